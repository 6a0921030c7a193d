//! Wire protocol for the Vocalink message bus.
//!
//! One request, one reply, in order — except `Message`, which the broker
//! pushes to every subscriber of a channel at any time. Payloads and
//! stored values are opaque strings; the broker never inspects them.

use serde::{Deserialize, Serialize};

/// Requests a client sends to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusRequest {
    /// Register interest in a channel. Published payloads arrive as
    /// [`BusReply::Message`] frames.
    Subscribe { channel: String },
    /// Deliver a payload to every current subscriber of the channel.
    Publish { channel: String, payload: String },
    /// Store a value, optionally expiring after `ttl_secs`.
    KvSet {
        key: String,
        value: String,
        ttl_secs: Option<u64>,
    },
    KvGet { key: String },
    KvDelete { key: String },
    /// All live keys starting with `prefix`.
    KvKeys { prefix: String },
}

/// Broker replies and pushed messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusReply {
    /// Acknowledges Subscribe, Publish, and KvSet.
    Ok,
    /// A payload published on a channel this connection subscribed to.
    Message { channel: String, payload: String },
    Value { value: Option<String> },
    Deleted { existed: bool },
    Keys { keys: Vec<String> },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_through_json() {
        let requests = vec![
            BusRequest::Subscribe {
                channel: "vocalink:commands".into(),
            },
            BusRequest::KvSet {
                key: "k".into(),
                value: "v".into(),
                ttl_secs: Some(3600),
            },
            BusRequest::KvKeys {
                prefix: "vocalink:cmd:".into(),
            },
        ];
        for request in requests {
            let json = serde_json::to_string(&request).unwrap();
            let back: BusRequest = serde_json::from_str(&json).unwrap();
            assert_eq!(back, request);
        }
    }
}
