//! The transport primitive the control plane and the device clients share.

use std::io;
use std::time::Duration;

use crossbeam_channel::Receiver;

/// Publish/subscribe plus keyed storage with optional expiry.
///
/// Delivery is at-least-once from the consumer's point of view: a payload
/// may be seen more than once (redelivery, multiple subscribed processes),
/// so handlers must be safe to repeat. Per-channel ordering follows
/// publish order; nothing is guaranteed across channels.
pub trait MessageBus: Send + Sync {
    fn publish(&self, channel: &str, payload: &str) -> io::Result<()>;

    /// Register interest in a channel. Payloads published after this call
    /// arrive on the returned receiver in publish order.
    fn subscribe(&self, channel: &str) -> io::Result<Receiver<String>>;

    fn kv_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> io::Result<()>;

    fn kv_get(&self, key: &str) -> io::Result<Option<String>>;

    /// Returns whether the key existed.
    fn kv_delete(&self, key: &str) -> io::Result<bool>;

    /// All live (non-expired) keys starting with `prefix`.
    fn kv_keys(&self, prefix: &str) -> io::Result<Vec<String>>;
}
