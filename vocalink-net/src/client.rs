//! TCP client for the Vocalink message bus.
//!
//! One connection carries both request/reply traffic and pushed channel
//! messages. A background reader thread routes pushed `Message` frames to
//! the matching subscription channels and everything else to the caller
//! waiting for a reply. Requests are serialized behind a mutex, so replies
//! always pair with the request that is currently in flight.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use log::{error, info, warn};

use crate::bus::MessageBus;
use crate::framing::{read_message, write_message};
use crate::protocol::{BusReply, BusRequest};

/// How long a caller waits for the broker to answer one request.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

type SubscriberMap = Arc<Mutex<HashMap<String, Vec<crossbeam_channel::Sender<String>>>>>;

struct Core {
    writer: BufWriter<TcpStream>,
    replies: mpsc::Receiver<BusReply>,
}

/// A connected bus client. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct BusClient {
    core: Mutex<Core>,
    subscribers: SubscriberMap,
}

impl BusClient {
    /// Connect with a bounded timeout. Resolution failures and connect
    /// timeouts surface as `io::Error`, never panics.
    pub fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        info!("Connecting to bus at {}", addr);

        let sock_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))?;
        let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
        let read_stream = stream.try_clone()?;

        let writer = BufWriter::new(stream);
        let (reply_tx, reply_rx) = mpsc::channel();
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_subs = Arc::clone(&subscribers);
        thread::spawn(move || {
            bus_reader_thread(read_stream, reply_tx, reader_subs);
        });

        Ok(Self {
            core: Mutex::new(Core {
                writer,
                replies: reply_rx,
            }),
            subscribers,
        })
    }

    fn request(&self, request: &BusRequest) -> io::Result<BusReply> {
        let mut core = self.core.lock().unwrap();
        write_message(&mut core.writer, request)?;
        match core.replies.recv_timeout(REPLY_TIMEOUT) {
            Ok(BusReply::Error { message }) => {
                Err(io::Error::new(io::ErrorKind::InvalidData, message))
            }
            Ok(reply) => Ok(reply),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "bus reply timed out",
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "bus connection lost",
            )),
        }
    }

    fn unexpected(reply: BusReply) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected bus reply: {:?}", reply),
        )
    }
}

impl MessageBus for BusClient {
    fn publish(&self, channel: &str, payload: &str) -> io::Result<()> {
        match self.request(&BusRequest::Publish {
            channel: channel.to_string(),
            payload: payload.to_string(),
        })? {
            BusReply::Ok => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    fn subscribe(&self, channel: &str) -> io::Result<Receiver<String>> {
        let (tx, rx) = unbounded();
        // Register locally first so no frame can slip between the broker's
        // acknowledgement and our routing table.
        self.subscribers
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(tx);

        match self.request(&BusRequest::Subscribe {
            channel: channel.to_string(),
        })? {
            BusReply::Ok => Ok(rx),
            other => Err(Self::unexpected(other)),
        }
    }

    fn kv_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> io::Result<()> {
        match self.request(&BusRequest::KvSet {
            key: key.to_string(),
            value: value.to_string(),
            ttl_secs: ttl.map(|t| t.as_secs()),
        })? {
            BusReply::Ok => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    fn kv_get(&self, key: &str) -> io::Result<Option<String>> {
        match self.request(&BusRequest::KvGet {
            key: key.to_string(),
        })? {
            BusReply::Value { value } => Ok(value),
            other => Err(Self::unexpected(other)),
        }
    }

    fn kv_delete(&self, key: &str) -> io::Result<bool> {
        match self.request(&BusRequest::KvDelete {
            key: key.to_string(),
        })? {
            BusReply::Deleted { existed } => Ok(existed),
            other => Err(Self::unexpected(other)),
        }
    }

    fn kv_keys(&self, prefix: &str) -> io::Result<Vec<String>> {
        match self.request(&BusRequest::KvKeys {
            prefix: prefix.to_string(),
        })? {
            BusReply::Keys { keys } => Ok(keys),
            other => Err(Self::unexpected(other)),
        }
    }
}

/// Background thread that reads frames from the broker.
fn bus_reader_thread(
    stream: TcpStream,
    reply_tx: mpsc::Sender<BusReply>,
    subscribers: SubscriberMap,
) {
    let mut reader = BufReader::new(stream);

    loop {
        match read_message::<_, BusReply>(&mut reader) {
            Ok(BusReply::Message { channel, payload }) => {
                let mut subs = subscribers.lock().unwrap();
                if let Some(senders) = subs.get_mut(&channel) {
                    senders.retain(|tx| tx.send(payload.clone()).is_ok());
                }
            }
            Ok(reply) => {
                if reply_tx.send(reply).is_err() {
                    // Client dropped, shut the reader down.
                    break;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    error!("Bus read error: {}", e);
                } else {
                    warn!("Bus connection closed");
                }
                break;
            }
        }
    }

    info!("Bus reader thread exiting");
}
