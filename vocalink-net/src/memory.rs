//! In-process implementation of the bus primitive.
//!
//! Used by tests and by single-process deployments where broker and client
//! share one address space. Semantics match the TCP broker: fan-out to
//! every subscriber, lazy expiry of TTL'd keys.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::bus::MessageBus;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<Sender<String>>>,
    store: HashMap<String, Entry>,
}

/// An in-memory [`MessageBus`].
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<Inner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageBus for MemoryBus {
    fn publish(&self, channel: &str, payload: &str) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.get_mut(channel) {
            // Drop subscribers whose receiver is gone.
            senders.retain(|tx| tx.send(payload.to_string()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> io::Result<Receiver<String>> {
        let (tx, rx) = unbounded();
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    fn kv_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> io::Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.inner.lock().unwrap().store.insert(key.to_string(), entry);
        Ok(())
    }

    fn kv_get(&self, key: &str) -> io::Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        match inner.store.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.store.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn kv_delete(&self, key: &str) -> io::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        match inner.store.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    fn kv_keys(&self, prefix: &str) -> io::Result<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.store.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = inner
            .store
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
