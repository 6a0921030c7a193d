//! The Vocalink bus broker.
//!
//! Accepts client connections, fans published payloads out to channel
//! subscribers, and owns the keyed store with TTL expiry. One reader
//! thread per connection feeds requests over a channel into `poll`, which
//! owns every writer and all broker state — the same shape as any
//! single-owner poll loop, so no per-connection locking is needed.

use std::collections::{HashMap, HashSet};
use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::framing::{read_message, write_message};
use crate::protocol::{BusReply, BusRequest};

/// Poll cadence of [`BusServer::run`].
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnId(u64);

enum Event {
    Request(BusRequest),
    Disconnected,
}

struct Connection {
    writer: BufWriter<TcpStream>,
    subscriptions: HashSet<String>,
}

impl Connection {
    fn send(&mut self, reply: &BusReply) -> io::Result<()> {
        write_message(&mut self.writer, reply)
    }
}

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// The broker. Bind, then either call [`BusServer::poll`] from your own
/// loop or hand the whole thing to [`BusServer::run`].
pub struct BusServer {
    listener: TcpListener,
    connections: HashMap<ConnId, Connection>,
    event_rx: Receiver<(ConnId, Event)>,
    event_tx: Sender<(ConnId, Event)>,
    next_conn_id: u64,
    store: HashMap<String, StoredValue>,
}

impl BusServer {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let (event_tx, event_rx) = mpsc::channel();

        info!("Bus broker listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            connections: HashMap::new(),
            event_rx,
            event_tx,
            next_conn_id: 0,
            store: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept pending connections and handle every queued request.
    pub fn poll(&mut self) {
        self.accept_connections();
        self.sweep_expired();

        while let Ok((conn_id, event)) = self.event_rx.try_recv() {
            match event {
                Event::Request(request) => self.handle(conn_id, request),
                Event::Disconnected => {
                    if self.connections.remove(&conn_id).is_some() {
                        info!("Bus connection {:?} closed", conn_id);
                    }
                }
            }
        }
    }

    /// Poll until the shutdown flag is set.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            self.poll();
            thread::sleep(POLL_INTERVAL);
        }
        info!("Bus broker shutting down");
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let conn_id = ConnId(self.next_conn_id);
                    self.next_conn_id += 1;

                    let read_stream = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            error!("Failed to clone stream: {}", e);
                            continue;
                        }
                    };

                    let event_tx = self.event_tx.clone();
                    thread::spawn(move || {
                        conn_reader_thread(conn_id, read_stream, event_tx);
                    });

                    self.connections.insert(
                        conn_id,
                        Connection {
                            writer: BufWriter::new(stream),
                            subscriptions: HashSet::new(),
                        },
                    );

                    info!("Bus connection {:?} from {}", conn_id, addr);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle(&mut self, conn_id: ConnId, request: BusRequest) {
        match request {
            BusRequest::Subscribe { channel } => {
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    conn.subscriptions.insert(channel);
                    Self::reply(conn_id, conn, &BusReply::Ok);
                }
            }
            BusRequest::Publish { channel, payload } => {
                // Ack the publisher first, then fan out.
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    Self::reply(conn_id, conn, &BusReply::Ok);
                }
                let message = BusReply::Message { channel: channel.clone(), payload };
                let mut dead = Vec::new();
                for (&id, conn) in &mut self.connections {
                    if conn.subscriptions.contains(&channel) && conn.send(&message).is_err() {
                        dead.push(id);
                    }
                }
                for id in dead {
                    warn!("Dropping unwritable bus connection {:?}", id);
                    self.connections.remove(&id);
                }
            }
            BusRequest::KvSet { key, value, ttl_secs } => {
                self.store.insert(
                    key,
                    StoredValue {
                        value,
                        expires_at: ttl_secs.map(|s| Instant::now() + Duration::from_secs(s)),
                    },
                );
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    Self::reply(conn_id, conn, &BusReply::Ok);
                }
            }
            BusRequest::KvGet { key } => {
                let now = Instant::now();
                if self.store.get(&key).is_some_and(|v| v.is_expired(now)) {
                    self.store.remove(&key);
                }
                let value = self.store.get(&key).map(|v| v.value.clone());
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    Self::reply(conn_id, conn, &BusReply::Value { value });
                }
            }
            BusRequest::KvDelete { key } => {
                let now = Instant::now();
                let existed = match self.store.remove(&key) {
                    Some(value) => !value.is_expired(now),
                    None => false,
                };
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    Self::reply(conn_id, conn, &BusReply::Deleted { existed });
                }
            }
            BusRequest::KvKeys { prefix } => {
                let now = Instant::now();
                self.store.retain(|_, value| !value.is_expired(now));
                let mut keys: Vec<String> = self
                    .store
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .cloned()
                    .collect();
                keys.sort();
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    Self::reply(conn_id, conn, &BusReply::Keys { keys });
                }
            }
        }
    }

    fn reply(conn_id: ConnId, conn: &mut Connection, reply: &BusReply) {
        if let Err(e) = conn.send(reply) {
            warn!("Failed to reply to {:?}: {}", conn_id, e);
        }
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        self.store.retain(|_, value| !value.is_expired(now));
    }
}

/// Background thread that reads requests from one connection.
fn conn_reader_thread(conn_id: ConnId, stream: TcpStream, event_tx: Sender<(ConnId, Event)>) {
    let mut reader = BufReader::new(stream);

    loop {
        match read_message::<_, BusRequest>(&mut reader) {
            Ok(request) => {
                if event_tx.send((conn_id, Event::Request(request))).is_err() {
                    break;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    error!("Bus connection {:?} read error: {}", conn_id, e);
                }
                let _ = event_tx.send((conn_id, Event::Disconnected));
                break;
            }
        }
    }
}
