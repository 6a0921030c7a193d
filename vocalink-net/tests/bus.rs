//! Broker + client integration over loopback TCP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vocalink_net::{BusClient, BusServer, MessageBus};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct TestBroker {
    addr: String,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestBroker {
    fn start() -> Self {
        let server = BusServer::bind("127.0.0.1:0").expect("bind broker");
        let addr = server.local_addr().expect("local addr").to_string();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || server.run(flag));
        Self {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn publish_subscribe_across_connections() {
    let broker = TestBroker::start();

    let subscriber = BusClient::connect(&broker.addr, CONNECT_TIMEOUT).unwrap();
    let rx = subscriber.subscribe("commands").unwrap();

    let publisher = BusClient::connect(&broker.addr, CONNECT_TIMEOUT).unwrap();
    publisher.publish("commands", "{\"n\":1}").unwrap();
    publisher.publish("commands", "{\"n\":2}").unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "{\"n\":1}");
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "{\"n\":2}");
}

#[test]
fn unsubscribed_channels_stay_silent() {
    let broker = TestBroker::start();

    let client = BusClient::connect(&broker.addr, CONNECT_TIMEOUT).unwrap();
    let rx = client.subscribe("a").unwrap();
    client.publish("b", "other channel").unwrap();

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn kv_round_trip_with_ttl() {
    let broker = TestBroker::start();
    let client = BusClient::connect(&broker.addr, CONNECT_TIMEOUT).unwrap();

    client.kv_set("cmd:abc", "payload", None).unwrap();
    client
        .kv_set("cmd:gone", "payload", Some(Duration::from_secs(0)))
        .unwrap();
    client.kv_set("dev:1", "device", None).unwrap();

    assert_eq!(client.kv_get("cmd:abc").unwrap(), Some("payload".into()));
    assert_eq!(client.kv_get("missing").unwrap(), None);

    // TTL of zero expires immediately.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(client.kv_get("cmd:gone").unwrap(), None);
    assert_eq!(client.kv_keys("cmd:").unwrap(), vec!["cmd:abc".to_string()]);

    assert!(client.kv_delete("cmd:abc").unwrap());
    assert!(!client.kv_delete("cmd:abc").unwrap());
}

#[test]
fn self_published_messages_are_delivered() {
    // A device client subscribes to the command channel it also answers
    // on; the broker must loop its own messages back.
    let broker = TestBroker::start();
    let client = BusClient::connect(&broker.addr, CONNECT_TIMEOUT).unwrap();

    let rx = client.subscribe("loop").unwrap();
    client.publish("loop", "echo").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "echo");
}
