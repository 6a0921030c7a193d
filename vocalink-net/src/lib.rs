//! Network layer for the Vocalink control plane.
//!
//! This crate provides the pub/sub + keyed-storage primitive the rest of
//! the system is built on: a small TCP broker ([`BusServer`]), a client
//! ([`BusClient`]), and an in-process implementation ([`MemoryBus`]) for
//! tests and single-process deployments. All three speak through the
//! [`MessageBus`] trait.

pub mod bus;
pub mod client;
pub mod framing;
pub mod memory;
pub mod protocol;
pub mod server;

pub use bus::MessageBus;
pub use client::BusClient;
pub use memory::MemoryBus;
pub use protocol::{BusReply, BusRequest};
pub use server::BusServer;
