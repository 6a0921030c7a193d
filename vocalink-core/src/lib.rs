//! # vocalink-core
//!
//! Backend library for the Vocalink effect control plane. Provides the
//! command store and device registry over the bus primitive, the
//! control-plane [`dispatch::Dispatcher`], the device-side
//! [`processor::CommandProcessor`], and the client runtime loops —
//! independent of any HTTP or UI surface.

pub mod config;
pub mod dispatch;
pub mod processor;
pub mod store;
pub mod worker;

pub use config::Config;
pub use dispatch::{Dispatcher, SubmitError};
pub use processor::{ApplyError, CommandPhase, CommandProcessor};
pub use store::{CommandStore, DeviceRegistry, StoreError};
pub use worker::ClientRuntime;
