//! # Ground Link
//!
//! Ground-side endpoint for a spacecraft telemetry link. It receives sensor
//! telemetry and on-demand log blocks over an unreliable datagram transport,
//! validates every line against its checksum, and drives the single-flight
//! log-download handshake with the remote device.
//!
//! ## Quick Start
//!
//! ```no_run
//! use groundlink::{Command, GroundLink, LinkConfig, TracingSink, UdpTransmitter};
//! use groundlink::devices::DeviceId;
//! use std::sync::Arc;
//!
//! let config = LinkConfig::default();
//! let transmitter = UdpTransmitter::bind(config.send_addr()).unwrap();
//! let link = GroundLink::new(&config, Arc::new(transmitter), Arc::new(TracingSink));
//!
//! link.submit(Command::getlog(1, DeviceId::OxygenSystem, "temp")).unwrap();
//! println!("{:?}", link.query_stats(DeviceId::OxygenSystem).unwrap());
//! ```
//!
//! ## Architecture
//!
//! - [`codec`] - raw line validation and decoding
//! - [`store`] - append-only JSON-lines log store and failure counting
//! - [`dispatcher`] - command queue with single-flight sending
//! - [`handshake`] - log-download state and inactivity timeout
//! - [`ingress`] - per-line decode/classify/route pipeline
//! - [`link`] - the orchestrator shared by receive loop and command issuer
//! - [`transport`] - UDP transmitter and receive loop

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod command;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod ingress;
pub mod link;
pub mod store;
pub mod transport;

// Re-export main public types for convenience
pub use codec::{decode, encode, ParsedMessage, Payload, Source};
pub use command::{Command, Request};
pub use config::LinkConfig;
pub use dispatcher::{CommandDispatcher, PumpOutcome, Transmitter};
pub use error::{LinkError, Result, StoreError};
pub use handshake::LinkPhase;
pub use ingress::{LinkSink, TracingSink};
pub use link::GroundLink;
pub use store::{FailureStats, LogStore};
pub use transport::UdpTransmitter;
