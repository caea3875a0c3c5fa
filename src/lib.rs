//! Interface impairment control for a single network namespace
//!
//! This crate lets an external caller change the administrative state of an
//! interface and attach packet loss and latency to it:
//! - request validation and unit conversion in the [`engine`]
//! - netem encodings (loss as a `u32` fraction, latency in scheduler ticks)
//! - a single `RTM_NEWQDISC` replace per request over rtnetlink
//! - a small HTTP/JSON facade with a Running/Stopped lifecycle

pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod netem;
pub mod netlink;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for public API
pub use driver::{KernelControl, QdiscReplace};
pub use engine::{AppliedImpairment, ImpairmentEngine};
pub use errors::{DriverError, ImpairError, Result};
pub use netem::{FixedTickRate, NetemParameters, PschedClock, TickConverter};
pub use netlink::RtnetlinkSession;
pub use service::{ImpairService, ServiceState};
pub use types::*;
