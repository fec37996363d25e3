//! # murmur-server
//!
//! Single-threaded, readiness-driven chat server.
//!
//! - **Registry**: fixed-capacity slot arena of sessions ([`registry`])
//! - **Readiness**: per-cycle `(handle, interest)` set and the [`Multiplexer`]
//!   seam, with a `poll(2)` backend ([`sys::poll`])
//! - **Dispatch**: wait → dispatch loop with listener-first ordering ([`dispatch`])
//! - **Protocol**: join, `/name`, `/list`, `/help`, chat, leave ([`protocol`])
//! - **Broadcast**: one non-blocking write attempt per recipient ([`broadcast`])
//! - **Messages**: bounded, overflow-checked line construction ([`message`])
//! - **Ops**: metric names and Prometheus exporter, signal-driven shutdown

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod shutdown;
pub mod sys;

#[cfg(test)]
mod testutil;

pub use broadcast::{Audience, BroadcastReport, broadcast};
pub use config::ServerConfig;
pub use dispatch::{ChatServer, Cycle};
pub use errors::{RegistryError, Result, ServerError};
pub use readiness::{Multiplexer, ReadinessSet, Target};
pub use registry::{Generation, Nickname, Registry, Session, SessionState, Slot};
pub use shutdown::ShutdownCoordinator;
pub use sys::poll::PollMultiplexer;
