//! Thin wrappers over the system calls murmur needs, built on `rustix`.

pub mod net;
pub mod nonblock;
