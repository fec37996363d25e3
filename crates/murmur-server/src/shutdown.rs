//! Graceful shutdown coordination via a shared atomic flag.
//!
//! Signal handlers only set the flag. The readiness wait returns
//! `Interrupted` when a signal lands, and the dispatch loop checks the flag
//! before every cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::debug;

use crate::errors::{Result, ServerError};

/// Coordinates shutdown between signal handlers and the dispatch loop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    flag: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag on SIGINT and SIGTERM.
    pub fn register_signals(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            let _ = signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .map_err(ServerError::Signal)?;
        }
        debug!("shutdown signal handlers registered");
        Ok(())
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
