//! Best-effort fan-out of one line to many sessions.
//!
//! Each recipient gets exactly one non-blocking write attempt. Nothing is
//! queued: a short write or a full socket buffer loses (part of) the line for
//! that recipient only. A hard write error flags the recipient for teardown
//! and delivery continues with the rest.

use metrics::counter;
use murmur_core::{Stream, WriteOutcome};
use tracing::{debug, warn};

use crate::metrics::BROADCAST_DROPS_TOTAL;
use crate::registry::{Registry, Slot};

/// Which sessions receive a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every active session.
    Everyone,
    /// Every active session except this one.
    EveryoneExcept(Slot),
    /// Only this session (direct replies).
    Only(Slot),
}

impl Audience {
    /// Whether `slot` is a recipient.
    pub fn includes(self, slot: Slot) -> bool {
        match self {
            Self::Everyone => true,
            Self::EveryoneExcept(excluded) => slot != excluded,
            Self::Only(target) => slot == target,
        }
    }
}

/// Per-call delivery tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients that accepted the whole line.
    pub delivered: usize,
    /// Recipients that accepted only part of it.
    pub partial: usize,
    /// Recipients whose outbound buffer was full.
    pub not_ready: usize,
    /// Recipients whose write failed hard (now closing).
    pub failed: usize,
}

impl BroadcastReport {
    /// Recipients a write was attempted on.
    pub fn attempted(&self) -> usize {
        self.delivered + self.partial + self.not_ready + self.failed
    }

    /// Recipients that did not get the complete line.
    pub fn dropped(&self) -> usize {
        self.partial + self.not_ready + self.failed
    }
}

/// Write `message` once to every non-closing session in `audience`, in slot
/// order.
pub fn broadcast<S: Stream>(
    registry: &mut Registry<S>,
    message: &[u8],
    audience: Audience,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for session in registry.iter_mut() {
        let slot = session.slot();
        if !audience.includes(slot) || session.is_closing() {
            continue;
        }
        match session.stream_mut().write(message) {
            Ok(outcome) if outcome.is_complete(message.len()) => report.delivered += 1,
            Ok(WriteOutcome::Accepted(n)) => {
                debug!(%slot, written = n, len = message.len(), "partial write, remainder dropped");
                counter!(BROADCAST_DROPS_TOTAL, "reason" => "partial").increment(1);
                report.partial += 1;
            }
            Ok(WriteOutcome::NotReady) => {
                debug!(%slot, len = message.len(), "outbound buffer full, line dropped");
                counter!(BROADCAST_DROPS_TOTAL, "reason" => "not_ready").increment(1);
                report.not_ready += 1;
            }
            Err(e) => {
                warn!(%slot, nickname = %session.nickname(), error = %e, "write failed, closing session");
                counter!(BROADCAST_DROPS_TOTAL, "reason" => "error").increment(1);
                let _ = session.mark_closing();
                report.failed += 1;
            }
        }
    }
    report
}
