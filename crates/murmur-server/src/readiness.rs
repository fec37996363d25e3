//! Readiness set construction and result resolution.
//!
//! Each cycle the set is rebuilt from scratch: the listener first, then every
//! session that is not closing, in ascending slot order, all with read
//! interest. After the wait, each entry carries the conditions reported for
//! it. Because handlers run between the wait and the lookup, an entry may
//! point at a slot that has since been released or reused, possibly by a new
//! connection that was handed the same descriptor number;
//! [`ReadinessSet::resolve`] filters those out by activation generation.

use std::io;

use murmur_core::{Handle, Interest, Readiness, Timeout};

use crate::registry::{Generation, Registry, Slot};

/// What a readiness entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The listening endpoint.
    Listener,
    /// The session in this slot.
    Session(Slot),
}

/// One `(handle, interest)` registration and the conditions reported for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// What the handle belongs to.
    pub target: Target,
    /// Activation the entry was built for; [`Generation::NONE`] for the
    /// listener.
    pub generation: Generation,
    /// Handle captured when the set was built.
    pub handle: Handle,
    /// Conditions to wait for.
    pub interest: Interest,
    /// Conditions reported by the last wait.
    pub readiness: Readiness,
}

/// Ordered registrations for one readiness cycle.
#[derive(Debug, Default)]
pub struct ReadinessSet {
    entries: Vec<Entry>,
}

impl ReadinessSet {
    /// Empty set with room for the listener plus `sessions` entries.
    pub fn with_capacity(sessions: usize) -> Self {
        Self {
            entries: Vec::with_capacity(sessions + 1),
        }
    }

    /// Replace the contents with the listener followed by every non-closing
    /// session of `registry`.
    pub fn rebuild<S>(&mut self, listener: Handle, registry: &Registry<S>) {
        self.entries.clear();
        self.entries.push(Entry {
            target: Target::Listener,
            generation: Generation::NONE,
            handle: listener,
            interest: Interest::READABLE,
            readiness: Readiness::EMPTY,
        });
        self.entries.extend(
            registry
                .iter()
                .filter(|s| !s.is_closing())
                .map(|s| Entry {
                    target: Target::Session(s.slot()),
                    generation: s.generation(),
                    handle: s.handle(),
                    interest: Interest::READABLE,
                    readiness: Readiness::EMPTY,
                }),
        );
    }

    /// All entries, listener first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// All entries, mutably, for a multiplexer to fill in readiness.
    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty (only before the first rebuild).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Conditions reported for the listener.
    pub fn listener_readiness(&self) -> Readiness {
        self.entries
            .first()
            .filter(|e| e.target == Target::Listener)
            .map_or(Readiness::EMPTY, |e| e.readiness)
    }

    /// Session entries that reported any condition, in set order.
    pub fn ready_sessions(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.target, Target::Session(_)) && !e.readiness.is_empty())
    }

    /// Number of entries that reported any condition.
    pub fn ready_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.readiness.is_empty())
            .count()
    }

    /// Map an entry back to its target, or `None` when the session it was
    /// built for is gone (slot free, or reused by a later activation even
    /// under the same handle).
    pub fn resolve<S>(entry: &Entry, registry: &Registry<S>) -> Option<Target> {
        match entry.target {
            Target::Listener => Some(Target::Listener),
            Target::Session(slot) => registry
                .get(slot)
                .filter(|s| s.generation() == entry.generation)
                .map(|_| entry.target),
        }
    }
}

/// The external readiness wait.
///
/// Implementations block for at most `timeout` until at least one entry of
/// `set` is ready, write the reported conditions into each entry and return
/// the number of entries with a non-empty readiness. `listener` and
/// `registry` give access to the handles the set was built from.
pub trait Multiplexer<L, S> {
    /// Wait for readiness on the entries of `set`.
    fn wait(
        &mut self,
        set: &mut ReadinessSet,
        listener: &L,
        registry: &Registry<S>,
        timeout: Timeout,
    ) -> io::Result<usize>;
}
