//! Connection registry: a fixed-capacity, slot-indexed session arena.
//!
//! Sessions are addressed by [`Slot`] everywhere outside this module, never by
//! raw handle, so releasing and reusing a slot cannot leave a dangling alias.
//! Iteration is always in ascending slot order.
//!
//! Each activation also gets a [`Generation`] that is never reused, so a
//! record taken before a slot was recycled can tell it is out of date even
//! when the new session landed on the same slot and the same handle.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use murmur_core::constants::NICKNAME_MAX_CHARS;
use murmur_core::{Handle, Stream};
use tracing::debug;

use crate::errors::RegistryError;

/// Stable index of a session's storage in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    /// Wrap a slot index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one activation. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Placeholder for entries that do not refer to a session.
    pub const NONE: Self = Self(0);
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session's display name: non-empty, printable, at most
/// [`NICKNAME_MAX_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Name assigned on activation: `user` followed by the slot in decimal.
    pub fn default_for(slot: Slot) -> Self {
        Self(format!("user{slot}"))
    }

    /// Parse a requested name from raw client bytes.
    ///
    /// Input stops at the first `\r` or `\n`. Invalid UTF-8 is replaced,
    /// control characters are dropped, surrounding whitespace is trimmed and
    /// the result is cut to [`NICKNAME_MAX_CHARS`] characters. Returns `None`
    /// when nothing printable remains.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let end = raw
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(raw.len());
        let text = String::from_utf8_lossy(&raw[..end]);
        let cleaned: String = text.chars().filter(|c| !c.is_control()).collect();
        let name: String = cleaned.trim().chars().take(NICKNAME_MAX_CHARS).collect();
        let name = name.trim_end();
        (!name.is_empty()).then(|| Self(name.to_string()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Nickname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not yet installed in a slot.
    Connecting,
    /// Installed and exchanging lines.
    Active,
    /// Flagged for teardown at the end of the current handler.
    Closing,
}

/// One accepted connection.
#[derive(Debug)]
pub struct Session<S> {
    slot: Slot,
    generation: Generation,
    handle: Handle,
    stream: S,
    nickname: Nickname,
    peer: SocketAddr,
    state: SessionState,
    connected_at: Instant,
}

impl<S: Stream> Session<S> {
    fn connecting(slot: Slot, generation: Generation, stream: S, peer: SocketAddr) -> Self {
        Self {
            slot,
            generation,
            handle: stream.handle(),
            stream,
            nickname: Nickname::default_for(slot),
            peer,
            state: SessionState::Connecting,
            connected_at: Instant::now(),
        }
    }
}

impl<S> Session<S> {
    /// Registry slot.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Activation identity.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Handle captured at accept time.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current display name.
    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is waiting for teardown.
    pub fn is_closing(&self) -> bool {
        self.state == SessionState::Closing
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// The underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// The underlying stream, mutably.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Replace the nickname, returning the previous one.
    pub fn rename(&mut self, nickname: Nickname) -> Nickname {
        std::mem::replace(&mut self.nickname, nickname)
    }

    /// Flag the session for teardown. Returns `false` if it already was.
    pub fn mark_closing(&mut self) -> bool {
        let changed = self.state != SessionState::Closing;
        self.state = SessionState::Closing;
        changed
    }
}

/// What remains of a session after its slot is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departed {
    /// The slot that was freed.
    pub slot: Slot,
    /// Last-known nickname, for the leave announcement.
    pub nickname: Nickname,
    /// Remote address.
    pub peer: SocketAddr,
    /// Handle that was closed.
    pub handle: Handle,
    /// How long the session was connected.
    pub connected_for: Duration,
}

/// Fixed-capacity arena of sessions indexed by [`Slot`].
#[derive(Debug)]
pub struct Registry<S> {
    slots: Vec<Option<Session<S>>>,
    active: usize,
    last_generation: u64,
}

impl<S> Registry<S> {
    /// Create an empty registry with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            active: 0,
            last_generation: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.active
    }

    /// Whether no session is active.
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.active == self.slots.len()
    }

    /// Lowest free slot. Never evicts an existing session.
    pub fn allocate(&self) -> Result<Slot, RegistryError> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(Slot)
            .ok_or(RegistryError::Full {
                capacity: self.capacity(),
            })
    }

    /// Free `slot`, dropping (and so closing) its stream exactly once.
    ///
    /// Releasing a free slot is a no-op and returns `None`.
    pub fn release(&mut self, slot: Slot) -> Option<Departed> {
        let session = self.slots.get_mut(slot.0)?.take()?;
        self.active -= 1;
        debug!(%slot, handle = %session.handle, "slot released");
        let connected_for = session.age();
        Some(Departed {
            slot,
            nickname: session.nickname,
            peer: session.peer,
            handle: session.handle,
            connected_for,
        })
    }

    /// Slot of the active session owning `handle`.
    pub fn find(&self, handle: Handle) -> Option<Slot> {
        self.iter().find(|s| s.handle == handle).map(|s| s.slot)
    }

    /// Session in `slot`, if active.
    pub fn get(&self, slot: Slot) -> Option<&Session<S>> {
        self.slots.get(slot.0)?.as_ref()
    }

    /// Session in `slot`, mutably, if active.
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Session<S>> {
        self.slots.get_mut(slot.0)?.as_mut()
    }

    /// Snapshot of active slots in ascending order.
    pub fn slots(&self) -> Vec<Slot> {
        self.iter().map(|s| s.slot).collect()
    }

    /// Active sessions in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Session<S>> {
        self.slots.iter().flatten()
    }

    /// Active sessions in ascending slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session<S>> {
        self.slots.iter_mut().flatten()
    }

    /// Flag `slot` for teardown. Returns `false` if the slot is free or
    /// already closing.
    pub fn mark_closing(&mut self, slot: Slot) -> bool {
        self.get_mut(slot).is_some_and(Session::mark_closing)
    }

    /// Slots flagged for teardown, ascending.
    pub fn closing_slots(&self) -> Vec<Slot> {
        self.iter()
            .filter(|s| s.is_closing())
            .map(|s| s.slot)
            .collect()
    }
}

impl<S: Stream> Registry<S> {
    /// Install a new session in a free `slot` with its default nickname.
    pub fn activate(
        &mut self,
        slot: Slot,
        stream: S,
        peer: SocketAddr,
    ) -> Result<&mut Session<S>, RegistryError> {
        match self.slots.get(slot.0) {
            None => {
                return Err(RegistryError::OutOfRange {
                    slot,
                    capacity: self.capacity(),
                });
            }
            Some(Some(_)) => return Err(RegistryError::Occupied(slot)),
            Some(None) => {}
        }
        self.last_generation += 1;
        let generation = Generation(self.last_generation);
        let mut session = Session::connecting(slot, generation, stream, peer);
        session.state = SessionState::Active;
        self.active += 1;
        Ok(self.slots[slot.0].insert(session))
    }
}
