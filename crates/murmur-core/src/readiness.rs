//! Readiness vocabulary shared by the dispatch loop and multiplexers.
//!
//! These types mirror `poll(2)`: an [`Interest`] is what a caller registers
//! for a [`Handle`], a [`Readiness`] is what the readiness wait reports back,
//! and a [`Timeout`] bounds the wait.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Opaque identity of an I/O handle (a socket descriptor on Unix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(RawFd);

impl Handle {
    /// Wrap a raw descriptor number.
    pub const fn new(raw: RawFd) -> Self {
        Self(raw)
    }

    /// Handle of anything that owns a descriptor.
    pub fn of(source: &impl AsRawFd) -> Self {
        Self(source.as_raw_fd())
    }

    /// The raw descriptor number.
    pub const fn raw(self) -> RawFd {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Conditions a caller wants to be woken for.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    /// Data (or a pending connection) can be read without blocking.
    pub const READABLE: Self = Self(0b01);
    /// Writing now will not block.
    pub const WRITABLE: Self = Self(0b10);

    /// Whether read interest is registered.
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Whether write interest is registered.
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("Interest(READABLE | WRITABLE)"),
            (true, false) => f.write_str("Interest(READABLE)"),
            (false, true) => f.write_str("Interest(WRITABLE)"),
            (false, false) => f.write_str("Interest(NONE)"),
        }
    }
}

/// Conditions reported by the readiness wait for one entry.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    /// Nothing happened on this entry.
    pub const EMPTY: Self = Self(0);
    /// Bytes (or a connection) are available.
    pub const READABLE: Self = Self(0b0_0001);
    /// Outbound buffer has room.
    pub const WRITABLE: Self = Self(0b0_0010);
    /// Error condition on the handle.
    pub const ERROR: Self = Self(0b0_0100);
    /// Peer hung up.
    pub const HANG_UP: Self = Self(0b0_1000);
    /// The handle is not open.
    pub const INVALID: Self = Self(0b1_0000);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::READABLE, "READABLE"),
        (Self::WRITABLE, "WRITABLE"),
        (Self::ERROR, "ERROR"),
        (Self::HANG_UP, "HANG_UP"),
        (Self::INVALID, "INVALID"),
    ];

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Data available.
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// Room to write.
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Error, hang-up or invalid handle: the handle is no longer usable.
    ///
    /// Takes priority over [`Readiness::is_readable`] during dispatch.
    pub const fn is_terminal(self) -> bool {
        self.0 & (Self::ERROR.0 | Self::HANG_UP.0 | Self::INVALID.0) != 0
    }
}

impl BitOr for Readiness {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Readiness(EMPTY)");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Readiness({})", names.join(" | "))
    }
}

/// How long the readiness wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until at least one entry is ready.
    Infinite,
    /// Poll and return immediately.
    Immediate,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    /// Interpret a `poll(2)`-style millisecond value: negative waits
    /// indefinitely, zero polls, positive waits up to that many milliseconds.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => Self::Infinite,
            0 => Self::Immediate,
            ms => Self::After(Duration::from_millis(ms.unsigned_abs())),
        }
    }

    /// The bound as a duration, `None` when unbounded.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Immediate => Some(Duration::ZERO),
            Self::After(d) => Some(d),
        }
    }
}
