//! Level-triggered readiness wait on `poll(2)`.

use std::io;
use std::os::fd::AsFd;

use murmur_core::{Interest, Readiness, Timeout};
use rustix::event::{PollFd, PollFlags, Timespec, poll};

use crate::readiness::{Multiplexer, ReadinessSet, Target};
use crate::registry::Registry;

/// [`Multiplexer`] backed by `poll(2)`.
///
/// The descriptor array is rebuilt from the readiness set on every call, so
/// it always borrows handles that are live for the duration of the wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollMultiplexer;

impl PollMultiplexer {
    /// Create a poll-backed multiplexer.
    pub fn new() -> Self {
        Self
    }
}

impl<L: AsFd, S: AsFd> Multiplexer<L, S> for PollMultiplexer {
    fn wait(
        &mut self,
        set: &mut ReadinessSet,
        listener: &L,
        registry: &Registry<S>,
        timeout: Timeout,
    ) -> io::Result<usize> {
        let mut fds = Vec::with_capacity(set.len());
        let mut positions = Vec::with_capacity(set.len());
        for (pos, entry) in set.entries().iter().enumerate() {
            let fd = match entry.target {
                Target::Listener => listener.as_fd(),
                Target::Session(slot) => match registry.get(slot) {
                    Some(session) => session.stream().as_fd(),
                    None => continue,
                },
            };
            fds.push(PollFd::from_borrowed_fd(fd, poll_flags(entry.interest)));
            positions.push(pos);
        }

        let timespec = timespec(timeout);
        let _ = poll(&mut fds, timespec.as_ref())?;

        let entries = set.entries_mut();
        let mut ready = 0;
        for (fd, &pos) in fds.iter().zip(&positions) {
            let readiness = readiness(fd.revents());
            entries[pos].readiness = readiness;
            if !readiness.is_empty() {
                ready += 1;
            }
        }
        Ok(ready)
    }
}

fn poll_flags(interest: Interest) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.is_readable() {
        flags |= PollFlags::IN;
    }
    if interest.is_writable() {
        flags |= PollFlags::OUT;
    }
    flags
}

fn readiness(revents: PollFlags) -> Readiness {
    const MAP: [(PollFlags, Readiness); 5] = [
        (PollFlags::IN, Readiness::READABLE),
        (PollFlags::OUT, Readiness::WRITABLE),
        (PollFlags::ERR, Readiness::ERROR),
        (PollFlags::HUP, Readiness::HANG_UP),
        (PollFlags::NVAL, Readiness::INVALID),
    ];
    MAP.iter()
        .filter(|(flag, _)| revents.contains(*flag))
        .fold(Readiness::EMPTY, |acc, (_, r)| acc | *r)
}

fn timespec(timeout: Timeout) -> Option<Timespec> {
    timeout.as_duration().map(|d| Timespec {
        tv_sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        tv_nsec: d.subsec_nanos().into(),
    })
}
