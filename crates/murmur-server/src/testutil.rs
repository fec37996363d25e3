//! Scripted fakes for driving the server without sockets.
//!
//! - [`FakeStream`] / [`Remote`]: an in-memory connection; the test holds the
//!   `Remote` end to feed input, inspect output and shape write behaviour.
//! - [`FakeListener`] / [`Connector`]: a listener whose pending connections
//!   the test enqueues.
//! - [`ScriptedMultiplexer`] / [`Script`]: a readiness wait that reports
//!   whatever the test scripted, keyed by handle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

use murmur_core::{
    AcceptOutcome, Handle, Listener, ReadOutcome, Readiness, Stream, Timeout, WriteOutcome,
};

use crate::readiness::{Multiplexer, ReadinessSet};
use crate::registry::Registry;
use crate::shutdown::ShutdownCoordinator;

static NEXT_HANDLE: AtomicI32 = AtomicI32::new(1000);

fn next_handle() -> Handle {
    Handle::new(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// Loopback address with a port derived from `n`.
pub fn peer_addr(n: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000 + u16::try_from(n).unwrap()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Streams
// ─────────────────────────────────────────────────────────────────────────────

enum Inbound {
    Data(Vec<u8>),
    Eof,
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct Wire {
    inbound: VecDeque<Inbound>,
    outbound: Vec<u8>,
    write_limit: Option<usize>,
    write_blocked: bool,
    write_error: Option<io::ErrorKind>,
    closes: usize,
    reads: usize,
}

/// Server side of an in-memory connection.
pub struct FakeStream {
    handle: Handle,
    wire: Rc<RefCell<Wire>>,
}

/// Test side of an in-memory connection.
#[derive(Clone)]
pub struct Remote {
    handle: Handle,
    wire: Rc<RefCell<Wire>>,
}

impl FakeStream {
    /// A connected pair with a fresh handle.
    pub fn pair() -> (Self, Remote) {
        Self::pair_with(next_handle())
    }

    /// A connected pair on `handle`, as when the kernel hands out a
    /// descriptor number that was just closed.
    pub fn pair_with(handle: Handle) -> (Self, Remote) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        (
            Self {
                handle,
                wire: Rc::clone(&wire),
            },
            Remote { handle, wire },
        )
    }
}

impl Stream for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let mut wire = self.wire.borrow_mut();
        wire.reads += 1;
        match wire.inbound.pop_front() {
            Some(Inbound::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    wire.inbound.push_front(Inbound::Data(bytes[n..].to_vec()));
                }
                Ok(ReadOutcome::Data(n))
            }
            Some(Inbound::Eof) => {
                wire.inbound.push_front(Inbound::Eof);
                Ok(ReadOutcome::Eof)
            }
            Some(Inbound::Fail(kind)) => Err(io::Error::from(kind)),
            None => Ok(ReadOutcome::NotReady),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome> {
        let mut wire = self.wire.borrow_mut();
        if let Some(kind) = wire.write_error {
            return Err(io::Error::from(kind));
        }
        if wire.write_blocked {
            return Ok(WriteOutcome::NotReady);
        }
        let n = wire.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        wire.outbound.extend_from_slice(&buf[..n]);
        Ok(WriteOutcome::Accepted(n))
    }

    fn handle(&self) -> Handle {
        self.handle
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.wire.borrow_mut().closes += 1;
    }
}

impl std::fmt::Debug for FakeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeStream").field("handle", &self.handle).finish()
    }
}

impl Remote {
    /// Handle of the server side.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Queue bytes for the server to read (one read returns at most this chunk).
    pub fn send(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.wire
                .borrow_mut()
                .inbound
                .push_back(Inbound::Data(bytes.to_vec()));
        }
    }

    /// Close the sending side; every later read reports EOF.
    pub fn hang_up(&self) {
        self.wire.borrow_mut().inbound.push_back(Inbound::Eof);
    }

    /// Make the next read fail hard.
    pub fn fail_read(&self, kind: io::ErrorKind) {
        self.wire.borrow_mut().inbound.push_back(Inbound::Fail(kind));
    }

    /// Everything the server wrote since the last call.
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.wire.borrow_mut().outbound);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Accept at most `n` bytes per write.
    pub fn limit_writes(&self, n: usize) {
        self.wire.borrow_mut().write_limit = Some(n);
    }

    /// Report every write as not ready.
    pub fn block_writes(&self) {
        self.wire.borrow_mut().write_blocked = true;
    }

    /// Make every write fail hard.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.wire.borrow_mut().write_error = Some(kind);
    }

    /// Whether the server side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// How many times the server side was dropped.
    pub fn close_count(&self) -> usize {
        self.wire.borrow().closes
    }

    /// How many reads the server attempted.
    pub fn reads(&self) -> usize {
        self.wire.borrow().reads
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────────

type Backlog = Rc<RefCell<VecDeque<io::Result<FakeStream>>>>;

/// Listener whose pending connections come from a [`Connector`].
pub struct FakeListener {
    handle: Handle,
    backlog: Backlog,
    accepted: usize,
}

/// Test side of a [`FakeListener`].
pub struct Connector {
    handle: Handle,
    backlog: Backlog,
}

impl FakeListener {
    /// A listener and the connector that feeds it.
    pub fn new() -> (Self, Connector) {
        let handle = next_handle();
        let backlog: Backlog = Rc::default();
        (
            Self {
                handle,
                backlog: Rc::clone(&backlog),
                accepted: 0,
            },
            Connector { handle, backlog },
        )
    }
}

impl Listener for FakeListener {
    type Stream = FakeStream;

    fn accept(&mut self) -> io::Result<AcceptOutcome<FakeStream>> {
        match self.backlog.borrow_mut().pop_front() {
            Some(Ok(stream)) => {
                let peer = peer_addr(self.accepted);
                self.accepted += 1;
                Ok(AcceptOutcome::Accepted { stream, peer })
            }
            Some(Err(e)) => Err(e),
            None => Ok(AcceptOutcome::NotReady),
        }
    }

    fn handle(&self) -> Handle {
        self.handle
    }
}

impl Connector {
    /// Handle of the listener.
    pub fn listener_handle(&self) -> Handle {
        self.handle
    }

    /// Queue a pending connection and return its test side.
    pub fn connect(&self) -> Remote {
        let (stream, remote) = FakeStream::pair();
        self.backlog.borrow_mut().push_back(Ok(stream));
        remote
    }

    /// Queue a pending connection whose server side uses `handle`.
    pub fn connect_on(&self, handle: Handle) -> Remote {
        let (stream, remote) = FakeStream::pair_with(handle);
        self.backlog.borrow_mut().push_back(Ok(stream));
        remote
    }

    /// Make the next accept fail hard.
    pub fn fail_accept(&self, kind: io::ErrorKind) {
        self.backlog.borrow_mut().push_back(Err(io::Error::from(kind)));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Multiplexer
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Ready(Vec<(Handle, Readiness)>),
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct Plan {
    steps: VecDeque<Step>,
    on_exhausted: Option<ShutdownCoordinator>,
    waits: Vec<Timeout>,
}

/// Readiness wait that replays a [`Script`].
pub struct ScriptedMultiplexer {
    plan: Rc<RefCell<Plan>>,
}

/// Test side of a [`ScriptedMultiplexer`].
#[derive(Clone)]
pub struct Script {
    plan: Rc<RefCell<Plan>>,
}

impl ScriptedMultiplexer {
    /// A multiplexer with an empty script.
    pub fn new() -> (Self, Script) {
        let plan = Rc::new(RefCell::new(Plan::default()));
        (
            Self {
                plan: Rc::clone(&plan),
            },
            Script { plan },
        )
    }
}

impl<L, S> Multiplexer<L, S> for ScriptedMultiplexer {
    fn wait(
        &mut self,
        set: &mut ReadinessSet,
        _listener: &L,
        _registry: &Registry<S>,
        timeout: Timeout,
    ) -> io::Result<usize> {
        let mut plan = self.plan.borrow_mut();
        plan.waits.push(timeout);
        match plan.steps.pop_front() {
            Some(Step::Ready(ready)) => {
                for entry in set.entries_mut() {
                    for (handle, readiness) in &ready {
                        if entry.handle == *handle {
                            entry.readiness |= *readiness;
                        }
                    }
                }
                Ok(set.ready_count())
            }
            Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
            None => match &plan.on_exhausted {
                Some(coordinator) => {
                    coordinator.shutdown();
                    Err(io::Error::from(io::ErrorKind::Interrupted))
                }
                None => Ok(0),
            },
        }
    }
}

impl Script {
    /// Next wait reports these conditions.
    pub fn ready(&self, ready: &[(Handle, Readiness)]) {
        self.plan
            .borrow_mut()
            .steps
            .push_back(Step::Ready(ready.to_vec()));
    }

    /// Next wait reports these handles readable.
    pub fn readable(&self, handles: &[Handle]) {
        let ready: Vec<(Handle, Readiness)> =
            handles.iter().map(|h| (*h, Readiness::READABLE)).collect();
        self.ready(&ready);
    }

    /// Next wait fails with `kind`.
    pub fn fail(&self, kind: io::ErrorKind) {
        self.plan.borrow_mut().steps.push_back(Step::Fail(kind));
    }

    /// Once the script runs out, request shutdown and report an interrupted
    /// wait, as a signal would.
    pub fn shutdown_when_exhausted(&self, coordinator: ShutdownCoordinator) {
        self.plan.borrow_mut().on_exhausted = Some(coordinator);
    }

    /// Timeouts passed to each wait so far.
    pub fn waits(&self) -> Vec<Timeout> {
        self.plan.borrow().waits.clone()
    }
}
