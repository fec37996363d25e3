//! The single-threaded event dispatch loop.
//!
//! One cycle: rebuild the readiness set, wait, then dispatch. The listener is
//! serviced before any session; sessions are serviced in the order of the set
//! (ascending slot). After each handler, sessions flagged `Closing` are torn
//! down until none remain, so a leave announcement that fails on another
//! recipient is itself followed by that recipient's teardown.

use std::io;
use std::net::{SocketAddr, TcpListener};

use metrics::counter;
use murmur_core::sys::net;
use murmur_core::{AcceptOutcome, Listener, Timeout};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::metrics::DISPATCH_CYCLES_TOTAL;
use crate::protocol::{Admission, Protocol};
use crate::readiness::{Entry, Multiplexer, ReadinessSet, Target};
use crate::registry::Registry;
use crate::shutdown::ShutdownCoordinator;
use crate::sys::poll::PollMultiplexer;

/// Outcome of one [`ChatServer::run_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// The wait returned with nothing ready (timeout, or a logged wait error).
    Idle,
    /// The wait was interrupted by a signal.
    Interrupted,
    /// This many entries were ready and have been dispatched.
    Dispatched {
        /// Entries reported ready by the wait.
        ready: usize,
    },
}

/// The chat server: listener, registry, protocol state and multiplexer.
pub struct ChatServer<L: Listener, M> {
    config: ServerConfig,
    listener: L,
    registry: Registry<L::Stream>,
    protocol: Protocol,
    set: ReadinessSet,
    pending: Vec<Entry>,
    mux: M,
    shutdown: ShutdownCoordinator,
}

impl ChatServer<TcpListener, PollMultiplexer> {
    /// Open the listening endpoint described by `config` and build a
    /// poll-driven server around it.
    pub fn bind(config: ServerConfig, shutdown: ShutdownCoordinator) -> Result<Self> {
        let listener = net::open_listener(&config.host, config.port, config.backlog())?;
        Ok(Self::new(config, listener, PollMultiplexer::new(), shutdown))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl<L, M> ChatServer<L, M>
where
    L: Listener,
    M: Multiplexer<L, L::Stream>,
{
    /// Assemble a server from an already-listening endpoint.
    pub fn new(config: ServerConfig, listener: L, mux: M, shutdown: ShutdownCoordinator) -> Self {
        let capacity = config.max_clients;
        Self {
            protocol: Protocol::new(&config),
            registry: Registry::new(capacity),
            set: ReadinessSet::with_capacity(capacity),
            pending: Vec::with_capacity(capacity),
            config,
            listener,
            mux,
            shutdown,
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Registry<L::Stream> {
        &self.registry
    }

    /// The configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run cycles until shutdown is requested or the listener fails, then
    /// close every session.
    ///
    /// A requested shutdown sends the shutdown notice first (when enabled)
    /// and returns `Ok`; a listener failure closes sessions silently and
    /// returns the error.
    pub fn run(&mut self) -> Result<()> {
        let timeout = self.config.poll_timeout();
        info!(
            handle = %self.listener.handle(),
            max_clients = self.config.max_clients,
            ?timeout,
            "chat server running"
        );
        let result = loop {
            if self.shutdown.is_shutting_down() {
                info!("shutdown requested");
                break Ok(());
            }
            match self.run_once(timeout) {
                Ok(Cycle::Interrupted) => debug!("readiness wait interrupted"),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };

        let announce = result.is_ok() && self.config.announce_shutdown;
        let closed = self.protocol.close_all(&mut self.registry, announce);
        match &result {
            Ok(()) => info!(closed, "chat server stopped"),
            Err(e) => warn!(closed, error = %e, "chat server stopped on fatal error"),
        }
        result
    }

    /// One wait → dispatch cycle.
    pub fn run_once(&mut self, timeout: Timeout) -> Result<Cycle> {
        self.set.rebuild(self.listener.handle(), &self.registry);

        let ready = match self
            .mux
            .wait(&mut self.set, &self.listener, &self.registry, timeout)
        {
            Ok(0) => return Ok(Cycle::Idle),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Cycle::Interrupted),
            Err(e) => {
                warn!(error = %e, "readiness wait failed");
                return Ok(Cycle::Idle);
            }
        };
        counter!(DISPATCH_CYCLES_TOTAL).increment(1);

        let listener_readiness = self.set.listener_readiness();
        if listener_readiness.is_terminal() {
            return Err(ServerError::ListenerFailed {
                readiness: listener_readiness,
            });
        }
        if listener_readiness.is_readable() {
            self.accept_pending();
        }

        self.pending.clear();
        self.pending.extend(self.set.ready_sessions().copied());
        for i in 0..self.pending.len() {
            let entry = self.pending[i];
            match ReadinessSet::resolve(&entry, &self.registry) {
                Some(Target::Session(slot)) => {
                    if entry.readiness.is_terminal() {
                        debug!(%slot, readiness = ?entry.readiness, "session hung up");
                        let _ = self.registry.mark_closing(slot);
                    } else if entry.readiness.is_readable() {
                        let _ = self.protocol.on_readable(&mut self.registry, slot);
                    }
                    self.drain_closing();
                }
                Some(Target::Listener) => {}
                None => debug!(
                    handle = %entry.handle,
                    generation = %entry.generation,
                    "stale readiness entry skipped"
                ),
            }
        }

        Ok(Cycle::Dispatched { ready })
    }

    /// Accept until the listener reports nothing pending.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok(AcceptOutcome::Accepted { stream, peer }) => {
                    if let Admission::Admitted(slot) =
                        self.protocol.admit(&mut self.registry, stream, peer)
                    {
                        debug!(%slot, %peer, "connection accepted");
                    }
                    self.drain_closing();
                }
                Ok(AcceptOutcome::NotReady) => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Tear down every session flagged `Closing`, including any flagged by
    /// the teardowns themselves.
    fn drain_closing(&mut self) {
        loop {
            let closing = self.registry.closing_slots();
            if closing.is_empty() {
                break;
            }
            for slot in closing {
                let _ = self.protocol.teardown(&mut self.registry, slot);
            }
        }
    }
}
