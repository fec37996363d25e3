//! Per-session protocol: admission, line interpretation and teardown.
//!
//! A session moves `Connecting → Active → Closing`. Admission installs it
//! with its default name and announces it; each readable event reads one
//! chunk and interprets every line in it; EOF, a hard read error or a hard
//! write error flags it `Closing`, after which the dispatch loop calls
//! [`Protocol::teardown`] to release the slot and announce the departure.
//!
//! Framing: a chunk is split on `\n`, a `\r` before the split point is
//! dropped and empty lines are ignored. An unterminated tail is treated as a
//! complete line.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use murmur_core::{ReadOutcome, Stream};
use tracing::{debug, info, warn};

use crate::broadcast::{Audience, BroadcastReport, broadcast};
use crate::config::ServerConfig;
use crate::message::{self, MessageBuilder, Overflow};
use crate::metrics::{
    CONNECTIONS_REJECTED_TOTAL, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL, MESSAGES_TOTAL,
    SESSIONS_ACTIVE,
};
use crate::registry::{Departed, Nickname, Registry, Session, Slot};

// ─────────────────────────────────────────────────────────────────────────────
// Commands and framing
// ─────────────────────────────────────────────────────────────────────────────

/// A client line, interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/name <newname>`; the payload is everything after `/name `.
    Rename(&'a [u8]),
    /// `/list`
    List,
    /// `/help`
    Help,
    /// Anything else.
    Chat(&'a [u8]),
}

impl Command<'_> {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rename(_) => "rename",
            Self::List => "list",
            Self::Help => "help",
            Self::Chat(_) => "chat",
        }
    }
}

/// Interpret one line (without its terminator).
///
/// `/name` takes the rest of the line after a single space; `/list` and
/// `/help` must stand alone, optionally followed by whitespace.
pub fn parse_command(line: &[u8]) -> Command<'_> {
    if let Some(rest) = line.strip_prefix(b"/name ") {
        return Command::Rename(rest);
    }
    if is_bare(line, b"/name") {
        return Command::Rename(b"");
    }
    if is_bare(line, b"/list") {
        return Command::List;
    }
    if is_bare(line, b"/help") {
        return Command::Help;
    }
    Command::Chat(line)
}

fn is_bare(line: &[u8], command: &[u8]) -> bool {
    line.strip_prefix(command)
        .is_some_and(|rest| rest.iter().all(u8::is_ascii_whitespace))
}

/// Split a read chunk into non-empty lines, dropping `\n` and a preceding `\r`.
pub fn split_lines(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    chunk
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Result of offering a new connection to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Installed in this slot.
    Admitted(Slot),
    /// No free slot; the notice was written and the connection closed.
    Rejected,
}

/// What a readable event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Nothing to read after all, or the slot is gone.
    Idle,
    /// A chunk was read; this many lines were interpreted.
    Lines(usize),
    /// EOF or a hard error; the session is now closing.
    Closed,
}

/// Session protocol state shared across all sessions: the outbound message
/// buffer and the inbound read buffer.
#[derive(Debug)]
pub struct Protocol {
    server_name: String,
    builder: MessageBuilder,
    read_buf: Vec<u8>,
}

impl Protocol {
    /// Buffers sized for `config`.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            server_name: config.server_name.clone(),
            builder: MessageBuilder::new(config.message_capacity()),
            read_buf: vec![0; config.read_limit()],
        }
    }

    /// Install a freshly accepted connection, or reject it when the registry
    /// is full.
    ///
    /// On success the new session gets the welcome line and every other
    /// session the join announcement. On rejection the full notice gets one
    /// write attempt, then the stream is dropped; the registry is untouched.
    pub fn admit<S: Stream>(
        &mut self,
        registry: &mut Registry<S>,
        mut stream: S,
        peer: SocketAddr,
    ) -> Admission {
        let slot = match registry.allocate() {
            Ok(slot) => slot,
            Err(err) => {
                warn!(%peer, handle = %stream.handle(), error = %err, "rejecting connection");
                counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                self.reject(&mut stream);
                return Admission::Rejected;
            }
        };
        let nickname = match registry.activate(slot, stream, peer) {
            Ok(session) => session.nickname().clone(),
            Err(err) => {
                warn!(%slot, %peer, error = %err, "slot activation failed");
                return Admission::Rejected;
            }
        };

        counter!(CONNECTIONS_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        info!(%slot, %peer, %nickname, active = registry.len(), "session joined");

        let _ = deliver(&mut self.builder, registry, Audience::Only(slot), |b| {
            message::welcome(b, &self.server_name, &nickname)
        });
        let _ = deliver(&mut self.builder, registry, Audience::EveryoneExcept(slot), |b| {
            message::joined(b, &nickname)
        });
        Admission::Admitted(slot)
    }

    /// Read one chunk from `slot` and act on every line in it.
    pub fn on_readable<S: Stream>(&mut self, registry: &mut Registry<S>, slot: Slot) -> Activity {
        let Some(session) = registry.get_mut(slot) else {
            return Activity::Idle;
        };
        match session.stream_mut().read(&mut self.read_buf) {
            Ok(ReadOutcome::NotReady) => Activity::Idle,
            Ok(ReadOutcome::Eof) => {
                debug!(%slot, nickname = %session.nickname(), "peer closed connection");
                let _ = session.mark_closing();
                Activity::Closed
            }
            Err(e) => {
                warn!(%slot, nickname = %session.nickname(), error = %e, "read failed, closing session");
                let _ = session.mark_closing();
                Activity::Closed
            }
            Ok(ReadOutcome::Data(n)) => {
                let buf = std::mem::take(&mut self.read_buf);
                let mut lines = 0;
                for line in split_lines(&buf[..n]) {
                    if registry.get(slot).is_none_or(Session::is_closing) {
                        break;
                    }
                    self.interpret(registry, slot, line);
                    lines += 1;
                }
                self.read_buf = buf;
                Activity::Lines(lines)
            }
        }
    }

    /// Release `slot` and tell everyone left. No-op for a free slot.
    pub fn teardown<S: Stream>(&mut self, registry: &mut Registry<S>, slot: Slot) -> Option<Departed> {
        let departed = registry.release(slot)?;
        counter!(DISCONNECTIONS_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        info!(
            slot = %departed.slot,
            nickname = %departed.nickname,
            peer = %departed.peer,
            connected_ms = u64::try_from(departed.connected_for.as_millis()).unwrap_or(u64::MAX),
            active = registry.len(),
            "session left"
        );
        let _ = deliver(&mut self.builder, registry, Audience::Everyone, |b| {
            message::left(b, &departed.nickname)
        });
        Some(departed)
    }

    /// Release every slot without announcements, optionally sending the
    /// shutdown notice first. Returns how many sessions were closed.
    pub fn close_all<S: Stream>(&mut self, registry: &mut Registry<S>, announce: bool) -> usize {
        if announce && !registry.is_empty() {
            let _ = deliver(&mut self.builder, registry, Audience::Everyone, |b| {
                message::notice(b, message::SHUTTING_DOWN)
            });
        }
        let mut closed = 0;
        for slot in registry.slots() {
            if registry.release(slot).is_some() {
                gauge!(SESSIONS_ACTIVE).decrement(1.0);
                closed += 1;
            }
        }
        closed
    }

    fn interpret<S: Stream>(&mut self, registry: &mut Registry<S>, slot: Slot, line: &[u8]) {
        let command = parse_command(line);
        counter!(MESSAGES_TOTAL, "kind" => command.kind()).increment(1);
        match command {
            Command::Rename(raw) => self.rename(registry, slot, raw),
            Command::List => self.list(registry, slot),
            Command::Help => {
                let _ = deliver(&mut self.builder, registry, Audience::Only(slot), |b| {
                    message::notice(b, message::HELP)
                });
            }
            Command::Chat(text) => {
                let Some(nickname) = registry.get(slot).map(|s| s.nickname().clone()) else {
                    return;
                };
                let report = deliver(&mut self.builder, registry, Audience::EveryoneExcept(slot), |b| {
                    message::chat(b, &nickname, text)
                });
                debug!(%slot, %nickname, len = text.len(), recipients = report.map_or(0, |r| r.attempted()), "chat relayed");
            }
        }
    }

    fn rename<S: Stream>(&mut self, registry: &mut Registry<S>, slot: Slot, raw: &[u8]) {
        let Some(new) = Nickname::parse(raw) else {
            let _ = deliver(&mut self.builder, registry, Audience::Only(slot), |b| {
                message::notice(b, message::NAME_USAGE)
            });
            return;
        };
        let Some(session) = registry.get_mut(slot) else {
            return;
        };
        let old = session.rename(new.clone());
        info!(%slot, %old, %new, "nickname changed");
        // The renamer sees the confirmation too.
        let _ = deliver(&mut self.builder, registry, Audience::Everyone, |b| {
            message::renamed(b, &old, &new)
        });
    }

    fn list<S: Stream>(&mut self, registry: &mut Registry<S>, slot: Slot) {
        let rows = registry
            .iter()
            .filter(|s| !s.is_closing())
            .map(|s| (s.nickname(), s.slot() == slot));
        if compose(&mut self.builder, |b| message::listing(b, rows)) {
            let _ = broadcast(registry, self.builder.as_bytes(), Audience::Only(slot));
        }
    }

    fn reject<S: Stream>(&mut self, stream: &mut S) {
        if !compose(&mut self.builder, |b| message::notice(b, message::SERVER_FULL)) {
            return;
        }
        let notice = self.builder.as_bytes();
        match stream.write(notice) {
            Ok(outcome) if outcome.is_complete(notice.len()) => {}
            Ok(outcome) => debug!(?outcome, "full notice not fully written"),
            Err(e) => debug!(error = %e, "full notice write failed"),
        }
    }
}

/// Fill `builder` with one message. On overflow the message is discarded.
fn compose(
    builder: &mut MessageBuilder,
    build: impl FnOnce(&mut MessageBuilder) -> Result<(), Overflow>,
) -> bool {
    builder.clear();
    match build(builder) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "outbound message dropped");
            builder.clear();
            false
        }
    }
}

fn deliver<S: Stream>(
    builder: &mut MessageBuilder,
    registry: &mut Registry<S>,
    audience: Audience,
    build: impl FnOnce(&mut MessageBuilder) -> Result<(), Overflow>,
) -> Option<BroadcastReport> {
    compose(builder, build).then(|| broadcast(registry, builder.as_bytes(), audience))
}
