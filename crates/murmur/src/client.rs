//! Interactive terminal client.
//!
//! Server lines are printed as they arrive; the client's own status lines
//! carry an `[HH:MM:SS]` prefix. `/quit`, `/help` and `/reconnect` are handled
//! locally, everything else is sent to the server newline-terminated.

use std::fmt::Display;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

const BANNER: &str = "\
==================================================
   murmur chat client
==================================================
Commands: /name <newname>, /list, /quit, /reconnect, /help
--------------------------------------------------";

const LOCAL_HELP: &str = "\
Commands:
  /name <newname> - Change your nickname
  /list           - List connected users
  /quit           - Exit the chat
  /reconnect      - Reconnect to server
  /help           - Show this help
";

/// What a line typed by the user asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    /// Blank line; ignored.
    Empty,
    /// Leave the client.
    Quit,
    /// Print the local command summary.
    Help,
    /// Drop the connection and dial again.
    Reconnect,
    /// Send this line to the server.
    Send(&'a str),
}

/// Classify one typed line. Local commands match case-insensitively.
pub fn classify(line: &str) -> Input<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    let word = line.trim();
    if word.is_empty() {
        Input::Empty
    } else if word.eq_ignore_ascii_case("/quit") {
        Input::Quit
    } else if word.eq_ignore_ascii_case("/help") {
        Input::Help
    } else if word.eq_ignore_ascii_case("/reconnect") {
        Input::Reconnect
    } else {
        Input::Send(line)
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    // Survives a cancelled read so a partial line is never lost.
    pending: Vec<u8>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
            pending: Vec::new(),
        }
    }

    /// Next server line without its terminator; `None` once the server closed.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let n = self.reader.read_until(b'\n', &mut self.pending).await?;
        if n == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        self.pending.clear();
        Ok(Some(line))
    }
}

/// Run the client on stdin/stdout until `/quit`, end of input, or Ctrl+C.
pub async fn run(host: &str, port: u16) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    tokio::select! {
        result = session(host, port, stdin, &mut stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            status(&mut io::stdout(), "Interrupted. Goodbye!")?;
            Ok(())
        }
    }
}

async fn session<I, W>(host: &str, port: u16, input: I, out: &mut W) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{BANNER}")?;
    writeln!(out, "Connecting to {host}:{port}...")?;
    let mut conn = dial(host, port, out).await?;
    if conn.is_none() {
        writeln!(out, "Failed to connect. Use /reconnect to try again.")?;
    }

    let mut input = input.lines();
    loop {
        tokio::select! {
            biased;
            incoming = next_server_line(&mut conn) => match incoming {
                Ok(Some(line)) => writeln!(out, "{line}")?,
                Ok(None) => {
                    status(out, "Disconnected: Server closed connection")?;
                    conn = None;
                }
                Err(e) => {
                    status(out, format_args!("Disconnected: {e}"))?;
                    conn = None;
                }
            },
            typed = input.next_line() => {
                let Some(typed) = typed.context("Failed to read input")? else {
                    writeln!(out, "Goodbye!")?;
                    break;
                };
                match classify(&typed) {
                    Input::Empty => {}
                    Input::Quit => {
                        writeln!(out, "Goodbye!")?;
                        break;
                    }
                    Input::Help => out.write_all(LOCAL_HELP.as_bytes())?,
                    Input::Reconnect => {
                        writeln!(out, "Attempting to reconnect...")?;
                        drop(conn.take());
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        conn = dial(host, port, out).await?;
                    }
                    Input::Send(text) => send(&mut conn, text, out).await?,
                }
            }
        }
        out.flush()?;
    }
    out.flush()?;
    Ok(())
}

async fn next_server_line(conn: &mut Option<Connection>) -> io::Result<Option<String>> {
    match conn {
        Some(conn) => conn.next_line().await,
        None => std::future::pending().await,
    }
}

/// Connect with a bounded wait. Failures are reported to the user, not
/// returned: the client stays up so `/reconnect` can retry.
async fn dial<W: Write>(host: &str, port: u16, out: &mut W) -> io::Result<Option<Connection>> {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            debug!(host, port, "connected");
            status(out, format_args!("Connected to chat server at {host}:{port}"))?;
            Ok(Some(Connection::new(stream)))
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            status(out, "Connection refused. Is the server running?")?;
            Ok(None)
        }
        Ok(Err(e)) => {
            status(out, format_args!("Connection error: {e}"))?;
            Ok(None)
        }
        Err(_) => {
            status(out, "Connection timed out.")?;
            Ok(None)
        }
    }
}

async fn send<W: Write>(conn: &mut Option<Connection>, text: &str, out: &mut W) -> io::Result<()> {
    let Some(active) = conn.as_mut() else {
        return status(out, "Not connected to server. Try /reconnect");
    };
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text);
    line.push('\n');
    if let Err(e) = active.writer.write_all(line.as_bytes()).await {
        debug!(error = %e, "send failed");
        *conn = None;
        return status(out, format_args!("Disconnected: {e}"));
    }
    Ok(())
}

fn status<W: Write>(out: &mut W, message: impl Display) -> io::Result<()> {
    writeln!(out, "[{}] {message}", Local::now().format("%H:%M:%S"))
}
