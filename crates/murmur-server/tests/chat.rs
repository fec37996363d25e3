//! End-to-end chat sessions over loopback TCP against a poll-driven server
//! running on its own thread.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use murmur_server::{ChatServer, ServerConfig, ShutdownCoordinator};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownCoordinator,
    handle: JoinHandle<murmur_server::Result<()>>,
}

impl Running {
    fn start(max_clients: usize) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_clients,
            poll_timeout_ms: 20,
            ..ServerConfig::default()
        };
        let shutdown = ShutdownCoordinator::new();
        let mut server = ChatServer::bind(config, shutdown.clone()).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = std::thread::spawn(move || server.run());
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn stop(self) -> murmur_server::Result<()> {
        self.shutdown.shutdown();
        self.handle.join().unwrap()
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    /// Connect and consume the welcome line, returning the assigned name.
    fn join(addr: SocketAddr) -> (Self, String) {
        let mut client = Self::connect(addr);
        let welcome = client.line();
        let name = welcome
            .strip_prefix("Welcome to murmur! Your name is: ")
            .unwrap_or_else(|| panic!("unexpected welcome: {welcome:?}"))
            .to_string();
        (client, name)
    }

    fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).unwrap();
    }

    /// Next line without its terminator.
    fn line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).unwrap();
        assert!(n > 0, "connection closed while waiting for a line");
        assert!(line.ends_with('\n'), "line not newline-terminated: {line:?}");
        line.trim_end_matches('\n').to_string()
    }

    fn expect_closed(&mut self) {
        let mut rest = String::new();
        let n = self.reader.read_line(&mut rest).unwrap();
        assert_eq!(n, 0, "expected EOF, got {rest:?}");
    }
}

#[test]
fn join_chat_and_leave() {
    let server = Running::start(4);

    let (mut a, a_name) = Client::join(server.addr);
    assert_eq!(a_name, "user0");
    let (mut b, b_name) = Client::join(server.addr);
    assert_eq!(b_name, "user1");
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    b.send("hello from b\n");
    assert_eq!(a.line(), "[user1] hello from b");

    a.send("hi b\r\n");
    assert_eq!(b.line(), "[user0] hi b");

    drop(b);
    assert_eq!(a.line(), "*** user1 has left the chat ***");

    server.stop().unwrap();
}

#[test]
fn rename_is_seen_by_everyone_including_renamer() {
    let server = Running::start(4);
    let (mut a, _) = Client::join(server.addr);
    let (mut b, _) = Client::join(server.addr);
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    a.send("/name alice\n");
    assert_eq!(a.line(), "*** user0 is now known as alice ***");
    assert_eq!(b.line(), "*** user0 is now known as alice ***");

    b.send("hey alice\n");
    assert_eq!(a.line(), "[user1] hey alice");

    server.stop().unwrap();
}

#[test]
fn list_is_private_to_requester() {
    let server = Running::start(4);
    let (mut a, _) = Client::join(server.addr);
    let (mut b, _) = Client::join(server.addr);
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    a.send("/name alice\n");
    assert_eq!(a.line(), "*** user0 is now known as alice ***");
    assert_eq!(b.line(), "*** user0 is now known as alice ***");
    b.send("/name bob\n");
    assert_eq!(a.line(), "*** user1 is now known as bob ***");
    assert_eq!(b.line(), "*** user1 is now known as bob ***");

    a.send("/list\n");
    assert_eq!(a.line(), "Connected users:");
    assert_eq!(a.line(), " - alice (you)");
    assert_eq!(a.line(), " - bob");

    // b saw nothing from the listing: its next line is this chat.
    a.send("after list\n");
    assert_eq!(b.line(), "[alice] after list");

    server.stop().unwrap();
}

#[test]
fn third_connection_rejected_at_capacity_two() {
    let server = Running::start(2);
    let (mut a, a_name) = Client::join(server.addr);
    let (_b, b_name) = Client::join(server.addr);
    assert_eq!((a_name.as_str(), b_name.as_str()), ("user0", "user1"));
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    let mut c = Client::connect(server.addr);
    assert_eq!(c.line(), "Server is full. Please try again later.");
    c.expect_closed();

    // The two admitted sessions are unaffected.
    a.send("/list\n");
    assert_eq!(a.line(), "Connected users:");
    assert_eq!(a.line(), " - user0 (you)");
    assert_eq!(a.line(), " - user1");

    server.stop().unwrap();
}

#[test]
fn released_slot_is_reused() {
    let server = Running::start(2);
    let (mut a, _) = Client::join(server.addr);
    let (b, _) = Client::join(server.addr);
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    drop(b);
    assert_eq!(a.line(), "*** user1 has left the chat ***");

    let (_c, c_name) = Client::join(server.addr);
    assert_eq!(c_name, "user1");
    assert_eq!(a.line(), "*** user1 has joined the chat ***");

    server.stop().unwrap();
}

#[test]
fn shutdown_notifies_and_closes_sessions() {
    let server = Running::start(2);
    let (mut a, _) = Client::join(server.addr);

    server.stop().unwrap();
    assert_eq!(a.line(), "*** Server is shutting down ***");
    a.expect_closed();
}
