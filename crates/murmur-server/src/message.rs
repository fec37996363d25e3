//! Server → client line construction.
//!
//! Every line goes through a [`MessageBuilder`]: a byte buffer with a fixed
//! capacity whose appends either fit entirely or fail with [`Overflow`] and
//! leave the buffer untouched. The composing functions below produce the
//! exact wire formats; each returns a complete `\n`-terminated line (or block
//! of lines).

use murmur_core::constants::NICKNAME_MAX_CHARS;
use thiserror::Error;

use crate::registry::Nickname;

/// Rejection notice written to a connection that finds every slot taken.
pub const SERVER_FULL: &str = "Server is full. Please try again later.\n";

/// Reply to `/name` with nothing printable after it.
pub const NAME_USAGE: &str = "Usage: /name <newname>\n";

/// Notice sent to every session before a graceful shutdown.
pub const SHUTTING_DOWN: &str = "*** Server is shutting down ***\n";

/// First line of a `/list` reply.
pub const LISTING_HEADER: &str = "Connected users:\n";

/// Reply to `/help`.
pub const HELP: &str = "Commands:\n\
    \x20 /name <newname>  change your name\n\
    \x20 /list            show connected users\n\
    \x20 /help            show this help\n\
    Anything else is sent to everyone.\n";

const SELF_MARKER: &str = " (you)";

/// Worst-case byte length of a nickname.
const NICKNAME_MAX_BYTES: usize = NICKNAME_MAX_CHARS * 4;

/// An append would have exceeded the builder's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message needs {needed} bytes, capacity is {capacity}")]
pub struct Overflow {
    /// Configured capacity.
    pub capacity: usize,
    /// Length the buffer would have reached.
    pub needed: usize,
}

/// Bounded, overflow-checked byte buffer for one outbound message.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    capacity: usize,
}

impl MessageBuilder {
    /// Create an empty builder that holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Discard the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// The message so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append `bytes` if they fit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<&mut Self, Overflow> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.capacity {
            return Err(Overflow {
                capacity: self.capacity,
                needed,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// Append `s` if it fits.
    pub fn push_str(&mut self, s: &str) -> Result<&mut Self, Overflow> {
        self.push(s.as_bytes())
    }

    /// Terminate the current line with `\n` unless it already ends with one.
    pub fn end_line(&mut self) -> Result<&mut Self, Overflow> {
        if self.buf.last() == Some(&b'\n') {
            Ok(self)
        } else {
            self.push(b"\n")
        }
    }
}

/// Builder capacity that fits the longest line a server can produce with
/// reads of at most `read_limit` bytes, `max_clients` sessions and the given
/// server name.
pub fn capacity_for(read_limit: usize, max_clients: usize, server_name: &str) -> usize {
    let chat = "[] ".len() + NICKNAME_MAX_BYTES + read_limit + 1;
    let welcome = "Welcome to ! Your name is: \n".len() + server_name.len() + NICKNAME_MAX_BYTES;
    let rename = "***  is now known as  ***\n".len() + 2 * NICKNAME_MAX_BYTES;
    let row = " - ".len() + NICKNAME_MAX_BYTES + SELF_MARKER.len() + 1;
    let listing = LISTING_HEADER.len() + row * max_clients;
    [chat, welcome, rename, listing, HELP.len(), SERVER_FULL.len()]
        .into_iter()
        .max()
        .unwrap_or(chat)
}

// ─────────────────────────────────────────────────────────────────────────────
// Line formats
// ─────────────────────────────────────────────────────────────────────────────

/// `Welcome to <server>! Your name is: <nick>`
pub fn welcome(b: &mut MessageBuilder, server_name: &str, nick: &Nickname) -> Result<(), Overflow> {
    let _ = b
        .push_str("Welcome to ")?
        .push_str(server_name)?
        .push_str("! Your name is: ")?
        .push_str(nick.as_str())?
        .end_line()?;
    Ok(())
}

/// `*** <nick> has joined the chat ***`
pub fn joined(b: &mut MessageBuilder, nick: &Nickname) -> Result<(), Overflow> {
    announcement(b, nick, " has joined the chat ***")
}

/// `*** <nick> has left the chat ***`
pub fn left(b: &mut MessageBuilder, nick: &Nickname) -> Result<(), Overflow> {
    announcement(b, nick, " has left the chat ***")
}

/// `*** <old> is now known as <new> ***`
pub fn renamed(b: &mut MessageBuilder, old: &Nickname, new: &Nickname) -> Result<(), Overflow> {
    let _ = b
        .push_str("*** ")?
        .push_str(old.as_str())?
        .push_str(" is now known as ")?
        .push_str(new.as_str())?
        .push_str(" ***")?
        .end_line()?;
    Ok(())
}

/// `[<nick>] <text>`, newline-terminated. `text` is relayed byte for byte.
pub fn chat(b: &mut MessageBuilder, nick: &Nickname, text: &[u8]) -> Result<(), Overflow> {
    let _ = b
        .push_str("[")?
        .push_str(nick.as_str())?
        .push_str("] ")?
        .push(text)?
        .end_line()?;
    Ok(())
}

/// `Connected users:` followed by ` - <nick>` per row; rows flagged `true`
/// get a ` (you)` suffix.
pub fn listing<'a, I>(b: &mut MessageBuilder, rows: I) -> Result<(), Overflow>
where
    I: IntoIterator<Item = (&'a Nickname, bool)>,
{
    let _ = b.push_str(LISTING_HEADER)?;
    for (nick, is_self) in rows {
        let _ = b.push_str(" - ")?.push_str(nick.as_str())?;
        if is_self {
            let _ = b.push_str(SELF_MARKER)?;
        }
        let _ = b.end_line()?;
    }
    Ok(())
}

/// A fixed notice such as [`SERVER_FULL`] or [`HELP`].
pub fn notice(b: &mut MessageBuilder, text: &str) -> Result<(), Overflow> {
    let _ = b.push_str(text)?.end_line()?;
    Ok(())
}

fn announcement(b: &mut MessageBuilder, nick: &Nickname, tail: &str) -> Result<(), Overflow> {
    let _ = b
        .push_str("*** ")?
        .push_str(nick.as_str())?
        .push_str(tail)?
        .end_line()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Slot;

    fn nick(s: &str) -> Nickname {
        Nickname::parse(s.as_bytes()).unwrap()
    }

    fn built(f: impl FnOnce(&mut MessageBuilder) -> Result<(), Overflow>) -> String {
        let mut b = MessageBuilder::new(4096);
        f(&mut b).unwrap();
        String::from_utf8(b.as_bytes().to_vec()).unwrap()
    }

    // ── MessageBuilder ──────────────────────────────────────────────

    #[test]
    fn push_within_capacity() {
        let mut b = MessageBuilder::new(8);
        let _ = b.push_str("abc").unwrap().push_str("def").unwrap();
        assert_eq!(b.as_bytes(), b"abcdef");
        assert_eq!(b.remaining(), 2);
    }

    #[test]
    fn overflow_leaves_buffer_untouched() {
        let mut b = MessageBuilder::new(5);
        let _ = b.push_str("abc").unwrap();
        let err = b.push_str("def").unwrap_err();
        assert_eq!(err, Overflow { capacity: 5, needed: 6 });
        assert_eq!(b.as_bytes(), b"abc");
    }

    #[test]
    fn exact_fit_is_allowed() {
        let mut b = MessageBuilder::new(4);
        let _ = b.push_str("abc").unwrap().end_line().unwrap();
        assert_eq!(b.len(), 4);
        assert!(b.push(b"x").is_err());
    }

    #[test]
    fn end_line_does_not_double_terminate() {
        let mut b = MessageBuilder::new(8);
        let _ = b.push_str("hi\n").unwrap().end_line().unwrap();
        assert_eq!(b.as_bytes(), b"hi\n");
    }

    #[test]
    fn clear_resets_length() {
        let mut b = MessageBuilder::new(8);
        let _ = b.push_str("hello").unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.remaining(), 8);
    }

    // ── Line formats ────────────────────────────────────────────────

    #[test]
    fn welcome_format() {
        let s = built(|b| welcome(b, "murmur", &Nickname::default_for(Slot::new(0))));
        assert_eq!(s, "Welcome to murmur! Your name is: user0\n");
    }

    #[test]
    fn join_and_leave_format() {
        assert_eq!(
            built(|b| joined(b, &nick("user3"))),
            "*** user3 has joined the chat ***\n"
        );
        assert_eq!(
            built(|b| left(b, &nick("alice"))),
            "*** alice has left the chat ***\n"
        );
    }

    #[test]
    fn rename_format() {
        let s = built(|b| renamed(b, &nick("user0"), &nick("alice")));
        assert_eq!(s, "*** user0 is now known as alice ***\n");
    }

    #[test]
    fn chat_format_adds_newline() {
        assert_eq!(built(|b| chat(b, &nick("bob"), b"hi there")), "[bob] hi there\n");
        assert_eq!(built(|b| chat(b, &nick("bob"), b"hi\n")), "[bob] hi\n");
    }

    #[test]
    fn listing_marks_self() {
        let alice = nick("alice");
        let bob = nick("bob");
        let s = built(|b| listing(b, [(&alice, true), (&bob, false)]));
        assert_eq!(s, "Connected users:\n - alice (you)\n - bob\n");
    }

    #[test]
    fn notices_are_newline_terminated() {
        assert_eq!(built(|b| notice(b, SERVER_FULL)), SERVER_FULL);
        assert_eq!(built(|b| notice(b, "no newline")), "no newline\n");
        assert!(HELP.ends_with('\n'));
        assert!(HELP.contains("/name <newname>"));
    }

    // ── capacity_for ────────────────────────────────────────────────

    #[test]
    fn capacity_fits_longest_chat_line() {
        let cap = capacity_for(511, 14, "murmur");
        let mut b = MessageBuilder::new(cap);
        let name = Nickname::parse("é".repeat(NICKNAME_MAX_CHARS).as_bytes()).unwrap();
        chat(&mut b, &name, &[b'x'; 511]).unwrap();
    }

    #[test]
    fn capacity_fits_full_listing() {
        let max_clients = 14;
        let cap = capacity_for(511, max_clients, "murmur");
        let name = Nickname::parse("é".repeat(NICKNAME_MAX_CHARS).as_bytes()).unwrap();
        let rows: Vec<(&Nickname, bool)> = (0..max_clients).map(|i| (&name, i == 0)).collect();
        let mut b = MessageBuilder::new(cap);
        listing(&mut b, rows).unwrap();
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_exceeds_capacity(
                cap in 0usize..256,
                pushes in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
            ) {
                let mut b = MessageBuilder::new(cap);
                for bytes in pushes {
                    let before = b.as_bytes().to_vec();
                    match b.push(&bytes) {
                        Ok(_) => prop_assert_eq!(b.len(), before.len() + bytes.len()),
                        Err(e) => {
                            prop_assert_eq!(b.as_bytes(), &before[..]);
                            prop_assert!(e.needed > cap);
                        }
                    }
                    prop_assert!(b.len() <= cap);
                }
            }

            #[test]
            fn chat_line_always_fits_computed_capacity(
                text in proptest::collection::vec(any::<u8>(), 0..511),
                raw_nick in "[a-zA-Z0-9é]{1,40}",
            ) {
                let name = Nickname::parse(raw_nick.as_bytes()).unwrap();
                let mut b = MessageBuilder::new(capacity_for(511, 1, "murmur"));
                prop_assert!(chat(&mut b, &name, &text).is_ok());
                prop_assert_eq!(b.as_bytes().last(), Some(&b'\n'));
            }
        }
    }
}
