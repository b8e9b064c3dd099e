//! RESP Data Types
//!
//! The server speaks a small subset of RESP. Requests are always arrays of
//! bulk strings, and every reply is one of four shapes.
//!
//! ## Wire Format
//!
//! Request (command frame):
//! `*<N>\r\n` followed by N elements of `$<L>\r\n<L bytes>\r\n`
//!
//! Replies:
//! - OK: `+OK\r\n`
//! - Error: `-<message>\r\n`
//! - Nil: `$-1\r\n`
//! - Bulk: `$<len>\r\n<bytes>\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One decoded command: the command name followed by its operands.
///
/// A frame produced by [`FrameDecoder`](crate::protocol::FrameDecoder) is
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    args: Vec<Bytes>,
}

impl Frame {
    /// Builds a frame from its arguments.
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Builds a frame from anything byte-like, copying each argument.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::Frame;
    /// let frame = Frame::from_parts(["GET", "name"]);
    /// assert_eq!(frame.len(), 2);
    /// ```
    pub fn from_parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self {
            args: parts
                .into_iter()
                .map(|p| Bytes::copy_from_slice(p.as_ref()))
                .collect(),
        }
    }

    /// The command name, if the frame has one.
    pub fn command(&self) -> Option<&Bytes> {
        self.args.first()
    }

    /// Everything after the command name.
    pub fn operands(&self) -> &[Bytes] {
        self.args.get(1..).unwrap_or(&[])
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Serializes the frame as an array of bulk strings.
    ///
    /// This is what a client writes to the socket for one command.
    pub fn serialize(&self) -> Vec<u8> {
        let payload: usize = self.args.iter().map(|a| a.len() + 16).sum();
        let mut buf = Vec::with_capacity(16 + payload);
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the frame into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.push(prefix::ARRAY);
        buf.extend_from_slice(self.args.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        for arg in &self.args {
            write_bulk(buf, arg);
        }
    }
}

/// A typed reply. Exactly one is produced for every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK\r\n`
    Ok,

    /// `$<len>\r\n<data>\r\n`
    Bulk(Bytes),

    /// `$-1\r\n`
    Nil,

    /// `-<message>\r\n`. The message never contains CR or LF.
    Error(String),
}

impl Reply {
    /// Creates an error reply.
    ///
    /// CR and LF are replaced with spaces so the message stays on one line.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::Reply;
    /// let err = Reply::error("ERR bad\r\nthing");
    /// assert_eq!(err.serialize(), b"-ERR bad  thing\r\n");
    /// ```
    pub fn error(msg: impl Into<String>) -> Self {
        let mut msg = msg.into();
        if msg.contains(['\r', '\n']) {
            msg = msg.replace(['\r', '\n'], " ");
        }
        Reply::Error(msg)
    }

    /// Creates a bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Maps a lookup result onto bulk-or-nil.
    pub fn from_option(value: Option<Bytes>) -> Self {
        value.map_or(Reply::Nil, Reply::Bulk)
    }

    /// Serializes the reply to its wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// The connection handler uses this to batch all replies of one read.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Ok => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(b"OK");
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => write_bulk(buf, data),
            Reply::Nil => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(msg) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(msg.as_bytes());
                buf.extend_from_slice(CRLF);
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

/// Renders replies the way `redis-cli` does.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{:?}", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
        }
    }
}
