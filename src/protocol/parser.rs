//! Incremental RESP Frame Decoder
//!
//! TCP is a byte stream: one read may carry half a command, or three of
//! them. [`FrameDecoder`] owns a growable buffer that the connection keeps
//! appending to, and hands back complete frames one at a time.
//!
//! ## How Decoding Works
//!
//! `try_decode()` scans the front of the buffer without consuming anything.
//! The scan ends in one of three ways:
//! - `Ok(Some(frame))` - a whole frame was present; exactly its bytes are removed
//! - `Ok(None)` - the frame is incomplete; the buffer is left untouched
//! - `Err(ProtocolError)` - the bytes can never become a valid frame
//!
//! An incomplete scan remembers how far it got (the declared element count,
//! the offset of the next element, and the elements already located), so
//! the next `feed()` resumes at the first unfinished element instead of the
//! start of the frame.
//!
//! Arguments are copied out of the read buffer when the frame is complete.
//! A stored key or value never holds on to the connection's read allocation.

use crate::protocol::types::{prefix, Frame, Reply, CRLF};
use bytes::{Bytes, BytesMut};
use std::ops::Range;
use thiserror::Error;

/// Errors that make a byte stream undecodable.
///
/// Running out of bytes is never one of these; that is `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame did not start with `*`
    #[error("expected '*', got {0:#04x}")]
    ExpectedArray(u8),

    /// An element did not start with `$`
    #[error("expected '$', got {0:#04x}")]
    ExpectedBulk(u8),

    /// A length header held something other than decimal digits
    #[error("invalid length '{0}'")]
    InvalidLength(String),

    /// A header or payload was not followed by `\r\n`
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// The element count exceeds [`MAX_ELEMENTS`]
    #[error("too many elements: {count} (max: {max})")]
    TooManyElements { count: usize, max: usize },

    /// A bulk string exceeds [`MAX_BULK_SIZE`]
    #[error("bulk string too large: {size} bytes (max: {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// A reply started with a type byte this client does not understand
    #[error("unknown reply prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A simple string or error reply was not valid UTF-8
    #[error("invalid UTF-8 in reply")]
    InvalidUtf8,
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one command frame
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Longest length header accepted, type byte included, before its CRLF
pub const MAX_HEADER_LEN: usize = 32;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Progress through the frame at the front of the buffer.
#[derive(Debug)]
struct PartialFrame {
    /// Declared element count
    count: usize,
    /// Offset of the next element header, or the frame length once complete
    pos: usize,
    /// Payload range of every element located so far
    spans: Vec<Range<usize>>,
}

/// Stateful, per-connection decoder for command frames.
///
/// # Example
///
/// ```
/// use respkv::protocol::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// decoder.feed(b"*2\r\n$3\r\nGET\r\n$3\r\nf");
/// assert!(decoder.try_decode().unwrap().is_none());
///
/// decoder.feed(b"oo\r\n");
/// let frame = decoder.try_decode().unwrap().unwrap();
/// assert_eq!(frame.args(), &["GET", "foo"]);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    partial: Option<PartialFrame>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            partial: None,
        }
    }

    /// Appends raw bytes to the end of the buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Direct access to the buffer, so a socket can read straight into it.
    ///
    /// Bytes may only be appended; a partially scanned frame keeps offsets
    /// into the front of the buffer.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes fed but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Removes and returns one complete frame from the front of the buffer.
    ///
    /// Empty arrays (`*0\r\n`) are consumed and skipped, so a returned
    /// frame always has at least one element.
    pub fn try_decode(&mut self) -> ParseResult<Option<Frame>> {
        loop {
            let mut partial = match self.partial.take() {
                Some(partial) => partial,
                None => match scan_header(&self.buffer)? {
                    Some(partial) => partial,
                    None => return Ok(None),
                },
            };

            if !scan_elements(&self.buffer, &mut partial)? {
                self.partial = Some(partial);
                return Ok(None);
            }

            let raw = self.buffer.split_to(partial.pos);
            if partial.spans.is_empty() {
                continue;
            }

            let args = partial
                .spans
                .into_iter()
                .map(|span| Bytes::copy_from_slice(&raw[span]))
                .collect();
            return Ok(Some(Frame::new(args)));
        }
    }
}

/// Reads the `*<count>\r\n` header at the front of `buf`.
fn scan_header(buf: &[u8]) -> ParseResult<Option<PartialFrame>> {
    let first = match buf.first() {
        Some(&b) => b,
        None => return Ok(None),
    };
    if first != prefix::ARRAY {
        return Err(ProtocolError::ExpectedArray(first));
    }

    let (count, pos) = match read_length(buf, 0)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if count > MAX_ELEMENTS {
        return Err(ProtocolError::TooManyElements {
            count,
            max: MAX_ELEMENTS,
        });
    }

    Ok(Some(PartialFrame {
        count,
        pos,
        spans: Vec::with_capacity(count.min(16)),
    }))
}

/// Locates as many remaining elements of `partial` as `buf` holds.
///
/// Returns `true` once every element has been found.
fn scan_elements(buf: &[u8], partial: &mut PartialFrame) -> ParseResult<bool> {
    while partial.spans.len() < partial.count {
        let tag = match buf.get(partial.pos) {
            Some(&b) => b,
            None => return Ok(false),
        };
        if tag != prefix::BULK_STRING {
            return Err(ProtocolError::ExpectedBulk(tag));
        }

        let (len, data_start) = match read_length(buf, partial.pos)? {
            Some(header) => header,
            None => return Ok(false),
        };
        let data_end = match bulk_end(buf, len, data_start)? {
            Some(end) => end,
            None => return Ok(false),
        };

        partial.spans.push(data_start..data_end);
        partial.pos = data_end + CRLF.len();
    }
    Ok(true)
}

/// Checks the payload of a bulk string of `len` bytes starting at `data_start`.
///
/// Returns the payload end once the payload and its CRLF are buffered.
fn bulk_end(buf: &[u8], len: usize, data_start: usize) -> ParseResult<Option<usize>> {
    if len > MAX_BULK_SIZE {
        return Err(ProtocolError::BulkTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let data_end = data_start + len;
    if buf.len() < data_end + CRLF.len() {
        return Ok(None);
    }
    if &buf[data_end..data_end + CRLF.len()] != CRLF {
        return Err(ProtocolError::MissingCrlf);
    }
    Ok(Some(data_end))
}

/// Reads the decimal length that follows the type byte at `at`.
///
/// Returns the value and the offset just past its `\r\n`. Any byte that
/// cannot belong to a non-negative length fails immediately instead of
/// waiting for a terminator that would not help, and so does a header
/// reaching [`MAX_HEADER_LEN`] bytes without one.
fn read_length(buf: &[u8], at: usize) -> ParseResult<Option<(usize, usize)>> {
    let start = at + 1;
    let mut value: usize = 0;
    let mut i = start;

    loop {
        if i - at >= MAX_HEADER_LEN {
            return Err(invalid_length(&buf[start..i]));
        }

        let b = match buf.get(i) {
            Some(&b) => b,
            None => return Ok(None),
        };

        match b {
            b'0'..=b'9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(usize::from(b - b'0')))
                    .ok_or_else(|| invalid_length(&buf[start..=i]))?;
                i += 1;
            }
            b'\r' if i > start => {
                return match buf.get(i + 1) {
                    Some(b'\n') => Ok(Some((value, i + 2))),
                    Some(_) => Err(ProtocolError::MissingCrlf),
                    None => Ok(None),
                };
            }
            _ => return Err(invalid_length(&buf[start..=i])),
        }
    }
}

fn invalid_length(raw: &[u8]) -> ProtocolError {
    ProtocolError::InvalidLength(String::from_utf8_lossy(raw).escape_debug().to_string())
}

/// Decodes one reply from the front of `buf`.
///
/// Used on the client side. Returns the reply and the number of bytes it
/// occupied, or `Ok(None)` if more bytes are needed.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(Reply, usize)>> {
    let first = match buf.first() {
        Some(&b) => b,
        None => return Ok(None),
    };

    match first {
        prefix::SIMPLE_STRING | prefix::ERROR => {
            let end = match find_crlf(&buf[1..]) {
                Some(pos) => 1 + pos,
                None => return Ok(None),
            };
            let text = std::str::from_utf8(&buf[1..end]).map_err(|_| ProtocolError::InvalidUtf8)?;
            let reply = if first == prefix::ERROR {
                Reply::Error(text.to_string())
            } else if text == "OK" {
                Reply::Ok
            } else {
                Reply::Bulk(Bytes::copy_from_slice(text.as_bytes()))
            };
            Ok(Some((reply, end + CRLF.len())))
        }
        prefix::BULK_STRING => {
            if buf.starts_with(b"$-1\r\n") {
                return Ok(Some((Reply::Nil, 5)));
            }
            if b"$-1\r\n".starts_with(buf) {
                return Ok(None);
            }

            let (len, data_start) = match read_length(buf, 0)? {
                Some(header) => header,
                None => return Ok(None),
            };
            let data_end = match bulk_end(buf, len, data_start)? {
                Some(end) => end,
                None => return Ok(None),
            };
            let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
            Ok(Some((Reply::Bulk(data), data_end + CRLF.len())))
        }
        other => Err(ProtocolError::UnknownPrefix(other)),
    }
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
