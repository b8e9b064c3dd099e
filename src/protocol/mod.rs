//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol this server speaks:
//! arrays of bulk strings in, one of OK / error / bulk / nil out.
//!
//! ## Modules
//!
//! - `types`: `Frame` and `Reply`, and their wire serialization
//! - `parser`: the incremental `FrameDecoder` and client-side `parse_reply`
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{FrameDecoder, Reply};
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.feed(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//! let frame = decoder.try_decode().unwrap().unwrap();
//! assert_eq!(frame.len(), 2);
//!
//! let bytes = Reply::bulk("Ariz").serialize();
//! assert_eq!(bytes, b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_reply, FrameDecoder, ParseResult, ProtocolError};
pub use types::{Frame, Reply};
