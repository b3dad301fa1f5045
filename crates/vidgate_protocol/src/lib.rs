//! Upload Wire Protocol
//!
//! Frame formats for the producer -> receiver upload stream.
//!
//! # Protocol Specification
//!
//! Frames are sent back-to-back on a single TCP connection
//! (Network Byte Order / Big Endian):
//!
//! ```text
//! C -> S: filename   [LEN:u16][LEN bytes of UTF-8]
//! C -> S: fileSize   [i64], must be >= 0
//! C -> S: payload    exactly fileSize bytes
//! S -> C: status     [LEN:u16][LEN bytes of UTF-8]
//! ```
//!
//! The string framing matches Java's `DataInput`/`DataOutput` UTF format;
//! ASCII content (every status string, every sanitized filename) is
//! bit-identical to plain UTF-8. The server closes the connection after the
//! status write.
//!
//! This crate also owns the file-naming conventions of the uploads
//! directory (`naming`), which are normative because duplicate detection
//! depends on them.

pub mod defaults;
pub mod error;
pub mod naming;
pub mod status;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use status::TerminalStatus;
