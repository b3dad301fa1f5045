//! Protocol error types

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("String too long for a u16 length prefix: {len} bytes")]
    StringTooLong { len: usize },

    #[error("Declared file size is negative: {size}")]
    NegativeFileSize { size: i64 },

    #[error("Unknown terminal status: {0:?}")]
    UnknownStatus(String),

    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
