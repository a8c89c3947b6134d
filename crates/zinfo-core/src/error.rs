use thiserror::Error;

use crate::types::{Offset, SpanId};

pub type ZinfoResult<T> = Result<T, ZinfoError>;

#[derive(Debug, Error)]
pub enum ZinfoError {
    /// Structural problem with an index blob or a gzip header.
    #[error("format error: {0}")]
    Format(String),

    /// The compressed stream itself is malformed.
    #[error("corrupt input at byte offset {offset}: {reason}")]
    Corrupt { offset: Offset, reason: &'static str },

    #[error("internal decoder error: {0}")]
    Internal(String),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("digest mismatch for span {span}")]
    Digest { span: SpanId },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZinfoError {
    pub fn format(msg: impl Into<String>) -> Self {
        ZinfoError::Format(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ZinfoError::InvalidArgument(msg.into())
    }
}
