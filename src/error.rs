//! Crate-wide error type.
//!
//! Mirrors the abstract error kinds of the download engine: malformed input
//! at each layer gets its own variant so callers (and the CLI's exit code)
//! can tell a bad `.torrent` file apart from a peer that went silent.
use thiserror::Error;

use crate::bencode::BencodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed bencode: {0}")]
    MalformedBencode(#[from] BencodeError),

    #[error("malformed metainfo: {0}")]
    MalformedMetainfo(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("malformed tracker reply: {0}")]
    MalformedTrackerReply(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("piece hash mismatch for piece {index}")]
    HashMismatch { index: usize },

    #[error("download incomplete: {left} bytes left")]
    IncompleteDownload { left: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
