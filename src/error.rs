use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::DecodeError;

/// Everything that can go wrong in the connection-and-relay core.
///
/// None of these are fatal to the process: `Bind`/`Connect` abort only the
/// attempted operation, `Decode` and `Send` are recovered per-frame or
/// per-peer, and `FileIo` aborts only the transfer it belongs to.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("send to {peer} failed: connection is closed")]
    Send { peer: String },

    #[error("file I/O on {path}: {source}")]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short kind tag so the UI collaborator can classify errors without
    /// matching on variants.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Bind { .. } => "bind",
            Error::Connect { .. } => "connect",
            Error::Decode(_) => "decode",
            Error::Send { .. } => "send",
            Error::FileIo { .. } => "file_io",
            Error::FrameTooLarge { .. } => "frame_too_large",
            Error::Io(_) => "io",
        }
    }
}
