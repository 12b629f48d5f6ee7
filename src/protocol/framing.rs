//! Length-prefixed message framing.
//!
//! The original text protocol assumed one stream read equals one message,
//! which breaks as soon as the kernel coalesces writes or a file overflows
//! the read buffer. Every payload here travels behind a 4-byte big-endian
//! length prefix instead, so a frame always arrives whole regardless of how
//! the bytes were split in transit.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Upper bound on a single frame payload. Large enough for any reasonable
/// file share, small enough that a garbage length prefix cannot make us
/// allocate the moon.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Read one frame. Returns `Ok(None)` when the stream closed cleanly at a
/// frame boundary; closure mid-frame is an error like any other.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame: length prefix, then the payload, flushed.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
