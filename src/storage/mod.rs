use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol;

/// Prefix stamped onto every received-file artifact.
pub const RECEIVED_PREFIX: &str = "received_";

/// Write an incoming file payload to local storage as
/// `received_<basename>` under `dir`, returning the path written.
///
/// The filename came off the wire, so it is reduced to its basename first;
/// a peer must not be able to place artifacts outside `dir`. Zero-length
/// payloads produce a zero-length artifact.
pub fn save_received_file(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    let name = protocol::basename(filename);
    if name.is_empty() {
        return Err(Error::FileIo {
            path: dir.join(filename),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty filename"),
        });
    }

    let path = dir.join(format!("{RECEIVED_PREFIX}{name}"));
    std::fs::write(&path, content).map_err(|source| Error::FileIo {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
