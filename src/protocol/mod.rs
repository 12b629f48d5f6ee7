pub mod framing;

use base64::Engine;
use std::path::Path;
use thiserror::Error;

/// Tag prefix marking a frame as a file payload.
pub const FILE_TAG: &str = "FILE:";
/// Delimiter between the filename and the base64 body of a file payload.
pub const FILE_DELIM: &str = "::";

/// One decoded unit of the wire protocol: either a line of chat or a whole
/// file. A frame carries exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Chat { sender: String, body: String },
    File { filename: String, content: Vec<u8> },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("file frame is missing the `::` delimiter")]
    MissingDelimiter,
    #[error("file frame content is not valid base64: {0}")]
    InvalidContent(String),
}

impl WireMessage {
    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        WireMessage::Chat {
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Build a file payload, keeping only the basename of whatever path the
    /// sender picked. Paths never travel on the wire.
    pub fn file(filename: &str, content: Vec<u8>) -> Self {
        WireMessage::File {
            filename: basename(filename),
            content,
        }
    }
}

/// Encode a message into one frame payload.
///
/// Chat is plain text, `<sender>: <body>`. Files carry the filename and the
/// base64-rendered content behind a fixed tag: `FILE:<name>::<base64>`.
pub fn encode(msg: &WireMessage) -> Vec<u8> {
    match msg {
        WireMessage::Chat { sender, body } => format!("{sender}: {body}").into_bytes(),
        WireMessage::File { filename, content } => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(content);
            format!("{FILE_TAG}{filename}{FILE_DELIM}{b64}").into_bytes()
        }
    }
}

/// Decode one frame payload.
///
/// A leading `FILE:` tag selects the file path: split on the first `::`
/// into filename and base64 body. Everything else is accepted as chat —
/// the first `": "` separates sender from body, and text without one
/// becomes a chat with an empty sender. Decode failure is per-frame: the
/// caller logs, drops the frame and keeps reading.
pub fn decode(payload: &[u8]) -> Result<WireMessage, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;

    if let Some(rest) = text.strip_prefix(FILE_TAG) {
        let (filename, b64) = rest
            .split_once(FILE_DELIM)
            .ok_or(DecodeError::MissingDelimiter)?;
        let content = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| DecodeError::InvalidContent(e.to_string()))?;
        return Ok(WireMessage::File {
            filename: basename(filename),
            content,
        });
    }

    match text.split_once(": ") {
        Some((sender, body)) => Ok(WireMessage::chat(sender, body)),
        None => Ok(WireMessage::chat("", text)),
    }
}

/// Strip any path components, keeping just the final name. Incoming
/// filenames are untrusted; `received_../../x` must not escape the
/// working directory.
pub fn basename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
