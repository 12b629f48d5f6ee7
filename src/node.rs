//! The boundary between the connection core and whatever renders it.
//!
//! The UI never touches sockets: it pushes [`Outgoing`] requests into a
//! channel and drains [`Event`]s out of another. Both the host and the peer
//! side hand back the same [`NodeHandle`], so the front-end does not care
//! which role it is driving.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::error::Error;
use crate::protocol::WireMessage;
use crate::storage;

/// What this process is. Set once when the user starts hosting or connects
/// out, never changed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Neither hosting nor connected yet.
    #[default]
    Uninitiated,
    /// Accepts inbound connections and relays between them.
    Host,
    /// Holds exactly one outbound connection to a host.
    Peer,
}

impl Role {
    /// Display name substituted when the user left theirs blank.
    pub fn default_display_name(&self) -> &'static str {
        match self {
            Role::Host => "Host",
            _ => "Peer",
        }
    }

    /// Resolve the name the user typed against the role default.
    pub fn display_name(&self, requested: &str) -> String {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            self.default_display_name().to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// A user-initiated request flowing UI → core.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// Send a line of chat to the peer set.
    Chat(String),
    /// Read a local file and send it whole to the peer set.
    SendFile(PathBuf),
}

/// A notification flowing core → UI.
#[derive(Debug)]
pub enum Event {
    /// Connection / lifecycle notice, already formatted for display.
    Status(String),
    /// The first peer is connected; sending is now meaningful.
    /// Raised once per host lifetime.
    SendReady,
    /// A chat line to render, local echoes included.
    Chat { sender: String, body: String },
    /// A file arrived and was written to local storage.
    FileReceived {
        filename: String,
        size: usize,
        path: PathBuf,
    },
    /// A recoverable failure the user should see.
    Error(Error),
}

/// Handle to a running node, returned by `relay::start` and
/// `client::connect`. Dropping it (or calling [`NodeHandle::shutdown`])
/// flips the running flag the background loops watch.
#[derive(Debug)]
pub struct NodeHandle {
    role: Role,
    local_addr: SocketAddr,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    events: mpsc::UnboundedReceiver<Event>,
    shutdown: watch::Sender<bool>,
}

impl NodeHandle {
    pub(crate) fn new(
        role: Role,
        local_addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Outgoing>,
        events: mpsc::UnboundedReceiver<Event>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            role,
            local_addr,
            outgoing,
            events,
            shutdown,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The bound listener address (host) or the local socket address of the
    /// outbound connection (peer).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue a user request. Returns `false` if the core has already shut
    /// down and the request can never be serviced.
    pub fn request(&self, req: Outgoing) -> bool {
        self.outgoing.send(req).is_ok()
    }

    /// Wait for the next event from the core. `None` once every producing
    /// task has exited.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Signal the running flag. Loops notice on their next iteration; an
    /// in-flight blocking read may take one more cycle to drain.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Surface one decoded inbound message to the UI collaborator. Chat is
/// displayed as-is; a file payload is persisted as a `received_` artifact
/// first, and a failure to write it surfaces as a failed-transfer event
/// rather than tearing anything down.
pub(crate) fn deliver_inbound(
    msg: WireMessage,
    events: &mpsc::UnboundedSender<Event>,
    download_dir: &Path,
) {
    match msg {
        WireMessage::Chat { sender, body } => {
            let _ = events.send(Event::Chat { sender, body });
        }
        WireMessage::File { filename, content } => {
            match storage::save_received_file(download_dir, &filename, &content) {
                Ok(path) => {
                    let _ = events.send(Event::FileReceived {
                        filename,
                        size: content.len(),
                        path,
                    });
                }
                Err(e) => {
                    warn!("failed to store received file {filename}: {e}");
                    let _ = events.send(Event::Error(e));
                }
            }
        }
    }
}

/// Read a local file and encode it as a file frame. Shared by both roles'
/// send paths; only the basename travels.
pub(crate) fn read_file_message(path: &Path) -> Result<(String, Vec<u8>), Error> {
    let content = std::fs::read(path).map_err(|source| Error::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = crate::protocol::basename(&path.to_string_lossy());

    let frame = crate::protocol::encode(&WireMessage::file(&filename, content));
    if frame.len() > crate::protocol::framing::MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: frame.len(),
            max: crate::protocol::framing::MAX_FRAME_LEN,
        });
    }
    Ok((filename, frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_starts_uninitiated() {
        assert_eq!(Role::default(), Role::Uninitiated);
    }

    #[test]
    fn test_blank_name_falls_back_to_role_default() {
        assert_eq!(Role::Host.display_name("   "), "Host");
        assert_eq!(Role::Peer.display_name(""), "Peer");
    }

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(Role::Host.display_name("  Alice "), "Alice");
    }
}
