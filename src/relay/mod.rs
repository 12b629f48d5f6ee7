use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::node::{deliver_inbound, read_file_message, Event, NodeHandle, Outgoing, Role};
use crate::protocol::{self, framing, WireMessage};

/// Identity of one registered connection. Ids are handed out monotonically,
/// so iterating the registry walks peers in insertion order.
pub(crate) type PeerId = u64;

pub(crate) struct PeerEntry {
    pub addr: SocketAddr,
    /// Feed of encoded frames draining into this peer's writer task.
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// The set of currently connected peers. Written by the acceptor
/// (insertions) and by each receive loop (removal on closure), read by the
/// broadcaster on every fan-out.
pub(crate) type Registry = Arc<RwLock<BTreeMap<PeerId, PeerEntry>>>;

/// Bind `addr` and start hosting: accept inbound connections, give each its
/// own receive loop, and relay every inbound message to the other peers.
/// Returns the collaborator handle; the UI drives everything through it.
pub async fn start(addr: SocketAddr, name: &str, download_dir: PathBuf) -> Result<NodeHandle> {
    let (handle, _registry) = start_with_registry(addr, name, download_dir).await?;
    Ok(handle)
}

/// As [`start`], but also exposes the registry so tests can observe its
/// size settle after connects and disconnects.
pub(crate) async fn start_with_registry(
    addr: SocketAddr,
    name: &str,
    download_dir: PathBuf,
) -> Result<(NodeHandle, Registry)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;

    let display_name = Role::Host.display_name(name);
    let registry: Registry = Arc::new(RwLock::new(BTreeMap::new()));
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(%local_addr, "hosting");
    let _ = event_tx.send(Event::Status(format!("hosting on {local_addr}")));

    tokio::spawn(accept_loop(
        listener,
        registry.clone(),
        event_tx.clone(),
        shutdown_rx.clone(),
        download_dir.clone(),
    ));

    tokio::spawn(send_loop(
        outgoing_rx,
        registry.clone(),
        event_tx,
        display_name,
        shutdown_rx,
    ));

    let handle = NodeHandle::new(Role::Host, local_addr, outgoing_tx, event_rx, shutdown_tx);
    Ok((handle, registry))
}

/// Accept connections until shutdown. Each accepted peer is registered and
/// handed its own receive loop, so a peer blocking on a read never stalls
/// the accept cycle.
async fn accept_loop(
    listener: TcpListener,
    registry: Registry,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: watch::Receiver<bool>,
    download_dir: PathBuf,
) {
    let mut next_id: PeerId = 0;
    let mut first_accept = true;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };

                let id = next_id;
                next_id += 1;

                let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
                registry.write().await.insert(id, PeerEntry { addr, tx: frame_tx });

                info!(%addr, id, "peer connected");
                if first_accept {
                    // Sending only becomes meaningful once someone can hear it.
                    first_accept = false;
                    let _ = events.send(Event::SendReady);
                }
                let _ = events.send(Event::Status(format!("peer connected: {addr}")));

                tokio::spawn(handle_connection(
                    id,
                    stream,
                    addr,
                    frame_rx,
                    registry.clone(),
                    events.clone(),
                    shutdown.clone(),
                    download_dir.clone(),
                ));
            }
        }
    }

    info!("host stopped, listener closed");
}

/// One connection: a writer task draining its frame channel plus the
/// receive loop. Runs until the stream closes or errors, then deregisters.
/// Closure is final — there is no reconnect for a registered peer.
#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    id: PeerId,
    stream: TcpStream,
    addr: SocketAddr,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    registry: Registry,
    events: mpsc::UnboundedSender<Event>,
    shutdown: watch::Receiver<bool>,
    download_dir: PathBuf,
) {
    let (read_half, mut write_half) = stream.into_split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = framing::write_frame(&mut write_half, &frame).await {
                warn!(%addr, "write failed, peer writer stopping: {e}");
                break;
            }
        }
    });

    receive_loop(id, read_half, addr, &registry, &events, shutdown, &download_dir).await;

    // Deregister before announcing, so no broadcast can pick this peer up
    // as a target once the closure is visible.
    registry.write().await.remove(&id);
    writer.abort();
    info!(%addr, id, "peer disconnected");
    let _ = events.send(Event::Status(format!("peer disconnected: {addr}")));
}

/// Read frames until closure. Decoded messages fan out to every other peer
/// and surface locally; malformed frames are dropped and the loop keeps
/// going.
async fn receive_loop(
    id: PeerId,
    mut reader: OwnedReadHalf,
    addr: SocketAddr,
    registry: &Registry,
    events: &mpsc::UnboundedSender<Event>,
    mut shutdown: watch::Receiver<bool>,
    download_dir: &Path,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = framing::read_frame(&mut reader) => {
                let payload = match frame {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%addr, "read failed: {e}");
                        break;
                    }
                };

                match protocol::decode(&payload) {
                    Ok(msg) => {
                        // Relay the frame exactly as it arrived; re-encoding
                        // a message we just decoded buys nothing.
                        broadcast(registry, &payload, Some(id)).await;
                        deliver_inbound(msg, events, download_dir);
                    }
                    Err(e) => {
                        warn!(%addr, "dropping malformed frame: {e}");
                        let _ = events.send(Event::Error(Error::Decode(e)));
                    }
                }
            }
        }
    }
}

/// Write an encoded frame to every registered peer except `origin`
/// (`None` for a host-originated send, which goes to all). A failed write
/// to one peer is logged and skipped; it never blocks the rest of the
/// fan-out.
pub(crate) async fn broadcast(registry: &Registry, frame: &[u8], origin: Option<PeerId>) {
    let peers = registry.read().await;
    for (id, entry) in peers.iter() {
        if Some(*id) == origin {
            continue;
        }
        if entry.tx.send(frame.to_vec()).is_err() {
            warn!(peer = %entry.addr, "relay write failed, skipping peer");
        }
    }
}

/// Host send path: user requests in, frames out to every peer, plus a local
/// echo so the host sees its own traffic.
async fn send_loop(
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    registry: Registry,
    events: mpsc::UnboundedSender<Event>,
    display_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            request = outgoing.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        match request {
            Outgoing::Chat(text) => {
                let body = text.trim();
                if body.is_empty() {
                    continue;
                }
                let frame = protocol::encode(&WireMessage::chat(&display_name, body));
                broadcast(&registry, &frame, None).await;
                let _ = events.send(Event::Chat {
                    sender: display_name.clone(),
                    body: body.to_string(),
                });
            }
            Outgoing::SendFile(path) => {
                match read_file_message(&path) {
                    Ok((filename, frame)) => {
                        broadcast(&registry, &frame, None).await;
                        let _ = events.send(Event::Status(format!(
                            "{display_name} sent file: {filename}"
                        )));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "file send failed: {e}");
                        let _ = events.send(Event::Error(e));
                    }
                }
            }
        }
    }
}
