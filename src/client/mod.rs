use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::node::{deliver_inbound, read_file_message, Event, NodeHandle, Outgoing, Role};
use crate::protocol::{self, framing, WireMessage};

/// Open the single outbound connection to a host and start its receive
/// loop. One attempt, no retry; a failure surfaces as `Error::Connect` and
/// the caller is free to try again manually.
pub async fn connect(addr: SocketAddr, name: &str, download_dir: PathBuf) -> Result<NodeHandle> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| Error::Connect { addr, source })?;
    let local_addr = stream.local_addr()?;
    let display_name = Role::Peer.display_name(name);

    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(%addr, "connected to host");
    let _ = event_tx.send(Event::Status(format!("connected to {addr}")));
    // A peer talks straight to the host; sending works from the start.
    let _ = event_tx.send(Event::SendReady);

    let (read_half, write_half) = stream.into_split();

    tokio::spawn(receive_loop(
        read_half,
        addr,
        event_tx.clone(),
        shutdown_rx.clone(),
        download_dir,
    ));

    tokio::spawn(send_loop(
        outgoing_rx,
        write_half,
        addr,
        event_tx,
        display_name,
        shutdown_rx,
    ));

    Ok(NodeHandle::new(
        Role::Peer,
        local_addr,
        outgoing_tx,
        event_rx,
        shutdown_tx,
    ))
}

/// Peer receive loop: frames from the host, decoded and surfaced. No relay
/// here — forwarding is the host's job. Ends for good when the stream
/// closes or errors.
async fn receive_loop(
    mut reader: OwnedReadHalf,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: watch::Receiver<bool>,
    download_dir: PathBuf,
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
                    Ok(None) => {
                        let _ = events.send(Event::Status(format!("disconnected from {addr}")));
                        break;
                    }
                    Err(e) => {
                        warn!(%addr, "read failed: {e}");
                        let _ = events.send(Event::Status(format!("connection to {addr} lost")));
                        break;
                    }
                };

                match protocol::decode(&payload) {
                    Ok(msg) => deliver_inbound(msg, &events, &download_dir),
                    Err(e) => {
                        warn!(%addr, "dropping malformed frame: {e}");
                        let _ = events.send(Event::Error(Error::Decode(e)));
                    }
                }
            }
        }
    }
}

/// Peer send path: encode user requests with the local display name and
/// write them to the one outbound connection. A failed write surfaces as a
/// send error but changes nothing else — the role stays, the loop stays.
async fn send_loop(
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    mut writer: OwnedWriteHalf,
    addr: SocketAddr,
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
                if write_or_report(&mut writer, &frame, addr, &events).await {
                    let _ = events.send(Event::Chat {
                        sender: display_name.clone(),
                        body: body.to_string(),
                    });
                }
            }
            Outgoing::SendFile(path) => match read_file_message(&path) {
                Ok((filename, frame)) => {
                    if write_or_report(&mut writer, &frame, addr, &events).await {
                        let _ = events.send(Event::Status(format!(
                            "{display_name} sent file: {filename}"
                        )));
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), "file send failed: {e}");
                    let _ = events.send(Event::Error(e));
                }
            },
        }
    }
}

/// Write one frame, turning a failure into a send-error event for the UI.
/// Returns whether the write went through.
async fn write_or_report(
    writer: &mut OwnedWriteHalf,
    frame: &[u8],
    addr: SocketAddr,
    events: &mpsc::UnboundedSender<Event>,
) -> bool {
    match framing::write_frame(writer, frame).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%addr, "send failed: {e}");
            let _ = events.send(Event::Error(Error::Send {
                peer: addr.to_string(),
            }));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn next_event(handle: &mut NodeHandle) -> Event {
        timeout(WAIT, handle.next_event()).await.unwrap().unwrap()
    }

    async fn wait_for(handle: &mut NodeHandle, pred: impl Fn(&Event) -> bool) -> Event {
        loop {
            let event = next_event(handle).await;
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        // Bind then drop, so the port is (momentarily) known-closed.
        let (listener, addr) = listener().await;
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let err = connect(addr, "A", dir.path().to_path_buf())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connect");
    }

    #[tokio::test]
    async fn test_chat_is_encoded_with_display_name() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();

        let mut handle = connect(addr, "A", dir.path().to_path_buf()).await.unwrap();
        let (mut host_side, _) = listener.accept().await.unwrap();

        handle.request(Outgoing::Chat("yo".into()));

        let frame = timeout(WAIT, framing::read_frame(&mut host_side))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame, b"A: yo");

        // Local echo for the sender's own display.
        let event = wait_for(&mut handle, |e| matches!(e, Event::Chat { .. })).await;
        match event {
            Event::Chat { sender, body } => {
                assert_eq!(sender, "A");
                assert_eq!(body, "yo");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_blank_name_sends_as_peer() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();

        let handle = connect(addr, "  ", dir.path().to_path_buf()).await.unwrap();
        let (mut host_side, _) = listener.accept().await.unwrap();

        handle.request(Outgoing::Chat("hello".into()));

        let frame = timeout(WAIT, framing::read_frame(&mut host_side))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame, b"Peer: hello");
    }

    #[tokio::test]
    async fn test_inbound_chat_surfaces_as_event() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();

        let mut handle = connect(addr, "A", dir.path().to_path_buf()).await.unwrap();
        let (mut host_side, _) = listener.accept().await.unwrap();

        let frame = protocol::encode(&WireMessage::chat("Host", "hi"));
        framing::write_frame(&mut host_side, &frame).await.unwrap();

        let event = wait_for(&mut handle, |e| matches!(e, Event::Chat { .. })).await;
        match event {
            Event::Chat { sender, body } => {
                assert_eq!(sender, "Host");
                assert_eq!(body, "hi");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_inbound_file_written_and_surfaced() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();

        let mut handle = connect(addr, "A", dir.path().to_path_buf()).await.unwrap();
        let (mut host_side, _) = listener.accept().await.unwrap();

        let frame = protocol::encode(&WireMessage::file("report.txt", vec![1, 2, 3]));
        framing::write_frame(&mut host_side, &frame).await.unwrap();

        let event = wait_for(&mut handle, |e| matches!(e, Event::FileReceived { .. })).await;
        match event {
            Event::FileReceived { path, size, .. } => {
                assert_eq!(size, 3);
                assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_send_after_close_surfaces_send_error() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();

        let mut handle = connect(addr, "A", dir.path().to_path_buf()).await.unwrap();
        let (host_side, _) = listener.accept().await.unwrap();
        drop(host_side);
        drop(listener);

        // The first writes may still land in kernel buffers; keep sending
        // until the broken pipe is observed.
        let event = loop {
            handle.request(Outgoing::Chat("anyone there?".into()));
            tokio::time::sleep(Duration::from_millis(20)).await;
            match timeout(Duration::from_millis(100), handle.next_event()).await {
                Ok(Some(Event::Error(e))) => break Event::Error(e),
                Ok(Some(_)) => continue,
                Ok(None) => panic!("event channel closed"),
                Err(_) => continue,
            }
        };
        match event {
            Event::Error(e) => assert_eq!(e.kind(), "send"),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_peer_sends_whole_file_from_disk() {
        let (listener, addr) = listener().await;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("notes.txt");
        std::fs::write(&file_path, b"contents").unwrap();

        let handle = connect(addr, "A", dir.path().to_path_buf()).await.unwrap();
        let (mut host_side, _) = listener.accept().await.unwrap();

        handle.request(Outgoing::SendFile(file_path));

        let frame = timeout(WAIT, framing::read_frame(&mut host_side))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match protocol::decode(&frame).unwrap() {
            WireMessage::File { filename, content } => {
                assert_eq!(filename, "notes.txt");
                assert_eq!(content, b"contents");
            }
            _ => panic!("expected a file frame"),
        }
    }
}
