//! Tokio TCP stream transport.
//!
//! Streams carry length-framed datagrams: a big-endian `u16` byte length
//! followed by that many bytes. Each accepted or connected socket gets a
//! reader task and a writer task on the runtime; both report back to the
//! manager thread exclusively through the link event channel, keeping the
//! core single-threaded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::errors::{ConfigError, NetResult};
use crate::transport::{Endpoint, LinkEvent, LinkEventSender, LinkId, Transport};

/// Maximum datagram body size representable by the frame header.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Prepends the length header to a datagram body.
pub fn frame(datagram: &[u8]) -> Option<Vec<u8>> {
    if datagram.len() > MAX_FRAME_LEN {
        return None;
    }
    let mut framed = Vec::with_capacity(datagram.len() + 2);
    framed.extend_from_slice(&(datagram.len() as u16).to_be_bytes());
    framed.extend_from_slice(datagram);
    Some(framed)
}

/// TCP link driver. Requires a running tokio runtime for `open_server` and
/// `connect`.
pub struct TcpTransport {
    events: Option<LinkEventSender>,
    writers: Arc<DashMap<LinkId, mpsc::UnboundedSender<Vec<u8>>>>,
    next_link: Arc<AtomicU64>,
    listener_shutdown: Option<mpsc::UnboundedSender<()>>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport {
            events: None,
            writers: Arc::new(DashMap::new()),
            next_link: Arc::new(AtomicU64::new(0)),
            listener_shutdown: None,
        }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> NetResult<LinkEventSender> {
        self.events
            .clone()
            .ok_or_else(|| ConfigError::ComponentNotProvided("transport").into())
    }

    fn spawn_connection(
        stream: TcpStream,
        inbound: bool,
        events: LinkEventSender,
        writers: Arc<DashMap<LinkId, mpsc::UnboundedSender<Vec<u8>>>>,
        next_link: Arc<AtomicU64>,
    ) {
        let link = next_link.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        writers.insert(link, writer_tx);
        events.send(LinkEvent::Opened { link, inbound });

        tokio::spawn(async move {
            while let Some(framed) = writer_rx.recv().await {
                if writer.write_all(&framed).await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        tokio::spawn(async move {
            let mut header = [0u8; 2];
            loop {
                match reader.read_exact(&mut header).await {
                    Ok(_) => {}
                    Err(_) => break,
                }
                let length = u16::from_be_bytes(header) as usize;
                let mut payload = vec![0u8; length];
                if reader.read_exact(&mut payload).await.is_err() {
                    break;
                }
                events.send(LinkEvent::Datagram { link, payload });
            }
            writers.remove(&link);
            events.send(LinkEvent::Closed { link });
        });
    }
}

impl Transport for TcpTransport {
    fn attach(&mut self, events: LinkEventSender) {
        self.events = Some(events);
    }

    fn open_server(&mut self, endpoint: Endpoint) -> NetResult<()> {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(ConfigError::ComponentNotProvided("tcp endpoint").into());
        };
        let events = self.events()?;
        let writers = self.writers.clone();
        let next_link = self.next_link.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
        self.listener_shutdown = Some(shutdown_tx);

        tokio::spawn(async move {
            let listener = match TcpListener::bind((host.as_str(), port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(host, port, error = %e, "failed to bind a listener");
                    return;
                }
            };
            tracing::info!(host, port, "server opened");
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => Self::spawn_connection(
                                stream,
                                true,
                                events.clone(),
                                writers.clone(),
                                next_link.clone(),
                            ),
                            Err(e) => {
                                tracing::warn!(error = %e, "accept failed");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        Ok(())
    }

    fn connect(&mut self, endpoint: Endpoint) -> NetResult<()> {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(ConfigError::ComponentNotProvided("tcp endpoint").into());
        };
        let events = self.events()?;
        let writers = self.writers.clone();
        let next_link = self.next_link.clone();

        tokio::spawn(async move {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => {
                    Self::spawn_connection(stream, false, events, writers, next_link)
                }
                Err(e) => {
                    tracing::info!(host, port, error = %e, "connection failed");
                }
            }
        });
        Ok(())
    }

    fn send(&mut self, link: LinkId, datagram: &[u8]) {
        let Some(framed) = frame(datagram) else {
            tracing::warn!(link, len = datagram.len(), "datagram exceeds the frame limit");
            return;
        };
        if let Some(writer) = self.writers.get(&link) {
            let _ = writer.send(framed);
        }
    }

    fn close(&mut self, link: LinkId) {
        // Dropping the writer sender ends the writer task, which shuts the
        // socket down; the reader task then reports Closed.
        self.writers.remove(&link);
    }

    fn shutdown(&mut self) {
        if let Some(shutdown) = self.listener_shutdown.take() {
            let _ = shutdown.send(());
        }
        self.writers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let framed = frame(b"hello").unwrap();
        assert_eq!(&framed[..2], &5u16.to_be_bytes());
        assert_eq!(&framed[2..], b"hello");
    }

    #[test]
    fn frame_rejects_oversized_payloads() {
        assert!(frame(&vec![0u8; MAX_FRAME_LEN]).is_some());
        assert!(frame(&vec![0u8; MAX_FRAME_LEN + 1]).is_none());
    }
}
