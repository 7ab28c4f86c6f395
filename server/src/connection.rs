//! Per-client connection handling
//!
//! A handler splits the byte stream into newline-delimited frames, applies
//! `pos` updates to the session's player and drains the session's outbound
//! queue to the socket. Whatever ends the connection, the handler closes the
//! session and unregisters it exactly once.

use crate::registry::{ClientSession, Frame, SessionRegistry};
use bytes::BytesMut;
use futures::StreamExt;
use log::{info, warn};
use shared::ClientMessage;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

/// Longest accepted client frame in bytes; longer lines are discarded
pub const MAX_FRAME_LENGTH: usize = 8 * 1024;

enum ClientFrame {
    Line(String),
    Oversized,
}

/// Newline framing that reports over-long lines as an item instead of an
/// error, so the stream keeps going while the codec skips to the next `\n`
struct ClientFrameCodec {
    lines: LinesCodec,
}

impl ClientFrameCodec {
    fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_FRAME_LENGTH),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> io::Result<Option<ClientFrame>> {
        match result {
            Ok(line) => Ok(line.map(ClientFrame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(ClientFrame::Oversized)),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for ClientFrameCodec {
    type Item = ClientFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<ClientFrame>> {
        Self::map(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<ClientFrame>> {
        Self::map(self.lines.decode_eof(buf))
    }
}

/// Why a connection handler stopped
#[derive(Debug)]
pub enum DisconnectReason {
    PeerClosed,
    ReadError(io::Error),
    SessionClosed,
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => f.write_str("peer closed the connection"),
            DisconnectReason::ReadError(e) => write!(f, "read error: {}", e),
            DisconnectReason::SessionClosed => f.write_str("session closed"),
            DisconnectReason::Shutdown => f.write_str("server shutting down"),
        }
    }
}

pub struct ConnectionHandler {
    session: Arc<ClientSession>,
    registry: SessionRegistry,
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    pub fn new(
        session: Arc<ClientSession>,
        registry: SessionRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            registry,
            shutdown,
        }
    }

    /// Runs the connection until the peer leaves, a read fails, the session is
    /// closed or the server shuts down, then cleans up
    pub async fn run<R, W>(
        self,
        reader: R,
        writer: W,
        outbound: mpsc::Receiver<Frame>,
    ) -> DisconnectReason
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let reading = async {
            let reason = self.read_frames(reader).await;
            // Stops the writer as well.
            self.session.close();
            reason
        };
        let writing = write_frames(&self.session, writer, outbound);

        let (reason, ()) = tokio::join!(reading, writing);

        self.registry.remove(self.session.id());
        info!("Client {} disconnected: {}", self.session.id(), reason);
        reason
    }

    async fn read_frames<R: AsyncRead + Unpin>(&self, reader: R) -> DisconnectReason {
        let mut frames = FramedRead::new(reader, ClientFrameCodec::new());

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return DisconnectReason::Shutdown,
                _ = self.session.closed() => return DisconnectReason::SessionClosed,
                frame = frames.next() => match frame {
                    Some(Ok(ClientFrame::Line(line))) => self.handle_frame(&line),
                    Some(Ok(ClientFrame::Oversized)) => {
                        warn!(
                            "Client {} sent a frame over {} bytes, skipping it",
                            self.session.id(),
                            MAX_FRAME_LENGTH
                        );
                    }
                    Some(Err(e)) => return DisconnectReason::ReadError(e),
                    None => return DisconnectReason::PeerClosed,
                },
            }
        }
    }

    fn handle_frame(&self, line: &str) {
        match ClientMessage::decode(line) {
            Ok(ClientMessage::Pos(pos)) => self.session.set_position(pos.x, pos.y),
            Err(e) => warn!(
                "Error processing message from client {}: {}",
                self.session.id(),
                e
            ),
        }
    }
}

/// Drains queued frames to the socket until the session closes
///
/// A failed write closes the session so the reader side tears down too.
async fn write_frames<W: AsyncWrite + Unpin>(
    session: &ClientSession,
    mut writer: W,
    mut outbound: mpsc::Receiver<Frame>,
) {
    loop {
        let frame = tokio::select! {
            _ = session.closed() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        tokio::select! {
            _ = session.closed() => break,
            result = writer.write_all(frame.as_bytes()) => {
                if let Err(e) = result {
                    warn!("Error sending to client {}: {}", session.id(), e);
                    session.close();
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}
