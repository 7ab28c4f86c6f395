//! TCP connection to the tag server: handshake, frame reading, position sends

use futures::StreamExt;
use log::{debug, info, warn};
use shared::{ClientMessage, GameMap, Position, ProtocolError, ServerMessage, StateSnapshot};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Longest server frame accepted; a `state` frame grows with the player count
pub const MAX_SERVER_FRAME: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] LinesCodecError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("server closed the connection")]
    Closed,
    #[error("expected {expected} during handshake, got {got}")]
    Handshake { expected: &'static str, got: String },
    #[error("client {0} is missing from the state")]
    NotInState(u32),
    #[error("timed out waiting for state")]
    Timeout,
}

/// Reading half: decodes server frames in arrival order
pub struct ServerReader {
    frames: FramedRead<OwnedReadHalf, LinesCodec>,
    last_state: Option<StateSnapshot>,
}

impl ServerReader {
    fn new(reader: OwnedReadHalf) -> Self {
        Self {
            frames: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_SERVER_FRAME)),
            last_state: None,
        }
    }

    /// Reads and decodes the next frame
    ///
    /// Cancel safe: a frame is only consumed when this returns it.
    pub async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        let line = self.frames.next().await.ok_or(ClientError::Closed)??;
        let message = ServerMessage::decode(&line)?;
        if let ServerMessage::State(snapshot) = &message {
            self.last_state = Some(snapshot.clone());
        }
        Ok(message)
    }

    /// Skips frames until the next `state`
    pub async fn next_state(&mut self) -> Result<StateSnapshot, ClientError> {
        loop {
            match self.next_message().await? {
                ServerMessage::State(snapshot) => return Ok(snapshot),
                other => debug!("Ignoring {:?} outside the handshake", other),
            }
        }
    }

    /// Waits up to `limit` for a state that satisfies `predicate`
    pub async fn wait_for_state<F>(
        &mut self,
        limit: Duration,
        mut predicate: F,
    ) -> Result<StateSnapshot, ClientError>
    where
        F: FnMut(&StateSnapshot) -> bool,
    {
        let waiting = async {
            loop {
                let snapshot = self.next_state().await?;
                if predicate(&snapshot) {
                    return Ok::<_, ClientError>(snapshot);
                }
            }
        };

        timeout(limit, waiting).await.map_err(|_| ClientError::Timeout)?
    }

    pub fn last_state(&self) -> Option<&StateSnapshot> {
        self.last_state.as_ref()
    }
}

/// Writing half: position updates and raw bytes
pub struct ClientWriter {
    writer: OwnedWriteHalf,
}

impl ClientWriter {
    pub async fn send_position(&mut self, x: f64, y: f64) -> Result<(), ClientError> {
        let frame = ClientMessage::Pos(Position { x, y }).encode()?;
        self.writer.write_all(frame.as_bytes()).await?;
        Ok(())
    }

    /// Writes bytes as-is, for frames the protocol types cannot express
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Half-closes the connection; the server sees end of stream
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Connected and handshaken client
pub struct Client {
    client_id: u32,
    map: GameMap,
    reader: ServerReader,
    writer: ClientWriter,
}

impl Client {
    /// Connects and completes the handshake: a `map` frame, then `client_id`
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let mut reader = ServerReader::new(read_half);

        let map = match reader.next_message().await? {
            ServerMessage::Map(map) => map,
            other => {
                return Err(ClientError::Handshake {
                    expected: "map",
                    got: format!("{:?}", other),
                })
            }
        };
        let client_id = match reader.next_message().await? {
            ServerMessage::ClientId(id) => id,
            other => {
                return Err(ClientError::Handshake {
                    expected: "client_id",
                    got: format!("{:?}", other),
                })
            }
        };

        info!(
            "Connected as client {} on a {}x{} map",
            client_id,
            map.width(),
            map.height()
        );

        Ok(Self {
            client_id,
            map,
            reader,
            writer: ClientWriter { writer: write_half },
        })
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    pub fn map(&self) -> &GameMap {
        &self.map
    }

    pub fn last_state(&self) -> Option<&StateSnapshot> {
        self.reader.last_state()
    }

    pub async fn send_position(&mut self, x: f64, y: f64) -> Result<(), ClientError> {
        self.writer.send_position(x, y).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.send_raw(bytes).await
    }

    pub async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        self.reader.next_message().await
    }

    pub async fn next_state(&mut self) -> Result<StateSnapshot, ClientError> {
        self.reader.next_state().await
    }

    pub async fn wait_for_state<F>(
        &mut self,
        limit: Duration,
        predicate: F,
    ) -> Result<StateSnapshot, ClientError>
    where
        F: FnMut(&StateSnapshot) -> bool,
    {
        self.reader.wait_for_state(limit, predicate).await
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.writer.close().await
    }

    /// Splits into halves that can be driven from separate tasks
    pub fn into_split(self) -> (ServerReader, ClientWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PowerupPositions, Role, ServerPlayerState};
    use std::collections::BTreeMap;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn state() -> StateSnapshot {
        StateSnapshot {
            server: ServerPlayerState {
                id: "server".to_string(),
                x: 0.0,
                y: 0.0,
                role: Role::Runner,
            },
            clients: BTreeMap::new(),
            powerups: PowerupPositions::new(),
        }
    }

    async fn serve_once(frames: Vec<ServerMessage>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for frame in frames {
                stream
                    .write_all(frame.encode().unwrap().as_bytes())
                    .await
                    .unwrap();
            }
            let mut received = String::new();
            BufReader::new(stream).read_line(&mut received).await.unwrap();
            received
        });

        (addr, server)
    }

    #[tokio::test]
    async fn test_handshake_and_position_frame() {
        let map = GameMap::new(vec![vec![0, 1], vec![1, 0]]);
        let (addr, server) = serve_once(vec![
            ServerMessage::Map(map.clone()),
            ServerMessage::ClientId(4),
            ServerMessage::State(state()),
        ])
        .await;

        let mut client = Client::connect(&addr).await.unwrap();
        assert_eq!(client.client_id(), 4);
        assert_eq!(client.map(), &map);

        let snapshot = client.next_state().await.unwrap();
        assert_eq!(snapshot, state());
        assert_eq!(client.last_state(), Some(&state()));

        client.send_position(1.5, 2.0).await.unwrap();
        let received = server.await.unwrap();
        assert_eq!(
            ClientMessage::decode(received.trim_end()).unwrap(),
            ClientMessage::Pos(Position { x: 1.5, y: 2.0 })
        );
    }

    #[tokio::test]
    async fn test_handshake_out_of_order_is_rejected() {
        let (addr, _server) = serve_once(vec![ServerMessage::ClientId(1)]).await;

        match Client::connect(&addr).await {
            Err(ClientError::Handshake { expected, .. }) => assert_eq!(expected, "map"),
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Handshake should fail"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_state_times_out() {
        let (addr, _server) = serve_once(vec![
            ServerMessage::Map(GameMap::new(vec![vec![0]])),
            ServerMessage::ClientId(1),
            ServerMessage::State(state()),
        ])
        .await;
        let mut client = Client::connect(&addr).await.unwrap();

        let result = client
            .wait_for_state(Duration::from_millis(50), |s| !s.clients.is_empty())
            .await;

        assert!(matches!(result, Err(ClientError::Timeout)));
    }
}
