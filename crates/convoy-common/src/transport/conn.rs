use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{ConvoyError, Result};

/// Default timeout for opening a backend connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default buffer size for the buffered envelope.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Upper bound on a single message, to keep a confused peer from forcing
/// huge allocations.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// How messages are delimited on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// 4-byte big-endian length prefix per message.
    Framed,
    /// Newline-delimited records over a buffered stream.
    Buffered { buffer_size: usize },
}

impl Envelope {
    /// Buffered envelope with the default buffer size.
    pub fn buffered() -> Self {
        Envelope::Buffered {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

enum Framing {
    Framed(TcpStream),
    Buffered(BufStream<TcpStream>),
}

/// One open byte-stream connection to a backend host, wrapped in its
/// envelope. The pool hands these to the client factory; it never looks at
/// the payloads itself.
pub struct Connection {
    framing: Framing,
    peer: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connects to `addr`, trying every resolved socket address until one
    /// accepts within `connect_timeout`.
    pub async fn open(addr: &str, envelope: Envelope, connect_timeout: Duration) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| ConvoyError::Connection(format!("invalid address '{addr}': {e}")))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    trace!(peer = %addr, "connection established");
                    return Ok(Self::wrap(stream, envelope, addr.to_string()));
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => {
                    last_err = Some(format!("connect timed out after {connect_timeout:?}"))
                }
            }
        }

        Err(ConvoyError::Connection(format!(
            "failed to connect to {addr}: {}",
            last_err.unwrap_or_else(|| "address resolved to nothing".to_string())
        )))
    }

    /// Wraps an already-connected stream. Used by client factories that do
    /// their own dialing, and by tests.
    pub fn from_stream(stream: TcpStream, envelope: Envelope) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::wrap(stream, envelope, peer)
    }

    fn wrap(stream: TcpStream, envelope: Envelope, peer: String) -> Self {
        let framing = match envelope {
            Envelope::Framed => Framing::Framed(stream),
            Envelope::Buffered { buffer_size } => {
                Framing::Buffered(BufStream::with_capacity(buffer_size, buffer_size, stream))
            }
        };
        Connection { framing, peer }
    }

    /// Address this connection was opened against.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Writes one message in the connection's envelope.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.framing {
            Framing::Framed(stream) => {
                let len = data.len() as u32;
                stream
                    .write_all(&len.to_be_bytes())
                    .await
                    .map_err(|e| io_err("writing frame header", e))?;
                stream
                    .write_all(data)
                    .await
                    .map_err(|e| io_err("writing frame body", e))?;
                stream.flush().await.map_err(|e| io_err("flushing", e))?;
            }
            Framing::Buffered(stream) => {
                stream
                    .write_all(data)
                    .await
                    .map_err(|e| io_err("writing record", e))?;
                stream
                    .write_all(b"\n")
                    .await
                    .map_err(|e| io_err("writing record delimiter", e))?;
                stream.flush().await.map_err(|e| io_err("flushing", e))?;
            }
        }
        Ok(())
    }

    /// Reads one message in the connection's envelope.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        match &mut self.framing {
            Framing::Framed(stream) => {
                let mut len_buf = [0u8; 4];
                stream
                    .read_exact(&mut len_buf)
                    .await
                    .map_err(|e| io_err("reading frame header", e))?;
                let len = u32::from_be_bytes(len_buf) as usize;
                if len > MAX_MESSAGE_SIZE {
                    return Err(ConvoyError::Protocol(format!(
                        "message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"
                    )));
                }
                let mut buf = vec![0u8; len];
                stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| io_err("reading frame body", e))?;
                Ok(buf)
            }
            Framing::Buffered(stream) => {
                let mut buf = Vec::new();
                let read = stream
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|e| io_err("reading record", e))?;
                if read == 0 {
                    return Err(ConvoyError::Transport(
                        "connection closed by peer".to_string(),
                    ));
                }
                if buf.len() > MAX_MESSAGE_SIZE {
                    return Err(ConvoyError::Protocol(format!(
                        "message too large: {} bytes (max {MAX_MESSAGE_SIZE})",
                        buf.len()
                    )));
                }
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                Ok(buf)
            }
        }
    }

    /// Sends one message and waits for the reply.
    pub async fn round_trip(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.send(data).await?;
        self.recv().await
    }
}

fn io_err(context: &str, err: std::io::Error) -> ConvoyError {
    ConvoyError::Transport(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn framed_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::from_stream(stream, Envelope::Framed);
            while let Ok(msg) = conn.recv().await {
                conn.send(&msg).await.unwrap();
            }
        });
        addr
    }

    async fn buffered_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::from_stream(stream, Envelope::buffered());
            while let Ok(msg) = conn.recv().await {
                conn.send(&msg).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn framed_round_trip() {
        let addr = framed_echo_server().await;
        let mut conn = Connection::open(&addr, Envelope::Framed, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let reply = conn.round_trip(b"{\"hello\":1}").await.unwrap();
        assert_eq!(reply, b"{\"hello\":1}");
        // boundaries hold for back-to-back messages
        let reply = conn.round_trip(b"second").await.unwrap();
        assert_eq!(reply, b"second");
    }

    #[tokio::test]
    async fn buffered_round_trip() {
        let addr = buffered_echo_server().await;
        let mut conn = Connection::open(&addr, Envelope::buffered(), DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let reply = conn.round_trip(b"{\"hello\":2}").await.unwrap();
        assert_eq!(reply, b"{\"hello\":2}");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = Connection::open(&addr, Envelope::Framed, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvoyError::Connection(_)), "{err:?}");
    }

    #[tokio::test]
    async fn peer_hangup_surfaces_as_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut conn = Connection::open(&addr, Envelope::Framed, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let err = conn.recv().await.unwrap_err();
        assert!(matches!(err, ConvoyError::Transport(_)), "{err:?}");
    }
}
