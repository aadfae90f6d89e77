//! Connection transport.
//!
//! A [`Listener`] owns the localhost listening socket; every accepted client
//! becomes a [`Connection`] that owns its stream. Both release their socket
//! on `close()` or when dropped, and `close()` may be called any number of
//! times.

use crate::error::ServerError;
use bytes::Bytes;
use rsplink_protocol::{PacketWriter, ACK, DEFAULT_PACKET_SIZE, NAK};
use std::future::poll_fn;
use std::net::{Ipv4Addr, SocketAddr};
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Listening side of the transport, bound to `localhost:<port>`.
pub struct Listener {
    port: u16,
    packet_size: usize,
    listener: Option<TcpListener>,
}

impl Listener {
    /// Creates a listener for `port`. Nothing is bound until [`listen`](Self::listen).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            packet_size: DEFAULT_PACKET_SIZE,
            listener: None,
        }
    }

    /// Sets the read size handed to accepted connections.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Binds and listens with address reuse and a single pending slot.
    ///
    /// Does nothing if already listening.
    pub fn listen(&mut self) -> Result<(), ServerError> {
        if self.listener.is_some() {
            return Ok(());
        }

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;

        tracing::info!("Listening for debugger on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Returns the bound address (useful when the port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        let listener = self.listener.as_ref().ok_or(ServerError::NotListening)?;
        Ok(listener.local_addr()?)
    }

    /// Waits for one client, for at most `timeout` if given.
    ///
    /// Returns `None` on timeout, on an accept failure, or when not
    /// listening.
    pub async fn accept(&self, timeout: Option<Duration>) -> Option<Connection> {
        let Some(listener) = self.listener.as_ref() else {
            tracing::warn!("accept() called on a listener that is not started");
            return None;
        };

        let accepted = match timeout {
            Some(limit) => match tokio::time::timeout(limit, listener.accept()).await {
                Ok(result) => result,
                Err(_) => return None,
            },
            None => listener.accept().await,
        };

        match accepted {
            Ok((stream, addr)) => {
                tracing::info!("Debugger connected: {}", addr);
                stream.set_nodelay(true).ok();
                Some(Connection::new(stream, self.packet_size))
            }
            Err(e) => {
                tracing::warn!("Accept error: {}", e);
                None
            }
        }
    }

    /// Stops listening. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            tracing::debug!("Closing listener on port {}", self.port);
            drop(listener);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

/// One connected debugger session socket.
pub struct Connection {
    stream: Option<TcpStream>,
    peer_addr: Option<SocketAddr>,
    packet_size: usize,
}

impl Connection {
    /// Wraps an already connected stream.
    pub fn new(stream: TcpStream, packet_size: usize) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream: Some(stream),
            peer_addr,
            packet_size,
        }
    }

    /// Opens a client connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ServerError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self::new(stream, DEFAULT_PACKET_SIZE))
    }

    /// Returns the default read size.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Closes after an I/O failure and converts the error.
    fn fail(&mut self, e: std::io::Error) -> ServerError {
        tracing::debug!("Connection {:?} failed: {}", self.peer_addr, e);
        self.close();
        ServerError::Io(e)
    }

    /// Receives up to `size` bytes (default: the packet size).
    ///
    /// An empty result means the peer closed its side. A zero `size` is
    /// rejected with [`ServerError::ZeroSizeRead`] so it cannot be mistaken
    /// for end of stream.
    pub async fn read(&mut self, size: Option<usize>) -> Result<Bytes, ServerError> {
        let size = size.unwrap_or(self.packet_size);
        if size == 0 {
            return Err(ServerError::ZeroSizeRead);
        }
        let mut buf = vec![0u8; size];
        let stream = self.stream.as_mut().ok_or(ServerError::NotConnected)?;
        match stream.read(&mut buf).await {
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Returns up to `size` pending bytes without consuming them.
    pub async fn peek(&mut self, size: usize) -> Result<Bytes, ServerError> {
        let mut buf = vec![0u8; size];
        let stream = self.stream.as_ref().ok_or(ServerError::NotConnected)?;
        match stream.peek(&mut buf).await {
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Sends the whole of `data`.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ServerError> {
        let stream = self.stream.as_mut().ok_or(ServerError::NotConnected)?;
        match stream.write_all(data).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn send_ack(&mut self) -> Result<(), ServerError> {
        self.write(&[ACK]).await
    }

    pub async fn send_nak(&mut self) -> Result<(), ServerError> {
        self.write(&[NAK]).await
    }

    /// Completes the writer's pending packet, sends it and returns the frame.
    ///
    /// The writer is left empty for the next reply whether or not the send
    /// succeeds.
    pub async fn send_packet(&mut self, writer: &mut PacketWriter) -> Result<Bytes, ServerError> {
        let frame = writer.finish();
        tracing::debug!(
            "Sending packet: {}",
            String::from_utf8_lossy(&frame).escape_debug()
        );
        self.write(&frame).await?;
        Ok(frame)
    }

    /// Reports whether a read would return immediately, without waiting.
    ///
    /// End of stream counts as ready.
    pub async fn input_ready(&mut self) -> Result<bool, ServerError> {
        let stream = self.stream.as_ref().ok_or(ServerError::NotConnected)?;
        let mut probe = [0u8; 1];
        let polled = poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut probe);
            match stream.poll_peek(cx, &mut buf) {
                Poll::Ready(result) => Poll::Ready(result.map(|_| true)),
                Poll::Pending => Poll::Ready(Ok(false)),
            }
        })
        .await;
        polled.map_err(|e| self.fail(e))
    }

    /// Releases the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            tracing::debug!("Closing connection {:?}", self.peer_addr);
            drop(stream);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pair() -> (Listener, Connection, Connection) {
        let mut listener = Listener::new(0);
        listener.listen().unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Connection::connect(addr).await.unwrap();
        let server = listener
            .accept(Some(Duration::from_secs(5)))
            .await
            .expect("accept");
        (listener, server, client)
    }

    async fn wait_ready(conn: &mut Connection) -> bool {
        for _ in 0..100 {
            if conn.input_ready().await.unwrap() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_listen_is_idempotent() {
        let mut listener = Listener::new(0);
        assert!(!listener.is_listening());
        listener.listen().unwrap();
        let addr = listener.local_addr().unwrap();
        listener.listen().unwrap();
        assert_eq!(listener.local_addr().unwrap(), addr);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_accept_times_out() {
        let mut listener = Listener::new(0);
        listener.listen().unwrap();
        let accepted = listener.accept(Some(Duration::from_millis(20))).await;
        assert!(accepted.is_none());
    }

    #[tokio::test]
    async fn test_accept_without_listen() {
        let listener = Listener::new(0);
        assert!(listener.accept(Some(Duration::from_millis(1))).await.is_none());
        assert!(matches!(
            listener.local_addr(),
            Err(ServerError::NotListening)
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_listener, mut server, mut client) = pair().await;
        client.write(b"$g#67").await.unwrap();

        let mut received = Vec::new();
        while received.len() < 5 {
            let chunk = server.read(None).await.unwrap();
            assert!(!chunk.is_empty());
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"$g#67");
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let (_listener, mut server, mut client) = pair().await;
        client.send_ack().await.unwrap();

        let peeked = server.peek(1).await.unwrap();
        assert_eq!(peeked.as_ref(), b"+");
        let read = server.read(Some(1)).await.unwrap();
        assert_eq!(read.as_ref(), b"+");
    }

    #[tokio::test]
    async fn test_zero_size_read_is_rejected() {
        let (_listener, mut server, mut client) = pair().await;
        client.send_ack().await.unwrap();

        assert!(matches!(
            server.read(Some(0)).await,
            Err(ServerError::ZeroSizeRead)
        ));
        assert!(!server.is_closed());
        let read = server.read(Some(1)).await.unwrap();
        assert_eq!(read.as_ref(), b"+");
    }

    #[tokio::test]
    async fn test_input_ready() {
        let (_listener, mut server, mut client) = pair().await;
        assert!(!server.input_ready().await.unwrap());

        client.send_nak().await.unwrap();
        assert!(wait_ready(&mut server).await);

        let read = server.read(None).await.unwrap();
        assert_eq!(read.as_ref(), b"-");
    }

    #[tokio::test]
    async fn test_read_after_peer_close_is_empty() {
        let (_listener, mut server, mut client) = pair().await;
        client.close();
        let read = server.read(None).await.unwrap();
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut listener, mut server, mut client) = pair().await;
        server.close();
        server.close();
        assert!(server.is_closed());
        assert!(matches!(
            server.write(b"+").await,
            Err(ServerError::NotConnected)
        ));
        assert!(matches!(
            server.read(None).await,
            Err(ServerError::NotConnected)
        ));

        client.close();
        client.close();
        listener.close();
        listener.close();
        assert!(!listener.is_listening());
    }

    #[tokio::test]
    async fn test_send_packet_resets_writer() {
        let (_listener, mut server, mut client) = pair().await;
        let mut writer = PacketWriter::new();
        writer.append(b"OK");
        let frame = server.send_packet(&mut writer).await.unwrap();
        assert_eq!(frame.as_ref(), b"$OK#9A");
        assert!(writer.is_empty());

        let mut received = Vec::new();
        while received.len() < frame.len() {
            received.extend_from_slice(&client.read(None).await.unwrap());
        }
        assert_eq!(received, frame.as_ref());
    }
}
