//! Debugger-facing TCP server.
//!
//! Serves one debugger at a time: accept, run the packet loop until the
//! client detaches or disconnects, then accept the next one.

use crate::config::Config;
use crate::connection::{Connection, Listener};
use crate::error::ServerError;
use crate::handler::{Disposition, PacketHandler};
use crate::reader::{PacketReader, DEFAULT_MAX_FRAMING_RETRIES};
use crate::session::Session;
use rsplink_protocol::{
    Message, Packet, PacketWriter, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PACKET_SIZE,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on; 0 picks a free one.
    pub port: u16,
    /// How long one accept attempt waits before checking for shutdown.
    pub accept_poll: Duration,
    /// Bytes requested per socket read.
    pub packet_size: usize,
    /// Consecutive framing faults tolerated per read.
    pub max_framing_retries: usize,
    /// Largest accepted frame body in bytes.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::config::DEFAULT_PORT,
            accept_poll: Duration::from_millis(500),
            packet_size: DEFAULT_PACKET_SIZE,
            max_framing_retries: DEFAULT_MAX_FRAMING_RETRIES,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Builds the server settings from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.network.port,
            accept_poll: config.network.accept_poll(),
            packet_size: config.transport.packet_size,
            max_framing_retries: config.transport.max_framing_retries,
            max_frame_size: config.transport.max_frame_size,
        }
    }

    pub fn with_accept_poll(mut self, accept_poll: Duration) -> Self {
        self.accept_poll = accept_poll;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub packets_total: AtomicU64,
    pub framing_faults_total: AtomicU64,
    pub retransmits_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for a GDB remote stub.
pub struct Server<H> {
    config: ServerConfig,
    listener: Listener,
    handler: Mutex<H>,
    stats: ServerStats,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl<H: PacketHandler> Server<H> {
    /// Creates a server and starts listening on the configured port.
    pub fn bind(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        let mut listener = Listener::new(config.port).with_packet_size(config.packet_size);
        listener.listen()?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            listener,
            handler: Mutex::new(handler),
            stats: ServerStats::default(),
            shutdown,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Waiting for debugger on {}", self.local_addr()?);

        while !*shutdown_rx.borrow() {
            let Some(conn) = self.listener.accept(Some(self.config.accept_poll)).await else {
                continue;
            };

            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
            let addr = conn.peer_addr();

            match self.serve_client(conn, &mut shutdown_rx).await {
                Ok(()) => {}
                Err(ServerError::ShuttingDown) => {
                    tracing::debug!("[{:?}] Session interrupted by shutdown", addr);
                }
                Err(e) => {
                    tracing::warn!("[{:?}] Session ended with error: {}", addr, e);
                    self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }
            tracing::info!("Debugger disconnected: {:?}", addr);
        }

        tracing::info!("Server shutting down");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Runs the packet loop for one client.
    async fn serve_client(
        &self,
        conn: Connection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let mut session = Session::new(conn.peer_addr());
        let mut reader = PacketReader::new(conn)
            .with_max_retries(self.config.max_framing_retries)
            .with_max_frame_size(self.config.max_frame_size);
        let mut writer = PacketWriter::new();
        let mut handler = self.handler.lock().await;

        tracing::debug!("[{:?}] Session {} started", session.remote_addr, session.id);

        let result = loop {
            if *shutdown.borrow() {
                break Err(ServerError::ShuttingDown);
            }

            let message = tokio::select! {
                message = reader.read() => message,
                _ = shutdown.changed() => continue,
            };

            match message {
                Ok(Some(message)) => {
                    let handled = self
                        .handle_message(
                            &mut *handler,
                            &mut session,
                            &mut reader,
                            &mut writer,
                            message,
                        )
                        .await;
                    if let Err(e) = handled {
                        break Err(e);
                    }
                    if session.is_detached() {
                        tracing::debug!("[{:?}] Debugger detached", session.remote_addr);
                        break Ok(());
                    }
                }
                Ok(None) => {
                    tracing::debug!("[{:?}] Connection closed by debugger", session.remote_addr);
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.stats
            .framing_faults_total
            .fetch_add(reader.framing_faults(), Ordering::Relaxed);
        tracing::debug!(
            "[{:?}] Session {} finished after {:?}: {} packets, {} replies, {} retransmits",
            session.remote_addr,
            session.id,
            session.duration(),
            session.packets_received(),
            session.replies_sent(),
            session.retransmits()
        );
        reader.connection_mut().close();
        result
    }

    async fn handle_message(
        &self,
        handler: &mut H,
        session: &mut Session,
        reader: &mut PacketReader,
        writer: &mut PacketWriter,
        message: Message,
    ) -> Result<(), ServerError> {
        match message {
            Message::Ack => Ok(()),
            Message::Nak => {
                tracing::warn!("[{:?}] Debugger requested retransmission", session.remote_addr);
                if let Some(frame) = session.last_reply().cloned() {
                    reader.connection_mut().write(&frame).await?;
                    session.record_retransmit();
                    self.stats.retransmits_total.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
            Message::Packet(packet) => {
                self.handle_packet(handler, session, reader.connection_mut(), writer, &packet)
                    .await
            }
        }
    }

    async fn handle_packet(
        &self,
        handler: &mut H,
        session: &mut Session,
        conn: &mut Connection,
        writer: &mut PacketWriter,
        packet: &Packet,
    ) -> Result<(), ServerError> {
        session.record_packet();
        self.stats.packets_total.fetch_add(1, Ordering::Relaxed);

        // The packet that turns acks off is itself still acknowledged.
        let ack = session.ack_mode();
        writer.clear();

        match handler.handle(session, packet, writer) {
            Ok(disposition) => {
                if ack {
                    conn.send_ack().await?;
                }
                if disposition != Disposition::NoReply {
                    let frame = conn.send_packet(writer).await?;
                    session.record_reply(frame);
                }
                if disposition == Disposition::Detach {
                    session.detach();
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[{:?}] Handler rejected {}: {}", session.remote_addr, packet, e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                writer.clear();
                conn.send_nak().await
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
