//! Packet reader: a connection plus the decoder that frames its bytes.

use crate::connection::Connection;
use crate::error::ServerError;
use rsplink_protocol::{Message, PacketDecoder};

/// Default number of consecutive framing faults tolerated by [`PacketReader::read`].
pub const DEFAULT_MAX_FRAMING_RETRIES: usize = 16;

/// Reads acks, naks and packets from one connection.
///
/// Recoverable framing faults (stray bytes, bad checksums, oversized frames)
/// are answered with a Nak and skipped. More than `max_retries` of them within a single
/// [`read`](Self::read) call means the stream is beyond recovery and the call
/// fails with [`ServerError::Desynchronized`].
pub struct PacketReader {
    conn: Connection,
    decoder: PacketDecoder,
    max_retries: usize,
    framing_faults: u64,
}

impl PacketReader {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            decoder: PacketDecoder::new(),
            max_retries: DEFAULT_MAX_FRAMING_RETRIES,
            framing_faults: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Caps the frame body size; longer frames count as a framing fault.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.decoder.set_max_frame_size(max_frame_size);
        self
    }

    /// Total framing faults seen over the reader's lifetime.
    pub fn framing_faults(&self) -> u64 {
        self.framing_faults
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Makes sure a byte is buffered at `position`, reading once if not.
    ///
    /// Returns `false` when the read delivered nothing (peer closed).
    pub async fn ensure_input_buffer(&mut self, position: usize) -> Result<bool, ServerError> {
        if self.decoder.has_byte_at(position) {
            return Ok(true);
        }

        let data = self.conn.read(None).await?;
        if data.is_empty() {
            return Ok(false);
        }
        self.decoder.extend(&data);
        Ok(true)
    }

    /// Reads the next message.
    ///
    /// Returns `Ok(None)` once the peer stops sending before a complete
    /// message is available.
    pub async fn read(&mut self) -> Result<Option<Message>, ServerError> {
        let mut faults = 0;

        loop {
            if !self.ensure_input_buffer(0).await? {
                return Ok(None);
            }

            match self.decoder.decode() {
                Ok(Some(message)) => {
                    if let Message::Packet(packet) = &message {
                        tracing::debug!("Received packet: {}", packet);
                    }
                    return Ok(Some(message));
                }
                Ok(None) => {
                    let next = self.decoder.buffered();
                    if !self.ensure_input_buffer(next).await? {
                        return Ok(None);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    faults += 1;
                    self.framing_faults += 1;
                    tracing::error!("Framing error from {:?}: {}", self.conn.peer_addr(), e);

                    if faults > self.max_retries {
                        return Err(ServerError::Desynchronized { faults });
                    }
                    self.conn.send_nak().await?;
                }
                Err(e) => {
                    self.framing_faults += 1;
                    tracing::error!("Unrecoverable packet from {:?}: {}", self.conn.peer_addr(), e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Reports whether [`read`](Self::read) has input to work on without
    /// waiting. Bytes already buffered count as ready.
    pub async fn input_ready(&mut self) -> Result<bool, ServerError> {
        if self.decoder.buffered() > 0 {
            return Ok(true);
        }
        self.conn.input_ready().await
    }
}
