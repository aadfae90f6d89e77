//! Session management.

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

/// State kept for one connected debugger.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: Option<SocketAddr>,

    /// Whether packets are acknowledged with `+`.
    ack_mode: bool,

    /// Whether the debugger asked to end the session.
    detached: bool,

    /// Last frame sent, kept for retransmission on Nak.
    last_reply: Option<Bytes>,

    packets_received: u64,
    replies_sent: u64,
    retransmits: u64,

    created_at: Instant,
}

impl Session {
    /// Creates a new session with acknowledgments enabled.
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            ack_mode: true,
            detached: false,
            last_reply: None,
            packets_received: 0,
            replies_sent: 0,
            retransmits: 0,
            created_at: Instant::now(),
        }
    }

    pub fn ack_mode(&self) -> bool {
        self.ack_mode
    }

    /// Stops acknowledging packets (`QStartNoAckMode`).
    pub fn disable_ack(&mut self) {
        if self.ack_mode {
            tracing::debug!("Session {} switching to no-ack mode", self.id);
        }
        self.ack_mode = false;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn last_reply(&self) -> Option<&Bytes> {
        self.last_reply.as_ref()
    }

    /// Records a packet taken off the wire.
    pub fn record_packet(&mut self) {
        self.packets_received += 1;
    }

    /// Records a reply frame that went out.
    pub fn record_reply(&mut self, frame: Bytes) {
        self.replies_sent += 1;
        self.last_reply = Some(frame);
    }

    pub fn record_retransmit(&mut self) {
        self.retransmits += 1;
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn replies_sent(&self) -> u64 {
        self.replies_sent
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    /// Returns the session duration.
    pub fn duration(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
