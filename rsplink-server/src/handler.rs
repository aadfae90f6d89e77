//! Packet handlers.
//!
//! The session loop owns framing, acknowledgments and retransmission; a
//! [`PacketHandler`] only sees decoded packets and fills in the reply.

use crate::error::ServerError;
use crate::session::Session;
use rsplink_protocol::{Packet, PacketWriter, ThreadId, DEFAULT_PACKET_SIZE};

/// What the session loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the reply built in the writer (possibly empty).
    Reply,
    /// Send nothing.
    NoReply,
    /// Send the reply, then end the session.
    Detach,
}

/// Answers debugger packets.
pub trait PacketHandler: Send {
    /// Handles one packet, appending the reply payload to `reply`.
    ///
    /// An error makes the session loop Nak the packet.
    fn handle(
        &mut self,
        session: &mut Session,
        packet: &Packet,
        reply: &mut PacketWriter,
    ) -> Result<Disposition, ServerError>;
}

/// Handler for a stub with nothing attached.
///
/// It negotiates features, reports that the inferior has exited and accepts
/// detach/kill, answering everything else as unsupported.
pub struct NullTarget {
    packet_size: usize,
    current: ThreadId,
}

impl NullTarget {
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size,
            current: ThreadId::new(1, 1),
        }
    }

    /// Returns the thread selected by the last `H` packet.
    pub fn current_thread(&self) -> ThreadId {
        self.current
    }

    fn select_thread(&mut self, packet: &Packet, reply: &mut PacketWriter) {
        let mut parser = packet.parser();
        parser.parse(b"H");
        let selected = parser
            .read_char()
            .filter(|op| matches!(op, b'g' | b'c'))
            .and_then(|_| parser.parse_thread_id())
            .filter(|_| parser.is_at_end());

        match selected {
            Some(thread) => {
                tracing::debug!("Selected thread {}", thread);
                self.current = thread;
                reply.append_str("OK");
            }
            None => reply.append_str("E01"),
        }
    }
}

impl Default for NullTarget {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_SIZE)
    }
}

impl PacketHandler for NullTarget {
    fn handle(
        &mut self,
        session: &mut Session,
        packet: &Packet,
        reply: &mut PacketWriter,
    ) -> Result<Disposition, ServerError> {
        let mut parser = packet.parser();

        if parser.parse(b"?") {
            reply.append_str("W00");
        } else if parser.parse(b"qSupported") {
            reply.append_str("PacketSize=");
            reply.append_hex(self.packet_size as u64, 0);
            reply.append_str(";QStartNoAckMode+");
        } else if parser.parse(b"QStartNoAckMode") {
            reply.append_str("OK");
            session.disable_ack();
        } else if parser.parse(b"qC") {
            reply.append_str("QC");
            reply.append_thread_id(self.current);
        } else if parser.parse(b"H") {
            self.select_thread(packet, reply);
        } else if parser.parse(b"D") || parser.parse(b"k") {
            reply.append_str("OK");
            session.detach();
            return Ok(Disposition::Detach);
        } else {
            tracing::debug!("Unsupported packet: {}", packet);
        }

        Ok(Disposition::Reply)
    }
}
