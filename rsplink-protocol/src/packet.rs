//! Decoded RSP messages and a cursor for reading packet payloads.

use crate::hex;
use crate::thread_id::ThreadId;
use bytes::Bytes;
use std::fmt;

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `+`: the peer accepted the previous packet.
    Ack,
    /// `-`: the peer asks for the previous packet again.
    Nak,
    /// A checksum-verified, unescaped packet payload.
    Packet(Packet),
}

impl Message {
    pub fn is_ack(&self) -> bool {
        matches!(self, Message::Ack)
    }

    pub fn is_nak(&self) -> bool {
        matches!(self, Message::Nak)
    }

    /// Returns the packet, if this message is one.
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Message::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

/// The payload of a verified packet, with escapes already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Bytes,
}

impl Packet {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns a cursor positioned at the start of the payload.
    pub fn parser(&self) -> PacketParser<'_> {
        PacketParser::new(&self.payload)
    }

    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.payload))
    }
}

/// Forward-only cursor over a packet payload.
///
/// Every read either succeeds and advances, or returns `None` and leaves the
/// cursor where it was.
#[derive(Debug, Clone)]
pub struct PacketParser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the unread part of the payload.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Advances past `prefix` if the unread payload starts with it.
    pub fn parse(&mut self, prefix: &[u8]) -> bool {
        if self.remaining().starts_with(prefix) {
            self.position += prefix.len();
            true
        } else {
            false
        }
    }

    /// Reads a variable-length hex number. `None` if no digits follow.
    pub fn parse_hex(&mut self) -> Option<u64> {
        let (value, consumed) = hex::parse_hex(self.remaining())?;
        self.position += consumed;
        Some(value)
    }

    /// Reads exactly `length` hex digits.
    pub fn read_hex(&mut self, length: usize) -> Option<u64> {
        let value = hex::read_hex(self.remaining(), length)?;
        self.position += length;
        Some(value)
    }

    /// Reads a 32-bit register value sent as four hex bytes, least
    /// significant byte first.
    pub fn read_register_hex(&mut self) -> Option<u32> {
        let digits = self.remaining().get(..8)?;
        let mut bytes = [0u8; 4];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
            *byte = hex::read_hex(pair, 2)? as u8;
        }
        self.position += 8;
        Some(u32::from_le_bytes(bytes))
    }

    /// Reads a thread-id: `p<pid>[.<tid>]` or a bare `<tid>`.
    ///
    /// A missing thread part means all threads of the process; a missing
    /// `p` part means all processes. `p-1.<tid>` naming a concrete thread
    /// is rejected.
    pub fn parse_thread_id(&mut self) -> Option<ThreadId> {
        let start = self.position;
        let parsed = self.thread_id_fields();
        if parsed.is_none() {
            self.position = start;
        }
        parsed
    }

    fn thread_id_fields(&mut self) -> Option<ThreadId> {
        if !self.parse(b"p") {
            return Some(ThreadId::thread(self.parse_id()?));
        }
        let process_id = self.parse_id()?;
        if !self.parse(b".") {
            return Some(ThreadId::process(process_id));
        }
        let thread_id = self.parse_id()?;
        if process_id == ThreadId::ALL && thread_id > ThreadId::ANY {
            return None;
        }
        Some(ThreadId::new(process_id, thread_id))
    }

    fn parse_id(&mut self) -> Option<i64> {
        if self.parse(b"-1") {
            return Some(ThreadId::ALL);
        }
        let start = self.position;
        let value = self.parse_hex()?;
        match i64::try_from(value) {
            Ok(id) => Some(id),
            Err(_) => {
                self.position = start;
                None
            }
        }
    }

    /// Reads one byte.
    pub fn read_char(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    /// Reads up to (not including) `delimiter` and skips the delimiter.
    ///
    /// Without a delimiter the rest of the payload is returned. `None` only
    /// at end of payload.
    pub fn read_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        if self.is_at_end() {
            return None;
        }
        let rest = self.remaining();
        match rest.iter().position(|&b| b == delimiter) {
            Some(index) => {
                self.position += index + 1;
                Some(&rest[..index])
            }
            None => {
                self.position = self.data.len();
                Some(rest)
            }
        }
    }

    /// Reads everything left. `None` at end of payload.
    pub fn read_rest(&mut self) -> Option<&'a [u8]> {
        if self.is_at_end() {
            return None;
        }
        let rest = self.remaining();
        self.position = self.data.len();
        Some(rest)
    }
}
