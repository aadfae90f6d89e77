//! Outbound packet builder.

use crate::hex;
use crate::thread_id::ThreadId;
use crate::{ESCAPE, ESCAPE_XOR, PACKET_END, PACKET_START, RLE_MARKER};
use bytes::{BufMut, Bytes, BytesMut};

/// Builds one `$payload#cs` frame at a time.
///
/// The writer is meant to live as long as the session: [`finish`](Self::finish)
/// hands out the completed frame and leaves the writer empty for the next
/// reply.
pub struct PacketWriter {
    buffer: BytesMut,
    checksum: u8,
}

impl PacketWriter {
    pub fn new() -> Self {
        let mut writer = Self {
            buffer: BytesMut::with_capacity(crate::DEFAULT_PACKET_SIZE),
            checksum: 0,
        };
        writer.clear();
        writer
    }

    /// Returns whether no payload has been appended since the last frame.
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 1
    }

    /// Discards the pending payload.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.checksum = 0;
        self.buffer.put_u8(PACKET_START);
    }

    fn push(&mut self, byte: u8) {
        self.buffer.put_u8(byte);
        self.checksum = self.checksum.wrapping_add(byte);
    }

    /// Appends one payload byte, escaping `$`, `#`, `*` and `}`.
    pub fn append_char(&mut self, byte: u8) {
        match byte {
            PACKET_START | PACKET_END | RLE_MARKER | ESCAPE => {
                self.push(ESCAPE);
                self.push(byte ^ ESCAPE_XOR);
            }
            _ => self.push(byte),
        }
    }

    /// Appends payload bytes, escaping as needed.
    pub fn append(&mut self, data: &[u8]) {
        for &byte in data {
            self.append_char(byte);
        }
    }

    pub fn append_str(&mut self, value: &str) {
        self.append(value.as_bytes());
    }

    /// Appends bytes verbatim. The caller guarantees they need no escaping.
    pub fn append_unescaped(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(byte);
        }
    }

    /// Appends `value` in hex, left-padded with zeros to `min_digits`.
    pub fn append_hex(&mut self, value: u64, min_digits: usize) {
        let needed = (64 - value.leading_zeros() as usize).div_ceil(4).max(1);
        for index in (0..needed.max(min_digits)).rev() {
            let nibble = if index < 16 { (value >> (index * 4)) as u8 } else { 0 };
            self.append_hex_digit(nibble);
        }
    }

    /// Appends the hex digit for the low nibble of `nibble`.
    pub fn append_hex_digit(&mut self, nibble: u8) {
        self.push(hex::to_digit(nibble));
    }

    /// Appends a 32-bit register as four two-digit bytes, least significant
    /// byte first.
    pub fn append_register_hex(&mut self, value: u32) {
        for byte in value.to_le_bytes() {
            self.append_hex(byte as u64, 2);
        }
    }

    /// Appends `p<pid>.<tid>`.
    ///
    /// Components are expected to be [`ThreadId::ALL`], [`ThreadId::ANY`] or
    /// a real id; any other negative value would be sent as `-1`.
    pub fn append_thread_id(&mut self, thread_id: ThreadId) {
        self.append_char(b'p');
        self.append_id(thread_id.process_id);
        self.append_char(b'.');
        self.append_id(thread_id.thread_id);
    }

    fn append_id(&mut self, id: i64) {
        debug_assert!(id >= ThreadId::ALL, "thread id component {} below -1", id);
        if id < 0 {
            self.append(b"-1");
        } else {
            self.append_hex(id as u64, 0);
        }
    }

    /// Terminates the frame with `#` and its checksum and returns it.
    ///
    /// The writer is reset and ready for the next payload.
    pub fn finish(&mut self) -> Bytes {
        let checksum = self.checksum;
        self.buffer.put_u8(PACKET_END);
        self.buffer.put_u8(hex::to_digit(checksum >> 4));
        self.buffer.put_u8(hex::to_digit(checksum));
        let frame = self.buffer.split().freeze();
        self.clear();
        frame
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}
