//! Incremental decoder for inbound RSP traffic.
//!
//! Wire forms:
//!
//! ```text
//! +                          ack
//! -                          nak
//! $<escaped payload>#<cs>    packet, cs = two hex digits
//! ```
//!
//! The checksum is the 8-bit sum of the payload bytes as they appear on the
//! wire, escape bytes included.

use crate::error::ProtocolError;
use crate::packet::{Message, Packet};
use crate::{hex, ACK, ESCAPE, ESCAPE_XOR, NAK, PACKET_END, PACKET_START, RLE_MARKER};
use bytes::{Buf, BufMut, BytesMut};

/// Buffers raw bytes from the peer and splits them into messages.
///
/// Bytes are consumed from the front only once a whole message (or a whole
/// malformed frame) has been recognised; a partial frame stays buffered until
/// more input arrives. Scanning of a partial frame resumes where the previous
/// [`decode`](Self::decode) call stopped.
pub struct PacketDecoder {
    buffer: BytesMut,
    scratch: BytesMut,
    max_frame_size: usize,
    /// Next byte of the frame at the front of `buffer` to scan; 0 when no
    /// frame is in progress.
    position: usize,
    checksum: u8,
    escaped: bool,
    body_done: bool,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(crate::DEFAULT_PACKET_SIZE),
            scratch: BytesMut::with_capacity(crate::DEFAULT_PACKET_SIZE),
            max_frame_size: crate::DEFAULT_MAX_FRAME_SIZE,
            position: 0,
            checksum: 0,
            escaped: false,
            body_done: false,
        }
    }

    /// Sets the largest accepted frame body (bytes between `$` and `#`, as
    /// sent on the wire).
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.set_max_frame_size(max_frame_size);
        self
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns whether a byte is buffered at `position`.
    pub fn has_byte_at(&self, position: usize) -> bool {
        position < self.buffer.len()
    }

    /// Drops everything buffered, including any partially scanned frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.reset_frame();
    }

    fn reset_frame(&mut self) {
        self.position = 0;
        self.checksum = 0;
        self.escaped = false;
        self.body_done = false;
    }

    /// Attempts to decode the next message.
    ///
    /// Returns `Ok(None)` if more data is needed. On an unexpected leading
    /// byte, an RLE marker or an oversized frame the whole buffer is
    /// discarded; on a bad checksum only the offending frame is.
    pub fn decode(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.position == 0 {
            let Some(&first) = self.buffer.first() else {
                return Ok(None);
            };

            match first {
                ACK => {
                    self.buffer.advance(1);
                    return Ok(Some(Message::Ack));
                }
                NAK => {
                    self.buffer.advance(1);
                    return Ok(Some(Message::Nak));
                }
                PACKET_START => {
                    self.scratch.clear();
                    self.position = 1;
                }
                other => {
                    self.clear();
                    return Err(ProtocolError::UnexpectedByte(other));
                }
            }
        }

        while !self.body_done {
            let Some(&byte) = self.buffer.get(self.position) else {
                return Ok(None);
            };
            if self.escaped {
                self.escaped = false;
                self.scratch.put_u8(byte ^ ESCAPE_XOR);
            } else if byte == ESCAPE {
                self.escaped = true;
            } else if byte == RLE_MARKER {
                self.clear();
                return Err(ProtocolError::RleUnsupported);
            } else if byte == PACKET_END {
                self.position += 1;
                self.body_done = true;
                break;
            } else {
                self.scratch.put_u8(byte);
            }
            self.checksum = self.checksum.wrapping_add(byte);
            self.position += 1;

            let size = self.position - 1;
            if size > self.max_frame_size {
                self.clear();
                return Err(ProtocolError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }
        }

        let position = self.position;
        let Some(digits) = self.buffer.get(position..position + 2) else {
            return Ok(None);
        };
        let digits = [digits[0], digits[1]];
        let computed = self.checksum;
        self.buffer.advance(position + 2);
        self.reset_frame();

        let received = hex::read_hex(&digits, 2)
            .ok_or(ProtocolError::InvalidChecksumDigits(digits))? as u8;
        if received != computed {
            return Err(ProtocolError::ChecksumMismatch { received, computed });
        }

        Ok(Some(Message::Packet(Packet::new(self.scratch.split().freeze()))))
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PacketWriter;
    use proptest::prelude::*;

    fn decode_all(input: &[u8]) -> Vec<Result<Message, ProtocolError>> {
        let mut decoder = PacketDecoder::new();
        decoder.extend(input);
        let mut out = Vec::new();
        loop {
            match decoder.decode() {
                Ok(Some(message)) => out.push(Ok(message)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    fn packet(payload: &[u8]) -> Message {
        Message::Packet(Packet::new(payload.to_vec()))
    }

    #[test]
    fn test_decode_simple_packet() {
        assert_eq!(decode_all(b"$g#67"), vec![Ok(packet(b"g"))]);
    }

    #[test]
    fn test_decode_empty_packet() {
        assert_eq!(decode_all(b"$#00"), vec![Ok(packet(b""))]);
    }

    #[test]
    fn test_checksum_digits_any_case() {
        // "OK" sums to 0x9a
        assert_eq!(decode_all(b"$OK#9a"), vec![Ok(packet(b"OK"))]);
        assert_eq!(decode_all(b"$OK#9A"), vec![Ok(packet(b"OK"))]);
    }

    #[test]
    fn test_ack_and_nak() {
        assert_eq!(
            decode_all(b"+-+$g#67"),
            vec![
                Ok(Message::Ack),
                Ok(Message::Nak),
                Ok(Message::Ack),
                Ok(packet(b"g")),
            ]
        );
    }

    #[test]
    fn test_unescape() {
        // "}\x04" is an escaped '$'; checksum covers the raw bytes 0x7d + 0x04
        let mut frame = b"$}\x04#".to_vec();
        frame.extend_from_slice(b"81");
        assert_eq!(decode_all(&frame), vec![Ok(packet(b"$"))]);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$m10");
        assert_eq!(decoder.decode(), Ok(None));
        decoder.extend(b"00,4#");
        assert_eq!(decoder.decode(), Ok(None));
        decoder.extend(b"8");
        assert_eq!(decoder.decode(), Ok(None));
        assert_eq!(decoder.buffered(), 10);
        decoder.extend(b"e");
        assert_eq!(decoder.decode(), Ok(Some(packet(b"m1000,4"))));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_unexpected_start_discards_buffer() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"garbage$g#67");
        assert_eq!(decoder.decode(), Err(ProtocolError::UnexpectedByte(b'g')));
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.decode(), Ok(None));
    }

    #[test]
    fn test_checksum_mismatch_consumes_frame() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$g#00$g#67");
        assert_eq!(
            decoder.decode(),
            Err(ProtocolError::ChecksumMismatch {
                received: 0x00,
                computed: 0x67
            })
        );
        assert_eq!(decoder.decode(), Ok(Some(packet(b"g"))));
    }

    #[test]
    fn test_invalid_checksum_digits() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$g#zz+");
        assert_eq!(
            decoder.decode(),
            Err(ProtocolError::InvalidChecksumDigits(*b"zz"))
        );
        assert_eq!(decoder.decode(), Ok(Some(Message::Ack)));
    }

    #[test]
    fn test_rle_is_rejected() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$0* #4e");
        assert_eq!(decoder.decode(), Err(ProtocolError::RleUnsupported));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_unterminated_frame() {
        let mut decoder = PacketDecoder::new().with_max_frame_size(16);
        decoder.extend(b"$");
        decoder.extend(&[b'a'; 17]);
        assert_eq!(
            decoder.decode(),
            Err(ProtocolError::FrameTooLarge { size: 17, max: 16 })
        );
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.decode(), Ok(None));
    }

    #[test]
    fn test_oversized_frame_fed_in_pieces() {
        let mut decoder = PacketDecoder::new().with_max_frame_size(64);
        decoder.extend(b"$");
        let mut result = Ok(None);
        for _ in 0..100 {
            decoder.extend(b"a");
            result = decoder.decode();
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(ProtocolError::FrameTooLarge { size: 65, max: 64 }));
        assert_eq!(decoder.buffered(), 0);

        // The next frame starts clean.
        decoder.extend(b"+$g#67");
        assert_eq!(decoder.decode(), Ok(Some(Message::Ack)));
        assert_eq!(decoder.decode(), Ok(Some(packet(b"g"))));
    }

    #[test]
    fn test_frame_at_size_limit_is_accepted() {
        let mut decoder = PacketDecoder::new().with_max_frame_size(2);
        decoder.extend(b"$OK#9a");
        assert_eq!(decoder.decode(), Ok(Some(packet(b"OK"))));
    }

    #[test]
    fn test_escaped_frame_resumes_across_calls() {
        // Split between the escape byte and the escaped byte.
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$a}");
        assert_eq!(decoder.decode(), Ok(None));
        decoder.extend(b"\x04");
        assert_eq!(decoder.decode(), Ok(None));
        decoder.extend(b"#");
        assert_eq!(decoder.decode(), Ok(None));
        // 'a' + '}' + 0x04 = 0xe2
        decoder.extend(b"e2");
        assert_eq!(decoder.decode(), Ok(Some(packet(b"a$"))));
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(b"$abc");
        assert_eq!(decoder.decode(), Ok(None));
        decoder.clear();
        decoder.extend(b"$g#67");
        assert_eq!(decoder.decode(), Ok(Some(packet(b"g"))));
    }

    #[test]
    fn test_has_byte_at() {
        let mut decoder = PacketDecoder::new();
        assert!(!decoder.has_byte_at(0));
        decoder.extend(b"$g");
        assert!(decoder.has_byte_at(1));
        assert!(!decoder.has_byte_at(2));
        decoder.clear();
        assert!(!decoder.has_byte_at(0));
    }

    proptest! {
        #[test]
        fn prop_writer_output_decodes_to_payload(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut writer = PacketWriter::new();
            writer.append(&payload);
            let frame = writer.finish();

            let mut decoder = PacketDecoder::new();
            decoder.extend(&frame);
            let decoded = decoder.decode().unwrap().unwrap();
            prop_assert_eq!(decoded, Message::Packet(Packet::new(payload)));
            prop_assert_eq!(decoder.buffered(), 0);
        }

        #[test]
        fn prop_split_delivery_decodes_same(payload in proptest::collection::vec(any::<u8>(), 1..128), split in 0usize..256) {
            let mut writer = PacketWriter::new();
            writer.append(&payload);
            let frame = writer.finish();
            let split = split % frame.len();

            let mut decoder = PacketDecoder::new();
            decoder.extend(&frame[..split]);
            prop_assert_eq!(decoder.decode().unwrap(), None);
            decoder.extend(&frame[split..]);
            let decoded = decoder.decode().unwrap().unwrap();
            prop_assert_eq!(decoded, Message::Packet(Packet::new(payload)));
        }

        #[test]
        fn prop_arbitrary_input_never_panics(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_all(&input);
        }
    }
}
