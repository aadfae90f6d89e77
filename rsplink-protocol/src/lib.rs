//! # rsplink-protocol
//!
//! Wire layer for the GDB Remote Serial Protocol (RSP).
//!
//! This crate provides:
//! - `$payload#cs` packet framing with 8-bit checksums
//! - `}`-escaping of reserved bytes in both directions
//! - Ack (`+`) / Nak (`-`) recognition
//! - ASCII hex value helpers and the multiprocess thread-id syntax
//!
//! Nothing here touches a socket; the server crate drives these types.

pub mod codec;
pub mod error;
pub mod hex;
pub mod packet;
pub mod thread_id;
pub mod writer;

pub use codec::PacketDecoder;
pub use error::ProtocolError;
pub use packet::{Message, Packet, PacketParser};
pub use thread_id::ThreadId;
pub use writer::PacketWriter;

/// Positive acknowledgment.
pub const ACK: u8 = b'+';

/// Negative acknowledgment (request retransmission).
pub const NAK: u8 = b'-';

/// Start of a packet.
pub const PACKET_START: u8 = b'$';

/// End of a packet payload; two checksum digits follow.
pub const PACKET_END: u8 = b'#';

/// Escape byte; the next byte is XORed with [`ESCAPE_XOR`].
pub const ESCAPE: u8 = b'}';

/// Run-length encoding marker. RLE is not supported.
pub const RLE_MARKER: u8 = b'*';

/// Value XORed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Default number of bytes requested per socket read.
pub const DEFAULT_PACKET_SIZE: usize = 2048;

/// Largest frame body (raw bytes between `$` and `#`) accepted by default.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;
