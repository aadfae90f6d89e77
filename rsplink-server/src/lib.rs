//! # rsplink-server
//!
//! TCP endpoint for a GDB remote serial protocol stub.
//!
//! This crate provides:
//! - A localhost listener and per-client connection transport
//! - A packet reader that acks, naks and recovers from framing faults
//! - Session state and the packet handler seam
//! - A single-client accept/serve loop

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod reader;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig, TransportConfig};
pub use connection::{Connection, Listener};
pub use error::ServerError;
pub use handler::{Disposition, NullTarget, PacketHandler};
pub use reader::PacketReader;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
