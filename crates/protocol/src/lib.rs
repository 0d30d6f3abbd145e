//! Wire protocol collaborators.
//!
//! Encoders produce opaque byte buffers that the game kernel routes verbatim;
//! readers decode the few client-bound-to-server packets a session needs.
//! All integers are big-endian. Strings carry a u16 byte length followed by
//! UTF-8 data.

mod read;
mod write;

pub use read::{read_client_packet, read_handshake, read_login, ClientPacket, LoginRequest};
pub use write::*;

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: i32 = 8;

/// Longest string payload, in bytes.
pub const MAX_STRING_LEN: usize = i16::MAX as usize;

/// Packet identifiers.
pub mod id {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const LOGIN: u8 = 0x01;
    pub const HANDSHAKE: u8 = 0x02;
    pub const CHAT_MESSAGE: u8 = 0x03;
    pub const TIME_UPDATE: u8 = 0x04;
    pub const SPAWN_POSITION: u8 = 0x06;
    pub const PLAYER_FLYING: u8 = 0x0A;
    pub const PLAYER_POSITION: u8 = 0x0B;
    pub const PLAYER_LOOK: u8 = 0x0C;
    pub const PLAYER_POSITION_LOOK: u8 = 0x0D;
    pub const NAMED_ENTITY_SPAWN: u8 = 0x14;
    pub const PICKUP_SPAWN: u8 = 0x15;
    pub const DESTROY_ENTITY: u8 = 0x1D;
    pub const DISCONNECT: u8 = 0xFF;
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("string of {0} bytes exceeds the protocol limit")]
    StringTooLong(usize),
    #[error("string is not valid UTF-8")]
    InvalidString,
    #[error("unexpected packet id {0:#04x}")]
    UnexpectedPacket(u8),
    #[error("invalid item count {0}")]
    InvalidItemCount(i8),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i32),
}
