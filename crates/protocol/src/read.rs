use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{id, ProtocolError, MAX_STRING_LEN, PROTOCOL_VERSION};

/// Fields of the client login request.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub protocol_version: i32,
    pub username: String,
    pub password: String,
    pub seed: i64,
    pub dimension: i8,
}

/// Packets a session handles after login.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    KeepAlive,
    Chat(String),
    Flying {
        on_ground: bool,
    },
    Position {
        x: f64,
        y: f64,
        stance: f64,
        z: f64,
        on_ground: bool,
    },
    Look {
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    PositionLook {
        x: f64,
        y: f64,
        stance: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    Disconnect(String),
}

async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, ProtocolError> {
    let len = r.read_u16().await? as usize;
    if len > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong(len));
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data).await?;
    String::from_utf8(data).map_err(|_| ProtocolError::InvalidString)
}

async fn expect_id<R: AsyncRead + Unpin>(r: &mut R, expected: u8) -> Result<(), ProtocolError> {
    let packet_id = r.read_u8().await?;
    if packet_id != expected {
        return Err(ProtocolError::UnexpectedPacket(packet_id));
    }
    Ok(())
}

/// Read the client handshake and return the username it announces.
pub async fn read_handshake<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, ProtocolError> {
    expect_id(r, id::HANDSHAKE).await?;
    read_string(r).await
}

/// Read the client login request following the handshake.
pub async fn read_login<R: AsyncRead + Unpin>(r: &mut R) -> Result<LoginRequest, ProtocolError> {
    expect_id(r, id::LOGIN).await?;
    let protocol_version = r.read_i32().await?;
    let username = read_string(r).await?;
    let password = read_string(r).await?;
    let seed = r.read_i64().await?;
    let dimension = r.read_i8().await?;
    if protocol_version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(protocol_version));
    }
    Ok(LoginRequest {
        protocol_version,
        username,
        password,
        seed,
        dimension,
    })
}

/// Read one in-game client packet. Unknown ids are an error, since the
/// stream cannot be resynchronised past a packet of unknown length.
pub async fn read_client_packet<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<ClientPacket, ProtocolError> {
    let packet_id = r.read_u8().await?;
    let packet = match packet_id {
        id::KEEP_ALIVE => ClientPacket::KeepAlive,
        id::CHAT_MESSAGE => ClientPacket::Chat(read_string(r).await?),
        id::PLAYER_FLYING => ClientPacket::Flying {
            on_ground: r.read_u8().await? != 0,
        },
        id::PLAYER_POSITION => ClientPacket::Position {
            x: r.read_f64().await?,
            y: r.read_f64().await?,
            stance: r.read_f64().await?,
            z: r.read_f64().await?,
            on_ground: r.read_u8().await? != 0,
        },
        id::PLAYER_LOOK => ClientPacket::Look {
            yaw: r.read_f32().await?,
            pitch: r.read_f32().await?,
            on_ground: r.read_u8().await? != 0,
        },
        id::PLAYER_POSITION_LOOK => ClientPacket::PositionLook {
            x: r.read_f64().await?,
            y: r.read_f64().await?,
            stance: r.read_f64().await?,
            z: r.read_f64().await?,
            yaw: r.read_f32().await?,
            pitch: r.read_f32().await?,
            on_ground: r.read_u8().await? != 0,
        },
        id::DISCONNECT => ClientPacket::Disconnect(read_string(r).await?),
        other => return Err(ProtocolError::UnexpectedPacket(other)),
    };
    tracing::trace!(packet_id, "read client packet");
    Ok(packet)
}
