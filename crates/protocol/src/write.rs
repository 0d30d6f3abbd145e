use bytes::{BufMut, Bytes, BytesMut};
use tessera_common::{AbsXyz, DimensionId, EntityId, ItemId, Orientation, Ticks};

use crate::{id, ProtocolError, MAX_STRING_LEN};

/// Sentinel item id for an empty hand.
pub const NO_ITEM: ItemId = -1;

fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    if s.len() > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong(s.len()));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Absolute coordinate as 1/32 block fixed point.
fn fixed_point(v: f64) -> i32 {
    (v * 32.0).floor() as i32
}

/// Angle in degrees packed into 1/256 of a turn.
fn packed_angle(degrees: f32) -> i8 {
    ((degrees.rem_euclid(360.0) / 360.0 * 256.0) as i32) as u8 as i8
}

fn put_fixed_xyz(buf: &mut BytesMut, pos: &AbsXyz) {
    buf.put_i32(fixed_point(pos.x()));
    buf.put_i32(fixed_point(pos.y()));
    buf.put_i32(fixed_point(pos.z()));
}

/// Server reply to the client handshake.
pub fn write_handshake(connection_hash: &str) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    buf.put_u8(id::HANDSHAKE);
    put_string(&mut buf, connection_hash)?;
    Ok(buf.freeze())
}

/// Server reply to a successful login.
pub fn write_login_response(
    entity_id: EntityId,
    seed: i64,
    dimension: DimensionId,
) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    buf.put_u8(id::LOGIN);
    buf.put_i32(entity_id.0);
    put_string(&mut buf, "")?;
    put_string(&mut buf, "")?;
    buf.put_i64(seed);
    buf.put_i8(dimension.as_i8());
    Ok(buf.freeze())
}

pub fn write_chat_message(message: &str) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    buf.put_u8(id::CHAT_MESSAGE);
    put_string(&mut buf, message)?;
    Ok(buf.freeze())
}

pub fn write_time_update(time: Ticks) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(id::TIME_UPDATE);
    buf.put_i64(time);
    buf.freeze()
}

pub fn write_spawn_position(pos: &AbsXyz) -> Bytes {
    let mut buf = BytesMut::with_capacity(13);
    buf.put_u8(id::SPAWN_POSITION);
    buf.put_i32(pos.x().floor() as i32);
    buf.put_i32(pos.y().floor() as i32);
    buf.put_i32(pos.z().floor() as i32);
    buf.freeze()
}

/// Server-side position and look. Stance is eye height above the feet.
pub fn write_player_position_look(pos: &AbsXyz, orientation: &Orientation, on_ground: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(42);
    buf.put_u8(id::PLAYER_POSITION_LOOK);
    buf.put_f64(pos.x());
    buf.put_f64(pos.y() + 1.62);
    buf.put_f64(pos.y());
    buf.put_f64(pos.z());
    buf.put_f32(orientation.yaw);
    buf.put_f32(orientation.pitch);
    buf.put_u8(on_ground as u8);
    buf.freeze()
}

/// Append a named entity spawn to `buf`. Several spawns may share one buffer.
pub fn write_named_entity_spawn(
    buf: &mut BytesMut,
    entity_id: EntityId,
    name: &str,
    pos: &AbsXyz,
    orientation: &Orientation,
    current_item: ItemId,
) -> Result<(), ProtocolError> {
    if name.len() > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong(name.len()));
    }
    buf.put_u8(id::NAMED_ENTITY_SPAWN);
    buf.put_i32(entity_id.0);
    put_string(buf, name)?;
    put_fixed_xyz(buf, pos);
    buf.put_i8(packed_angle(orientation.yaw));
    buf.put_i8(packed_angle(orientation.pitch));
    buf.put_i16(current_item);
    Ok(())
}

pub fn write_pickup_spawn(
    entity_id: EntityId,
    item: ItemId,
    count: i8,
    pos: &AbsXyz,
) -> Result<Bytes, ProtocolError> {
    if count <= 0 || count > 64 {
        return Err(ProtocolError::InvalidItemCount(count));
    }
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u8(id::PICKUP_SPAWN);
    buf.put_i32(entity_id.0);
    buf.put_i16(item);
    buf.put_i8(count);
    put_fixed_xyz(&mut buf, pos);
    // rotation, pitch, roll
    buf.put_slice(&[0, 0, 0]);
    Ok(buf.freeze())
}

pub fn write_destroy_entity(entity_id: EntityId) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(id::DESTROY_ENTITY);
    buf.put_i32(entity_id.0);
    buf.freeze()
}

pub fn write_disconnect(reason: &str) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    buf.put_u8(id::DISCONNECT);
    put_string(&mut buf, reason)?;
    Ok(buf.freeze())
}
