//! One connected player, from handshake to removal.

use anyhow::{Context, Result};
use std::sync::Arc;
use tessera_common::{AbsXyz, DimensionId, EntityId, Orientation};
use tessera_kernel::{outbound_channel, GameHandle, Player};
use tessera_persist::{PlayerDataError, WorldStore};
use tessera_protocol::{self as proto, ClientPacket, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Connection hash sent in the handshake reply: no authentication.
const OFFLINE_HASH: &str = "-";

/// Shared by every session of one server.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub game: GameHandle,
    pub world: Arc<WorldStore>,
}

/// Log the connection in, register its player with the game, then relay
/// client packets until the connection ends.
///
/// Errors before registration leave no trace in the game. Once the player
/// is registered the session always submits its removal.
pub async fn run_session<S>(stream: S, ctx: SessionContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut stream = BufReader::new(stream);

    let username = proto::read_handshake(&mut stream).await.context("handshake")?;
    stream.write_all(&proto::write_handshake(OFFLINE_HASH)?).await?;
    stream.flush().await?;

    let login = match proto::read_login(&mut stream).await {
        Ok(login) => login,
        Err(err @ ProtocolError::UnsupportedVersion(_)) => {
            let reason = proto::write_disconnect("Unsupported protocol version")?;
            if let Err(io) = stream.write_all(&reason).await {
                debug!(%io, "could not send disconnect");
            }
            return Err(err).context("login");
        }
        Err(err) => return Err(err).context("login"),
    };
    debug!(name = %username, login_name = %login.username, "login accepted");

    let position = initial_position(&ctx.world, &username)?;
    let entity_id = ctx.game.allocate_entity_id().await?;
    let time = ctx.game.time().await?;

    for packet in [
        proto::write_login_response(entity_id, ctx.world.seed(), DimensionId::Normal)?,
        proto::write_spawn_position(&ctx.world.spawn_position()),
        proto::write_time_update(time),
        proto::write_player_position_look(&position, &Orientation::default(), false),
    ] {
        stream.write_all(&packet).await?;
    }
    stream.flush().await?;

    // Bounded: if this client stops reading, the game evicts the player
    // rather than buffering for it.
    let (outbound, mut packets) = outbound_channel();
    ctx.game
        .add_player(Player::new(entity_id, username.clone(), position, outbound))
        .await?;

    let (mut reader, mut writer) = tokio::io::split(stream);
    // Ends once the game drops the player's sender.
    let writer_task = tokio::spawn(async move {
        while let Some(packet) = packets.recv().await {
            if let Err(err) = writer.write_all(&packet).await {
                debug!(%err, "connection write failed");
                return;
            }
        }
        if let Err(err) = writer.shutdown().await {
            debug!(%err, "connection shutdown failed");
        }
    });

    let reason = relay(&mut reader, &ctx.game, entity_id, &username).await;
    info!(entity_id = %entity_id, name = %username, reason = %reason, "session ended");

    if let Err(err) = ctx.game.remove_player(entity_id).await {
        warn!(%err, entity_id = %entity_id, "could not submit player removal");
        writer_task.abort();
    }
    if let Err(err) = writer_task.await {
        if !err.is_cancelled() {
            warn!(%err, "connection writer failed");
        }
    }
    Ok(())
}

/// Saved position of `username`, else the world's start position.
fn initial_position(world: &WorldStore, username: &str) -> Result<AbsXyz> {
    match world.player_data(username) {
        Ok(data) => Ok(data.position),
        Err(PlayerDataError::NotFound(_)) => Ok(world.start_position()),
        Err(err @ PlayerDataError::InvalidName(_)) => Err(err).context("login"),
        Err(err) => {
            warn!(%err, name = %username, "ignoring unreadable player data");
            Ok(world.start_position())
        }
    }
}

/// A client-reported position, if every coordinate is finite.
fn client_position(x: f64, y: f64, z: f64) -> Option<AbsXyz> {
    (x.is_finite() && y.is_finite() && z.is_finite()).then(|| AbsXyz::new(x, y, z))
}

/// Forward client packets to the game until the connection ends. Returns
/// why it ended.
async fn relay<R>(reader: &mut R, game: &GameHandle, entity_id: EntityId, username: &str) -> String
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = match proto::read_client_packet(reader).await {
            Ok(packet) => packet,
            Err(ProtocolError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return "connection closed".into();
            }
            Err(err) => return err.to_string(),
        };
        let submitted = match packet {
            ClientPacket::KeepAlive | ClientPacket::Flying { .. } => Ok(()),
            ClientPacket::Chat(text) => game.send_chat_message(format!("<{username}> {text}")).await,
            ClientPacket::Position { x, y, z, .. } => {
                let Some(position) = client_position(x, y, z) else {
                    return "non-finite position".into();
                };
                game.move_player(entity_id, Some(position), None).await
            }
            ClientPacket::Look { yaw, pitch, .. } => {
                game.move_player(entity_id, None, Some(Orientation { yaw, pitch }))
                    .await
            }
            ClientPacket::PositionLook {
                x, y, z, yaw, pitch, ..
            } => {
                let Some(position) = client_position(x, y, z) else {
                    return "non-finite position".into();
                };
                game.move_player(entity_id, Some(position), Some(Orientation { yaw, pitch }))
                    .await
            }
            ClientPacket::Disconnect(reason) => return format!("client quit: {reason}"),
        };
        if let Err(err) = submitted {
            return err.to_string();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_kernel::{Game, GameConfig};
    use tessera_persist::{write_player_data, LevelInfo};
    use tokio::io::{AsyncReadExt, DuplexStream};

    pub(crate) async fn test_world(dir: &std::path::Path) -> Arc<WorldStore> {
        LevelInfo {
            spawn_position: AbsXyz::new(8.0, 64.0, 8.0),
            time: 100,
            seed: Some(42),
            legacy_player_position: None,
        }
        .write(dir)
        .unwrap();
        Arc::new(WorldStore::load(dir).unwrap())
    }

    fn string_bytes(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    pub(crate) fn handshake(name: &str) -> Vec<u8> {
        let mut out = vec![proto::id::HANDSHAKE];
        string_bytes(&mut out, name);
        out
    }

    pub(crate) fn login(version: i32, name: &str) -> Vec<u8> {
        let mut out = vec![proto::id::LOGIN];
        out.extend_from_slice(&version.to_be_bytes());
        string_bytes(&mut out, name);
        string_bytes(&mut out, "");
        out.extend_from_slice(&0i64.to_be_bytes());
        out.push(0);
        out
    }

    fn chat(text: &str) -> Vec<u8> {
        let mut out = vec![proto::id::CHAT_MESSAGE];
        string_bytes(&mut out, text);
        out
    }

    async fn read_chat(client: &mut DuplexStream) -> String {
        assert_eq!(client.read_u8().await.unwrap(), proto::id::CHAT_MESSAGE);
        let len = client.read_u16().await.unwrap() as usize;
        let mut text = vec![0; len];
        client.read_exact(&mut text).await.unwrap();
        String::from_utf8(text).unwrap()
    }

    /// Handshake and log in, consuming the direct login replies. Returns
    /// the entity id and the position sent to the client.
    async fn join(client: &mut DuplexStream, name: &str) -> (i32, (f64, f64, f64)) {
        client.write_all(&handshake(name)).await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [proto::id::HANDSHAKE, 0, 1, b'-']);

        client.write_all(&login(proto::PROTOCOL_VERSION, name)).await.unwrap();
        assert_eq!(client.read_u8().await.unwrap(), proto::id::LOGIN);
        let entity_id = client.read_i32().await.unwrap();
        assert_eq!(client.read_u16().await.unwrap(), 0);
        assert_eq!(client.read_u16().await.unwrap(), 0);
        assert_eq!(client.read_i64().await.unwrap(), 42);
        assert_eq!(client.read_i8().await.unwrap(), 0);

        let mut spawn = [0u8; 13];
        client.read_exact(&mut spawn).await.unwrap();
        assert_eq!(spawn[0], proto::id::SPAWN_POSITION);

        assert_eq!(client.read_u8().await.unwrap(), proto::id::TIME_UPDATE);
        assert_eq!(client.read_i64().await.unwrap(), 100);

        assert_eq!(client.read_u8().await.unwrap(), proto::id::PLAYER_POSITION_LOOK);
        let x = client.read_f64().await.unwrap();
        let _stance = client.read_f64().await.unwrap();
        let y = client.read_f64().await.unwrap();
        let z = client.read_f64().await.unwrap();
        let mut rest = [0u8; 9];
        client.read_exact(&mut rest).await.unwrap();
        (entity_id, (x, y, z))
    }

    #[tokio::test]
    async fn full_session_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        let (game, _task) = Game::new(GameConfig::default(), 100).spawn();
        let ctx = SessionContext {
            game: game.clone(),
            world,
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(server, ctx));

        let (entity_id, position) = join(&mut client, "steve").await;
        assert!(entity_id > 0);
        assert_eq!(position, (8.0, 64.0, 8.0));
        assert_eq!(read_chat(&mut client).await, "steve has joined");
        assert_eq!(game.player_names().await.unwrap(), vec!["steve".to_string()]);

        client.write_all(&chat("hello")).await.unwrap();
        assert_eq!(read_chat(&mut client).await, "<steve> hello");

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(game.player_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn saved_player_position_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        write_player_data(tmp.path(), "alex", &AbsXyz::new(-3.5, 70.0, 12.25)).unwrap();
        let (game, _task) = Game::new(GameConfig::default(), 100).spawn();

        let (mut client, server) = tokio::io::duplex(4096);
        let _session = tokio::spawn(run_session(server, SessionContext { game, world }));
        let (_, position) = join(&mut client, "alex").await;
        assert_eq!(position, (-3.5, 70.0, 12.25));
    }

    #[tokio::test]
    async fn movement_updates_game_state() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        let (game, _task) = Game::new(GameConfig::default(), 100).spawn();

        let (mut first, server) = tokio::io::duplex(4096);
        tokio::spawn(run_session(server, SessionContext { game: game.clone(), world: world.clone() }));
        join(&mut first, "first").await;
        assert_eq!(read_chat(&mut first).await, "first has joined");

        // Walk far outside the default radius before the second player joins.
        let mut moved = vec![proto::id::PLAYER_POSITION];
        for v in [1000.0f64, 64.0, 65.62, 1000.0] {
            moved.extend_from_slice(&v.to_be_bytes());
        }
        moved.push(1);
        first.write_all(&moved).await.unwrap();
        // A chat round trip orders the move before the next join.
        first.write_all(&chat("moved")).await.unwrap();
        assert_eq!(read_chat(&mut first).await, "<first> moved");

        let (mut second, server) = tokio::io::duplex(4096);
        tokio::spawn(run_session(server, SessionContext { game: game.clone(), world }));
        join(&mut second, "second").await;

        assert_eq!(read_chat(&mut first).await, "second has joined");
        assert_eq!(read_chat(&mut second).await, "second has joined");

        // Out of range both ways: no spawn packet precedes the next chat line.
        second.write_all(&chat("hi")).await.unwrap();
        assert_eq!(read_chat(&mut first).await, "<second> hi");
        assert_eq!(read_chat(&mut second).await, "<second> hi");
    }

    #[tokio::test]
    async fn non_finite_position_ends_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        let (game, _task) = Game::new(GameConfig::default(), 100).spawn();

        let (mut client, server) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(server, SessionContext { game: game.clone(), world }));
        join(&mut client, "drifter").await;
        assert_eq!(read_chat(&mut client).await, "drifter has joined");

        let mut moved = vec![proto::id::PLAYER_POSITION];
        for v in [f64::NAN, 64.0, 65.62, 8.0] {
            moved.extend_from_slice(&v.to_be_bytes());
        }
        moved.push(1);
        client.write_all(&moved).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(game.player_count().await.unwrap(), 0);
    }

    #[test]
    fn client_position_rejects_non_finite_coordinates() {
        assert_eq!(client_position(1.0, 2.0, 3.0), Some(AbsXyz::new(1.0, 2.0, 3.0)));
        assert_eq!(client_position(f64::INFINITY, 64.0, 0.0), None);
        assert_eq!(client_position(0.0, f64::NAN, 0.0), None);
        assert_eq!(client_position(0.0, 64.0, f64::NEG_INFINITY), None);
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected_before_registration() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        let (game, _task) = Game::new(GameConfig::default(), 0).spawn();

        let (mut client, server) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(server, SessionContext { game: game.clone(), world }));
        client.write_all(&handshake("old")).await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        client.write_all(&login(7, "old")).await.unwrap();

        assert_eq!(client.read_u8().await.unwrap(), proto::id::DISCONNECT);
        assert!(session.await.unwrap().is_err());
        assert_eq!(game.player_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let world = test_world(tmp.path()).await;
        let (game, _task) = Game::new(GameConfig::default(), 0).spawn();

        let (mut client, server) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(server, SessionContext { game: game.clone(), world }));
        client.write_all(&handshake("../x")).await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        client.write_all(&login(proto::PROTOCOL_VERSION, "../x")).await.unwrap();

        assert!(session.await.unwrap().is_err());
        assert_eq!(game.player_count().await.unwrap(), 0);
    }
}
