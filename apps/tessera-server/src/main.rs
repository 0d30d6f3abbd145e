mod acceptor;
mod config;
mod session;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_common::{AbsXyz, ChunkXz};
use tessera_kernel::{spawn_timer, Game};
use tessera_persist::WorldStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::acceptor::ConnectionAcceptor;
use crate::config::ServerConfig;
use crate::session::SessionContext;

#[derive(Parser)]
#[command(name = "tessera-server", about = "Multiplayer world server and world tools")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// YAML config file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Address to listen on
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// World directory
        #[arg(long)]
        world: Option<PathBuf>,
        /// Interest radius in chunks
        #[arg(long)]
        chunk_radius: Option<i32>,
    },
    /// Create a new world directory
    NewWorld {
        path: PathBuf,
        /// Terrain seed; time-derived when omitted
        #[arg(long, allow_hyphen_values = true)]
        seed: Option<i64>,
        /// Spawn point as x,y,z
        #[arg(long, default_value = "0,64,0", value_parser = tools::parse_xyz, allow_hyphen_values = true)]
        spawn: AbsXyz,
        /// Write generated chunks this many chunks around spawn
        #[arg(long, default_value = "0")]
        pregen_radius: u16,
    },
    /// Print world metadata
    Info {
        path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve one chunk and print its column heights
    Chunk {
        path: PathBuf,
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        z: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Serve {
            config,
            listen,
            world,
            chunk_radius,
        } => {
            let mut config = ServerConfig::load(config.as_deref())?;
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(world) = world {
                config.world_path = world;
            }
            if let Some(radius) = chunk_radius {
                config.chunk_radius = radius;
            }
            config.validate()?;
            serve(config).await?;
        }
        Commands::NewWorld {
            path,
            seed,
            spawn,
            pregen_radius,
        } => tools::new_world(&path, seed, spawn, i32::from(pregen_radius))?,
        Commands::Info { path, json } => tools::print_summary(&tools::summarize(&path)?, json)?,
        Commands::Chunk { path, x, z } => tools::show_chunk(&path, ChunkXz::new(x, z)).await?,
    }

    Ok(())
}

/// Load the world, start the game and its timer, and accept players until
/// Ctrl-C. The chunk services are drained before returning.
async fn serve(config: ServerConfig) -> Result<()> {
    let world = WorldStore::load(&config.world_path)
        .with_context(|| format!("load world {}", config.world_path.display()))?;
    let world = Arc::new(world);

    let (game, _game_task) = Game::new(config.game_config(), world.time()).spawn();
    let timer = spawn_timer(game.clone(), config.tick_period());

    let ctx = SessionContext {
        game,
        world: Arc::clone(&world),
    };
    let acceptor = ConnectionAcceptor::bind(config.listen_addr, ctx)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;

    acceptor
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "cannot listen for Ctrl-C; running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("shutting down");
    timer.abort();
    world.shutdown().await;
    Ok(())
}
