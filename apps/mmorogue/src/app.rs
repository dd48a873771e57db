use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::auth::{Authenticator, CredentialStore};
use crate::chat::ChatHub;
use crate::config::ServerConfig;
use crate::game::Game;
use crate::server::Server;
use crate::session::SessionContext;

/// Build the world and its services, serve until Ctrl-C or a `quit` line on
/// stdin, then stop the simulation.
pub async fn run(config: ServerConfig) -> Result<()> {
    let world = Arc::new(
        config
            .map
            .build()
            .with_context(|| format!("failed to prepare world map ({:?})", config.map))?,
    );
    let (width, height) = world.size();
    info!(target: "mmorogue", width, height, "world ready");

    let auth: Arc<dyn Authenticator> = match &config.credentials {
        Some(path) => Arc::new(
            CredentialStore::open(path)
                .with_context(|| format!("failed to open credential store {}", path.display()))?,
        ),
        None => {
            warn!(target: "mmorogue", "no credential file configured; accounts are kept in memory");
            Arc::new(CredentialStore::in_memory())
        }
    };

    let game = Arc::new(Game::new(world, Arc::new(ChatHub::new())));
    game.spawn_dogs(config.npcs, &mut rand::thread_rng());

    let server = Server::bind(
        config.listen_addr,
        SessionContext {
            game: Arc::clone(&game),
            auth,
        },
    )
    .await
    .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    let game_loop = game.start(config.tick_period);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    wait_for_shutdown().await;

    let _ = stop_tx.send(());
    if let Err(err) = server_task.await {
        warn!(target: "mmorogue", error = %err, "listener task failed");
    }
    game_loop.stop().await;
    Ok(())
}

async fn wait_for_shutdown() {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!(target: "mmorogue", "interrupt received"),
            Err(err) => warn!(target: "mmorogue", error = %err, "failed to listen for ctrl-c"),
        },
        _ = console_quit() => info!(target: "mmorogue", "quit requested on console"),
    }
}

/// Resolves when stdin delivers a `quit` line. Closed stdin never resolves,
/// so running detached from a terminal keeps serving.
async fn console_quit() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "quit" => return,
                "" => {}
                other => println!("Unknown command: {other}"),
            },
            Ok(None) | Err(_) => std::future::pending::<()>().await,
        }
    }
}
