use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mmorogue::auth::{Authenticator, CredentialStore, HashCost};
use mmorogue::chat::ChatHub;
use mmorogue::game::{Game, GameLoop};
use mmorogue::server::Server;
use mmorogue::session::SessionContext;
use mmorogue::world::WorldMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

struct Harness {
    addr: SocketAddr,
    game: Arc<Game>,
    auth: Arc<CredentialStore>,
    game_loop: GameLoop,
    stop: oneshot::Sender<()>,
}

async fn start() -> Harness {
    let world = Arc::new(WorldMap::walled(40, 30).unwrap());
    let game = Arc::new(Game::new(world, Arc::new(ChatHub::new())));
    let auth = Arc::new(
        CredentialStore::in_memory()
            .with_cost(HashCost::minimal())
            .unwrap(),
    );
    let server = Server::bind(
        "127.0.0.1:0".parse().unwrap(),
        SessionContext {
            game: Arc::clone(&game),
            auth: auth.clone(),
        },
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(server.serve(async move {
        let _ = stopped.await;
    }));
    let game_loop = game.start(Duration::from_millis(20));
    Harness {
        addr,
        game,
        auth,
        game_loop,
        stop,
    }
}

/// Read until `needle` shows up in everything received so far.
async fn read_until(stream: &mut TcpStream, seen: &mut Vec<u8>, needle: &[u8]) {
    let mut buf = [0u8; 4096];
    while !seen.windows(needle.len()).any(|w| w == needle) {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed before sending {:?}", String::from_utf8_lossy(needle));
        seen.extend_from_slice(&buf[..n]);
    }
}

async fn log_in(addr: SocketAddr, name: &str, password: &str) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, b"Selection: ").await;
    stream
        .write_all(format!("1\r\n{name}\r\n{password}\r\n").as_bytes())
        .await
        .unwrap();
    // The world view is drawn once the player has joined.
    read_until(&mut stream, &mut seen, b"@").await;
    (stream, seen)
}

async fn wait_for_live(game: &Game, live: usize) {
    while game.stats().live != live {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[test_timeout::timeout(30)]
async fn create_account_over_tcp_then_play_and_leave() {
    let harness = start().await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, b"Selection: ").await;
    stream
        .write_all(b"2\r\nann\r\nsecret\r\nsecret\r\nann@example.com\r\n")
        .await
        .unwrap();
    read_until(&mut stream, &mut seen, b"Account created").await;
    assert!(harness.auth.user_exists("ann"));

    // The echoed e-mail address contains an '@' too.
    seen.clear();
    stream.write_all(b"1\r\nann\r\nsecret\r\n").await.unwrap();
    read_until(&mut stream, &mut seen, b"@").await;
    wait_for_live(&harness.game, 1).await;

    // Arrow keys are accepted once in the world.
    stream.write_all(b"\x1b[C\x1b[B").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(stream);
    wait_for_live(&harness.game, 0).await;

    let _ = harness.stop.send(());
    harness.game_loop.stop().await;
}

#[test_timeout::timeout(30)]
async fn chat_between_two_connected_players() {
    let harness = start().await;
    harness.auth.create_user("ann", "pw", "").unwrap();
    harness.auth.create_user("bob", "pw", "").unwrap();

    let (mut ann, _) = log_in(harness.addr, "ann", "pw").await;
    let (mut bob, mut bob_seen) = log_in(harness.addr, "bob", "pw").await;
    wait_for_live(&harness.game, 2).await;

    ann.write_all(b"hello bob\r\n").await.unwrap();
    // Unchanged blanks between words are not resent, so look for each word.
    read_until(&mut bob, &mut bob_seen, b"ann:").await;
    read_until(&mut bob, &mut bob_seen, b"hello").await;

    drop(ann);
    drop(bob);
    wait_for_live(&harness.game, 0).await;
    let _ = harness.stop.send(());
    harness.game_loop.stop().await;
}

#[test_timeout::timeout(30)]
async fn wrong_password_is_rejected_and_connection_survives() {
    let harness = start().await;
    harness.auth.create_user("cat", "right", "").unwrap();

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let mut seen = Vec::new();
    read_until(&mut stream, &mut seen, b"Selection: ").await;
    stream.write_all(b"1\r\ncat\r\nwrong\r\n").await.unwrap();
    read_until(&mut stream, &mut seen, b"Invalid credentials").await;
    assert_eq!(harness.game.stats().live, 0);

    stream.write_all(b"3\r\n").await.unwrap();
    let mut rest = Vec::new();
    // Choosing disconnect closes the connection from the server side.
    let _ = stream.read_to_end(&mut rest).await;

    let _ = harness.stop.send(());
    harness.game_loop.stop().await;
}
