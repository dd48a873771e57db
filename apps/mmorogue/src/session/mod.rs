//! One client from accept to disconnect: negotiation, login, then feeding
//! keystrokes to a player entity until the connection drops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::game::{Game, PlayerHandle};
use crate::transport::{self, ansi, OutputHandle, TelnetReader, TransportError};

mod command;
mod line;
mod login;

pub use command::{split_commands, Command, CommandSplitter};
pub use line::{Echo, LineBuffer, LineEditor};
pub use login::{LoginFlow, LoginOutcome};

/// How long a partial escape sequence waits for its tail before it is
/// taken as a lone ESC key press.
pub const ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

/// Shared services every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub game: Arc<Game>,
    pub auth: Arc<dyn Authenticator>,
}

pub struct Session<P> {
    peer: P,
    context: SessionContext,
}

impl<P: fmt::Display> Session<P> {
    pub fn new(peer: P, context: SessionContext) -> Self {
        Self { peer, context }
    }

    /// Drive `stream` until the client leaves. Transport failures end the
    /// session quietly; they never reach the caller.
    pub async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let transport::Connection {
            mut reader,
            output,
            writer,
        } = transport::open(stream);
        let mut editor = LineEditor::new();

        let login = LoginFlow::new(&mut reader, &mut editor, Arc::clone(&self.context.auth))
            .run()
            .await;
        match login {
            Ok(LoginOutcome::Authenticated(name)) => {
                output.write(ansi::CLEAR_SCREEN);
                output.write(ansi::HIDE_CURSOR);
                self.play(&name, &mut reader, &editor.take_pending(), &output).await;
            }
            Ok(LoginOutcome::Disconnect) => {
                debug!(target: "mmorogue::session", peer = %self.peer, "disconnect chosen at menu");
            }
            Err(err) => {
                debug!(target: "mmorogue::session", peer = %self.peer, error = %err, "connection lost during login");
            }
        }

        output.write(ansi::SHOW_CURSOR);
        drop(output);
        drop(reader);
        // The writer finishes once every output handle is gone, including the
        // player's, which the game dropped on removal.
        let _ = writer.await;
        info!(target: "mmorogue::session", peer = %self.peer, "connection closed");
    }

    /// Keep `name` in the world until its connection drops. Entity set
    /// changes run on the blocking pool since they take the game lock.
    async fn play<R>(&self, name: &str, reader: &mut TelnetReader<R>, typed_ahead: &[u8], output: &OutputHandle)
    where
        R: AsyncRead + Unpin,
    {
        let game = Arc::clone(&self.context.game);
        let (player_name, player_output) = (name.to_owned(), output.clone());
        let player = match tokio::task::spawn_blocking(move || game.create_player(&player_name, player_output)).await {
            Ok(player) => player,
            Err(err) => {
                debug!(target: "mmorogue::session", peer = %self.peer, error = %err, "player creation failed");
                return;
            }
        };
        info!(
            target: "mmorogue::session",
            peer = %self.peer,
            user = %name,
            entity = %player.id(),
            "player entered the world"
        );

        let mut splitter = CommandSplitter::new();
        for command in splitter.feed(typed_ahead) {
            player.push_command(command);
        }
        let reason = pump(reader, &mut splitter, &player).await;

        let game = Arc::clone(&self.context.game);
        let id = player.id();
        if let Err(err) = tokio::task::spawn_blocking(move || game.remove_entity(id)).await {
            debug!(target: "mmorogue::session", peer = %self.peer, error = %err, "player removal failed");
        }
        info!(
            target: "mmorogue::session",
            peer = %self.peer,
            user = %name,
            reason = %reason,
            "player left the world"
        );
    }
}

/// Forward decoded input to the player's command queue until reading fails.
/// An escape prefix left at the end of a read waits up to
/// [`ESCAPE_TIMEOUT`] for the rest of the sequence.
pub async fn pump<R>(
    reader: &mut TelnetReader<R>,
    splitter: &mut CommandSplitter,
    player: &PlayerHandle,
) -> TransportError
where
    R: AsyncRead + Unpin,
{
    loop {
        let read = if splitter.has_partial() {
            match tokio::time::timeout(ESCAPE_TIMEOUT, reader.read()).await {
                Ok(read) => read,
                Err(_) => {
                    for command in splitter.flush() {
                        player.push_command(command);
                    }
                    continue;
                }
            }
        } else {
            reader.read().await
        };
        match read {
            Ok(data) => {
                for command in splitter.feed(&data) {
                    player.push_command(command);
                }
            }
            Err(err) => return err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatHub;
    use crate::world::{Position, WorldMap};
    use tokio::io::AsyncWriteExt;

    #[test_timeout::timeout(10)]
    async fn escape_left_waiting_is_taken_as_a_key_press() {
        let game = Game::new(Arc::new(WorldMap::walled(20, 5).unwrap()), Arc::new(ChatHub::new()));
        let (mut client, server) = tokio::io::duplex(4096);
        let transport::Connection {
            mut reader, output, ..
        } = transport::open(server);
        let ann = game.create_player_at("ann", Position::new(5, 2), output.clone());
        let bob = game.create_player_at("bob", Position::new(6, 2), output);

        let typing = tokio::spawn(async move {
            client.write_all(b"hi\x1b").await.unwrap();
            tokio::time::sleep(ESCAPE_TIMEOUT * 4).await;
            client.write_all(b"[A\r\n").await.unwrap();
        });
        let mut splitter = CommandSplitter::new();
        let reason = pump(&mut reader, &mut splitter, &ann).await;
        assert!(matches!(reason, TransportError::Closed), "{reason}");
        typing.await.unwrap();

        // ESC cleared "hi"; the late "[A" is plain text.
        game.tick(std::time::Instant::now());
        assert_eq!(game.position(ann.id()), Some(Position::new(5, 2)));
        assert_eq!(bob.chat_history(), vec!["ann: [A".to_string()]);
    }
}
