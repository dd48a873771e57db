use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::chat::ChatService;
use crate::screen::{encode_deltas, Canvas, Screen};
use crate::session::Command;
use crate::transport::OutputHandle;
use crate::world::{Direction, Position};

use super::{Entity, EntityId, Frame, TickContext};

pub const SCREEN_WIDTH: usize = 80;
pub const SCREEN_HEIGHT: usize = 24;
pub const VIEW_SIZE: usize = 24;
pub const CHAT_INPUT_CAPACITY: usize = 128;
pub const CHAT_HISTORY_LEN: usize = 25;
pub const COMMAND_QUEUE_LIMIT: usize = 256;

const CHAT_COLUMN: usize = 25;
const CHAT_WIDTH: usize = SCREEN_WIDTH - CHAT_COLUMN;

const ESC: u8 = 0x1b;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// Commands waiting for the player's next update. Written by the session's
/// reader, drained by the game tick; each side only holds the lock briefly.
#[derive(Debug, Default)]
pub struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    /// Queue `command`, or drop it when the queue is full.
    pub fn push(&self, command: Command) -> bool {
        let mut queue = self.inner.lock();
        if queue.len() >= COMMAND_QUEUE_LIMIT {
            trace!(target: "mmorogue::game", "command queue full; dropping input");
            return false;
        }
        queue.push_back(command);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn drain(&self) -> VecDeque<Command> {
        std::mem::take(&mut *self.inner.lock())
    }
}

/// The most recent chat lines, oldest first.
#[derive(Debug, Default, Clone)]
pub struct ChatHistory {
    lines: VecDeque<String>,
}

impl ChatHistory {
    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > CHAT_HISTORY_LEN {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// What the session keeps of its player after handing it to the game.
#[derive(Clone)]
pub struct PlayerHandle {
    id: EntityId,
    commands: Arc<CommandQueue>,
    history: Arc<Mutex<ChatHistory>>,
}

impl PlayerHandle {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn push_command(&self, command: Command) -> bool {
        self.commands.push(command)
    }

    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    pub fn chat_history(&self) -> Vec<String> {
        self.history.lock().lines().map(str::to_string).collect()
    }
}

pub struct PlayerEntity {
    id: EntityId,
    name: String,
    position: Position,
    commands: Arc<CommandQueue>,
    history: Arc<Mutex<ChatHistory>>,
    chat_input: Vec<u8>,
    screen: Screen,
    output: OutputHandle,
    // Reused for map rows while rendering.
    row: Vec<u8>,
}

impl PlayerEntity {
    pub fn new(id: EntityId, name: &str, position: Position, output: OutputHandle) -> (Self, PlayerHandle) {
        let commands = Arc::new(CommandQueue::default());
        let history = Arc::new(Mutex::new(ChatHistory::default()));
        let handle = PlayerHandle {
            id,
            commands: Arc::clone(&commands),
            history: Arc::clone(&history),
        };
        let player = Self {
            id,
            name: name.to_string(),
            position,
            commands,
            history,
            chat_input: Vec::with_capacity(CHAT_INPUT_CAPACITY),
            screen: Screen::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            output,
            row: vec![0; VIEW_SIZE],
        };
        (player, handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chat_input(&self) -> &[u8] {
        &self.chat_input
    }

    fn apply(&mut self, command: &[u8], ctx: &mut TickContext<'_>) {
        match command {
            [ESC, b'[', key] => {
                let direction = match key {
                    b'A' => Direction::Up,
                    b'B' => Direction::Down,
                    b'C' => Direction::Right,
                    b'D' => Direction::Left,
                    _ => return,
                };
                let target = self.position.step(direction);
                if !ctx.world().is_blocked(target) {
                    self.position = target;
                }
            }
            b"\r\n" => self.submit_chat(ctx),
            [ESC] => self.chat_input.clear(),
            [BACKSPACE | DELETE] => {
                self.chat_input.pop();
            }
            [byte @ 0x20..=0x7e] => {
                if self.chat_input.len() < CHAT_INPUT_CAPACITY {
                    self.chat_input.push(*byte);
                } else {
                    trace!(target: "mmorogue::game", entity = %self.id, "chat input full");
                }
            }
            _ => {}
        }
    }

    fn submit_chat(&mut self, ctx: &mut TickContext<'_>) {
        if self.chat_input.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.chat_input);
        let message = format!("{}: {}", self.name, text);
        self.chat_input.clear();
        ctx.chat().send(self.id, &message);
    }

    fn draw_world(&mut self, frame: &Frame<'_>) {
        let (map_width, map_height) = frame.world.size();
        let x0 = self.position.x - (VIEW_SIZE / 2) as i32;
        let y0 = self.position.y - (VIEW_SIZE / 2) as i32;

        let mut view = self.screen.region(0, 0, VIEW_SIZE, VIEW_SIZE);
        view.clear(0, 0, VIEW_SIZE, VIEW_SIZE, b'~');

        for vy in 0..VIEW_SIZE {
            let wy = y0 + vy as i32;
            if wy < 0 || wy as usize >= map_height {
                continue;
            }
            let wx = x0.max(0);
            if wx as usize >= map_width {
                continue;
            }
            let vx = (wx - x0) as usize;
            let n = frame
                .world
                .row(wx as usize, wy as usize, VIEW_SIZE - vx, &mut self.row);
            view.goto(vx, vy);
            view.write(&self.row[..n]);
        }

        // Others first so the player's own glyph always wins its cell.
        let own = frame.markers.iter().filter(|m| m.id == self.id);
        for marker in frame.markers.iter().filter(|m| m.id != self.id).chain(own) {
            let vx = marker.position.x - x0;
            let vy = marker.position.y - y0;
            if (0..VIEW_SIZE as i32).contains(&vx) && (0..VIEW_SIZE as i32).contains(&vy) {
                view.goto(vx as usize, vy as usize);
                view.put(&[marker.glyph]);
            }
        }
    }

    fn draw_chat(&mut self) {
        let tail = self.chat_input.len().saturating_sub(CHAT_WIDTH);
        let mut input = self.screen.region(CHAT_COLUMN, SCREEN_HEIGHT - 1, CHAT_WIDTH, 1);
        input.clear(0, 0, CHAT_WIDTH, 1, b' ');
        input.goto(0, 0);
        input.write(&self.chat_input[tail..]);

        let history = self.history.lock();
        let rows = SCREEN_HEIGHT - 1;
        let mut area = self.screen.region(CHAT_COLUMN, 0, CHAT_WIDTH, rows);
        area.clear(0, 0, CHAT_WIDTH, rows, b' ');
        for (row, line) in (0..rows).rev().zip(history.lines().rev()) {
            area.goto(0, row);
            area.write(line.as_bytes());
        }
    }
}

impl Entity for PlayerEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn glyph(&self) -> u8 {
        b'@'
    }

    fn initialize(&mut self, chat: &dyn ChatService) {
        let history = Arc::clone(&self.history);
        chat.register(
            self.id,
            Box::new(move |_: EntityId, message: &str| {
                history.lock().push(message.to_string())
            }),
        );
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        for command in self.commands.drain() {
            self.apply(&command, ctx);
        }
    }

    fn render(&mut self, frame: &Frame<'_>) {
        self.draw_world(frame);
        self.draw_chat();
        let deltas = self.screen.present();
        if !deltas.is_empty() && !self.output.write(encode_deltas(&deltas)) && !self.output.is_closed() {
            // The client fell behind and lost this frame; repaint in full once
            // its queue has room again.
            trace!(target: "mmorogue::game", entity = %self.id, "frame dropped; repainting");
            self.screen.invalidate();
        }
    }

    fn terminate(&mut self, chat: &dyn ChatService) {
        chat.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatHub;
    use crate::game::Game;
    use crate::world::WorldMap;
    use std::time::Instant;

    const MAP: &str = "\
##########
#........#
#..#~....#
#........#
##########
";

    fn setup() -> (Game, tokio::sync::mpsc::Receiver<bytes::Bytes>, PlayerHandle) {
        let world = Arc::new(WorldMap::parse(MAP).unwrap());
        let game = Game::new(world, Arc::new(ChatHub::new()));
        let (output, rx) = OutputHandle::channel();
        let handle = game.create_player_at("ann", Position::new(2, 1), output);
        (game, rx, handle)
    }

    fn send(handle: &PlayerHandle, bytes: &[u8]) {
        for token in crate::session::split_commands(bytes) {
            handle.push_command(token);
        }
    }

    #[test]
    fn arrows_move_until_blocked() {
        let (game, _rx, handle) = setup();
        send(&handle, b"\x1b[B");
        game.tick(Instant::now());
        // (2, 2) is floor.
        assert_eq!(game.position(handle.id()), Some(Position::new(2, 2)));

        send(&handle, b"\x1b[C");
        game.tick(Instant::now());
        // (3, 2) is a wall.
        assert_eq!(game.position(handle.id()), Some(Position::new(2, 2)));

        send(&handle, b"\x1b[A\x1b[C\x1b[C\x1b[B");
        game.tick(Instant::now());
        // Down from (4, 1) is water.
        assert_eq!(game.position(handle.id()), Some(Position::new(4, 1)));
    }

    #[test]
    fn walls_enclose_the_map() {
        let (game, _rx, handle) = setup();
        send(&handle, b"\x1b[A\x1b[A\x1b[D\x1b[D\x1b[D");
        game.tick(Instant::now());
        assert_eq!(game.position(handle.id()), Some(Position::new(1, 1)));
    }

    #[test]
    fn chat_input_editing() {
        let world = Arc::new(WorldMap::walled(10, 10).unwrap());
        let game = Game::new(world, Arc::new(ChatHub::new()));
        let (output, _rx) = OutputHandle::channel();
        let (mut player, handle) = PlayerEntity::new(game.allocate_id(), "ann", Position::new(1, 1), output);
        let mut deferred = Vec::new();
        let ids = std::sync::atomic::AtomicU64::new(100);
        let chat = ChatHub::new();
        let mut ctx = TickContext {
            entity: handle.id(),
            world: game.world(),
            chat: &chat,
            ids: &ids,
            tick: 1,
            deferred: &mut deferred,
        };

        for token in crate::session::split_commands(b"hellp\x7fo") {
            player.apply(&token, &mut ctx);
        }
        assert_eq!(player.chat_input(), b"hello");

        player.apply(b"\x1b", &mut ctx);
        assert!(player.chat_input().is_empty());

        for _ in 0..CHAT_INPUT_CAPACITY + 10 {
            player.apply(b"x", &mut ctx);
        }
        assert_eq!(player.chat_input().len(), CHAT_INPUT_CAPACITY);

        player.apply(b"\x08", &mut ctx);
        assert_eq!(player.chat_input().len(), CHAT_INPUT_CAPACITY - 1);
    }

    #[test]
    fn history_keeps_the_newest_lines() {
        let mut history = ChatHistory::default();
        for i in 0..40 {
            history.push(format!("line {i}"));
        }
        assert_eq!(history.len(), CHAT_HISTORY_LEN);
        assert_eq!(history.lines().next(), Some("line 15"));
        assert_eq!(history.lines().last(), Some("line 39"));
    }

    #[test]
    fn first_render_draws_view_and_later_renders_are_quiet() {
        let (game, mut rx, handle) = setup();
        game.tick(Instant::now());
        let first = rx.try_recv().unwrap();
        assert!(first.windows(1).any(|w| w == b"@"));
        assert!(first.windows(2).any(|w| w == b"#."));

        game.tick(Instant::now());
        assert!(rx.try_recv().is_err(), "nothing changed, nothing sent");

        send(&handle, b"\x1b[C");
        game.tick(Instant::now());
        let moved = rx.try_recv().unwrap();
        assert!(!moved.is_empty());
        assert!(moved.len() < first.len());
    }

    #[test]
    fn dropped_frame_is_repainted_in_full() {
        let world = Arc::new(WorldMap::parse(MAP).unwrap());
        let game = Game::new(world, Arc::new(ChatHub::new()));
        let (output, mut rx) = OutputHandle::with_capacity(1);
        let handle = game.create_player_at("ann", Position::new(2, 1), output);

        game.tick(Instant::now());
        // The queue is now full, so the move below is lost on the way out.
        send(&handle, b"\x1b[C");
        game.tick(Instant::now());
        let first = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());

        game.tick(Instant::now());
        let repaint = rx.try_recv().unwrap();
        assert_eq!(repaint.len(), first.len());
        assert_ne!(repaint, first);

        game.tick(Instant::now());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn chat_reaches_others_only() {
        let (game, _rx, ann) = setup();
        let (output, _bob_rx) = OutputHandle::channel();
        let bob = game.create_player_at("bob", Position::new(3, 1), output);

        send(&ann, b"hi bob\r\n");
        game.tick(Instant::now());

        assert_eq!(bob.chat_history(), vec!["ann: hi bob".to_string()]);
        assert!(ann.chat_history().is_empty());
    }

    #[test]
    fn empty_lines_are_not_sent() {
        let (game, _rx, ann) = setup();
        let (output, _bob_rx) = OutputHandle::channel();
        let bob = game.create_player_at("bob", Position::new(3, 1), output);
        send(&ann, b"\r\n\r\n");
        game.tick(Instant::now());
        assert!(bob.chat_history().is_empty());
    }

    #[test]
    fn removed_player_stops_receiving_chat() {
        let (game, _rx, ann) = setup();
        let (output, _bob_rx) = OutputHandle::channel();
        let bob = game.create_player_at("bob", Position::new(3, 1), output);
        game.remove_entity(bob.id());

        send(&ann, b"anyone?\r\n");
        game.tick(Instant::now());
        assert!(bob.chat_history().is_empty());
    }
}
