use std::fmt;
use std::time::Duration;

use crate::chat::ChatService;
use crate::world::{Position, WorldMap};

use super::TickContext;

/// Stable identity of a live entity. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What other entities see of an entity when they render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub id: EntityId,
    pub position: Position,
    pub glyph: u8,
}

/// Read-only view handed to `render`: the world and where everything stood
/// once the update pass finished.
pub struct Frame<'a> {
    pub world: &'a WorldMap,
    pub markers: &'a [Marker],
    pub tick: u64,
}

/// Behaviour shared by players and NPCs. The scheduler owns every entity and
/// calls these with its entity lock held, so implementations must not block.
pub trait Entity: Send {
    fn id(&self) -> EntityId;

    fn position(&self) -> Position;

    fn set_position(&mut self, position: Position);

    fn glyph(&self) -> u8;

    /// Called once when the entity joins the game.
    fn initialize(&mut self, _chat: &dyn ChatService) {}

    /// Advance one tick. Only called while the entity is active.
    fn update(&mut self, ctx: &mut TickContext<'_>);

    /// Draw after every active entity has updated. Called for every live
    /// entity, sleeping or not.
    fn render(&mut self, _frame: &Frame<'_>) {}

    /// Called once before the entity leaves the game.
    fn terminate(&mut self, _chat: &dyn ChatService) {}

    fn marker(&self) -> Marker {
        Marker {
            id: self.id(),
            position: self.position(),
            glyph: self.glyph(),
        }
    }
}

/// Structural changes requested during a tick, applied once it ends.
pub(super) enum Deferred {
    Sleep(EntityId, Duration),
    Spawn(Box<dyn Entity>),
    Despawn(EntityId),
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleep(id, duration) => f.debug_tuple("Sleep").field(id).field(duration).finish(),
            Self::Spawn(entity) => f.debug_tuple("Spawn").field(&entity.id()).finish(),
            Self::Despawn(id) => f.debug_tuple("Despawn").field(id).finish(),
        }
    }
}
