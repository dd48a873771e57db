use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::world::{Direction, Position};

use super::{Entity, EntityId, TickContext};

/// How long a dog rests after each successful step.
pub const DOG_NAP: Duration = Duration::from_secs(1);

const DIRECTIONS: [Direction; 4] = [
    Direction::Right,
    Direction::Left,
    Direction::Down,
    Direction::Up,
];

/// Wanders one random step at a time and naps after every step it takes.
pub struct Dog {
    id: EntityId,
    position: Position,
    rng: StdRng,
}

impl Dog {
    pub fn new(id: EntityId, position: Position, seed: u64) -> Self {
        Self {
            id,
            position,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Entity for Dog {
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
        b'd'
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        let direction = DIRECTIONS[self.rng.gen_range(0..DIRECTIONS.len())];
        let target = self.position.step(direction);
        if ctx.world().is_blocked(target) {
            return;
        }
        self.position = target;
        ctx.sleep(DOG_NAP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatHub;
    use crate::game::{Game, Membership};
    use crate::world::WorldMap;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn boxed_in_dog_never_moves_or_sleeps() {
        let world = Arc::new(WorldMap::parse("###\n#.#\n###\n").unwrap());
        let game = Game::new(world, Arc::new(ChatHub::new()));
        let id = game.add_entity(Box::new(Dog::new(game.allocate_id(), Position::new(1, 1), 5)));
        let now = Instant::now();
        for _ in 0..20 {
            game.tick(now);
        }
        assert_eq!(game.position(id), Some(Position::new(1, 1)));
        assert_eq!(game.membership(id), Some(Membership::Active));
    }

    #[test]
    fn dog_naps_after_a_step() {
        let world = Arc::new(WorldMap::walled(30, 30).unwrap());
        let game = Game::new(world, Arc::new(ChatHub::new()));
        let start = Position::new(15, 15);
        let id = game.add_entity(Box::new(Dog::new(game.allocate_id(), start, 11)));

        // In open floor every step succeeds.
        let now = Instant::now();
        game.tick(now);
        let moved = game.position(id).unwrap();
        assert_eq!((moved.x - start.x).abs() + (moved.y - start.y).abs(), 1);
        assert_eq!(game.membership(id), Some(Membership::Sleeping));

        game.tick(now + Duration::from_millis(500));
        assert_eq!(game.position(id), Some(moved));

        game.tick(now + DOG_NAP);
        assert_ne!(game.position(id), Some(moved));
    }
}
