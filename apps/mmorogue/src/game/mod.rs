//! The authoritative simulation.
//!
//! Every entity lives in one [`EntitySet`] behind a single lock. A tick takes
//! the lock, wakes entities whose sleep has ended, updates every active
//! entity, renders every live entity, and releases the lock. Structural
//! changes requested during the tick (sleep, spawn, despawn) are queued and
//! applied after the lock is released but before the next tick starts, so the
//! active and sleeping sets never change in the middle of a pass.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::chat::ChatService;
use crate::transport::OutputHandle;
use crate::world::{Position, WorldMap};

mod entity;
mod npc;
mod player;

pub use entity::{Entity, EntityId, Frame, Marker};
pub use npc::Dog;
pub use player::{ChatHistory, CommandQueue, PlayerEntity, PlayerHandle};

use entity::Deferred;

/// Default simulation period.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Which half of the partition an entity is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Active,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameStats {
    pub live: usize,
    pub active: usize,
    pub sleeping: usize,
    pub ticks: u64,
}

#[derive(Default)]
struct EntitySet {
    entities: BTreeMap<EntityId, Box<dyn Entity>>,
    active: BTreeSet<EntityId>,
    sleeping: BTreeSet<EntityId>,
    wakeups: BinaryHeap<Reverse<(Instant, EntityId)>>,
}

impl EntitySet {
    /// Reactivate sleepers whose time has come. A wakeup for an entity that
    /// is no longer sleeping (removed, or never slept) does nothing.
    fn wake_due(&mut self, now: Instant) {
        while let Some(Reverse((due, id))) = self.wakeups.peek().copied() {
            if due > now {
                break;
            }
            self.wakeups.pop();
            if self.sleeping.remove(&id) {
                self.active.insert(id);
                debug!(target: "mmorogue::game", entity = %id, "entity woke");
            }
        }
    }

    /// Put `id` to sleep until `until`, or for good when it is `None`.
    fn sleep(&mut self, id: EntityId, until: Option<Instant>) {
        if self.active.remove(&id) {
            self.sleeping.insert(id);
            if let Some(until) = until {
                self.wakeups.push(Reverse((until, id)));
            }
        }
    }

    fn insert(&mut self, mut entity: Box<dyn Entity>, chat: &dyn ChatService) -> EntityId {
        let id = entity.id();
        entity.initialize(chat);
        self.entities.insert(id, entity);
        self.sleeping.remove(&id);
        self.active.insert(id);
        id
    }

    fn remove(&mut self, id: EntityId, chat: &dyn ChatService) -> bool {
        let Some(mut entity) = self.entities.remove(&id) else {
            return false;
        };
        entity.terminate(chat);
        self.active.remove(&id);
        self.sleeping.remove(&id);
        true
    }
}

/// Handed to [`Entity::update`]. Requests made through it take effect when
/// the tick ends.
pub struct TickContext<'a> {
    entity: EntityId,
    world: &'a WorldMap,
    chat: &'a dyn ChatService,
    ids: &'a AtomicU64,
    tick: u64,
    deferred: &'a mut Vec<Deferred>,
}

impl<'a> TickContext<'a> {
    /// The entity being updated.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn world(&self) -> &'a WorldMap {
        self.world
    }

    pub fn chat(&self) -> &'a dyn ChatService {
        self.chat
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Move the current entity to the sleeping set for `duration` once this
    /// tick ends.
    pub fn sleep(&mut self, duration: Duration) {
        self.deferred.push(Deferred::Sleep(self.entity, duration));
    }

    pub fn allocate_id(&self) -> EntityId {
        EntityId::new(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    pub fn spawn(&mut self, entity: Box<dyn Entity>) {
        self.deferred.push(Deferred::Spawn(entity));
    }

    pub fn despawn(&mut self, id: EntityId) {
        self.deferred.push(Deferred::Despawn(id));
    }
}

pub struct Game {
    world: Arc<WorldMap>,
    chat: Arc<dyn ChatService>,
    entities: Mutex<EntitySet>,
    next_id: AtomicU64,
    ticks: AtomicU64,
}

impl Game {
    pub fn new(world: Arc<WorldMap>, chat: Arc<dyn ChatService>) -> Self {
        Self {
            world,
            chat,
            entities: Mutex::new(EntitySet::default()),
            next_id: AtomicU64::new(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn world(&self) -> &Arc<WorldMap> {
        &self.world
    }

    pub fn chat(&self) -> &Arc<dyn ChatService> {
        &self.chat
    }

    pub fn allocate_id(&self) -> EntityId {
        EntityId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `entity` as active and run its initialization.
    pub fn add_entity(&self, entity: Box<dyn Entity>) -> EntityId {
        let id = self.entities.lock().insert(entity, self.chat.as_ref());
        debug!(target: "mmorogue::game", entity = %id, "entity added");
        id
    }

    /// Tear down and forget `id`. Returns `false` if it was not live.
    pub fn remove_entity(&self, id: EntityId) -> bool {
        let removed = self.entities.lock().remove(id, self.chat.as_ref());
        if removed {
            debug!(target: "mmorogue::game", entity = %id, "entity removed");
        }
        removed
    }

    /// Add a player on a random floor tile.
    pub fn create_player(&self, name: &str, output: OutputHandle) -> PlayerHandle {
        let position = self.world.spawn_point(&mut rand::thread_rng());
        self.create_player_at(name, position, output)
    }

    pub fn create_player_at(&self, name: &str, position: Position, output: OutputHandle) -> PlayerHandle {
        let (player, handle) = PlayerEntity::new(self.allocate_id(), name, position, output);
        self.add_entity(Box::new(player));
        handle
    }

    /// Add `count` wandering dogs on random floor tiles.
    pub fn spawn_dogs<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<EntityId> {
        (0..count)
            .map(|_| {
                let position = self.world.spawn_point(rng);
                let dog = Dog::new(self.allocate_id(), position, rng.gen());
                self.add_entity(Box::new(dog))
            })
            .collect()
    }

    pub fn membership(&self, id: EntityId) -> Option<Membership> {
        let set = self.entities.lock();
        if set.active.contains(&id) {
            Some(Membership::Active)
        } else if set.sleeping.contains(&id) {
            Some(Membership::Sleeping)
        } else {
            None
        }
    }

    pub fn position(&self, id: EntityId) -> Option<Position> {
        self.entities.lock().entities.get(&id).map(|e| e.position())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.lock().entities.contains_key(&id)
    }

    pub fn stats(&self) -> GameStats {
        let set = self.entities.lock();
        GameStats {
            live: set.entities.len(),
            active: set.active.len(),
            sleeping: set.sleeping.len(),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }

    /// Run one tick as of `now`.
    pub fn tick(&self, now: Instant) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut deferred = Vec::new();

        {
            let mut guard = self.entities.lock();
            let set = &mut *guard;
            set.wake_due(now);

            for id in &set.active {
                let Some(entity) = set.entities.get_mut(id) else {
                    continue;
                };
                let mut ctx = TickContext {
                    entity: *id,
                    world: &self.world,
                    chat: self.chat.as_ref(),
                    ids: &self.next_id,
                    tick,
                    deferred: &mut deferred,
                };
                entity.update(&mut ctx);
            }

            let markers: Vec<Marker> = set.entities.values().map(|e| e.marker()).collect();
            let frame = Frame {
                world: &self.world,
                markers: &markers,
                tick,
            };
            for entity in set.entities.values_mut() {
                entity.render(&frame);
            }
        }

        for action in deferred {
            let mut set = self.entities.lock();
            match action {
                // A wake time past what Instant can hold never comes.
                Deferred::Sleep(id, duration) => set.sleep(id, now.checked_add(duration)),
                Deferred::Spawn(entity) => {
                    let id = set.insert(entity, self.chat.as_ref());
                    debug!(target: "mmorogue::game", entity = %id, "entity spawned");
                }
                Deferred::Despawn(id) => {
                    set.remove(id, self.chat.as_ref());
                }
            }
        }
    }

    /// Drive [`tick`](Self::tick) every `period` on the runtime until
    /// [`GameLoop::stop`]. A slow tick delays the next one; none are skipped
    /// or overlapped.
    pub fn start(self: &Arc<Self>, period: Duration) -> GameLoop {
        let (shutdown, mut stopped) = watch::channel(false);
        let game = Arc::clone(self);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        let started = Instant::now();
                        // Ticks hold the entity lock and run every update, so
                        // they stay off the async workers.
                        let ticking = Arc::clone(&game);
                        if let Err(err) = tokio::task::spawn_blocking(move || ticking.tick(started)).await {
                            debug!(target: "mmorogue::game", error = %err, "tick task failed");
                        }
                        let elapsed = started.elapsed();
                        if elapsed > period {
                            debug!(
                                target: "mmorogue::game",
                                elapsed_ms = elapsed.as_millis() as u64,
                                "slow tick"
                            );
                        }
                    }
                }
            }
        });
        info!(target: "mmorogue::game", period_ms = period.as_millis() as u64, "game started");
        GameLoop { shutdown, task }
    }
}

/// Handle to the running tick task.
pub struct GameLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GameLoop {
    /// Stop ticking and wait for the tick in progress, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            debug!(target: "mmorogue::game", error = %err, "game loop task failed");
        }
        info!(target: "mmorogue::game", "game stopped");
    }
}
