//! In-process chat relay.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::game::EntityId;

/// Called with the sender and the message text.
pub type ChatHandler = Box<dyn Fn(EntityId, &str) + Send + Sync>;

pub trait ChatService: Send + Sync {
    /// Deliver `message` to every registered entity except `origin`.
    fn send(&self, origin: EntityId, message: &str);
    /// Subscribe `entity`, replacing any earlier handler it had.
    fn register(&self, entity: EntityId, handler: ChatHandler);
    fn unregister(&self, entity: EntityId);
}

#[derive(Default)]
pub struct ChatHub {
    handlers: RwLock<BTreeMap<EntityId, Arc<ChatHandler>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribers(&self) -> usize {
        self.handlers.read().len()
    }
}

impl ChatService for ChatHub {
    fn send(&self, origin: EntityId, message: &str) {
        // Handlers run outside the lock so they may register or unregister.
        let recipients: Vec<_> = self
            .handlers
            .read()
            .iter()
            .filter(|(id, _)| **id != origin)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        trace!(target: "mmorogue::chat", origin = %origin, recipients = recipients.len(), "chat message");
        for handler in recipients {
            handler(origin, message);
        }
    }

    fn register(&self, entity: EntityId, handler: ChatHandler) {
        self.handlers.write().insert(entity, Arc::new(handler));
    }

    fn unregister(&self, entity: EntityId) {
        self.handlers.write().remove(&entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(hub: &ChatHub, id: u64) -> Arc<Mutex<Vec<(EntityId, String)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        hub.register(
            EntityId::new(id),
            Box::new(move |from: EntityId, msg: &str| {
                sink.lock().push((from, msg.to_string()))
            }),
        );
        log
    }

    #[test]
    fn send_skips_origin() {
        let hub = ChatHub::new();
        let a = recorder(&hub, 1);
        let b = recorder(&hub, 2);
        let c = recorder(&hub, 3);

        hub.send(EntityId::new(1), "hello");

        assert!(a.lock().is_empty());
        assert_eq!(*b.lock(), vec![(EntityId::new(1), "hello".to_string())]);
        assert_eq!(*c.lock(), vec![(EntityId::new(1), "hello".to_string())]);
    }

    #[test]
    fn unregistered_entities_stop_receiving() {
        let hub = ChatHub::new();
        let b = recorder(&hub, 2);
        hub.unregister(EntityId::new(2));
        hub.send(EntityId::new(1), "anyone?");
        assert!(b.lock().is_empty());
        assert_eq!(hub.subscribers(), 0);
    }

    #[test]
    fn register_replaces_handler() {
        let hub = ChatHub::new();
        let first = recorder(&hub, 2);
        let second = recorder(&hub, 2);
        hub.send(EntityId::new(1), "x");
        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
        assert_eq!(hub.subscribers(), 1);
    }
}
