use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::model::task::TaskId;

/// What a change notification is about. Both fields `None` means "anything
/// may have changed, re-read the world".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub task: Option<TaskId>,
    pub fields: Option<Vec<&'static str>>,
}

impl Change {
    pub fn everything() -> Self {
        Change {
            task: None,
            fields: None,
        }
    }

    pub fn task(id: TaskId, fields: Option<Vec<&'static str>>) -> Self {
        Change {
            task: Some(id),
            fields,
        }
    }

    pub fn is_everything(&self) -> bool {
        self.task.is_none() && self.fields.is_none()
    }
}

pub type Listener = Arc<dyn Fn(&Change) + Send + Sync>;

/// Ordered listener registry.
#[derive(Default)]
pub struct Listeners {
    next_key: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.lock().push((key, listener));
        Subscription {
            key,
            registry: Arc::downgrade(self),
        }
    }

    /// Call every listener in registration order. Runs on a snapshot, so a
    /// listener may subscribe or unsubscribe while being notified.
    pub fn notify(&self, change: &Change) {
        let snapshot: Vec<Listener> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in snapshot {
            listener(change);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: u64) {
        self.lock().retain(|(k, _)| *k != key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration handle. Dropping it unregisters the listener.
pub struct Subscription {
    key: u64,
    registry: Weak<Listeners>,
}

impl Subscription {
    /// Same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.key);
        }
    }
}
