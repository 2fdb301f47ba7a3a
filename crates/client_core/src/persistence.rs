use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use shared::protocol::Event;
use storage::Storage;
use tokio::sync::broadcast;

const MEMORY_SELECTION_CAPACITY: usize = 64;

/// Persisted group selection with a change feed.
///
/// The feed may repeat values; consumers are expected to debounce.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn load_selection(&self) -> Result<Option<String>>;
    fn selection_changes(&self) -> broadcast::Receiver<String>;
}

#[async_trait]
pub trait RecentEventCache: Send + Sync {
    async fn save_most_recent(&self, event: &Event) -> Result<()>;
}

#[async_trait]
impl SelectionStore for Storage {
    async fn load_selection(&self) -> Result<Option<String>> {
        self.selected_group().await
    }

    fn selection_changes(&self) -> broadcast::Receiver<String> {
        self.subscribe_selection()
    }
}

#[async_trait]
impl RecentEventCache for Storage {
    async fn save_most_recent(&self, event: &Event) -> Result<()> {
        self.save_most_recent_event(event).await
    }
}

/// Process-local store, used for ephemeral sessions and tests.
pub struct MemoryStore {
    selection: Mutex<Option<String>>,
    saved: Mutex<Vec<Event>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(MEMORY_SELECTION_CAPACITY);
        Self {
            selection: Mutex::new(None),
            saved: Mutex::new(Vec::new()),
            changes,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(name: impl Into<String>) -> Self {
        let store = Self::default();
        *lock(&store.selection) = Some(name.into());
        store
    }

    pub fn set_selection(&self, name: impl Into<String>) {
        let name = name.into();
        *lock(&self.selection) = Some(name.clone());
        let _ = self.changes.send(name);
    }

    /// Every event passed to `save_most_recent`, oldest first.
    pub fn saved_events(&self) -> Vec<Event> {
        lock(&self.saved).clone()
    }
}

#[async_trait]
impl SelectionStore for MemoryStore {
    async fn load_selection(&self) -> Result<Option<String>> {
        Ok(lock(&self.selection).clone())
    }

    fn selection_changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl RecentEventCache for MemoryStore {
    async fn save_most_recent(&self, event: &Event) -> Result<()> {
        lock(&self.saved).push(event.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
