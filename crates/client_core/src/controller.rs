use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use shared::protocol::InterestGroup;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    error::FetchError,
    fetcher::RemoteFetcher,
    partition::partition,
    persistence::{RecentEventCache, SelectionStore},
    state::{EventSlot, LoadStatus, SyncState},
};

pub const SELECTION_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub selection_debounce: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            selection_debounce: SELECTION_DEBOUNCE,
        }
    }
}

/// Owns the published [`SyncState`] and drives every fetch that feeds it.
///
/// Each commit re-checks two counters under the state channel's lock:
/// `epoch` is bumped by [`SyncController::cancel_all`] and invalidates all
/// in-flight work, `events_generation` is bumped by every
/// [`SyncController::load_events`] call so only the latest one may commit.
pub struct SyncController {
    fetcher: Arc<dyn RemoteFetcher>,
    selection: Arc<dyn SelectionStore>,
    recent: Arc<dyn RecentEventCache>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    state: watch::Sender<SyncState>,
    epoch: AtomicU64,
    events_generation: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncController {
    pub fn new_with_dependencies(
        fetcher: Arc<dyn RemoteFetcher>,
        selection: Arc<dyn SelectionStore>,
        recent: Arc<dyn RecentEventCache>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SyncState::default());
        Arc::new(Self {
            fetcher,
            selection,
            recent,
            clock,
            options,
            state,
            epoch: AtomicU64::new(0),
            events_generation: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn resolve_selection(&self, name: &str) -> Option<InterestGroup> {
        self.state.borrow().group_named(name).cloned()
    }

    pub async fn load_groups(&self) -> Result<(), FetchError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.commit(epoch, |state| state.status = LoadStatus::Loading);

        let groups = match self.fetcher.fetch_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                error!(error = %err, "sync: group load failed; keeping previous groups");
                let failure = err.clone();
                self.commit(epoch, move |state| state.status = LoadStatus::Failed(failure));
                return Err(err);
            }
        };

        let count = groups.len();
        let committed = self.commit(epoch, move |state| {
            // Keep the selection pointing at the fresh record when one matches.
            if let Some(selected) = state.selected_group.as_mut() {
                if let Some(fresh) = groups.iter().find(|group| group.name == selected.name) {
                    *selected = fresh.clone();
                }
            }
            state.groups = groups;
            state.status = LoadStatus::Ready;
        });
        if !committed {
            return Err(cancelled());
        }
        info!(count, "sync: groups ready");

        let needs_selection = self.state.borrow().selected_group.is_none();
        if needs_selection {
            self.restore_selection(epoch).await;
        }
        Ok(())
    }

    pub async fn load_events(&self, group: &InterestGroup) -> Result<(), FetchError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let generation = self.events_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if group.events_locator().is_none() {
            let err = FetchError::InvalidLocator {
                group: group.name.clone(),
            };
            error!(group = %group.name, "sync: group has no events locator");
            let failure = err.clone();
            self.commit_events(epoch, generation, move |state| {
                state.status = LoadStatus::Failed(failure)
            });
            return Err(err);
        }

        self.commit_events(epoch, generation, |state| state.status = LoadStatus::Loading);

        let result = self.fetcher.fetch_events(group).await;
        let now = self.clock.now();

        match result {
            Ok(events) => {
                let first = events.first().cloned();
                let split = partition(&events, now);
                let (upcoming, past) = (split.upcoming.len(), split.past.len());
                let first_slot = first.clone().map_or(EventSlot::Empty, EventSlot::Event);

                let committed = self.commit_events(epoch, generation, move |state| {
                    state.first_event = first_slot;
                    state.events = events.into_iter().map(EventSlot::Event).collect();
                    state.upcoming_events = split.upcoming;
                    state.past_events = split.past;
                    state.status = LoadStatus::Ready;
                });
                if !committed {
                    return self.discarded(epoch, group);
                }
                info!(group = %group.name, upcoming, past, "sync: events ready");

                if let Some(first) = first {
                    if let Err(err) = self.recent.save_most_recent(&first).await {
                        warn!(
                            group = %group.name,
                            error = %err,
                            "sync: failed to persist most recent event"
                        );
                    }
                }
                Ok(())
            }
            Err(err) => {
                error!(group = %group.name, error = %err, "sync: event load failed");
                let events = vec![EventSlot::Error];
                let split = partition(events.iter().filter_map(EventSlot::as_event), now);
                let failure = err.clone();

                let committed = self.commit_events(epoch, generation, move |state| {
                    state.events = events;
                    state.upcoming_events = split.upcoming;
                    state.past_events = split.past;
                    state.status = LoadStatus::Failed(failure);
                });
                if !committed {
                    return self.discarded(epoch, group);
                }
                Err(err)
            }
        }
    }

    /// Loads groups, then the events of the selected group if there is one.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        self.load_groups().await?;
        let selected = self.state.borrow().selected_group.clone();
        match selected {
            Some(group) => self.load_events(&group).await,
            None => Ok(()),
        }
    }

    /// Follows the selection store, applying each value once it has been stable
    /// for the configured debounce interval.
    pub fn observe_selection(self: &Arc<Self>) {
        let changes = self.selection.selection_changes();
        let controller = Arc::downgrade(self);
        let epoch = self.epoch.load(Ordering::SeqCst);
        let debounce = self.options.selection_debounce;

        let task = tokio::spawn(follow_selection(controller, changes, epoch, debounce));
        lock(&self.tasks).push(task);
    }

    /// Drops every subscription and in-flight result, then resets the event view.
    pub fn cancel_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.state.send_modify(|state| {
            state.first_event = EventSlot::Loading;
            state.events.clear();
            state.upcoming_events.clear();
            state.past_events.clear();
            state.status = LoadStatus::Ready;
        });
        info!("sync: cancelled all pending work");
    }

    async fn restore_selection(&self, epoch: u64) {
        match self.selection.load_selection().await {
            Ok(Some(name)) => {
                self.apply_selection(epoch, &name);
            }
            Ok(None) => debug!("sync: no persisted selection"),
            Err(err) => warn!(error = %err, "sync: failed to read persisted selection"),
        }
    }

    fn apply_selection(&self, epoch: u64, name: &str) -> bool {
        let mut matched = false;
        let changed = self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            let Some(group) = state.group_named(name).cloned() else {
                return false;
            };
            matched = true;
            if state.selected_group.as_ref() == Some(&group) {
                return false;
            }
            state.selected_group = Some(group);
            true
        });
        if changed {
            info!(group = name, "sync: selection applied");
        } else if !matched {
            debug!(group = name, "sync: selection has no matching group");
        }
        changed
    }

    fn commit(&self, epoch: u64, apply: impl FnOnce(&mut SyncState)) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            apply(state);
            true
        })
    }

    fn commit_events(
        &self,
        epoch: u64,
        generation: u64,
        apply: impl FnOnce(&mut SyncState),
    ) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch
                || self.events_generation.load(Ordering::SeqCst) != generation
            {
                return false;
            }
            apply(state);
            true
        })
    }

    fn discarded(&self, epoch: u64, group: &InterestGroup) -> Result<(), FetchError> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(group = %group.name, "sync: event result dropped after cancellation");
            return Err(cancelled());
        }
        debug!(group = %group.name, "sync: event result superseded by a newer load");
        Ok(())
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

async fn follow_selection(
    controller: Weak<SyncController>,
    mut changes: broadcast::Receiver<String>,
    epoch: u64,
    debounce: Duration,
) {
    while let Some(name) = next_settled(&mut changes, debounce).await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        controller.apply_selection(epoch, &name);
    }
    debug!("sync: selection feed closed");
}

/// Waits for a value, then keeps replacing it until `debounce` passes quietly.
async fn next_settled(
    changes: &mut broadcast::Receiver<String>,
    debounce: Duration,
) -> Option<String> {
    let mut pending = next_change(changes).await?;
    loop {
        tokio::select! {
            next = next_change(changes) => match next {
                Some(name) => pending = name,
                None => return Some(pending),
            },
            _ = tokio::time::sleep(debounce) => return Some(pending),
        }
    }
}

async fn next_change(changes: &mut broadcast::Receiver<String>) -> Option<String> {
    loop {
        match changes.recv().await {
            Ok(name) => return Some(name),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "sync: selection feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn cancelled() -> FetchError {
    FetchError::Unknown("sync cancelled before completion".into())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
