use shared::protocol::{Event, InterestGroup};

use crate::error::FetchError;

/// An event position in the view: either real data or a presentation marker.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSlot {
    /// Nothing has been loaded yet.
    Loading,
    /// The fetch succeeded with zero events.
    Empty,
    /// The fetch failed.
    Error,
    Event(Event),
}

impl EventSlot {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed(FetchError),
}

impl LoadStatus {
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Snapshot of everything the UI renders. Published as a whole on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub selected_group: Option<InterestGroup>,
    pub groups: Vec<InterestGroup>,
    pub events: Vec<EventSlot>,
    pub first_event: EventSlot,
    pub upcoming_events: Vec<Event>,
    pub past_events: Vec<Event>,
    pub status: LoadStatus,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            selected_group: None,
            groups: Vec::new(),
            events: Vec::new(),
            first_event: EventSlot::Loading,
            upcoming_events: Vec::new(),
            past_events: Vec::new(),
            status: LoadStatus::Loading,
        }
    }
}

impl SyncState {
    pub fn group_named(&self, name: &str) -> Option<&InterestGroup> {
        self.groups.iter().find(|group| group.name == name)
    }
}
