//! Keeps a local view of interest groups and their events in step with the
//! remote source of truth.
//!
//! [`SyncController`] owns the published [`SyncState`]; [`HttpFetcher`] talks to
//! the remote endpoints; [`partition`] splits an event list around an instant.
//! Persistence is reached through [`SelectionStore`] and [`RecentEventCache`].

pub mod clock;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod partition;
pub mod persistence;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use controller::{SyncController, SyncOptions, SELECTION_DEBOUNCE};
pub use error::FetchError;
pub use fetcher::{HttpFetcher, RemoteFetcher, RetryPolicy, DEFAULT_GROUPS_URL};
pub use partition::{partition, EventPartition};
pub use persistence::{MemoryStore, RecentEventCache, SelectionStore};
pub use state::{EventSlot, LoadStatus, SyncState};

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod fixtures;

#[cfg(test)]
#[path = "tests/partition_tests.rs"]
mod partition_tests;

#[cfg(test)]
#[path = "tests/fetcher_tests.rs"]
mod fetcher_tests;

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod controller_tests;

#[cfg(test)]
#[path = "tests/persistence_tests.rs"]
mod persistence_tests;
