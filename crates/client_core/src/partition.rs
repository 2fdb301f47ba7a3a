use chrono::{DateTime, Utc};
use shared::protocol::Event;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPartition {
    /// Events starting strictly after the evaluation instant, earliest first.
    pub upcoming: Vec<Event>,
    /// Events starting at or before the evaluation instant, in input order.
    pub past: Vec<Event>,
}

/// Splits `events` around `now`. Events without a start instant land in neither
/// list. Ties in `upcoming` keep their input order.
pub fn partition<'a, I>(events: I, now: DateTime<Utc>) -> EventPartition
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut result = EventPartition::default();
    for event in events {
        let Some(start_at) = event.start_at else {
            continue;
        };
        if start_at > now {
            result.upcoming.push(event.clone());
        } else {
            result.past.push(event.clone());
        }
    }
    // `sort_by_key` is stable; every remaining event has a start instant.
    result.upcoming.sort_by_key(|event| event.start_at);
    result
}
