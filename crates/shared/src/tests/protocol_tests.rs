use chrono::{TimeZone, Utc};

use crate::{
    domain::{EventId, GroupId},
    protocol::{Event, InterestGroup},
};

const EVENT_JSON: &str = r#"{
    "id": 7,
    "groupId": 1,
    "name": "Rust meetup",
    "imageUrl": "https://img.example.com/7.png",
    "startAt": "2025-03-01T18:30:00Z",
    "endAt": "2025-03-01T21:00:00+01:00",
    "venue": { "name": "Hall", "location": { "lat": 37.77, "lng": -122.41 } },
    "rsvpCount": 42
}"#;

#[test]
fn decodes_event_with_unknown_fields_ignored() {
    let event: Event = serde_json::from_str(EVENT_JSON).expect("decode event");
    assert_eq!(event.id, EventId(7));
    assert_eq!(event.group_id, GroupId(1));
    assert_eq!(
        event.start_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 18, 30, 0).unwrap())
    );
    assert_eq!(
        event.end_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap())
    );
    assert_eq!(event.venue.location.latitude, 37.77);
}

#[test]
fn missing_and_null_dates_decode_to_none() {
    let event: Event = serde_json::from_str(
        r#"{"id":1,"groupId":1,"name":"TBD","startAt":null,"venue":{"name":"?","location":{"latitude":0,"longitude":0}}}"#,
    )
    .expect("decode event");
    assert_eq!(event.start_at, None);
    assert_eq!(event.end_at, None);
    assert_eq!(event.image_url, None);
}

#[test]
fn rejects_non_iso_timestamps() {
    let err = serde_json::from_str::<Event>(
        r#"{"id":1,"groupId":1,"name":"x","startAt":"03/01/2025 18:30","venue":{"name":"?","location":{"latitude":0,"longitude":0}}}"#,
    )
    .expect_err("timestamp must be rejected");
    assert!(err.to_string().contains("invalid ISO-8601 timestamp"));
}

#[test]
fn events_locator_requires_http_url() {
    let mut group = InterestGroup {
        id: GroupId(1),
        name: "SF".into(),
        events_url: Some("https://api.example.com/groups/1/events".into()),
    };
    assert!(group.events_locator().is_some());

    group.events_url = Some("   ".into());
    assert!(group.events_locator().is_none());

    group.events_url = Some("ftp://example.com/events".into());
    assert!(group.events_locator().is_none());

    group.events_url = None;
    assert!(group.events_locator().is_none());
}

#[test]
fn event_serializes_back_to_camel_case() {
    let event: Event = serde_json::from_str(EVENT_JSON).expect("decode event");
    let value = serde_json::to_value(&event).expect("encode event");
    assert_eq!(value["groupId"], 1);
    assert_eq!(value["startAt"], "2025-03-01T18:30:00Z");
    assert!(value.get("rsvpCount").is_none());
}
