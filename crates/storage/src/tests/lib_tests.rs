use super::*;
use shared::domain::{Coordinate, EventId, GroupId, Venue};

fn sample_event(id: i64) -> Event {
    Event {
        id: EventId(id),
        group_id: GroupId(1),
        name: format!("event-{id}"),
        image_url: None,
        start_at: Some(Utc::now()),
        end_at: None,
        venue: Venue {
            name: "Hall".into(),
            location: Coordinate {
                latitude: 1.5,
                longitude: -2.5,
            },
        },
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn selection_is_absent_until_written() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.selected_group().await.expect("load"), None);

    storage.set_selected_group("SF").await.expect("store");
    assert_eq!(
        storage.selected_group().await.expect("load"),
        Some("SF".to_string())
    );

    storage.set_selected_group("NYC").await.expect("overwrite");
    assert_eq!(
        storage.selected_group().await.expect("load"),
        Some("NYC".to_string())
    );

    storage.clear_selected_group().await.expect("clear");
    assert_eq!(storage.selected_group().await.expect("load"), None);
}

#[tokio::test]
async fn selection_writes_are_broadcast_to_every_subscriber() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut first = storage.subscribe_selection();
    let mut second = storage.subscribe_selection();

    storage.set_selected_group("SF").await.expect("store");
    storage.set_selected_group("SF").await.expect("store duplicate");

    assert_eq!(first.recv().await.expect("first"), "SF");
    assert_eq!(first.recv().await.expect("duplicate"), "SF");
    assert_eq!(second.recv().await.expect("second"), "SF");
}

#[tokio::test]
async fn most_recent_event_round_trips_through_json() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.most_recent_event().await.expect("load").is_none());

    let event = sample_event(3);
    storage.save_most_recent_event(&event).await.expect("save");
    storage
        .save_most_recent_event(&sample_event(4))
        .await
        .expect("save newer");

    let stored = storage
        .most_recent_event()
        .await
        .expect("load")
        .expect("present");
    assert_eq!(stored.event.id, EventId(4));
    assert!(stored.saved_at <= Utc::now());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("event_sync_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.set_selected_group("SF").await.expect("store");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.selected_group().await.expect("load"),
        Some("SF".to_string())
    );
    reopened.pool().close().await;

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn memory_urls_have_no_file_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/app.db?mode=rwc"),
        Some(PathBuf::from("./data/app.db"))
    );
}
