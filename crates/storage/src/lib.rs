use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::protocol::Event;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::broadcast;

const SELECTED_GROUP_KEY: &str = "selected_group";
const MOST_RECENT_EVENT_KEY: &str = "most_recent_event";
const SELECTION_CHANNEL_CAPACITY: usize = 64;

/// SQLite-backed preference store for the selected group and the last seen event.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    selection_changes: broadcast::Sender<String>,
}

#[derive(Debug, Clone)]
pub struct StoredPreference {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredRecentEvent {
    pub event: Event,
    pub saved_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite database url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a separate database, so pin a single one.
        let pool_options = if sqlite_path(database_url).is_none() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;

        let (selection_changes, _) = broadcast::channel(SELECTION_CHANNEL_CAPACITY);
        let storage = Self {
            pool,
            selection_changes,
        };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure preferences table exists")?;
        Ok(())
    }

    async fn put_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store preference '{key}'"))?;
        Ok(())
    }

    async fn load_preference(&self, key: &str) -> Result<Option<StoredPreference>> {
        let row = sqlx::query("SELECT value, updated_at FROM preferences WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load preference '{key}'"))?;
        Ok(row.map(|r| StoredPreference {
            value: r.get::<String, _>(0),
            updated_at: r.get::<DateTime<Utc>, _>(1),
        }))
    }

    pub async fn selected_group(&self) -> Result<Option<String>> {
        Ok(self
            .load_preference(SELECTED_GROUP_KEY)
            .await?
            .map(|pref| pref.value))
    }

    /// Persists the selection and notifies subscribers, even when the value is unchanged.
    pub async fn set_selected_group(&self, name: &str) -> Result<()> {
        self.put_preference(SELECTED_GROUP_KEY, name).await?;
        // No subscribers is fine; the value is still persisted.
        let _ = self.selection_changes.send(name.to_string());
        Ok(())
    }

    pub async fn clear_selected_group(&self) -> Result<()> {
        sqlx::query("DELETE FROM preferences WHERE key = ?1")
            .bind(SELECTED_GROUP_KEY)
            .execute(&self.pool)
            .await
            .context("failed to clear selected group")?;
        Ok(())
    }

    pub fn subscribe_selection(&self) -> broadcast::Receiver<String> {
        self.selection_changes.subscribe()
    }

    pub async fn save_most_recent_event(&self, event: &Event) -> Result<()> {
        let encoded =
            serde_json::to_string(event).context("failed to encode most recent event")?;
        self.put_preference(MOST_RECENT_EVENT_KEY, &encoded).await
    }

    pub async fn most_recent_event(&self) -> Result<Option<StoredRecentEvent>> {
        let Some(pref) = self.load_preference(MOST_RECENT_EVENT_KEY).await? else {
            return Ok(None);
        };
        let event = serde_json::from_str(&pref.value)
            .context("stored most recent event is not valid json")?;
        Ok(Some(StoredRecentEvent {
            event,
            saved_at: pref.updated_at,
        }))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
