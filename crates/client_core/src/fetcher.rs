use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::protocol::{Event, InterestGroup};
use tracing::{debug, info, warn};

use crate::error::FetchError;

pub const DEFAULT_GROUPS_URL: &str = "https://api.meetgroups.io/v1/groups";
pub const GROUPS_RETRY_ATTEMPTS: usize = 2;
pub const EVENTS_RETRY_ATTEMPTS: usize = 5;

/// Remote source of truth for groups and their events.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_groups(&self) -> Result<Vec<InterestGroup>, FetchError>;
    async fn fetch_events(&self, group: &InterestGroup) -> Result<Vec<Event>, FetchError>;
}

/// Additional attempts per endpoint after the first request fails with a
/// transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub groups_retries: usize,
    pub events_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            groups_retries: GROUPS_RETRY_ATTEMPTS,
            events_retries: EVENTS_RETRY_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }
}

pub struct HttpFetcher {
    http: Client,
    groups_url: String,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn with_client(http: Client, groups_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            groups_url: groups_url.into(),
            retry,
        }
    }

    async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        retries: usize,
    ) -> Result<T, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_json(endpoint).await {
                Ok(body) => {
                    if attempt > 1 {
                        info!(endpoint, attempt, "fetch: succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(err) if err.is_retryable() && attempt <= retries => {
                    warn!(
                        endpoint,
                        attempt,
                        max_attempts = retries + 1,
                        error = %err,
                        "fetch: transport failure; retrying"
                    );
                    if !self.retry.backoff.is_zero() {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        debug!(endpoint, "fetch: GET");
        let body = self
            .http
            .get(endpoint)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| FetchError::transport(endpoint, err))?
            .bytes()
            .await
            .map_err(|err| FetchError::transport(endpoint, err))?;

        serde_json::from_slice(&body).map_err(|err| FetchError::decode(endpoint, err))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_groups(&self) -> Result<Vec<InterestGroup>, FetchError> {
        let groups: Vec<InterestGroup> = self
            .get_json_with_retry(&self.groups_url, self.retry.groups_retries)
            .await?;
        info!(count = groups.len(), "fetch: groups loaded");
        Ok(groups)
    }

    async fn fetch_events(&self, group: &InterestGroup) -> Result<Vec<Event>, FetchError> {
        let locator = group
            .events_locator()
            .ok_or_else(|| FetchError::InvalidLocator {
                group: group.name.clone(),
            })?;
        let events: Vec<Event> = self
            .get_json_with_retry(locator.as_str(), self.retry.events_retries)
            .await?;
        info!(
            group = %group.name,
            count = events.len(),
            "fetch: events loaded"
        );
        Ok(events)
    }
}
