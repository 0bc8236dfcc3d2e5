// src/clicklog.rs
//! Fire-and-forget click instrumentation boundary. Failures are logged and
//! swallowed; nothing in the pipeline ever waits on or fails with this.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    pub sponsor_id: String,
    pub artifact_id: String,
}

#[async_trait]
pub trait ClickLogger: Send + Sync {
    async fn post(&self, event: &ClickEvent);
}

/// Default: drop events.
pub struct NoopClickLogger;

#[async_trait]
impl ClickLogger for NoopClickLogger {
    async fn post(&self, _event: &ClickEvent) {}
}

pub struct HttpClickLogger {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClickLogger {
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("sitesmith/0.1")
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self { endpoint, client }
    }
}

#[async_trait]
impl ClickLogger for HttpClickLogger {
    async fn post(&self, event: &ClickEvent) {
        let res = self.client.post(&self.endpoint).json(event).send().await;
        match res {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => debug!(status = %resp.status(), "click log rejected"),
            Err(e) => debug!(error = ?e, "click log failed"),
        }
    }
}
