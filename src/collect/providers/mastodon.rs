//! Mastodon status search collector. Only constructed when the instance URL
//! and access token are configured; otherwise the source is not registered
//! at all and the run proceeds without it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::collect::{CandidateSource, RawRecord};
use crate::config::MastodonAuth;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    content: Option<String>,
    url: Option<String>,
    created_at: Option<String>,
}

pub struct MastodonSource {
    mode: Mode,
    queries: Vec<String>,
    per_query: usize,
}

enum Mode {
    Http {
        client: reqwest::Client,
        auth: MastodonAuth,
    },
    Fixture(String),
}

impl MastodonSource {
    pub fn new(auth: MastodonAuth, queries: Vec<String>, per_query: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("sitesmith/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http { client, auth },
            queries,
            per_query,
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            queries: vec![String::new()],
            per_query: 100,
        }
    }

    fn records_from_body(&self, body: &str) -> Result<Vec<RawRecord>> {
        let resp: SearchResponse =
            serde_json::from_str(body).context("parsing mastodon search response")?;
        let mut out = Vec::with_capacity(resp.statuses.len());
        for st in resp.statuses.into_iter().take(self.per_query) {
            let timestamp = st
                .created_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp());
            out.push(RawRecord {
                // content is HTML; the normalizer strips tags and entities
                text: st.content,
                url: st.url,
                source: "mastodon".to_string(),
                timestamp,
                engagement: None,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CandidateSource for MastodonSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture(body) => self.records_from_body(body),
            Mode::Http { client, auth } => {
                let mut out = Vec::new();
                for q in &self.queries {
                    let url = format!("{}/api/v2/search", auth.base_url);
                    let resp = client
                        .get(&url)
                        .bearer_auth(&auth.token)
                        .query(&[
                            ("q", q.as_str()),
                            ("type", "statuses"),
                            ("resolve", "false"),
                            ("limit", &self.per_query.to_string()),
                        ])
                        .send()
                        .await
                        .context("mastodon request failed")?
                        .error_for_status()
                        .context("mastodon request returned error status")?;
                    let body = resp.text().await.context("reading mastodon body")?;
                    out.extend(self.records_from_body(&body)?);
                }
                Ok(out)
            }
        }
    }

    fn name(&self) -> &'static str {
        "mastodon"
    }
}
