//! Hacker News collector backed by the public Algolia search API.
//! No credentials required; failures degrade to an empty batch upstream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::collect::{CandidateSource, RawRecord};

const SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search_by_date";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: Option<String>,
    story_title: Option<String>,
    comment_text: Option<String>,
    url: Option<String>,
    #[serde(rename = "objectID")]
    object_id: Option<String>,
    created_at_i: Option<i64>,
    points: Option<i64>,
}

pub struct HackerNewsSource {
    mode: Mode,
    queries: Vec<String>,
    per_query: usize,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture(String),
}

impl HackerNewsSource {
    pub fn new(queries: Vec<String>, per_query: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("sitesmith/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http { client },
            queries,
            per_query,
        }
    }

    /// Parse a canned Algolia response body instead of hitting the network.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            queries: vec![String::new()],
            per_query: 100,
        }
    }

    fn records_from_body(&self, body: &str) -> Result<Vec<RawRecord>> {
        let resp: SearchResponse =
            serde_json::from_str(body).context("parsing hackernews search response")?;
        let mut out = Vec::with_capacity(resp.hits.len());
        for hit in resp.hits.into_iter().take(self.per_query) {
            let text = hit
                .title
                .or(hit.story_title)
                .or(hit.comment_text)
                .filter(|t| !t.trim().is_empty());
            let url = hit.url.filter(|u| !u.trim().is_empty()).or_else(|| {
                hit.object_id
                    .as_deref()
                    .map(|id| format!("https://news.ycombinator.com/item?id={id}"))
            });
            out.push(RawRecord {
                text,
                url,
                source: "hackernews".to_string(),
                timestamp: hit.created_at_i,
                engagement: hit.points,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CandidateSource for HackerNewsSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture(body) => self.records_from_body(body),
            Mode::Http { client } => {
                let mut out = Vec::new();
                for q in &self.queries {
                    let resp = client
                        .get(SEARCH_URL)
                        .query(&[
                            ("query", q.as_str()),
                            ("tags", "(story,comment)"),
                            ("hitsPerPage", &self.per_query.to_string()),
                        ])
                        .send()
                        .await
                        .context("hackernews request failed")?
                        .error_for_status()
                        .context("hackernews request returned error status")?;
                    let body = resp.text().await.context("reading hackernews body")?;
                    out.extend(self.records_from_body(&body)?);
                }
                Ok(out)
            }
        }
    }

    fn name(&self) -> &'static str {
        "hackernews"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "hits": [
            {"title": "Is there a tool to convert csv to json?", "url": null,
             "objectID": "101", "created_at_i": 1700000000, "points": 12},
            {"title": null, "story_title": null, "comment_text": "need a timezone converter",
             "objectID": "102", "created_at_i": 1700000100, "points": 3},
            {"title": "", "objectID": null, "created_at_i": null, "points": null}
        ]
    }"#;

    #[tokio::test]
    async fn fixture_maps_hits_and_fallback_urls() {
        let src = HackerNewsSource::from_fixture(FIXTURE);
        let recs = src.fetch().await.unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(
            recs[0].url.as_deref(),
            Some("https://news.ycombinator.com/item?id=101")
        );
        assert_eq!(recs[0].engagement, Some(12));
        assert_eq!(
            recs[1].text.as_deref(),
            Some("need a timezone converter")
        );
        // Third hit has no text and no url; the normalizer drops it later.
        assert!(recs[2].text.is_none());
        assert!(recs[2].url.is_none());
    }
}
