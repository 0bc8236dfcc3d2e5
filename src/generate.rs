// src/generate.rs
//! Generation collaborator boundary: one trait, three implementations.
//! `HttpGenerator` talks to a chat-completions style endpoint; the mock is
//! scripted for tests; the disabled variant lets a run finish with nothing
//! published when no key is configured.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::theme::Theme;

/// Structured build request handed to the generator. Carries everything the
/// artifact contract needs so a compliant response can pass validation on
/// the first attempt.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRequest {
    pub title: String,
    pub category: String,
    pub canonical_url: String,
    pub hub_url: String,
    pub keywords: Vec<String>,
    pub problem_examples: Vec<String>,
}

impl BuildRequest {
    pub fn from_theme(theme: &Theme, canonical_url: &str, hub_url: &str) -> Self {
        Self {
            title: theme.title.clone(),
            category: theme.category.clone(),
            canonical_url: canonical_url.to_string(),
            hub_url: hub_url.to_string(),
            keywords: theme.keywords.clone(),
            problem_examples: theme.problem_examples.clone(),
        }
    }

    /// Render the request as the prompt text sent to the generator.
    /// `failure_reason` is appended on full-regeneration retries.
    pub fn prompt(&self, failure_reason: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str("Build a complete single-file HTML micro-site.\n\n");
        out.push_str(&format!("Title: {}\n", self.title));
        out.push_str(&format!("Category: {}\n", self.category));
        out.push_str(&format!("Canonical URL: {}\n", self.canonical_url));
        out.push_str(&format!("Keywords: {}\n", self.keywords.join(", ")));
        out.push_str("Problems this page must address:\n");
        for p in &self.problem_examples {
            out.push_str(&format!("- {p}\n"));
        }
        out.push_str(
            "\nStructural requirements (all mandatory):\n\
             - full document: starts with <!doctype html>, ends with </html>\n\
             - footer links to privacy.html, terms.html, disclaimer.html, about.html, contact.html\n\
             - a language selector element with id=\"langSel\"\n\
             - at least 8 elements carrying data-i18n attributes\n",
        );
        out.push_str(&format!("- a back-link anchor to {}\n", self.hub_url));
        out.push_str(
            "- an <!-- AFF_SLOT --> comment marker where sponsor blocks go\n\
             - a script line assigning window.__RELATED__ = []\n\
             \nReturn ONLY the final HTML.\n",
        );
        if let Some(reason) = failure_reason {
            out.push_str(&format!(
                "\nThe previous attempt was rejected: {reason}. Fix exactly that.\n"
            ));
        }
        out
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// One-shot artifact generation.
    async fn build(&self, req: &BuildRequest, failure_reason: Option<&str>) -> Result<String>;
    /// One-shot patch generation scoped to a single validation failure.
    async fn patch(&self, reason: &str, current_artifact: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Always errors; used when no API key is configured so the pipeline
/// degrades to a run with nothing published instead of panicking.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn build(&self, _req: &BuildRequest, _failure_reason: Option<&str>) -> Result<String> {
        Err(anyhow!("generator disabled: no API key configured"))
    }
    async fn patch(&self, _reason: &str, _current_artifact: &str) -> Result<String> {
        Err(anyhow!("generator disabled: no API key configured"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Scripted generator for tests: pops canned build and patch responses in
/// order, and records the prompts it was given.
#[derive(Default)]
pub struct MockGenerator {
    builds: Mutex<VecDeque<String>>,
    patches: Mutex<VecDeque<String>>,
    pub seen_build_prompts: Mutex<Vec<String>>,
    pub seen_patch_reasons: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(builds: Vec<String>, patches: Vec<String>) -> Self {
        Self {
            builds: Mutex::new(builds.into()),
            patches: Mutex::new(patches.into()),
            seen_build_prompts: Mutex::new(Vec::new()),
            seen_patch_reasons: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn build(&self, req: &BuildRequest, failure_reason: Option<&str>) -> Result<String> {
        self.seen_build_prompts
            .lock()
            .expect("mock prompts")
            .push(req.prompt(failure_reason));
        self.builds
            .lock()
            .expect("mock builds")
            .pop_front()
            .ok_or_else(|| anyhow!("mock generator ran out of build responses"))
    }

    async fn patch(&self, reason: &str, _current_artifact: &str) -> Result<String> {
        self.seen_patch_reasons
            .lock()
            .expect("mock reasons")
            .push(reason.to_string());
        self.patches
            .lock()
            .expect("mock patches")
            .pop_front()
            .ok_or_else(|| anyhow!("mock generator ran out of patch responses"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Chat-completions backed generator. Bounded timeouts; any non-success
/// status is an error for the caller to degrade on.
pub struct HttpGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("sitesmith/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("generation request failed")?
            .error_for_status()
            .context("generation request returned error status")?;

        let body: Resp = resp.json().await.context("parsing generation response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            Err(anyhow!("generator returned an empty completion"))
        } else {
            Ok(content)
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn build(&self, req: &BuildRequest, failure_reason: Option<&str>) -> Result<String> {
        let system = "You generate production-quality static HTML pages. \
                      Output only the document, no commentary, no code fences.";
        self.complete(system, &req.prompt(failure_reason)).await
    }

    async fn patch(&self, reason: &str, current_artifact: &str) -> Result<String> {
        let system = "You produce minimal unified diffs against the given document. \
                      Output only the diff: ---/+++ headers, @@ hunks, no commentary.";
        let user = format!(
            "The document below failed a structural check: {reason}\n\
             Produce a unified diff that fixes ONLY that issue.\n\n{current_artifact}"
        );
        self.complete(system, &user).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_markers_and_failure_reason() {
        let req = BuildRequest {
            title: "csv tools".into(),
            category: "data-spreadsheets".into(),
            canonical_url: "https://s.test/pages/csv-tools/".into(),
            hub_url: "https://s.test/hub/".into(),
            keywords: vec!["csv".into()],
            problem_examples: vec!["convert csv to json".into()],
        };
        let p = req.prompt(Some("missing sponsor placeholder marker"));
        assert!(p.contains("AFF_SLOT"));
        assert!(p.contains("window.__RELATED__"));
        assert!(p.contains("langSel"));
        assert!(p.contains("https://s.test/hub/"));
        assert!(p.contains("missing sponsor placeholder marker"));
    }

    #[tokio::test]
    async fn mock_pops_responses_in_order() {
        let req = BuildRequest {
            title: "t".into(),
            category: "dev-tools".into(),
            canonical_url: "https://s.test/t/".into(),
            hub_url: "https://s.test/hub/".into(),
            keywords: vec![],
            problem_examples: vec![],
        };
        let gen = MockGenerator::new(vec!["one".into(), "two".into()], vec![]);
        assert_eq!(gen.build(&req, None).await.unwrap(), "one");
        assert_eq!(gen.build(&req, None).await.unwrap(), "two");
        assert!(gen.build(&req, None).await.is_err());
    }
}
