//! Homepage reachability checks and text extraction.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use tracing::{debug, warn};

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeOutcome {
    pub available: bool,
    pub content_length: Option<u64>,
}

impl ProbeOutcome {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub check_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: None,
        }
    }
}

/// Network side of the homepage crawl.
///
/// Implementations never surface transport errors: a failed check is an
/// unavailable page and a failed extraction is `None`.
#[async_trait]
pub trait HomepageProbe: Send + Sync {
    async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome;

    async fn extract_text(&self, url: &str, timeout: Duration) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building probe http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HomepageProbe for HttpProbe {
    async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let url = url.trim();
        if url.is_empty() {
            return ProbeOutcome::unavailable();
        }
        match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let content_length = resp
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                debug!(url, ?content_length, "homepage available");
                ProbeOutcome {
                    available: true,
                    content_length,
                }
            }
            Ok(resp) => {
                debug!(url, status = resp.status().as_u16(), "homepage not available");
                ProbeOutcome::unavailable()
            }
            Err(err) => {
                debug!(url, error = %err, "homepage check failed");
                ProbeOutcome::unavailable()
            }
        }
    }

    async fn extract_text(&self, url: &str, timeout: Duration) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        let resp = match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(url, error = %err, "fetching homepage text failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(url, status = resp.status().as_u16(), "homepage text not retrievable");
            return None;
        }
        match resp.text().await {
            Ok(html) => html_to_text(&html),
            Err(err) => {
                warn!(url, error = %err, "reading homepage body failed");
                None
            }
        }
    }
}

/// Visible text of the document body, one phrase per line.
///
/// `script` and `style` subtrees are dropped. Returns `None` when the
/// document has no body.
pub fn html_to_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").ok()?;
    let body = document.select(&body_selector).next()?;

    let mut raw = String::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !hidden {
            raw.push_str(text);
        }
    }
    Some(normalize_text(&raw))
}

/// Trim lines, break double-space separated phrases onto their own lines, drop blanks.
pub fn normalize_text(raw: &str) -> String {
    raw.split(['\n', '\r'])
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
