//! Event signature metadata extracted from a volume's homepage.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub volume: i64,
    pub acronym: Option<String>,
    pub ordinal: Option<i64>,
    pub frequency: Option<String>,
    pub event_reach: Option<String>,
    pub event_type: Option<String>,
    pub year: Option<i64>,
    /// ISO date
    pub start_date: Option<String>,
    /// ISO date
    pub end_date: Option<String>,
    /// ISO 3166-1 alpha-2
    pub country: Option<String>,
    /// ISO 3166-2
    pub region: Option<String>,
    pub city: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
}

impl Event {
    /// Parse a language-model answer; a surrounding markdown code fence is tolerated.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let body = strip_code_fence(yaml);
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(body).context("parsing event yaml")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing event yaml")
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("yaml").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Events {
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Events {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(self).context("serializing events")?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// First event per volume, ordered by volume number.
    pub fn unique_by_volume(&self) -> Vec<Event> {
        let mut seen = HashSet::new();
        let mut unique = self
            .events
            .iter()
            .filter(|event| seen.insert(event.volume))
            .cloned()
            .collect::<Vec<_>>();
        unique.sort_by_key(|event| event.volume);
        unique
    }
}

/// One-line summary of extracted homepage text.
pub fn text_status(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.is_empty() => {
            let lines = text.matches('\n').count();
            let chars = text.chars().count();
            format!("✅ {lines} lines and {chars} chars")
        }
        _ => "❌".to_string(),
    }
}
