//! Volume reconciliation, sampled homepage crawls and report orchestration.

pub mod checker;
pub mod engine;
pub mod stats;
pub mod table;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ceurws_sources::{
    volume_list_source, wikidata_volume_source, LodCache, RecordSource, DEFAULT_LOD_BASE_URL,
    DEFAULT_WIKIDATA_ENDPOINT,
};
use ceurws_storage::{HttpClientConfig, HttpFetcher, ProbeConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub use checker::{
    sample_window, CheckerOptions, HomepageChecker, SampleResult, VolumeSetInfo,
    DETAILED_HEADERS, SUMMARY_HEADERS,
};
pub use engine::{
    entity_id_from_uri, Direction, PropertyMapping, ReconciliationAction, Side, StatusRow, Sync,
    SyncPair, SyncResult, DEFAULT_UPDATE_COMMAND,
};
pub use stats::{availability, ListStats, PercentageRow, PercentageTable};
pub use table::{Align, Table, TableFormat};

pub const CRATE_NAME: &str = "ceurws-sync";

pub const VOLUME_SYNC_TITLE: &str = "CEUR-WS volumes";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("invalid direction `{0}`; expected one of ←, ↔, →, right_only, both, left_only")]
    InvalidDirection(String),
    #[error("unknown table format `{0}`; expected grid, github or plain")]
    InvalidFormat(String),
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub home: PathBuf,
    pub homepage_cache: PathBuf,
    pub volumes_path: PathBuf,
    pub lod_base_url: String,
    pub wikidata_endpoint: String,
    pub user_agent: String,
    pub check_timeout: Duration,
    pub read_timeout: Duration,
    pub reports_dir: PathBuf,
}

impl WorkflowConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: u64| {
            Duration::from_millis(var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default))
        };

        let home = var("CEURWS_HOME").map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ceurws")
        });
        Self {
            homepage_cache: var("CEURWS_HOMEPAGE_CACHE")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("volume_homepages.yaml")),
            volumes_path: var("CEURWS_VOLUMES")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("volumes.json")),
            lod_base_url: var("CEURWS_LOD_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOD_BASE_URL.to_string()),
            wikidata_endpoint: var("CEURWS_WIKIDATA_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_WIKIDATA_ENDPOINT.to_string()),
            user_agent: var("CEURWS_USER_AGENT")
                .unwrap_or_else(|| "ceurws-workflow/0.1".to_string()),
            check_timeout: millis("CEURWS_CHECK_TIMEOUT_MS", 500),
            read_timeout: millis("CEURWS_READ_TIMEOUT_MS", 3000),
            reports_dir: var("CEURWS_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("reports")),
            home,
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            check_timeout: self.check_timeout,
            read_timeout: self.read_timeout,
            user_agent: Some(self.user_agent.clone()),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }

    pub fn checker_options(&self) -> CheckerOptions {
        CheckerOptions {
            check_timeout: self.check_timeout,
            read_timeout: self.read_timeout,
            ..Default::default()
        }
    }

    /// Local volume list: the configured file when present, else the LOD cache under `home`.
    pub fn local_volume_source(&self, http: HttpFetcher) -> Box<dyn RecordSource> {
        if self.volumes_path.is_file() {
            Box::new(volume_list_source(&self.volumes_path))
        } else {
            let lod = LodCache::new(&self.home, &self.lod_base_url, http);
            Box::new(lod.source("volumes"))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeSyncSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub left_records: usize,
    pub right_records: usize,
    pub left_only: usize,
    pub both: usize,
    pub right_only: usize,
    pub suggested_updates: Vec<String>,
    pub status_table: String,
    pub reports_dir: String,
}

pub struct VolumeSyncPipeline {
    reports_dir: PathBuf,
    local: Box<dyn RecordSource>,
    authority: Box<dyn RecordSource>,
    mappings: Vec<PropertyMapping>,
    command: String,
}

impl VolumeSyncPipeline {
    pub fn new(
        reports_dir: impl Into<PathBuf>,
        local: Box<dyn RecordSource>,
        authority: Box<dyn RecordSource>,
    ) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            local,
            authority,
            mappings: vec![PropertyMapping::new("urn", "urn", "P4109")],
            command: DEFAULT_UPDATE_COMMAND.to_string(),
        }
    }

    pub fn with_mappings(mut self, mappings: Vec<PropertyMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub async fn run_once(&self) -> Result<VolumeSyncSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let left = self
            .local
            .fetch_records()
            .await
            .with_context(|| format!("loading records from {}", self.local.source_id()))?;
        let right = self
            .authority
            .fetch_records()
            .await
            .with_context(|| format!("loading records from {}", self.authority.source_id()))?;
        let left_records = left.len();
        let right_records = right.len();

        let pair = SyncPair::new(
            VOLUME_SYNC_TITLE,
            self.local.source_id(),
            self.authority.source_id(),
            left,
            right,
            "number",
            "sVolume",
        )
        .with_primary_keys(Some("number"), Some("proceeding"));
        let sync = Sync::new(pair);
        let actions = sync.suggest_updates(&self.mappings, &self.command);
        let status_table = sync.status_table(TableFormat::Grid);

        let finished_at = Utc::now();
        let reports_dir = self
            .write_reports(run_id, started_at, finished_at, &sync, &actions, &status_table)
            .await?;

        let result = sync.result();
        info!(
            %run_id,
            left_only = result.left_only.len(),
            both = result.both.len(),
            right_only = result.right_only.len(),
            actions = actions.len(),
            "volume sync finished"
        );

        Ok(VolumeSyncSummary {
            run_id,
            started_at,
            finished_at,
            left_records,
            right_records,
            left_only: result.left_only.len(),
            both: result.both.len(),
            right_only: result.right_only.len(),
            suggested_updates: actions.iter().map(ToString::to_string).collect(),
            status_table,
            reports_dir: reports_dir.display().to_string(),
        })
    }

    async fn write_reports(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        sync: &Sync,
        actions: &[ReconciliationAction],
        status_table: &str,
    ) -> Result<PathBuf> {
        let reports_dir = self.reports_dir.join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let pair = sync.pair();
        let action_lines = if actions.is_empty() {
            "(none)".to_string()
        } else {
            actions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        };
        let status = format!(
            "# {}\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- {}: {} records\n- {}: {} records\n\n## Status\n\n```\n{}\n```\n\n## Suggested updates\n\n```\n{}\n```\n",
            pair.title,
            run_id,
            started_at,
            finished_at,
            pair.left_name,
            pair.left_records.len(),
            pair.right_name,
            pair.right_records.len(),
            status_table,
            action_lines,
        );
        fs::write(reports_dir.join("sync_status.md"), status)
            .await
            .context("writing sync_status.md")?;

        let delta_json = serde_json::to_vec_pretty(&serde_json::json!({
            "run_id": run_id,
            "started_at": started_at,
            "finished_at": finished_at,
            "title": pair.title,
            "left": pair.left_name,
            "right": pair.right_name,
            "result": sync.result(),
            "actions": actions,
        }))
        .context("serializing sync delta")?;
        fs::write(reports_dir.join("sync_delta.json"), delta_json)
            .await
            .context("writing sync_delta.json")?;

        Ok(reports_dir)
    }
}

pub async fn run_volume_sync_from_env() -> Result<VolumeSyncSummary> {
    let config = WorkflowConfig::from_env();
    let http = HttpFetcher::new(config.http_config())?;
    let local = config.local_volume_source(http.clone());
    let authority = Box::new(wikidata_volume_source(&config.wikidata_endpoint, http));
    VolumeSyncPipeline::new(&config.reports_dir, local, authority)
        .run_once()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn config_defaults_hang_off_home() {
        let vars = HashMap::from([("CEURWS_HOME", "/tmp/ceurws-home")]);
        let config = WorkflowConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.home, PathBuf::from("/tmp/ceurws-home"));
        assert_eq!(
            config.homepage_cache,
            PathBuf::from("/tmp/ceurws-home/volume_homepages.yaml")
        );
        assert_eq!(config.volumes_path, PathBuf::from("/tmp/ceurws-home/volumes.json"));
        assert_eq!(config.reports_dir, PathBuf::from("/tmp/ceurws-home/reports"));
        assert_eq!(config.lod_base_url, DEFAULT_LOD_BASE_URL);
        assert_eq!(config.check_timeout, Duration::from_millis(500));
        assert_eq!(config.read_timeout, Duration::from_millis(3000));
        assert_eq!(config.user_agent, "ceurws-workflow/0.1");
    }

    #[test]
    fn config_overrides_and_ignores_garbage_timeouts() {
        let vars = HashMap::from([
            ("CEURWS_HOME", "/data"),
            ("CEURWS_HOMEPAGE_CACHE", "/elsewhere/hp.json"),
            ("CEURWS_CHECK_TIMEOUT_MS", "1200"),
            ("CEURWS_READ_TIMEOUT_MS", "soon"),
            ("CEURWS_USER_AGENT", "  "),
        ]);
        let config = WorkflowConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.homepage_cache, PathBuf::from("/elsewhere/hp.json"));
        assert_eq!(config.check_timeout, Duration::from_millis(1200));
        assert_eq!(config.read_timeout, Duration::from_millis(3000));
        assert_eq!(config.user_agent, "ceurws-workflow/0.1");
        assert_eq!(config.checker_options().check_timeout, Duration::from_millis(1200));
    }
}
