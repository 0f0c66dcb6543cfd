use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ceurws_core::Record;
use ceurws_sources::{parse_sparql_json, volume_list_source, RecordSource, SourceError};
use ceurws_sync::{Direction, VolumeSyncPipeline};

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(rel)
}

/// Saved SPARQL response standing in for the live Wikidata endpoint.
struct SparqlFixture {
    path: PathBuf,
}

#[async_trait]
impl RecordSource for SparqlFixture {
    fn source_id(&self) -> &str {
        "wikidata"
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, SourceError> {
        let bytes = std::fs::read(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        parse_sparql_json("fixture", &bytes)
    }
}

fn pipeline(reports_dir: &Path) -> VolumeSyncPipeline {
    VolumeSyncPipeline::new(
        reports_dir,
        Box::new(volume_list_source(fixture("volumes/sample.json"))),
        Box::new(SparqlFixture {
            path: fixture("wikidata/volumes.json"),
        }),
    )
}

#[tokio::test]
async fn fixture_volumes_reconcile_against_wikidata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = pipeline(dir.path()).run_once().await.expect("sync run");

    assert_eq!(summary.left_records, 5);
    assert_eq!(summary.right_records, 4);
    assert_eq!(summary.left_only, 2);
    assert_eq!(summary.both, 3);
    assert_eq!(summary.right_only, 1);
    assert_eq!(
        summary.suggested_updates,
        [
            "wd add-claim Q121000498 P4109 \"urn:nbn:de:0074-3498-0\"",
            "wd add-claim Q121000499 P4109 \"urn:nbn:de:0074-3499-7\"",
        ]
    );
    assert!(summary.status_table.contains("ceurws-volumes"));
    assert!(summary.status_table.contains(" 50.00%"));
}

#[tokio::test]
async fn reports_land_in_a_run_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = pipeline(dir.path()).run_once().await.expect("sync run");

    let run_dir = dir.path().join(summary.run_id.to_string());
    assert_eq!(PathBuf::from(&summary.reports_dir), run_dir);

    let status = std::fs::read_to_string(run_dir.join("sync_status.md")).expect("status report");
    assert!(status.starts_with("# CEUR-WS volumes"));
    assert!(status.contains("wd add-claim Q121000499 P4109"));

    let delta: serde_json::Value = serde_json::from_slice(
        &std::fs::read(run_dir.join("sync_delta.json")).expect("delta report"),
    )
    .expect("delta json");
    let keys = |direction: Direction| {
        delta["result"][direction.name()]
            .as_array()
            .expect("key list")
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(Direction::LeftOnly), ["3497", "3501"]);
    assert_eq!(keys(Direction::Both), ["3498", "3499", "3500"]);
    assert_eq!(keys(Direction::RightOnly), ["3502"]);
    assert_eq!(delta["actions"].as_array().map(Vec::len), Some(2));
}
