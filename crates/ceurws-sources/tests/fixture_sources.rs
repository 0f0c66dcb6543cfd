use std::path::{Path, PathBuf};

use ceurws_core::VolumeView;
use ceurws_sources::{parse_sparql_json, volume_list_source, RecordSource};

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(rel)
}

#[tokio::test]
async fn sample_volume_list_loads_through_record_source() {
    let source = volume_list_source(fixture("volumes/sample.json"));
    let records = source.fetch_records().await.expect("volume fixture");
    assert_eq!(records.len(), 5);

    let views = records.iter().map(VolumeView::new).collect::<Vec<_>>();
    assert_eq!(views[0].number(), Some(3497));
    assert!(views[2].has_homepage_field());
    assert_eq!(views[2].homepage(), None);
    assert!(!views[4].has_homepage_field());
}

#[test]
fn wikidata_fixture_flattens_bindings() {
    let bytes = std::fs::read(fixture("wikidata/volumes.json")).expect("sparql fixture");
    let records = parse_sparql_json("fixture", &bytes).expect("parse");
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].int_field("sVolume"), Some(3502));
    assert_eq!(
        records[3].str_field("dblpPublicationId"),
        Some("conf/esws/2023kgcw")
    );
}
