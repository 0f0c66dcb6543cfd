//! Record source contracts and the concrete sources feeding reconciliation:
//! local JSON volume lists, DBLP dumps and SPARQL endpoints such as Wikidata.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ceurws_core::Record;
use ceurws_storage::{FetchError, HttpFetcher};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "ceurws-sources";

pub const DEFAULT_WIKIDATA_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_LOD_BASE_URL: &str = "http://cvb.bitplan.com";
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// CEUR-WS proceedings volumes on Wikidata, keyed by the series volume qualifier.
pub const CEURWS_VOLUME_QUERY: &str = r#"PREFIX pq: <http://www.wikidata.org/prop/qualifier/>
PREFIX ps: <http://www.wikidata.org/prop/statement/>
PREFIX p: <http://www.wikidata.org/prop/>
PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
SELECT ?sVolume ?proceeding ?proceedingLabel ?ppnId ?urn ?dblpPublicationId
WHERE {
  ?proceeding wdt:P31 wd:Q1143604.
  ?proceeding rdfs:label ?proceedingLabel.
  FILTER(LANG(?proceedingLabel) = "en")
  ?proceeding p:P179 ?partOfTheSeries.
  ?partOfTheSeries ps:P179 wd:Q27230297.
  ?partOfTheSeries pq:P478 ?sVolume.
  OPTIONAL { ?proceeding wdt:P6721 ?ppnId. }
  OPTIONAL { ?proceeding wdt:P4109 ?urn. }
  OPTIONAL { ?proceeding wdt:P8978 ?dblpPublicationId. }
} ORDER BY DESC(xsd:integer(?sVolume))"#;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed records from {origin}: {message}")]
    Malformed { origin: String, message: String },
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A provider of flat records; the reconciliation engine only sees the records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch_records(&self) -> Result<Vec<Record>, SourceError>;
}

/// Parse a JSON array of objects into records.
pub fn parse_record_list(origin: &str, bytes: &[u8]) -> Result<Vec<Record>, SourceError> {
    let malformed = |message: String| SourceError::Malformed {
        origin: origin.to_string(),
        message,
    };
    let value: JsonValue = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
    let JsonValue::Array(items) = value else {
        return Err(malformed("expected a list of records".to_string()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            JsonValue::Object(map) => Ok(Record::from(map)),
            other => Err(malformed(format!(
                "item {idx} is not an object but {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, SourceError> {
    fs::read(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// A local JSON list-of-records document: the CEUR-WS volume list or a DBLP dump.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    source_id: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_records(&self) -> Result<Vec<Record>, SourceError> {
        let bytes = read_file(&self.path)?;
        let records = parse_record_list(&self.path.display().to_string(), &bytes)?;
        debug!(source_id = %self.source_id, records = records.len(), "read json records");
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, SourceError> {
        self.read_records()
    }
}

pub fn volume_list_source(path: impl Into<PathBuf>) -> JsonFileSource {
    JsonFileSource::new("ceurws-volumes", path)
}

pub fn dblp_dump_source(path: impl Into<PathBuf>) -> JsonFileSource {
    JsonFileSource::new("dblp", path)
}

/// Named list-of-records documents cached under a local directory, downloaded
/// from a JSON provider on first use.
#[derive(Debug, Clone)]
pub struct LodCache {
    root: PathBuf,
    base_url: String,
    http: HttpFetcher,
}

impl LodCache {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, http: HttpFetcher) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn json_path(&self, lod_name: &str) -> PathBuf {
        self.root.join(format!("{lod_name}.json"))
    }

    pub async fn load_lod(&self, lod_name: &str) -> Result<Vec<Record>, SourceError> {
        let path = self.json_path(lod_name);
        if path.is_file() {
            let bytes = read_file(&path)?;
            return parse_record_list(&path.display().to_string(), &bytes);
        }

        let url = format!("{}/{lod_name}.json", self.base_url);
        info!(lod_name, %url, "lod cache miss, downloading");
        let fetched = self
            .http
            .fetch_bytes(lod_name, &url, Some("application/json"))
            .await?;
        let records = parse_record_list(&url, &fetched.body)?;
        self.store(lod_name, &records)?;
        Ok(records)
    }

    pub fn store(&self, lod_name: &str, records: &[Record]) -> Result<(), SourceError> {
        let path = self.json_path(lod_name);
        let write_err = |source| SourceError::Write {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(write_err)?;
        let bytes = serde_json::to_vec(records).map_err(|e| SourceError::Malformed {
            origin: lod_name.to_string(),
            message: e.to_string(),
        })?;
        fs::write(&path, bytes).map_err(write_err)
    }

    pub fn source(&self, lod_name: impl Into<String>) -> LodSource {
        LodSource {
            cache: self.clone(),
            lod_name: lod_name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LodSource {
    cache: LodCache,
    lod_name: String,
}

#[async_trait]
impl RecordSource for LodSource {
    fn source_id(&self) -> &str {
        &self.lod_name
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, SourceError> {
        self.cache.load_lod(&self.lod_name).await
    }
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<BTreeMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// Flatten SPARQL JSON results into one record per solution; unbound variables are left out.
pub fn parse_sparql_json(origin: &str, bytes: &[u8]) -> Result<Vec<Record>, SourceError> {
    let response: SparqlResponse =
        serde_json::from_slice(bytes).map_err(|e| SourceError::Malformed {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
    Ok(response
        .results
        .bindings
        .into_iter()
        .map(|solution| {
            solution
                .into_iter()
                .map(|(var, term)| (var, term.value))
                .collect::<Record>()
        })
        .collect())
}

/// A SELECT query against a SPARQL endpoint, treated as a black-box record provider.
#[derive(Debug, Clone)]
pub struct SparqlSource {
    source_id: String,
    endpoint: String,
    query: String,
    http: HttpFetcher,
}

impl SparqlSource {
    pub fn new(
        source_id: impl Into<String>,
        endpoint: impl Into<String>,
        query: impl Into<String>,
        http: HttpFetcher,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            endpoint: endpoint.into(),
            query: query.into(),
            http,
        }
    }

    pub fn request_url(&self) -> Result<String, SourceError> {
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[("query", self.query.as_str()), ("format", "json")],
        )
        .map(|url| url.to_string())
        .map_err(|e| SourceError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RecordSource for SparqlSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, SourceError> {
        let url = self.request_url()?;
        let fetched = self
            .http
            .fetch_bytes(&self.source_id, &url, Some(SPARQL_RESULTS_JSON))
            .await?;
        let records = parse_sparql_json(&self.endpoint, &fetched.body)?;
        info!(source_id = %self.source_id, records = records.len(), "sparql query answered");
        Ok(records)
    }
}

pub fn wikidata_volume_source(endpoint: impl Into<String>, http: HttpFetcher) -> SparqlSource {
    SparqlSource::new("wikidata", endpoint, CEURWS_VOLUME_QUERY, http)
}
