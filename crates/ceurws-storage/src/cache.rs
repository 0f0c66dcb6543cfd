//! Durable key -> record cache backed by a single YAML or JSON document.
//!
//! The backing list and its lookup index live behind one mutation path
//! (`upsert`), so a lookup can never observe an index that disagrees with
//! the list.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};

use ceurws_core::Homepage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// A record type that can live in a [`KeyedCache`].
pub trait Keyed {
    type Key: Eq + Hash + Clone + Debug;

    /// Top-level field of the persisted document holding the record list.
    const COLLECTION: &'static str;

    fn key(&self) -> Self::Key;
}

impl Keyed for Homepage {
    type Key = i64;
    const COLLECTION: &'static str = "homepages";

    fn key(&self) -> i64 {
        self.volume
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("reading cache {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cache {path} is not well-formed: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("cache {path} does not match the expected schema: {message}")]
    Schema { path: PathBuf, message: String },
    #[error("serializing cache for {path}: {message}")]
    Serialize { path: PathBuf, message: String },
    #[error("writing cache {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyedCache<R: Keyed> {
    records: Vec<R>,
    index: HashMap<R::Key, usize>,
}

impl<R: Keyed> Default for KeyedCache<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<R: Keyed> KeyedCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later duplicates replace earlier ones in place.
    pub fn from_records(records: Vec<R>) -> Self {
        let mut cache = Self::new();
        cache.extend(records);
        cache
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    pub fn contains_key(&self, key: &R::Key) -> bool {
        self.index.contains_key(key)
    }

    /// Insert `record`, or replace the record with the same key in place.
    pub fn upsert(&mut self, record: R) -> Option<R> {
        let key = record.key();
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.records[pos], record)),
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Mutate the record stored under `key`; returns false when there is none.
    ///
    /// A closure that changes the key re-files the record in place. When the new
    /// key already belongs to another record the edit is discarded and false is
    /// returned.
    pub fn update<F: FnOnce(&mut R)>(&mut self, key: &R::Key, f: F) -> bool
    where
        R: Clone,
    {
        let Some(&pos) = self.index.get(key) else {
            return false;
        };
        let mut edited = self.records[pos].clone();
        f(&mut edited);
        let new_key = edited.key();
        if new_key != *key {
            if self.index.contains_key(&new_key) {
                debug!(?key, ?new_key, "update would collide with an existing key, discarded");
                return false;
            }
            self.index.remove(key);
            self.index.insert(new_key, pos);
        }
        self.records[pos] = edited;
        true
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = R>) {
        for record in records {
            self.upsert(record);
        }
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}

impl<R: Keyed + Serialize + DeserializeOwned> KeyedCache<R> {
    /// Load the cache from `path`; a missing file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no cache file yet, starting empty");
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path).map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let records = match DocumentFormat::for_path(path) {
            DocumentFormat::Yaml => parse_yaml_document::<R>(path, &text)?,
            DocumentFormat::Json => parse_json_document::<R>(path, &text)?,
        };
        debug!(path = %path.display(), records = records.len(), "loaded cache");
        Ok(Self::from_records(records))
    }

    /// Serialize the full collection and atomically replace `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let path = path.as_ref();
        let mut document = BTreeMap::new();
        document.insert(R::COLLECTION, &self.records);
        let serialize_err = |message: String| CacheError::Serialize {
            path: path.to_path_buf(),
            message,
        };
        let bytes = match DocumentFormat::for_path(path) {
            DocumentFormat::Yaml => serde_yaml::to_string(&document)
                .map_err(|e| serialize_err(e.to_string()))?
                .into_bytes(),
            DocumentFormat::Json => {
                let mut bytes =
                    serde_json::to_vec_pretty(&document).map_err(|e| serialize_err(e.to_string()))?;
                bytes.push(b'\n');
                bytes
            }
        };
        write_atomically(path, &bytes).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), records = self.records.len(), "saved cache");
        Ok(())
    }
}

fn schema_error(path: &Path, message: impl Into<String>) -> CacheError {
    CacheError::Schema {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn parse_yaml_document<R: Keyed + DeserializeOwned>(
    path: &Path,
    text: &str,
) -> Result<Vec<R>, CacheError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| CacheError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mapping = match value {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(schema_error(path, "expected a top-level mapping")),
    };
    let mut list = None;
    for (field, value) in mapping {
        match field.as_str() {
            Some(name) if name == R::COLLECTION => list = Some(value),
            Some(name) => return Err(schema_error(path, format!("unexpected top-level field `{name}`"))),
            None => return Err(schema_error(path, "top-level field names must be strings")),
        }
    }
    let list = list.ok_or_else(|| schema_error(path, format!("missing `{}` list", R::COLLECTION)))?;
    if list.is_null() {
        return Ok(Vec::new());
    }
    serde_yaml::from_value(list).map_err(|e| schema_error(path, e.to_string()))
}

fn parse_json_document<R: Keyed + DeserializeOwned>(
    path: &Path,
    text: &str,
) -> Result<Vec<R>, CacheError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| CacheError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let serde_json::Value::Object(mut object) = value else {
        return Err(schema_error(path, "expected a top-level object"));
    };
    if let Some(name) = object.keys().find(|k| k.as_str() != R::COLLECTION) {
        return Err(schema_error(path, format!("unexpected top-level field `{name}`")));
    }
    let list = object
        .remove(R::COLLECTION)
        .ok_or_else(|| schema_error(path, format!("missing `{}` list", R::COLLECTION)))?;
    if list.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(list).map_err(|e| schema_error(path, e.to_string()))
}

/// Write via a sibling temp file and rename so readers never see a torn document.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let result = (|| {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
