//! Core record model for the CEUR-WS workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod event;

pub use event::{text_status, Event, Events};

pub const CRATE_NAME: &str = "ceurws-core";

pub const VOLUME_NUMBER_FIELD: &str = "number";
pub const HOMEPAGE_FIELD: &str = "homepage";

/// Open-ended row from any record source: local volume list, SPARQL results, DBLP dumps.
///
/// The field set differs per source, so there are no per-field struct members;
/// integrations read fields through named accessor views such as [`VolumeView`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalized join key for `field`, or `None` when the field is missing or absent-valued.
    pub fn key_value(&self, field: &str) -> Option<String> {
        self.0.get(field).and_then(scalar_key)
    }

    /// Non-blank string value of `field`.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer value of `field`; numeric strings such as SPARQL literals are accepted.
    pub fn int_field(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Scalar values become keys; null, blank strings and containers count as absent.
pub fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Accessors for rows of the local CEUR-WS volume list.
#[derive(Debug, Clone, Copy)]
pub struct VolumeView<'a> {
    record: &'a Record,
}

impl<'a> VolumeView<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    pub fn number(&self) -> Option<i64> {
        self.record.int_field(VOLUME_NUMBER_FIELD)
    }

    /// True when the row carries a `homepage` field at all, even a null one.
    pub fn has_homepage_field(&self) -> bool {
        self.record.contains_field(HOMEPAGE_FIELD)
    }

    pub fn homepage(&self) -> Option<&'a str> {
        self.record.str_field(HOMEPAGE_FIELD).map(str::trim)
    }

    pub fn title(&self) -> Option<&'a str> {
        self.record.str_field("title")
    }

    pub fn acronym(&self) -> Option<&'a str> {
        self.record.str_field("acronym")
    }
}

/// Cached availability and content of a volume's event homepage.
///
/// Identity is the volume number, not the URL, so a homepage that moves
/// between crawls keeps its cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Homepage {
    pub volume: i64,
    pub url: Option<String>,
    pub available: bool,
    pub content_length: Option<u64>,
    pub text: Option<String>,
    pub last_checked: DateTime<Utc>,
}

impl Homepage {
    pub fn new(volume: i64, url: Option<&str>, last_checked: DateTime<Utc>) -> Self {
        Self {
            volume,
            url: url.map(str::trim).filter(|u| !u.is_empty()).map(ToString::to_string),
            available: false,
            content_length: None,
            text: None,
            last_checked,
        }
    }

    pub fn record_probe(
        &mut self,
        available: bool,
        content_length: Option<u64>,
        checked_at: DateTime<Utc>,
    ) {
        self.available = available;
        self.content_length = if available { content_length } else { None };
        self.last_checked = checked_at;
    }

    pub fn text_len(&self) -> Option<usize> {
        self.text.as_deref().map(|t| t.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).expect("record")
    }

    #[test]
    fn key_value_normalizes_scalars() {
        let rec = record(json!({
            "s": "Vol-1",
            "i": 42,
            "b": true,
            "empty": "",
            "blank": "  ",
            "null": null,
            "list": [1, 2],
        }));
        assert_eq!(rec.key_value("s").as_deref(), Some("Vol-1"));
        assert_eq!(rec.key_value("i").as_deref(), Some("42"));
        assert_eq!(rec.key_value("b").as_deref(), Some("true"));
        assert_eq!(rec.key_value("empty"), None);
        assert_eq!(rec.key_value("blank"), None);
        assert_eq!(rec.key_value("null"), None);
        assert_eq!(rec.key_value("list"), None);
        assert_eq!(rec.key_value("missing"), None);
    }

    #[test]
    fn int_field_accepts_sparql_literals() {
        let rec = record(json!({"sVolume": "3412", "number": 7, "bad": "x"}));
        assert_eq!(rec.int_field("sVolume"), Some(3412));
        assert_eq!(rec.int_field("number"), Some(7));
        assert_eq!(rec.int_field("bad"), None);
    }

    #[test]
    fn volume_view_distinguishes_null_homepage_from_missing() {
        let with_null = record(json!({"number": 5, "homepage": null}));
        let without = record(json!({"number": 6}));
        let with_url = record(json!({"number": 7, "homepage": " https://example.org/ws "}));

        assert!(VolumeView::new(&with_null).has_homepage_field());
        assert_eq!(VolumeView::new(&with_null).homepage(), None);
        assert!(!VolumeView::new(&without).has_homepage_field());
        assert_eq!(
            VolumeView::new(&with_url).homepage(),
            Some("https://example.org/ws")
        );
        assert_eq!(VolumeView::new(&with_url).number(), Some(7));
    }

    #[test]
    fn homepage_trims_url_and_clears_length_when_unavailable() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().unwrap();
        let mut hp = Homepage::new(3000, Some("  http://ws.example.org/ "), at);
        assert_eq!(hp.url.as_deref(), Some("http://ws.example.org/"));

        hp.record_probe(true, Some(1024), at);
        assert_eq!(hp.content_length, Some(1024));
        hp.record_probe(false, Some(1024), at);
        assert!(!hp.available);
        assert_eq!(hp.content_length, None);
    }
}
