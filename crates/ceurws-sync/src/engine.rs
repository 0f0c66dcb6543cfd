//! Set-difference reconciliation between two keyed record collections.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use ceurws_core::{scalar_key, Record};
use serde::Serialize;

use crate::table::{Align, Table, TableFormat};
use crate::SyncError;

pub const DEFAULT_UPDATE_COMMAND: &str = "wd add-claim";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `←`: key present on the right only, missing on the left.
    RightOnly,
    /// `↔`: key present on both sides.
    Both,
    /// `→`: key present on the left only, missing on the right.
    LeftOnly,
}

impl Direction {
    /// Display order of the status table.
    pub const ALL: [Direction; 3] = [Direction::RightOnly, Direction::Both, Direction::LeftOnly];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::RightOnly => "←",
            Self::Both => "↔",
            Self::LeftOnly => "→",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftOnly => "left_only",
            Self::Both => "both",
            Self::RightOnly => "right_only",
        }
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| token == d.symbol() || token == d.name())
            .ok_or_else(|| SyncError::InvalidDirection(token.to_string()))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Two named record collections and the fields that join them.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPair {
    pub title: String,
    pub left_name: String,
    pub right_name: String,
    pub left_records: Vec<Record>,
    pub right_records: Vec<Record>,
    pub left_key: String,
    pub right_key: String,
    pub left_primary_key: Option<String>,
    pub right_primary_key: Option<String>,
}

impl SyncPair {
    pub fn new(
        title: impl Into<String>,
        left_name: impl Into<String>,
        right_name: impl Into<String>,
        left_records: Vec<Record>,
        right_records: Vec<Record>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_records,
            right_records,
            left_key: left_key.into(),
            right_key: right_key.into(),
            left_primary_key: None,
            right_primary_key: None,
        }
    }

    pub fn with_primary_keys(mut self, left: Option<&str>, right: Option<&str>) -> Self {
        self.left_primary_key = left.map(str::to_string);
        self.right_primary_key = right.map(str::to_string);
        self
    }
}

/// Partition of the union of both key sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncResult {
    pub left_only: BTreeSet<String>,
    pub both: BTreeSet<String>,
    pub right_only: BTreeSet<String>,
}

impl SyncResult {
    pub fn compute(left_keys: &BTreeSet<String>, right_keys: &BTreeSet<String>) -> Self {
        Self {
            left_only: left_keys.difference(right_keys).cloned().collect(),
            both: left_keys.intersection(right_keys).cloned().collect(),
            right_only: right_keys.difference(left_keys).cloned().collect(),
        }
    }

    pub fn keys(&self, direction: Direction) -> &BTreeSet<String> {
        match direction {
            Direction::LeftOnly => &self.left_only,
            Direction::Both => &self.both,
            Direction::RightOnly => &self.right_only,
        }
    }

    pub fn total(&self) -> usize {
        self.left_only.len() + self.both.len() + self.right_only.len()
    }
}

#[derive(Debug, Clone, Default)]
struct SideIndex {
    by_key: HashMap<String, usize>,
    by_primary_key: Option<HashMap<String, usize>>,
}

impl SideIndex {
    fn build(records: &[Record], key_field: &str, primary_key_field: Option<&str>) -> Self {
        let by_key = index_by(records, key_field);
        let by_primary_key = primary_key_field.map(|field| index_by(records, field));
        Self {
            by_key,
            by_primary_key,
        }
    }
}

fn index_by(records: &[Record], field: &str) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        if let Some(key) = record.key_value(field) {
            index.entry(key).or_insert(pos);
        }
    }
    index
}

/// Maps a left-side field onto a right-side field and the property that carries it upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyMapping {
    pub left_field: String,
    pub right_field: String,
    pub property: String,
}

impl PropertyMapping {
    pub fn new(
        left_field: impl Into<String>,
        right_field: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            left_field: left_field.into(),
            right_field: right_field.into(),
            property: property.into(),
        }
    }
}

/// A suggested upstream edit. Rendered as a command line, never executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationAction {
    pub command: String,
    pub key: String,
    pub entity_id: String,
    pub property: String,
    pub value: String,
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} \"{}\"",
            self.command,
            self.entity_id,
            self.property,
            self.value.replace('"', "\\\"")
        )
    }
}

/// `http://www.wikidata.org/entity/Q123` → `Q123`; plain ids pass through.
pub fn entity_id_from_uri(value: &str) -> &str {
    let trimmed = value.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub direction: Direction,
    pub count: usize,
    pub percentage: f64,
}

/// Reconciliation of one [`SyncPair`]; the result is computed once at construction.
#[derive(Debug, Clone)]
pub struct Sync {
    pair: SyncPair,
    result: SyncResult,
    left: SideIndex,
    right: SideIndex,
}

impl Sync {
    pub fn new(pair: SyncPair) -> Self {
        let left = SideIndex::build(
            &pair.left_records,
            &pair.left_key,
            pair.left_primary_key.as_deref(),
        );
        let right = SideIndex::build(
            &pair.right_records,
            &pair.right_key,
            pair.right_primary_key.as_deref(),
        );
        let left_keys = left.by_key.keys().cloned().collect::<BTreeSet<_>>();
        let right_keys = right.by_key.keys().cloned().collect::<BTreeSet<_>>();
        let result = SyncResult::compute(&left_keys, &right_keys);
        Self {
            pair,
            result,
            left,
            right,
        }
    }

    pub fn pair(&self) -> &SyncPair {
        &self.pair
    }

    pub fn result(&self) -> &SyncResult {
        &self.result
    }

    pub fn directions(&self) -> [Direction; 3] {
        Direction::ALL
    }

    pub fn keys(&self, direction: Direction) -> &BTreeSet<String> {
        self.result.keys(direction)
    }

    /// Keys for a direction given as a symbol (`←`, `↔`, `→`) or a name (`right_only`, ...).
    pub fn get_keys(&self, token: &str) -> Result<&BTreeSet<String>, SyncError> {
        let direction = token.parse::<Direction>()?;
        Ok(self.keys(direction))
    }

    pub fn status_rows(&self) -> Vec<StatusRow> {
        let total = self.result.total().max(1) as f64;
        self.directions()
            .into_iter()
            .map(|direction| {
                let count = self.keys(direction).len();
                StatusRow {
                    direction,
                    count,
                    percentage: count as f64 / total * 100.0,
                }
            })
            .collect()
    }

    pub fn status_table(&self, format: TableFormat) -> String {
        let mut table = Table::new(["left", "↔", "right", "#", "%"]).with_alignments(&[
            Align::Right,
            Align::Center,
            Align::Left,
            Align::Right,
            Align::Right,
        ]);
        for row in self.status_rows() {
            table.push_row([
                self.pair.left_name.clone(),
                row.direction.symbol().to_string(),
                self.pair.right_name.clone(),
                row.count.to_string(),
                format!("{:7.2}%", row.percentage),
            ]);
        }
        table.render(format)
    }

    pub fn get_record_by_key(&self, side: Side, key: &str) -> Option<&Record> {
        let (index, records) = self.side(side);
        index.by_key.get(key).map(|pos| &records[*pos])
    }

    pub fn get_record_by_primary_key(&self, side: Side, primary_key: &str) -> Option<&Record> {
        let (index, records) = self.side(side);
        index
            .by_primary_key
            .as_ref()?
            .get(primary_key)
            .map(|pos| &records[*pos])
    }

    /// Values present on the left but missing on the right, for every key in `↔`.
    ///
    /// The entity id is the right record's primary key, or its join key when no
    /// primary key field is configured.
    pub fn suggest_updates(
        &self,
        mappings: &[PropertyMapping],
        command: &str,
    ) -> Vec<ReconciliationAction> {
        let mut actions = Vec::new();
        for key in &self.result.both {
            let (Some(left), Some(right)) = (
                self.get_record_by_key(Side::Left, key),
                self.get_record_by_key(Side::Right, key),
            ) else {
                continue;
            };
            let entity = match &self.pair.right_primary_key {
                Some(field) => right.key_value(field),
                None => Some(key.clone()),
            };
            let Some(entity) = entity else {
                continue;
            };
            for mapping in mappings {
                let Some(value) = left.key_value(&mapping.left_field) else {
                    continue;
                };
                if right.get(&mapping.right_field).and_then(scalar_key).is_some() {
                    continue;
                }
                actions.push(ReconciliationAction {
                    command: command.to_string(),
                    key: key.clone(),
                    entity_id: entity_id_from_uri(&entity).to_string(),
                    property: mapping.property.clone(),
                    value,
                });
            }
        }
        actions
    }

    fn side(&self, side: Side) -> (&SideIndex, &[Record]) {
        match side {
            Side::Left => (&self.left, &self.pair.left_records),
            Side::Right => (&self.right, &self.pair.right_records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(field: &str, keys: &[i64]) -> Vec<Record> {
        keys.iter()
            .map(|k| Record::new().with(field, *k).with("label", format!("r{k}")))
            .collect()
    }

    fn worked_example() -> Sync {
        Sync::new(SyncPair::new(
            "numbers",
            "local",
            "remote",
            records("id", &[1, 2, 4, 5]),
            records("id", &[1, 2, 3]),
            "id",
            "id",
        ))
    }

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn worked_example_partitions_keys() {
        let sync = worked_example();
        assert_eq!(sync.get_keys("→").unwrap(), &set(&["4", "5"]));
        assert_eq!(sync.get_keys("↔").unwrap(), &set(&["1", "2"]));
        assert_eq!(sync.get_keys("←").unwrap(), &set(&["3"]));
        assert_eq!(sync.get_keys("right_only").unwrap(), &set(&["3"]));
        assert_eq!(sync.get_keys("left_only").unwrap(), &set(&["4", "5"]));
    }

    #[test]
    fn arrows_follow_left_and_right_key_fields() {
        let left = ["1", "2", "4", "5"]
            .into_iter()
            .map(|k| Record::new().with("id_l", k))
            .collect();
        let right = ["1", "2", "3"]
            .into_iter()
            .map(|k| Record::new().with("id_r", k))
            .collect();
        let sync = Sync::new(SyncPair::new("ids", "l", "r", left, right, "id_l", "id_r"));

        assert_eq!(sync.get_keys("→").unwrap(), &set(&["4", "5"]));
        assert_eq!(sync.get_keys("→"), sync.get_keys("left_only"));
        assert_eq!(sync.get_keys("↔").unwrap(), &set(&["1", "2"]));
        assert_eq!(sync.get_keys("both"), sync.get_keys("↔"));
        assert_eq!(sync.get_keys("←").unwrap(), &set(&["3"]));
        assert_eq!(sync.get_keys("←"), sync.get_keys("right_only"));
        assert_eq!(Direction::LeftOnly.to_string(), "→");
        assert_eq!(Direction::RightOnly.to_string(), "←");
    }

    #[test]
    fn status_table_rows_pair_arrows_with_counts() {
        let rendered = worked_example().status_table(TableFormat::Plain);
        let rows = rendered
            .lines()
            .skip(1)
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(rows[0], ["local", "←", "remote", "1", "20.00%"]);
        assert_eq!(rows[1], ["local", "↔", "remote", "2", "40.00%"]);
        assert_eq!(rows[2], ["local", "→", "remote", "2", "40.00%"]);
    }

    #[test]
    fn partition_is_disjoint_and_covers_the_union() {
        let sync = Sync::new(SyncPair::new(
            "overlap",
            "a",
            "b",
            records("k", &[10, 11, 12, 13, 14, 20]),
            records("k", &[12, 13, 20, 21, 22]),
            "k",
            "k",
        ));
        let result = sync.result();
        assert!(result.left_only.is_disjoint(&result.both));
        assert!(result.left_only.is_disjoint(&result.right_only));
        assert!(result.both.is_disjoint(&result.right_only));

        let union = set(&["10", "11", "12", "13", "14", "20", "21", "22"]);
        let mut covered = result.left_only.clone();
        covered.extend(result.both.iter().cloned());
        covered.extend(result.right_only.iter().cloned());
        assert_eq!(covered, union);
        assert_eq!(result.total(), union.len());
    }

    #[test]
    fn unknown_direction_fails_fast() {
        let sync = worked_example();
        assert_eq!(
            sync.get_keys("<->"),
            Err(SyncError::InvalidDirection("<->".to_string()))
        );
    }

    #[test]
    fn directions_have_fixed_order() {
        let symbols = worked_example()
            .directions()
            .iter()
            .map(|d| d.symbol())
            .collect::<Vec<_>>();
        assert_eq!(symbols, ["←", "↔", "→"]);
    }

    #[test]
    fn status_percentages_sum_to_one_hundred() {
        let sync = worked_example();
        let sum: f64 = sync.status_rows().iter().map(|r| r.percentage).sum();
        assert!((sum - 100.0).abs() < 0.01);

        let table = sync.status_table(TableFormat::Grid);
        assert!(table.contains("  40.00%"), "{table}");
        assert!(table.contains("  20.00%"), "{table}");
    }

    #[test]
    fn empty_pair_reports_zero_without_dividing_by_zero() {
        let sync = Sync::new(SyncPair::new("empty", "a", "b", vec![], vec![], "k", "k"));
        assert!(sync.status_rows().iter().all(|r| r.percentage == 0.0));
        assert!(sync.status_table(TableFormat::Plain).contains("0.00%"));
    }

    #[test]
    fn blank_and_null_keys_are_absent() {
        let left = vec![
            Record::new().with("k", "a"),
            Record::new().with("k", ""),
            Record::new().with("k", json!(null)),
            Record::new().with("other", "x"),
        ];
        let right = vec![Record::new().with("k", "   "), Record::new().with("k", "a")];
        let sync = Sync::new(SyncPair::new("blank", "l", "r", left, right, "k", "k"));
        assert_eq!(sync.result().both, set(&["a"]));
        assert!(sync.result().left_only.is_empty());
        assert!(sync.result().right_only.is_empty());
    }

    #[test]
    fn numeric_and_string_keys_join() {
        let left = vec![Record::new().with("number", 3500)];
        let right = vec![Record::new().with("sVolume", "3500")];
        let sync = Sync::new(SyncPair::new(
            "mixed", "l", "r", left, right, "number", "sVolume",
        ));
        assert_eq!(sync.result().both, set(&["3500"]));
    }

    #[test]
    fn first_duplicate_wins_lookup() {
        let left = vec![
            Record::new().with("k", 1).with("label", "first"),
            Record::new().with("k", 1).with("label", "second"),
        ];
        let sync = Sync::new(SyncPair::new("dups", "l", "r", left, vec![], "k", "k"));
        let found = sync.get_record_by_key(Side::Left, "1").unwrap();
        assert_eq!(found.str_field("label"), Some("first"));
    }

    #[test]
    fn primary_key_lookup_needs_a_primary_key_field() {
        let right = vec![Record::new()
            .with("sVolume", "3500")
            .with("proceeding", "http://www.wikidata.org/entity/Q1")];
        let pair = SyncPair::new("pk", "l", "r", vec![], right, "k", "sVolume");
        let without = Sync::new(pair.clone());
        assert!(without
            .get_record_by_primary_key(Side::Right, "http://www.wikidata.org/entity/Q1")
            .is_none());

        let with = Sync::new(pair.with_primary_keys(None, Some("proceeding")));
        let found = with
            .get_record_by_primary_key(Side::Right, "http://www.wikidata.org/entity/Q1")
            .unwrap();
        assert_eq!(found.str_field("sVolume"), Some("3500"));
        assert!(with.get_record_by_key(Side::Right, "3501").is_none());
    }

    #[test]
    fn suggests_updates_for_values_missing_upstream() {
        let left = vec![
            Record::new().with("number", 1).with("urn", "urn:nbn:de:0074-1-0"),
            Record::new().with("number", 2).with("urn", "urn:nbn:de:0074-2-7"),
            Record::new().with("number", 3),
        ];
        let right = vec![
            Record::new()
                .with("sVolume", "1")
                .with("proceeding", "http://www.wikidata.org/entity/Q11"),
            Record::new()
                .with("sVolume", "2")
                .with("proceeding", "http://www.wikidata.org/entity/Q12")
                .with("urn", "urn:nbn:de:0074-2-7"),
            Record::new()
                .with("sVolume", "3")
                .with("proceeding", "http://www.wikidata.org/entity/Q13"),
        ];
        let sync = Sync::new(
            SyncPair::new("volumes", "local", "wikidata", left, right, "number", "sVolume")
                .with_primary_keys(Some("number"), Some("proceeding")),
        );
        let actions = sync.suggest_updates(
            &[PropertyMapping::new("urn", "urn", "P4109")],
            DEFAULT_UPDATE_COMMAND,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].to_string(),
            "wd add-claim Q11 P4109 \"urn:nbn:de:0074-1-0\""
        );
        assert_eq!(actions[0].key, "1");
    }

    #[test]
    fn entity_ids_are_stripped_from_uris() {
        assert_eq!(entity_id_from_uri("http://www.wikidata.org/entity/Q42"), "Q42");
        assert_eq!(entity_id_from_uri("Q42"), "Q42");
        assert_eq!(entity_id_from_uri("https://example.org/x/"), "x");
    }
}
