//! Sampled homepage availability crawl over the CEUR-WS volume list.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ceurws_core::{Homepage, Record, VolumeView};
use ceurws_storage::{
    CacheError, HomepageCache, HomepageProbe, ProbeOutcome, DEFAULT_CHECK_TIMEOUT,
    DEFAULT_READ_TIMEOUT,
};
use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::table::{Table, TableFormat};

pub const SUMMARY_HEADERS: [&str; 6] = ["#", "From", "To", "Accessible", "Total", "Percentage"];
pub const DETAILED_HEADERS: [&str; 5] = ["#", "Set", "Volume Number", "Homepage", "Is Accessible"];

/// Accessibility counts for one contiguous slot of the volume list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSetInfo {
    pub set_index: usize,
    pub from_volume: i64,
    pub to_volume: i64,
    pub accessible_count: usize,
    pub total_count: usize,
}

impl VolumeSetInfo {
    pub fn new(set_index: usize, first_volume: i64) -> Self {
        Self {
            set_index,
            from_volume: first_volume,
            to_volume: first_volume,
            accessible_count: 0,
            total_count: 0,
        }
    }

    /// Count one sampled volume; the volume range only ever widens.
    pub fn update(&mut self, volume: i64, accessible: bool) {
        self.from_volume = self.from_volume.min(volume);
        self.to_volume = self.to_volume.max(volume);
        self.total_count += 1;
        if accessible {
            self.accessible_count += 1;
        }
    }

    pub fn percentage(&self) -> Option<f64> {
        (self.total_count > 0)
            .then(|| self.accessible_count as f64 / self.total_count as f64 * 100.0)
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.set_index.to_string(),
            self.from_volume.to_string(),
            self.to_volume.to_string(),
            self.accessible_count.to_string(),
            self.total_count.to_string(),
            self.percentage()
                .map(|p| format!("{p:.2}%"))
                .unwrap_or_else(|| "N/A".to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleResult {
    pub set_index: usize,
    pub volume: i64,
    pub homepage: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct CheckerOptions {
    pub check_timeout: Duration,
    pub read_timeout: Duration,
    /// Probe even when the cache already has an answer.
    pub force_recheck: bool,
    /// Report per-volume rows instead of per-set summaries.
    pub debug: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            force_recheck: false,
            debug: false,
        }
    }
}

#[derive(Debug, Clone)]
struct VolumeEntry {
    number: i64,
    homepage: Option<String>,
}

fn volume_entries(volumes: &[Record]) -> Vec<VolumeEntry> {
    volumes
        .iter()
        .map(VolumeView::new)
        .filter(|view| view.has_homepage_field())
        .filter_map(|view| {
            let Some(number) = view.number() else {
                warn!(title = view.title(), "volume without number skipped");
                return None;
            };
            Some(VolumeEntry {
                number,
                homepage: view.homepage().map(str::to_string),
            })
        })
        .collect()
}

/// Index range sampled from slot `set_index` when `total` items are split into `set_number` slots.
///
/// Slots are `total / set_number` wide and any remainder is never sampled. With more
/// than one slot the window is centered in its slot; it never leaves the slot.
pub fn sample_window(
    total: usize,
    set_number: usize,
    set_index: usize,
    sample_size: usize,
) -> Range<usize> {
    let slot_size = total.checked_div(set_number).unwrap_or(0);
    let slot_start = set_index * slot_size;
    let slot_end = slot_start + slot_size;
    let start = if set_number > 1 {
        slot_start + slot_size.saturating_sub(sample_size) / 2
    } else {
        slot_start
    };
    start..start.saturating_add(sample_size).min(slot_end)
}

pub struct HomepageChecker<P: HomepageProbe> {
    volumes: Vec<VolumeEntry>,
    probe: P,
    cache: HomepageCache,
    cache_path: PathBuf,
    options: CheckerOptions,
    results: Vec<SampleResult>,
    set_infos: Vec<VolumeSetInfo>,
    live_probes: usize,
}

impl<P: HomepageProbe> HomepageChecker<P> {
    /// Load the homepage cache at `cache_path`; a missing file starts an empty cache.
    pub fn new(
        volumes: &[Record],
        probe: P,
        cache_path: impl Into<PathBuf>,
        options: CheckerOptions,
    ) -> Result<Self, CacheError> {
        let cache_path = cache_path.into();
        let cache = HomepageCache::load(&cache_path)?;
        Ok(Self::with_cache(volumes, probe, cache, cache_path, options))
    }

    pub fn with_cache(
        volumes: &[Record],
        probe: P,
        cache: HomepageCache,
        cache_path: impl Into<PathBuf>,
        options: CheckerOptions,
    ) -> Self {
        Self {
            volumes: volume_entries(volumes),
            probe,
            cache,
            cache_path: cache_path.into(),
            options,
            results: Vec::new(),
            set_infos: Vec::new(),
            live_probes: 0,
        }
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn cache(&self) -> &HomepageCache {
        &self.cache
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn results(&self) -> &[SampleResult] {
        &self.results
    }

    pub fn set_infos(&self) -> &[VolumeSetInfo] {
        &self.set_infos
    }

    pub fn live_probes(&self) -> usize {
        self.live_probes
    }

    /// Cached availability for `volume`, probing `url` only on a miss or a forced recheck.
    pub async fn check_availability(&mut self, url: Option<&str>, volume: i64) -> bool {
        if !self.options.force_recheck {
            if let Some(cached) = self.cache.get(&volume) {
                debug!(volume, available = cached.available, "homepage cache hit");
                return cached.available;
            }
        }

        let outcome = match url {
            Some(url) => {
                self.live_probes += 1;
                self.probe.check(url, self.options.check_timeout).await
            }
            None => ProbeOutcome::unavailable(),
        };
        if url.is_some() && !outcome.available {
            warn!(volume, url, "homepage not reachable");
        }

        let now = Utc::now();
        let refreshed = self.cache.update(&volume, |homepage| {
            let url = url.map(str::trim).filter(|u| !u.is_empty());
            if homepage.url.as_deref() != url {
                homepage.url = url.map(str::to_string);
                homepage.text = None;
            }
            homepage.record_probe(outcome.available, outcome.content_length, now);
        });
        if !refreshed {
            let mut homepage = Homepage::new(volume, url, now);
            homepage.record_probe(outcome.available, outcome.content_length, now);
            self.cache.upsert(homepage);
        }
        outcome.available
    }

    /// Sample `set_number` slots of the volume list and record availability per volume.
    ///
    /// Previous sample results are replaced. Probe failures count as unavailable
    /// and never abort the batch; only cache write errors are returned.
    pub async fn process_samples(
        &mut self,
        set_number: usize,
        sample_size: Option<usize>,
        with_save: bool,
    ) -> Result<()> {
        if set_number == 0 {
            bail!("set_number must be at least 1");
        }
        let total = self.volumes.len();
        let sample_size = sample_size.unwrap_or(total / set_number);
        let probes_before = self.live_probes;
        self.results.clear();
        self.set_infos.clear();

        for set_index in 0..set_number {
            let mut set_info: Option<VolumeSetInfo> = None;
            for pos in sample_window(total, set_number, set_index, sample_size) {
                let VolumeEntry { number, homepage } = self.volumes[pos].clone();
                let available = self.check_availability(homepage.as_deref(), number).await;
                set_info
                    .get_or_insert_with(|| VolumeSetInfo::new(set_index + 1, number))
                    .update(number, available);
                self.results.push(SampleResult {
                    set_index: set_index + 1,
                    volume: number,
                    homepage,
                    available,
                });
            }
            if let Some(set_info) = set_info {
                self.set_infos.push(set_info);
            }
        }

        info!(
            volumes = total,
            sets = self.set_infos.len(),
            sampled = self.results.len(),
            accessible = self.results.iter().filter(|r| r.available).count(),
            live_probes = self.live_probes - probes_before,
            "homepage sample processed"
        );

        if with_save {
            self.save_cache()
                .with_context(|| format!("saving {}", self.cache_path.display()))?;
        }
        Ok(())
    }

    pub fn save_cache(&self) -> Result<(), CacheError> {
        self.cache.save(&self.cache_path)
    }

    /// Fetch page text for available homepages that have none yet.
    ///
    /// Pages whose known content length exceeds `max_content_length` are skipped.
    /// Returns the number of homepages that gained text.
    pub async fn enrich_texts(&mut self, max_content_length: u64) -> usize {
        let candidates = self
            .cache
            .iter()
            .filter(|hp| hp.available && hp.text.is_none())
            .filter(|hp| hp.content_length.map_or(true, |len| len <= max_content_length))
            .filter_map(|hp| Some((hp.volume, hp.url.clone()?)))
            .collect::<Vec<_>>();

        let mut enriched = 0usize;
        for (volume, url) in candidates {
            match self.probe.extract_text(&url, self.options.read_timeout).await {
                Some(text) => {
                    self.cache.update(&volume, |hp| hp.text = Some(text));
                    enriched += 1;
                }
                None => debug!(volume, url, "no homepage text extracted"),
            }
        }
        info!(enriched, "homepage texts enriched");
        enriched
    }

    /// Uniform draw without replacement among homepages whose text is shorter than `max_text_len`.
    pub fn get_random_homepages<R: Rng + ?Sized>(
        &self,
        count: usize,
        max_text_len: usize,
        rng: &mut R,
    ) -> Vec<&Homepage> {
        let eligible = self
            .cache
            .iter()
            .filter(|hp| hp.text_len().is_some_and(|len| len < max_text_len))
            .collect::<Vec<_>>();
        eligible.choose_multiple(rng, count).copied().collect()
    }

    pub fn summary_rows(&self) -> Vec<Vec<String>> {
        self.set_infos.iter().map(VolumeSetInfo::to_row).collect()
    }

    pub fn detailed_rows(&self) -> Vec<Vec<String>> {
        self.results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                vec![
                    (i + 1).to_string(),
                    result.set_index.to_string(),
                    result.volume.to_string(),
                    result.homepage.clone().unwrap_or_default(),
                    result.available.to_string(),
                ]
            })
            .collect()
    }

    pub fn generate_summary_table(&self, format: TableFormat) -> String {
        let (headers, rows) = if self.options.debug {
            (DETAILED_HEADERS.as_slice(), self.detailed_rows())
        } else {
            (SUMMARY_HEADERS.as_slice(), self.summary_rows())
        };
        if rows.is_empty() {
            return String::new();
        }
        let mut table = Table::new(headers.iter().copied());
        for row in rows {
            table.push_row(row);
        }
        table.render(format)
    }
}
