use std::borrow::Cow;
use std::fmt;

use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Options;
use crate::fingerprint::Deduplicator;
use crate::input::LogFile;
use crate::record::{Record, NOTHING};
use crate::registry::Registry;
use crate::scrub::Filter;
use crate::search::{DataKind, SearchPath};

/// Rows at or below this count show a sample line in threshold mode.
pub const SAMPLE_THRESHOLD: usize = 3;

/// Turns one record into the keys it contributes to the dictionary.
pub type KeyFn = fn(&Filter, &Record) -> Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Normalized `daemon message`.
    Hash,
    /// Individual message tokens.
    Words,
    Daemon,
    Host,
}

impl ReportKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Hash => "hash",
            ReportKind::Words => "words",
            ReportKind::Daemon => "daemon",
            ReportKind::Host => "host",
        }
    }

    pub fn default_sample(&self) -> SampleMode {
        match self {
            ReportKind::Hash => SampleMode::Threshold,
            _ => SampleMode::None,
        }
    }

    pub fn key_fn(&self) -> KeyFn {
        match self {
            ReportKind::Hash => hash_keys,
            ReportKind::Words => word_keys,
            ReportKind::Daemon => daemon_keys,
            ReportKind::Host => host_keys,
        }
    }

    /// Rule file shared by every format, replacement fixed to the sentinel.
    pub fn stopwords(&self) -> String {
        format!("{}.stopwords", self.name())
    }

    /// Self-describing rule file for one recognizer.
    pub fn dialect_stopwords(&self, recognizer: &str) -> String {
        format!("{}.{}.stopwords", self.name(), recognizer)
    }
}

fn settle(key: String) -> String {
    if key.is_empty() {
        NOTHING.to_string()
    } else {
        key
    }
}

fn hash_keys(filter: &Filter, record: &Record) -> Vec<String> {
    vec![settle(filter.scrub(&record.full_key()))]
}

fn word_keys(filter: &Filter, record: &Record) -> Vec<String> {
    let scrubbed = filter.scrub(&record.message);
    let words: Vec<String> = scrubbed
        .split([' ', '\t'])
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        vec![NOTHING.to_string()]
    } else {
        words
    }
}

fn daemon_keys(filter: &Filter, record: &Record) -> Vec<String> {
    if record.daemon.is_empty() {
        return vec![NOTHING.to_string()];
    }
    vec![settle(filter.scrub(&record.daemon))]
}

fn host_keys(filter: &Filter, record: &Record) -> Vec<String> {
    if record.host.is_empty() {
        return vec![NOTHING.to_string()];
    }
    vec![settle(filter.scrub(&record.host))]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleMode {
    /// Print the key.
    #[default]
    None,
    /// Print a sample line for rows at or below `SAMPLE_THRESHOLD`.
    Threshold,
    /// Print a random sample line for every row.
    All,
}

/// Population statistics over per-key counts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub keys: usize,
    pub total: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Stats {
    pub fn compute(counts: impl Iterator<Item = usize> + Clone) -> Self {
        let keys = counts.clone().count();
        if keys == 0 {
            return Self::default();
        }
        let total: usize = counts.clone().sum();
        let mean = total as f64 / keys as f64;
        let variance = counts.map(|c| (c as f64 - mean).powi(2)).sum::<f64>() / keys as f64;
        Self { keys, total, mean, std_dev: variance.sqrt() }
    }

    /// True when `count` lies more than `multiplier` deviations away from the mean.
    pub fn is_unusual(&self, count: usize, multiplier: u8) -> bool {
        multiplier == 0 || (count as f64 - self.mean).abs() > f64::from(multiplier) * self.std_dev
    }
}

/// One report line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub count: usize,
    pub text: String,
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:\t{}", self.count, self.text)
    }
}

type Dictionary<'a> = AHashMap<String, Vec<Cow<'a, Record>>>;

/// Filter for one file: the report-wide rules, then the recognizer-specific ones.
pub fn build_filter(report: ReportKind, recognizer: &str, options: &Options) -> Filter {
    let mut filter = Filter::new(SearchPath::installed(DataKind::Filters, &options.filter_dirs));
    if options.filter {
        filter.extend(&report.stopwords(), Some(NOTHING));
        filter.extend(&report.dialect_stopwords(recognizer), None);
    }
    filter
}

/// Counts keys across a set of classified files.
///
/// Every dictionary entry holds the records that produced its key, so an
/// entry's count is always the number of records mapped to it.
pub struct Aggregator<'a> {
    registry: &'a Registry,
    options: Options,
    files: &'a [LogFile],
    dictionary: Dictionary<'a>,
    file_keys: Vec<AHashSet<String>>,
    stats: Stats,
    rng: StdRng,
}

impl<'a> Aggregator<'a> {
    pub fn new(registry: &'a Registry, options: Options, files: &'a [LogFile]) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            registry,
            options,
            files,
            dictionary: AHashMap::new(),
            file_keys: Vec::new(),
            stats: Stats::default(),
            rng,
        }
    }

    /// Fill the dictionary, drop the sentinel bucket, collapse fingerprinted
    /// files when enabled, then compute statistics.
    pub fn prepare(&mut self) {
        self.fill();
        self.dictionary.remove(NOTHING);

        if self.options.fingerprint {
            let dedup = Deduplicator::load(self.registry, &self.options);
            let collapsed = dedup.run(self);
            info!("{} file{} collapsed by fingerprint", collapsed, if collapsed == 1 { "" } else { "s" });
        }

        self.stats = Stats::compute(self.dictionary.values().map(Vec::len));
        debug!(
            keys = self.stats.keys,
            total = self.stats.total,
            mean = self.stats.mean,
            std_dev = self.stats.std_dev,
            "dictionary statistics"
        );
    }

    fn fill(&mut self) {
        let report = self.options.report;
        let options = &self.options;
        let files: &'a [LogFile] = self.files;
        let partials: Vec<(Dictionary<'a>, AHashSet<String>)> = files
            .par_iter()
            .map(|file| fill_file(report, file, options))
            .collect();

        self.dictionary.clear();
        self.file_keys.clear();
        for (partial, keys) in partials {
            for (key, records) in partial {
                self.dictionary.entry(key).or_default().extend(records);
            }
            self.file_keys.push(keys);
        }
    }

    /// Remove every key file `index` contributed and count the file once
    /// under `key` with `representative` as its sample.
    pub fn collapse_file(&mut self, index: usize, key: String, representative: Record) {
        if let Some(keys) = self.file_keys.get(index) {
            for k in keys {
                self.dictionary.remove(k);
            }
        }
        self.dictionary.entry(key).or_default().push(Cow::Owned(representative));
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn files(&self) -> &'a [LogFile] {
        self.files
    }

    /// Distinct keys file `index` produced, sentinel excluded.
    pub fn file_keys(&self, index: usize) -> Option<&AHashSet<String>> {
        self.file_keys.get(index)
    }

    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.dictionary.keys()
    }

    pub fn count(&self, key: &str) -> Option<usize> {
        self.dictionary.get(key).map(Vec::len)
    }

    pub fn records(&self, key: &str) -> Option<&[Cow<'a, Record>]> {
        self.dictionary.get(key).map(Vec::as_slice)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Report rows by descending count, then ascending key.
    pub fn display(&mut self) -> Vec<Row> {
        let mut entries: Vec<(&String, &Vec<Cow<'a, Record>>)> = self.dictionary.iter().collect();
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        info!("Sample mode: {:?}", self.options.sample);
        let stats = self.stats;
        let multiplier = self.options.deviation;
        let sample = self.options.sample;
        let rng = &mut self.rng;

        entries
            .into_iter()
            .filter(|(_, records)| stats.is_unusual(records.len(), multiplier))
            .map(|(key, records)| {
                let count = records.len();
                let text = match sample {
                    SampleMode::None => key.clone(),
                    SampleMode::Threshold if count <= SAMPLE_THRESHOLD => records[0].message.clone(),
                    SampleMode::Threshold => key.clone(),
                    SampleMode::All => records[rng.gen_range(0..count)].message.clone(),
                };
                Row { count, text }
            })
            .collect()
    }
}

fn fill_file<'a>(report: ReportKind, file: &'a LogFile, options: &Options) -> (Dictionary<'a>, AHashSet<String>) {
    let filter = build_filter(report, file.recognizer(), options);
    let extract = report.key_fn();
    let mut dictionary: Dictionary<'a> = AHashMap::new();
    for record in file.records() {
        for key in extract(&filter, record) {
            dictionary.entry(key).or_default().push(Cow::Borrowed(record));
        }
    }
    let keys: AHashSet<String> = dictionary.keys().filter(|k| k.as_str() != NOTHING).cloned().collect();
    debug!(file = file.name(), keys = keys.len(), rules = filter.rules().len(), "filled");
    (dictionary, keys)
}
