use std::fs;
use std::path::PathBuf;

use ahash::AHashSet;
use itertools::Itertools;
use tracing::{debug, info};

use crate::aggregate::{Aggregator, SampleMode};
use crate::classifier::Classifier;
use crate::config::Options;
use crate::input::{load_all, LogFile};
use crate::record::Record;
use crate::registry::Registry;
use crate::search::{DataKind, SearchPath};

/// Extension of fingerprint reference files.
pub const FINGERPRINT_EXT: &str = "fp";

/// Share of a file's distinct keys that must be known noise for it to collapse.
pub const MATCH_RATIO: f64 = 0.31;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Examine every file.
    #[default]
    All,
    /// Stop at the first file that does not collapse.
    UntilUnmatched,
}

/// Every `.fp` file in `search`, directory by directory, each directory in name order.
pub fn fingerprint_files(search: &SearchPath) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in search.dirs() {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping fingerprint directory");
                continue;
            }
        };
        found.extend(
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == FINGERPRINT_EXT))
                .sorted(),
        );
    }
    found
}

/// Collapses files that look like previously seen noise into a single marker entry.
pub struct Deduplicator<'r> {
    registry: &'r Registry,
    reference: AHashSet<String>,
    policy: ScanPolicy,
    year: i32,
}

impl<'r> Deduplicator<'r> {
    /// Build the reference dictionary from the fingerprint directories.
    pub fn load(registry: &'r Registry, options: &Options) -> Self {
        let search = SearchPath::installed(DataKind::Fingerprints, &options.fingerprint_dirs);
        let paths = fingerprint_files(&search);
        info!("{} fingerprint file{} found", paths.len(), if paths.len() == 1 { "" } else { "s" });

        let mut classifier = Classifier::new(registry, options.seed);
        let files = load_all(&paths, &mut classifier, options.year);
        Self::from_files(registry, &files, options)
    }

    /// Reference dictionary from already classified files, aggregated with
    /// the target's report kind so keys are comparable.
    pub fn from_files(registry: &'r Registry, files: &[LogFile], options: &Options) -> Self {
        let reference_options = Options {
            filter: true,
            fingerprint: false,
            sample: SampleMode::None,
            ..options.clone()
        };
        let mut reference = Aggregator::new(registry, reference_options, files);
        reference.prepare();
        debug!(keys = reference.len(), "fingerprint reference built");
        Self::from_keys(registry, reference.keys().cloned().collect(), options.year)
    }

    pub fn from_keys(registry: &'r Registry, reference: AHashSet<String>, year: i32) -> Self {
        Self { registry, reference, policy: ScanPolicy::All, year }
    }

    pub fn policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn reference(&self) -> &AHashSet<String> {
        &self.reference
    }

    /// (distinct keys, keys also in the reference) for one file's key set.
    pub fn score(&self, keys: &AHashSet<String>) -> (usize, usize) {
        let matched = keys.iter().filter(|k| self.reference.contains(k.as_str())).count();
        (keys.len(), matched)
    }

    fn representative(&self, base_name: &str) -> Record {
        match self.registry.catch_all() {
            Some(r) => r.parse(base_name, self.year),
            None => Record::unstructured(base_name, ""),
        }
    }

    /// Collapse matching files of `target`, in file order. Returns how many collapsed.
    pub fn run(&self, target: &mut Aggregator<'_>) -> usize {
        if self.reference.is_empty() {
            debug!("empty fingerprint reference, nothing to collapse");
            return 0;
        }
        let mut collapsed = 0;
        for (index, file) in target.files().iter().enumerate() {
            let (unique, matched) = target.file_keys(index).map(|k| self.score(k)).unwrap_or((0, 0));
            let threshold = MATCH_RATIO * unique as f64;
            info!(
                "{}: {} of {} distinct keys fingerprinted, threshold {:.2}",
                file.name(),
                matched,
                unique,
                threshold
            );

            if unique > 0 && matched as f64 > threshold {
                let base = file.base_name();
                target.collapse_file(index, base.to_string(), self.representative(base));
                collapsed += 1;
            } else if self.policy == ScanPolicy::UntilUnmatched {
                break;
            }
        }
        collapsed
    }
}
