use std::path::PathBuf;

use chrono::Datelike;
use thiserror::Error;

use crate::aggregate::{ReportKind, SampleMode};

/// Largest accepted deviation multiplier.
pub const MAX_DEVIATION: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("deviation multiplier must be 0, 1 or 2, got {0}")]
    Deviation(u8),
    #[error("year {0} is out of range")]
    Year(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Fully resolved options for one run.
#[derive(Debug, Clone)]
pub struct Options {
    pub report: ReportKind,
    pub filter: bool,
    pub fingerprint: bool,
    pub sample: SampleMode,
    pub deviation: u8,
    pub year: i32,
    pub filter_dirs: Vec<PathBuf>,
    pub fingerprint_dirs: Vec<PathBuf>,
    pub recognizer_dirs: Vec<PathBuf>,
    pub seed: Option<u64>,
    pub format: OutputFormat,
}

impl Options {
    /// Defaults for `report`; only the full-message report samples by default.
    pub fn for_report(report: ReportKind) -> Self {
        Self {
            report,
            filter: true,
            fingerprint: false,
            sample: report.default_sample(),
            deviation: 0,
            year: chrono::Local::now().year(),
            filter_dirs: Vec::new(),
            fingerprint_dirs: Vec::new(),
            recognizer_dirs: Vec::new(),
            seed: None,
            format: OutputFormat::Table,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deviation > MAX_DEVIATION {
            return Err(ConfigError::Deviation(self.deviation));
        }
        if !(1..=9999).contains(&self.year) {
            return Err(ConfigError::Year(self.year));
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::for_report(ReportKind::Hash)
    }
}
