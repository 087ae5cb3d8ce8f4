use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::{ClassifyError, Classifier};
use crate::record::Record;

/// Longest line kept, terminator included; longer lines are truncated.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("error while reading {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot classify {path}: {source}")]
    Classify { path: PathBuf, source: ClassifyError },
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary.
pub fn bounded(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Raw lines of one input, before classification.
#[derive(Debug, Clone, Default)]
pub struct Lines {
    pub lines: Vec<String>,
    pub size: u64,
    pub truncated: usize,
}

/// Read every line, cutting each to `MAX_LINE_LEN - 1` bytes.
pub fn read_lines<R: Read>(reader: R) -> io::Result<Lines> {
    let mut reader = BufReader::new(reader);
    let mut out = Lines::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        out.size += n as u64;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.len() > MAX_LINE_LEN - 1 {
            info!("Truncating line {}", out.lines.len());
            buf.truncate(MAX_LINE_LEN - 1);
            out.truncated += 1;
        }
        let line = String::from_utf8_lossy(&buf);
        out.lines.push(bounded(&line, MAX_LINE_LEN - 1).to_string());
    }
    if out.truncated > 0 {
        warn!(
            "{} line{} too long, truncated to {} characters",
            out.truncated,
            if out.truncated > 1 { "s" } else { "" },
            MAX_LINE_LEN - 1
        );
    }
    debug!("Read {} line{}", out.lines.len(), if out.lines.len() > 1 { "s" } else { "" });
    Ok(out)
}

/// Read a path, or stdin for `-`.
pub fn read_path(path: &Path) -> Result<Lines, InputError> {
    if path == Path::new("-") {
        debug!("Using stdin");
        return read_lines(io::stdin().lock())
            .map_err(|source| InputError::Read { path: path.to_path_buf(), source });
    }
    let file = File::open(path).map_err(|source| InputError::Open { path: path.to_path_buf(), source })?;
    debug!("Opening file: {}", path.display());
    read_lines(file).map_err(|source| InputError::Read { path: path.to_path_buf(), source })
}

/// One ingested, classified file.
#[derive(Debug, Clone)]
pub struct LogFile {
    name: String,
    size: u64,
    lines: Vec<String>,
    recognizer: String,
    records: Vec<Record>,
}

impl LogFile {
    /// Classify `lines` and parse every one of them with the chosen recognizer.
    pub fn classify(
        name: &str,
        lines: Lines,
        classifier: &mut Classifier<'_, impl rand::Rng>,
        current_year: i32,
    ) -> Result<Self, ClassifyError> {
        let recognizer = classifier.classify(&lines.lines)?;
        info!("Using recognizer \"{}\" for file {}", recognizer.name(), name);
        let records = lines
            .lines
            .iter()
            .map(|l| recognizer.parse(l, current_year))
            .collect();
        Ok(Self {
            name: name.to_string(),
            size: lines.size,
            lines: lines.lines,
            recognizer: recognizer.name().to_string(),
            records,
        })
    }

    /// Read and classify; failures are reported to the caller, who decides to skip.
    pub fn load(
        path: &Path,
        classifier: &mut Classifier<'_, impl rand::Rng>,
        current_year: i32,
    ) -> Result<Self, InputError> {
        let lines = read_path(path)?;
        let name = path.to_string_lossy();
        Self::classify(&name, lines, classifier, current_year)
            .map_err(|source| InputError::Classify { path: path.to_path_buf(), source })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final path component, as used for fingerprint markers.
    pub fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn recognizer(&self) -> &str {
        &self.recognizer
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

/// Load every path in order, logging and skipping the ones that fail.
pub fn load_all(
    paths: &[PathBuf],
    classifier: &mut Classifier<'_, impl rand::Rng>,
    current_year: i32,
) -> Vec<LogFile> {
    let mut files = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        info!("Input {}/{}: {}", i + 1, paths.len(), path.display());
        match LogFile::load(path, classifier, current_year) {
            Ok(f) => files.push(f),
            Err(e) => warn!("{e}"),
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_split_and_sized() {
        let lines = read_lines("a\nbb\n\nccc".as_bytes()).unwrap();
        assert_eq!(lines.lines, vec!["a", "bb", "", "ccc"]);
        assert_eq!(lines.size, 9);
        assert_eq!(lines.truncated, 0);
    }

    #[test]
    fn long_lines_are_truncated_not_rejected() {
        let long = "x".repeat(MAX_LINE_LEN + 100);
        let text = format!("short\n{long}\n");
        let lines = read_lines(text.as_bytes()).unwrap();
        assert_eq!(lines.lines.len(), 2);
        assert_eq!(lines.lines[1].len(), MAX_LINE_LEN - 1);
        assert_eq!(lines.truncated, 1);
    }

    #[test]
    fn truncation_never_splits_past_the_bound() {
        let text = format!("{}\u{1F600}\u{1F600}\n", "x".repeat(MAX_LINE_LEN - 2));
        let lines = read_lines(text.as_bytes()).unwrap();
        let line = &lines.lines[0];
        assert!(line.len() <= MAX_LINE_LEN - 1, "{} bytes", line.len());
        assert!(line.starts_with(&"x".repeat(MAX_LINE_LEN - 2)));
        assert_eq!(lines.truncated, 1);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = read_path(Path::new("/nonexistent/definitely/missing.log")).unwrap_err();
        assert!(matches!(err, InputError::Open { .. }));
    }
}
