use std::path::{Path, PathBuf};

use tracing::debug;

/// Families of installed data directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Filters,
    Fingerprints,
    Recognizers,
}

impl DataKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            DataKind::Filters => "filters",
            DataKind::Fingerprints => "fingerprints",
            DataKind::Recognizers => "recognizers",
        }
    }
}

/// Ordered list of directories; earlier directories shadow later ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Caller-supplied directories first, then the installation directories.
    pub fn installed(kind: DataKind, extra: &[PathBuf]) -> Self {
        let mut dirs = extra.to_vec();
        dirs.extend(installed_dirs(kind));
        Self { dirs }
    }

    /// Exactly the given directories, nothing installed.
    pub fn from_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Path of `file_name` in the first directory that contains it.
    pub fn find(&self, file_name: &str) -> Option<PathBuf> {
        for dir in &self.dirs {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "found rule file");
                return Some(candidate);
            }
        }
        debug!(file = file_name, "rule file not found in any search directory");
        None
    }
}

fn installed_dirs(kind: DataKind) -> Vec<PathBuf> {
    let name = kind.dir_name();
    vec![
        Path::new("/var/lib/logsieve").join(name),
        Path::new("/usr/local/logsieve/var/lib").join(name),
        Path::new("/opt/logsieve/var/lib").join(name),
    ]
}
