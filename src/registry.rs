use std::cmp::Ordering;
use std::path::PathBuf;

use tracing::debug;

use crate::recognizer::{Dialect, Recognizer};
use crate::search::{DataKind, SearchPath};

/// All recognizers known to a run, in classification order: descending
/// priority, then ascending name. Built once and only read afterwards.
#[derive(Debug)]
pub struct Registry {
    recognizers: Vec<Recognizer>,
    catch_all: usize,
}

impl Registry {
    /// The seven built-in dialects, with rule files looked up in `extra_dirs`
    /// and then the installed recognizer directories.
    pub fn with_builtins(extra_dirs: &[PathBuf]) -> Self {
        let rules = SearchPath::installed(DataKind::Recognizers, extra_dirs);
        Self::from_recognizers(
            Dialect::ALL
                .iter()
                .map(|d| Recognizer::builtin(*d, rules.clone()))
                .collect(),
        )
    }

    /// Built-ins without any rule file lookup.
    pub fn builtins_only() -> Self {
        Self::from_recognizers(
            Dialect::ALL
                .iter()
                .map(|d| Recognizer::builtin(*d, SearchPath::default()))
                .collect(),
        )
    }

    /// Any set of recognizers. The catch-all is the one named `raw`, or the
    /// lowest ranked recognizer when there is no such name.
    pub fn from_recognizers(mut recognizers: Vec<Recognizer>) -> Self {
        recognizers.sort_by(compare);
        for (i, r) in recognizers.iter().enumerate() {
            debug!("{:2}: {} ({})", i + 1, r.name(), r.priority());
        }
        let catch_all = recognizers
            .iter()
            .position(|r| r.name() == Dialect::Raw.name())
            .unwrap_or_else(|| recognizers.len().saturating_sub(1));
        Self { recognizers, catch_all }
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recognizer> {
        self.recognizers.iter()
    }

    pub fn at(&self, index: usize) -> Option<&Recognizer> {
        self.recognizers.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&Recognizer> {
        self.recognizers.iter().find(|r| r.name() == name)
    }

    pub fn catch_all(&self) -> Option<&Recognizer> {
        self.recognizers.get(self.catch_all)
    }
}

fn compare(a: &Recognizer, b: &Recognizer) -> Ordering {
    b.priority()
        .cmp(&a.priority())
        .then_with(|| a.name().cmp(b.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::Acceptance;

    #[test]
    fn builtins_are_ordered_by_priority_then_name() {
        let reg = Registry::builtins_only();
        let names: Vec<&str> = reg.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec!["securelog", "rsyslog", "syslog", "apache_access", "apache_error", "snort", "raw"]
        );
        assert_eq!(reg.catch_all().map(|r| r.name()), Some("raw"));
    }

    #[test]
    fn custom_catch_all_is_lowest_ranked() {
        let reg = Registry::from_recognizers(vec![
            Recognizer::custom("low", 1, Acceptance::General, &["."]),
            Recognizer::custom("high", 9, Acceptance::General, &["^x"]),
        ]);
        assert_eq!(reg.at(0).map(|r| r.name()), Some("high"));
        assert_eq!(reg.catch_all().map(|r| r.name()), Some("low"));
    }
}
