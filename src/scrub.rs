use std::fs;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::input::{bounded, MAX_LINE_LEN};
use crate::record::NOTHING;
use crate::search::SearchPath;

/// Longest string a scrub may produce.
pub const MAX_SCRUB_LEN: usize = MAX_LINE_LEN - 1;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("no closing delimiter {0:?}")]
    MissingDelimiter(char),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// One regex and the literal text that replaces its matches.
#[derive(Debug, Clone)]
pub struct ScrubRule {
    regex: Regex,
    replacement: String,
}

impl ScrubRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, RuleError> {
        if pattern.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        Ok(Self { regex: Regex::new(pattern)?, replacement: replacement.to_string() })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace every non-overlapping match of the rule in `current`. A match
    /// whose replacement would push the string past `MAX_SCRUB_LEN` is left as is.
    fn apply(&self, current: &str) -> String {
        let mut out = String::with_capacity(current.len());
        let mut len = current.len();
        let mut last = 0;
        for m in self.regex.find_iter(current) {
            let grown = len - m.len() + self.replacement.len();
            if grown > MAX_SCRUB_LEN {
                warn!(
                    pattern = self.regex.as_str(),
                    "string replacement longer than matched substring, cannot replace"
                );
                continue;
            }
            out.push_str(&current[last..m.start()]);
            out.push_str(&self.replacement);
            last = m.end();
            len = grown;
        }
        out.push_str(&current[last..]);
        out
    }
}

/// Ordered scrub rules for one (report, file) pair.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    rules: Vec<ScrubRule>,
    search: SearchPath,
}

impl Filter {
    pub fn new(search: SearchPath) -> Self {
        Self { rules: Vec::new(), search }
    }

    pub fn rules(&self) -> &[ScrubRule] {
        &self.rules
    }

    pub fn push(&mut self, rule: ScrubRule) {
        self.rules.push(rule);
    }

    /// Load `file_name` from the first search directory holding it. With a
    /// `fixed` replacement every line is a bare regex; otherwise lines are
    /// self-describing `/regex/replacement/`. Returns the number of rules added.
    pub fn extend(&mut self, file_name: &str, fixed: Option<&str>) -> usize {
        let Some(path) = self.search.find(file_name) else {
            return 0;
        };
        match fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                self.extend_from_str(&text, fixed, &path.display().to_string())
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read rule file");
                0
            }
        }
    }

    pub fn extend_from_str(&mut self, text: &str, fixed: Option<&str>, origin: &str) -> usize {
        let before = self.rules.len();
        for (n, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let rule = match fixed {
                Some(replacement) => ScrubRule::new(line, replacement),
                None => parse_rule_line(line).and_then(|(re, rep)| ScrubRule::new(&re, &rep)),
            };
            match rule {
                Ok(rule) => self.rules.push(rule),
                Err(RuleError::EmptyPattern) => debug!("{}:{}: empty pattern skipped", origin, n + 1),
                Err(e) => warn!("{}:{}: dropping rule {:?}: {}", origin, n + 1, line, e),
            }
        }
        let added = self.rules.len() - before;
        debug!("{} rule{} loaded from {}", added, if added == 1 { "" } else { "s" }, origin);
        added
    }

    /// Apply every rule in load order to the progressively rewritten string.
    pub fn scrub(&self, text: &str) -> String {
        let mut current = bounded(text, MAX_SCRUB_LEN).to_string();
        for rule in &self.rules {
            current = rule.apply(&current);
        }
        current
    }

    /// True when the text scrubs down to the sentinel.
    pub fn bleach(&self, text: &str) -> bool {
        self.scrub(text) == NOTHING
    }
}

fn is_delimiter(c: char) -> bool {
    !(c.is_whitespace() || c.is_alphanumeric() || c.is_control())
}

/// Split a self-describing rule `<d>regex<d>replacement<d>`.
///
/// A line that does not open with a delimiter is a bare regex replaced by the
/// sentinel. A backslash before the delimiter escapes it.
pub fn parse_rule_line(line: &str) -> Result<(String, String), RuleError> {
    let Some(delim) = line.chars().next() else {
        return Err(RuleError::EmptyPattern);
    };
    if !is_delimiter(delim) {
        return Ok((line.to_string(), NOTHING.to_string()));
    }

    let body = &line[delim.len_utf8()..];
    // keep the backslash when the delimiter means something to the regex engine
    let meta = regex::escape(&delim.to_string()) != delim.to_string();
    let (pattern, rest) = segment(body, delim, meta);
    let Some(rest) = rest else {
        return Err(RuleError::MissingDelimiter(delim));
    };

    let (replacement, closed) = segment(rest, delim, false);
    let replacement = match closed {
        Some(_) => replacement,
        None => {
            let trimmed = replacement.trim_end();
            if trimmed.is_empty() {
                NOTHING.to_string()
            } else {
                trimmed.to_string()
            }
        }
    };
    Ok((pattern, replacement))
}

/// Text up to the next unescaped `delim`, and what follows it (None if unclosed).
fn segment(s: &str, delim: char, keep_escape: bool) -> (String, Option<&str>) {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == delim {
            return (out, Some(&s[i + c.len_utf8()..]));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, next)) if next == delim => {
                    if keep_escape {
                        out.push('\\');
                    }
                    out.push(next);
                }
                Some((_, next)) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
            continue;
        }
        out.push(c);
    }
    (out, None)
}
