use chrono::Month;
use regex::Captures;
use serde::Serialize;

/// Sentinel meaning "nothing of interest". Keys equal to it never reach the report.
pub const NOTHING: &str = "#";

/// Year given to lines that carry no structure at all.
pub const UNSTRUCTURED_YEAR: i32 = 1900;

/// One classified log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub host: String,
    pub daemon: String,
    pub message: String,
    pub recognizer: String,
}

impl Record {
    /// Build a record from the named groups of a recognizer match.
    ///
    /// Missing `year` falls back to `current_year`, a missing `month` is taken
    /// from `strmonth` when present, and every other missing field is 1.
    pub fn from_captures(caps: &Captures<'_>, recognizer: &str, current_year: i32) -> Self {
        let number = |name: &str| -> Option<u32> {
            caps.name(name).and_then(|m| m.as_str().trim().parse::<u32>().ok())
        };
        let text = |name: &str| -> String {
            caps.name(name).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
        };

        let year = caps
            .name("year")
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(current_year);
        let month = number("month")
            .or_else(|| caps.name("strmonth").and_then(|m| month_number(m.as_str())))
            .unwrap_or(1);

        let message = match caps.name("log") {
            Some(m) => message_body(m.as_str()),
            None => message_body(caps.get(0).map(|m| m.as_str()).unwrap_or_default()),
        };

        Record {
            year,
            month,
            day: number("day").unwrap_or(1),
            hour: number("hour").unwrap_or(1),
            minute: number("minute").unwrap_or(1),
            second: number("second").unwrap_or(1),
            host: text("host"),
            daemon: text("daemon"),
            message,
            recognizer: recognizer.to_string(),
        }
    }

    /// A line the recognizer could not parse: only the message survives.
    pub fn unstructured(line: &str, recognizer: &str) -> Self {
        Record {
            year: UNSTRUCTURED_YEAR,
            month: 1,
            day: 1,
            hour: 1,
            minute: 1,
            second: 1,
            host: String::new(),
            daemon: String::new(),
            message: message_body(line),
            recognizer: recognizer.to_string(),
        }
    }

    /// Key of the full-message report: `daemon message`, or the message alone
    /// when there is no daemon.
    pub fn full_key(&self) -> String {
        if self.daemon.is_empty() {
            self.message.clone()
        } else {
            format!("{} {}", self.daemon, self.message)
        }
    }
}

/// Collapse whitespace runs to single spaces; an empty result becomes the sentinel.
pub fn message_body(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        NOTHING.to_string()
    } else {
        collapsed
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// `Jan`..`Dec` (or the full English name) to 1..12.
pub fn month_number(name: &str) -> Option<u32> {
    name.trim().parse::<Month>().ok().map(|m| m.number_from_month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn months_parse_short_names() {
        assert_eq!(month_number("Jan"), Some(1));
        assert_eq!(month_number("Sep"), Some(9));
        assert_eq!(month_number("Dec"), Some(12));
        assert_eq!(month_number("Foo"), None);
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(collapse_whitespace("  a \t b   c  "), "a b c");
        assert_eq!(message_body("   "), NOTHING);
    }

    #[test]
    fn captures_fill_defaults() {
        let re = Regex::new(r"^(?P<strmonth>[A-Z][a-z]{2}) (?P<day>\d+) (?P<log>.*)$").unwrap();
        let caps = re.captures("Mar 7 hello   world").unwrap();
        let rec = Record::from_captures(&caps, "test", 2020);
        assert_eq!(rec.year, 2020);
        assert_eq!(rec.month, 3);
        assert_eq!(rec.day, 7);
        assert_eq!(rec.hour, 1);
        assert_eq!(rec.second, 1);
        assert_eq!(rec.message, "hello world");
        assert!(rec.host.is_empty());
    }

    #[test]
    fn full_key_joins_daemon_and_message() {
        let mut rec = Record::unstructured("disk full", "raw");
        assert_eq!(rec.full_key(), "disk full");
        rec.daemon = "app".into();
        assert_eq!(rec.full_key(), "app disk full");
    }
}
