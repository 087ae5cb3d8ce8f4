use std::fs;

use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::record::Record;
use crate::search::SearchPath;

/// Decides, from an accumulated tally, whether a recognizer owns a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// More than `threshold` sampled lines matched.
    General,
    /// At least a whole sample's worth of lines matched.
    Strict,
}

impl Acceptance {
    pub fn accepts(&self, tally: usize, threshold: usize, sample_size: usize) -> bool {
        match self {
            Acceptance::General => tally > threshold,
            Acceptance::Strict => tally >= sample_size,
        }
    }
}

/// Extra predicate on a successful match, splitting syslog from its
/// authentication sub-dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Any,
    AuthOnly,
    NotAuth,
}

impl Guard {
    fn allows(&self, caps: &Captures<'_>) -> bool {
        match self {
            Guard::Any => true,
            Guard::AuthOnly => is_auth_line(caps),
            Guard::NotAuth => !is_auth_line(caps),
        }
    }
}

fn is_auth_line(caps: &Captures<'_>) -> bool {
    let daemon = caps.name("daemon").map(|m| m.as_str()).unwrap_or_default();
    let log = caps.name("log").map(|m| m.as_str()).unwrap_or_default();
    daemon.starts_with("sshd[") || log.starts_with("pam_")
}

/// The built-in log dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Syslog,
    Rsyslog,
    ApacheAccess,
    ApacheError,
    Securelog,
    Snort,
    Raw,
}

const SYSLOG_RE: &str = r"^(?P<strmonth>[A-Z][a-z]{2}) +(?P<day>[0-9]{1,2}) +(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2}) +(?P<host>[^ ]+) +(?P<daemon>[^ ]+): +(?P<log>.*)$";

const RSYSLOG_RE: &str = r"^(?P<year>[0-9]{4})-(?P<month>[0-9]{2})-(?P<day>[0-9]{2})T(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2})(?:\.[0-9]+)?(?:Z|[-+][0-9]{2}:?[0-9]{2}) +(?P<host>[^ ]+) +(?P<daemon>[^ ]+): +(?P<log>.*)$";

// 127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326
const APACHE_ACCESS_RE: &str = r#"^(?P<host>[0-9a-fA-F:.]+) +[^ ]+ +(?P<user>[^ ]+) +\[(?P<day>[0-9]{1,2})/(?P<strmonth>[A-Z][a-z]{2})/(?P<year>[0-9]{4}):(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2}) +[-+][0-9]{4}\] +(?P<log>"[^"]*" +[0-9]{3} +(?:[0-9]+|-).*)$"#;

// [Wed Oct 11 14:32:52 2000] [error] [client 127.0.0.1] client denied by server configuration
const APACHE_ERROR_RE: &str = r"^\[(?P<strday>[A-Z][a-z]{2}) +(?P<strmonth>[A-Z][a-z]{2}) +(?P<day>[0-9]{1,2}) +(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2})(?:\.[0-9]+)? +(?P<year>[0-9]{4})\] +\[(?P<daemon>[^\]]+)\](?: +\[pid [^\]]*\])?(?: +\[client (?P<host>[^\]]+?)(?::[0-9]+)?\])? +(?P<log>.*)$";

// 08/28-12:34:56.123456 [**] [1:2003:8] MS-SQL Worm propagation attempt [**]
const SNORT_RE: &str = r"^(?P<month>[0-9]{2})/(?P<day>[0-9]{2})[-:](?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2})\.[0-9]+ +(?P<log>.*)$";

const RAW_RE: &str = r"^(?P<log>.+)$";

impl Dialect {
    pub const ALL: [Dialect; 7] = [
        Dialect::Syslog,
        Dialect::Rsyslog,
        Dialect::ApacheAccess,
        Dialect::ApacheError,
        Dialect::Securelog,
        Dialect::Snort,
        Dialect::Raw,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Syslog => "syslog",
            Dialect::Rsyslog => "rsyslog",
            Dialect::ApacheAccess => "apache_access",
            Dialect::ApacheError => "apache_error",
            Dialect::Securelog => "securelog",
            Dialect::Snort => "snort",
            Dialect::Raw => "raw",
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Dialect::Securelog => 100,
            Dialect::Syslog | Dialect::Rsyslog => 90,
            Dialect::ApacheAccess | Dialect::ApacheError => 80,
            Dialect::Snort => 70,
            Dialect::Raw => 0,
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Dialect::Syslog | Dialect::Securelog => SYSLOG_RE,
            Dialect::Rsyslog => RSYSLOG_RE,
            Dialect::ApacheAccess => APACHE_ACCESS_RE,
            Dialect::ApacheError => APACHE_ERROR_RE,
            Dialect::Snort => SNORT_RE,
            Dialect::Raw => RAW_RE,
        }
    }

    fn acceptance(&self) -> Acceptance {
        match self {
            Dialect::Securelog => Acceptance::Strict,
            _ => Acceptance::General,
        }
    }

    fn guard(&self) -> Guard {
        match self {
            Dialect::Syslog => Guard::NotAuth,
            Dialect::Securelog => Guard::AuthOnly,
            _ => Guard::Any,
        }
    }
}

/// A log dialect: how to spot its lines and how to turn them into records.
///
/// Candidate patterns are compiled on first use and cached; the first pattern
/// that matches a line (and passes the guard) is the one used to parse it.
#[derive(Debug)]
pub struct Recognizer {
    name: String,
    priority: i32,
    acceptance: Acceptance,
    guard: Guard,
    sources: Vec<String>,
    rules: SearchPath,
    compiled: OnceCell<Vec<Regex>>,
}

impl Recognizer {
    /// A built-in dialect; `rules` is searched for `<name>.patterns`.
    pub fn builtin(dialect: Dialect, rules: SearchPath) -> Self {
        Self {
            name: dialect.name().to_string(),
            priority: dialect.priority(),
            acceptance: dialect.acceptance(),
            guard: dialect.guard(),
            sources: vec![dialect.pattern().to_string()],
            rules,
            compiled: OnceCell::new(),
        }
    }

    /// A recognizer built from explicit patterns, with no rule file lookup.
    pub fn custom(name: &str, priority: i32, acceptance: Acceptance, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            priority,
            acceptance,
            guard: Guard::Any,
            sources: patterns.iter().map(|p| p.to_string()).collect(),
            rules: SearchPath::default(),
            compiled: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn acceptance(&self) -> Acceptance {
        self.acceptance
    }

    pub fn patterns(&self) -> &[Regex] {
        self.compiled.get_or_init(|| self.compile())
    }

    fn compile(&self) -> Vec<Regex> {
        let mut sources = self.sources.clone();
        if let Some(path) = self.rules.find(&format!("{}.patterns", self.name)) {
            match fs::read_to_string(&path) {
                Ok(text) => sources.extend(
                    text.lines()
                        .map(str::trim_end)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                ),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot read recognizer patterns"),
            }
        }
        let compiled: Vec<Regex> = sources
            .iter()
            .filter_map(|src| match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(recognizer = %self.name, pattern = %src, error = %e, "dropping pattern");
                    None
                }
            })
            .collect();
        debug!(recognizer = %self.name, patterns = compiled.len(), "compiled recognizer");
        compiled
    }

    /// First pattern match, without the guard.
    fn parse_captures<'l>(&self, line: &'l str) -> Option<Captures<'l>> {
        self.patterns().iter().find_map(|re| re.captures(line))
    }

    /// True when a pattern matches and the guard accepts the match. Only
    /// classification is guarded; parsing a classified file is not.
    pub fn matches(&self, line: &str) -> bool {
        self.patterns()
            .iter()
            .filter_map(|re| re.captures(line))
            .any(|caps| self.guard.allows(&caps))
    }

    /// Parse one line; lines no pattern matches become unstructured records.
    pub fn parse(&self, line: &str, current_year: i32) -> Record {
        match self.parse_captures(line) {
            Some(caps) => Record::from_captures(&caps, &self.name, current_year),
            None => Record::unstructured(line, &self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(d: Dialect) -> Recognizer {
        Recognizer::builtin(d, SearchPath::default())
    }

    #[test]
    fn acceptance_rules() {
        assert!(Acceptance::General.accepts(3, 2, 10));
        assert!(!Acceptance::General.accepts(2, 2, 10));
        assert!(!Acceptance::Strict.accepts(9, 2, 10));
        assert!(Acceptance::Strict.accepts(10, 2, 10));
    }

    #[test]
    fn syslog_and_securelog_split_on_auth_lines() {
        let syslog = builtin(Dialect::Syslog);
        let secure = builtin(Dialect::Securelog);
        let plain = "Sep  5 14:20:00 web01 cron[42]: job started";
        let ssh = "Sep  5 14:20:01 web01 sshd[77]: Accepted publickey for root";
        let pam = "Sep  5 14:20:02 web01 su: pam_unix(su:session): session opened";
        assert!(syslog.matches(plain) && !secure.matches(plain));
        assert!(secure.matches(ssh) && !syslog.matches(ssh));
        assert!(secure.matches(pam) && !syslog.matches(pam));
    }

    #[test]
    fn syslog_parse_fills_fields() {
        let rec = builtin(Dialect::Syslog).parse("Sep  5 14:20:00 web01 cron[42]: job   started", 2023);
        assert_eq!((rec.year, rec.month, rec.day), (2023, 9, 5));
        assert_eq!((rec.hour, rec.minute, rec.second), (14, 20, 0));
        assert_eq!(rec.host, "web01");
        assert_eq!(rec.daemon, "cron[42]");
        assert_eq!(rec.message, "job started");
        assert_eq!(rec.recognizer, "syslog");
    }

    #[test]
    fn rsyslog_parse_reads_year() {
        let rec = builtin(Dialect::Rsyslog)
            .parse("2024-02-03T04:05:06.123456+01:00 db1 postgres[9]: checkpoint starting", 1999);
        assert_eq!((rec.year, rec.month, rec.day), (2024, 2, 3));
        assert_eq!(rec.daemon, "postgres[9]");
        assert_eq!(rec.message, "checkpoint starting");
    }

    #[test]
    fn apache_lines_parse() {
        let access = builtin(Dialect::ApacheAccess).parse(
            r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#,
            2024,
        );
        assert_eq!(access.host, "127.0.0.1");
        assert_eq!((access.year, access.month, access.day), (2000, 10, 10));
        assert_eq!(access.message, r#""GET /apache_pb.gif HTTP/1.0" 200 2326"#);

        let error = builtin(Dialect::ApacheError).parse(
            "[Wed Oct 11 14:32:52 2000] [error] [client 127.0.0.1] client denied by server configuration",
            2024,
        );
        assert_eq!(error.daemon, "error");
        assert_eq!(error.host, "127.0.0.1");
        assert_eq!(error.message, "client denied by server configuration");
    }

    #[test]
    fn snort_parse_uses_current_year() {
        let rec = builtin(Dialect::Snort).parse("08/28-12:34:56.123456 [**] portscan [**]", 2010);
        assert_eq!((rec.year, rec.month, rec.day, rec.hour), (2010, 8, 28, 12));
        assert_eq!(rec.message, "[**] portscan [**]");
    }

    #[test]
    fn raw_matches_any_non_empty_line() {
        let raw = builtin(Dialect::Raw);
        assert!(raw.matches("anything at all"));
        assert!(!raw.matches(""));
        assert_eq!(raw.parse("  spaced   out ", 2024).message, "spaced out");
    }

    #[test]
    fn guard_only_applies_to_classification() {
        let syslog = builtin(Dialect::Syslog);
        let ssh = "Sep  5 14:21:00 web01 sshd[9]: Accepted password for root";
        assert!(!syslog.matches(ssh));
        let rec = syslog.parse(ssh, 2022);
        assert_eq!((rec.year, rec.month, rec.day), (2022, 9, 5));
        assert_eq!(rec.host, "web01");
        assert_eq!(rec.daemon, "sshd[9]");

        let rec = builtin(Dialect::Securelog).parse("Sep  5 14:21:01 web01 cron[4]: job started", 2022);
        assert_eq!(rec.daemon, "cron[4]");
        assert_eq!(rec.message, "job started");
    }

    #[test]
    fn unmatched_line_becomes_unstructured() {
        let rec = builtin(Dialect::Syslog).parse("garbage", 2024);
        assert_eq!(rec.year, crate::record::UNSTRUCTURED_YEAR);
        assert_eq!(rec.message, "garbage");
        assert!(rec.daemon.is_empty());
    }

    #[test]
    fn rule_file_adds_candidate_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("snort.patterns"),
            "^(?P<daemon>ids): (?P<log>.*)$\n\n((unclosed\n",
        )
        .unwrap();
        let snort = Recognizer::builtin(
            Dialect::Snort,
            SearchPath::from_dirs(vec![dir.path().to_path_buf()]),
        );
        assert_eq!(snort.patterns().len(), 2);
        let rec = snort.parse("ids: alert raised", 2024);
        assert_eq!(rec.daemon, "ids");
        assert_eq!(rec.message, "alert raised");
    }
}
