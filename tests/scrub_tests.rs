use std::fs;

use logsieve::aggregate::{build_filter, ReportKind};
use logsieve::config::Options;
use logsieve::record::Record;
use logsieve::scrub::{Filter, ScrubRule};
use logsieve::search::SearchPath;
use tempfile::tempdir;

fn filter_in(dir: &std::path::Path) -> Filter {
    Filter::new(SearchPath::from_dirs(vec![dir.to_path_buf()]))
}

#[test]
fn self_describing_rule_scrubs_full_key() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hash.syslog.stopwords"), "/ERROR .*$/ERROR/\n").unwrap();
    let mut filter = filter_in(dir.path());
    assert_eq!(filter.extend("hash.syslog.stopwords", None), 1);

    let record = Record {
        daemon: "app".to_string(),
        host: "host".to_string(),
        ..Record::unstructured("ERROR disk full", "syslog")
    };
    assert_eq!(filter.scrub(&record.full_key()), "app ERROR");
}

#[test]
fn clean_text_is_unchanged() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hash.stopwords"), "[0-9]+\n0x[0-9a-f]+\n").unwrap();
    let mut filter = filter_in(dir.path());
    assert_eq!(filter.extend("hash.stopwords", Some("#")), 2);
    let text = "session opened for user deploy";
    assert_eq!(filter.scrub(text), text);
}

#[test]
fn match_everything_always_bleaches() {
    let mut filter = Filter::default();
    filter.push(ScrubRule::new(".*", "#").unwrap());
    for text in ["", "a", "kernel: oops at 0xdeadbeef", "   "] {
        assert!(filter.bleach(text), "{text:?}");
    }
}

#[test]
fn shrinking_rules_never_grow_the_string() {
    let mut filter = Filter::default();
    filter.push(ScrubRule::new("[0-9]+", "N").unwrap());
    filter.push(ScrubRule::new("[a-f0-9]{8,}", "H").unwrap());
    for text in ["pid 12345 exited", "id deadbeefcafe 7 9", "nothing here"] {
        assert!(filter.scrub(text).len() <= text.len());
    }
    assert_eq!(filter.scrub("pid 12345 exited"), "pid N exited");
}

#[test]
fn rules_apply_to_the_rewritten_string() {
    let mut filter = Filter::default();
    filter.push(ScrubRule::new("[0-9]+", "NUM").unwrap());
    filter.push(ScrubRule::new("port NUM", "port").unwrap());
    assert_eq!(filter.scrub("connect to port 8080 ok"), "connect to port ok");
}

#[test]
fn replacement_is_literal() {
    let mut filter = Filter::default();
    filter.push(ScrubRule::new("(a)", "$1$1").unwrap());
    assert_eq!(filter.scrub("cat"), "c$1$1t");
}

#[test]
fn oversized_replacement_is_skipped_and_scrubbing_continues() {
    let mut filter = Filter::default();
    filter.push(ScrubRule::new("x", &"y".repeat(5000)).unwrap());
    filter.push(ScrubRule::new("[0-9]", "#").unwrap());
    assert_eq!(filter.scrub("x 1"), "x #");
}

#[test]
fn type_wide_rules_load_first_and_win() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hash.stopwords"), "disk\n").unwrap();
    fs::write(dir.path().join("hash.syslog.stopwords"), "/disk/DISK/\n").unwrap();
    let options = Options { filter_dirs: vec![dir.path().to_path_buf()], ..Options::for_report(ReportKind::Hash) };

    let filter = build_filter(ReportKind::Hash, "syslog", &options);
    assert_eq!(filter.rules().len(), 2);
    assert_eq!(filter.rules()[0].replacement(), "#");
    assert_eq!(filter.rules()[1].replacement(), "DISK");
    assert_eq!(filter.scrub("app disk full"), "app # full");
}

#[test]
fn disabled_filter_loads_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("hash.stopwords"), "disk\n").unwrap();
    let options = Options {
        filter: false,
        filter_dirs: vec![dir.path().to_path_buf()],
        ..Options::for_report(ReportKind::Hash)
    };
    assert!(build_filter(ReportKind::Hash, "syslog", &options).rules().is_empty());
}

#[test]
fn missing_rule_file_is_not_an_error() {
    let dir = tempdir().unwrap();
    let mut filter = filter_in(dir.path());
    assert_eq!(filter.extend("words.stopwords", Some("#")), 0);
    assert!(filter.rules().is_empty());
}

#[test]
fn bad_lines_drop_only_themselves() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("hash.raw.stopwords"),
        "/[unclosed/x/\n/abc\n\n//empty/\n/ok/y/\n|a\\|b|pipe|\n",
    )
    .unwrap();
    let mut filter = filter_in(dir.path());
    assert_eq!(filter.extend("hash.raw.stopwords", None), 2);
    assert_eq!(filter.scrub("ok a|b"), "y pipe");
}

#[test]
fn first_directory_holding_the_file_wins() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(first.path().join("hash.stopwords"), "a\n").unwrap();
    fs::write(second.path().join("hash.stopwords"), "b\n").unwrap();
    let mut filter = Filter::new(SearchPath::from_dirs(vec![first.path().to_path_buf(), second.path().to_path_buf()]));
    assert_eq!(filter.extend("hash.stopwords", Some("#")), 1);
    assert_eq!(filter.scrub("ab"), "#b");
}
