use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Once;

use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{info, warn};

use logsieve::aggregate::{Aggregator, ReportKind, Row, SampleMode};
use logsieve::classifier::Classifier;
use logsieve::config::{Options, OutputFormat};
use logsieve::input::load_all;
use logsieve::logging::init_logging;
use logsieve::registry::Registry;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "logsieve", version, about = "Summarize log files by what is unusual in them")]
#[command(group(ArgGroup::new("mode").required(true).args(["hash", "wordcount", "daemon", "host"])))]
#[command(group(ArgGroup::new("sampling").args(["sample", "nosample", "allsample"])))]
struct Cli {
    /// Input files (`-` for stdin). Reads stdin when none are given.
    input: Vec<PathBuf>,

    /// Count normalized daemon + message lines
    #[arg(short = 'x', long = "hash")] hash: bool,
    /// Count message words
    #[arg(short = 'w', long = "wordcount")] wordcount: bool,
    /// Count daemon names
    #[arg(short = 'D', long = "daemon")] daemon: bool,
    /// Count host names
    #[arg(short = 'H', long = "host")] host: bool,

    /// Show a sample line for rows with few occurrences
    #[arg(long = "sample")] sample: bool,
    /// Always show the key
    #[arg(long = "nosample")] nosample: bool,
    /// Show a random sample line for every row
    #[arg(long = "allsample")] allsample: bool,

    /// Apply stopword filters (default)
    #[arg(long = "filter", conflicts_with = "nofilter")] filter: bool,
    /// Do not apply stopword filters
    #[arg(long = "nofilter")] nofilter: bool,
    /// Collapse files matching known fingerprints
    #[arg(long = "fingerprint")] fingerprint: bool,

    /// Only show counts more than N standard deviations from the mean
    #[arg(long = "dev", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    dev: u8,
    /// Year for lines whose timestamp carries none
    #[arg(long = "year")] year: Option<i32>,

    /// Extra directory searched for filter rules (repeatable)
    #[arg(long = "filter-dir")] filter_dir: Vec<PathBuf>,
    /// Extra directory searched for fingerprint files (repeatable)
    #[arg(long = "fingerprint-dir")] fingerprint_dir: Vec<PathBuf>,
    /// Extra directory searched for recognizer patterns (repeatable)
    #[arg(long = "recognizer-dir")] recognizer_dir: Vec<PathBuf>,

    /// Seed for every random choice, for reproducible output
    #[arg(long = "seed")] seed: Option<u64>,
    /// Output format
    #[arg(long = "format", value_enum, default_value_t = Format::Table)] format: Format,
    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)] verbose: u8,
}

impl Cli {
    fn report(&self) -> ReportKind {
        if self.wordcount {
            ReportKind::Words
        } else if self.daemon {
            ReportKind::Daemon
        } else if self.host {
            ReportKind::Host
        } else {
            ReportKind::Hash
        }
    }

    fn options(&self) -> Options {
        let mut opts = Options::for_report(self.report());
        if self.sample {
            opts.sample = SampleMode::Threshold;
        } else if self.nosample {
            opts.sample = SampleMode::None;
        } else if self.allsample {
            opts.sample = SampleMode::All;
        }
        opts.filter = !self.nofilter;
        opts.fingerprint = self.fingerprint;
        opts.deviation = self.dev;
        if let Some(year) = self.year {
            opts.year = year;
        }
        opts.filter_dirs = self.filter_dir.clone();
        opts.fingerprint_dirs = self.fingerprint_dir.clone();
        opts.recognizer_dirs = self.recognizer_dir.clone();
        opts.seed = self.seed;
        opts.format = match self.format {
            Format::Table => OutputFormat::Table,
            Format::Json => OutputFormat::Json,
        };
        opts
    }
}

fn write_rows(rows: &[Row], format: OutputFormat) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match format {
        OutputFormat::Table => {
            for row in rows {
                writeln!(out, "{row}")?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, rows)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    init_parallelism();

    let options = cli.options();
    options.validate()?;
    info!("Report: {}", options.report.name());

    let inputs = if cli.input.is_empty() { vec![PathBuf::from("-")] } else { cli.input.clone() };

    let registry = Registry::with_builtins(&options.recognizer_dirs);
    let mut classifier = Classifier::new(&registry, options.seed);
    let files = load_all(&inputs, &mut classifier, options.year);
    if files.is_empty() {
        warn!("no data");
        return Ok(());
    }

    let mut aggregator = Aggregator::new(&registry, options.clone(), &files);
    aggregator.prepare();
    if aggregator.is_empty() {
        warn!("no data");
        return Ok(());
    }

    let rows = aggregator.display();
    write_rows(&rows, options.format)
}
