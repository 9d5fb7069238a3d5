pub mod address;
pub mod cache;
pub mod config;
pub mod report;
pub mod stattrack;
pub mod trace;

use cache::CacheModel;
use config::{CacheConfiguration, Config, ConfigurationError};
use indicatif::{ProgressBar, ProgressStyle};
use stattrack::{Statistics, StatisticsCollector};
use std::path::{Path, PathBuf};
use trace::{AccessRecord, TraceError, TraceReader};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to simulate trace '{}'", path.display())]
    Trace {
        path: PathBuf,
        #[source]
        source: TraceError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A `Simulation` replays traces against one cache geometry. Every replay starts from a cold
/// cache, so nothing carries over from one trace to the next.
#[derive(Debug, Clone)]
pub struct Simulation {
    configuration: CacheConfiguration,
    show_progress: bool,
}

impl Simulation {
    pub fn build(configuration: CacheConfiguration, show_progress: bool) -> Self {
        Self {
            configuration,
            show_progress,
        }
    }

    pub fn configuration(&self) -> &CacheConfiguration {
        &self.configuration
    }

    /// Feed `records` in order to a fresh cache and collect the outcome of every access.
    ///
    /// # Errors
    ///
    /// Stops at the first record the source fails to produce and returns that error; counters
    /// gathered up to that point are discarded.
    pub fn run_records<I>(&self, records: I) -> std::result::Result<StatisticsCollector, TraceError>
    where
        I: IntoIterator<Item = std::result::Result<AccessRecord, TraceError>>,
    {
        let mut model = CacheModel::new(self.configuration);
        let mut collector = StatisticsCollector::new();
        let progress = self.progress_bar();

        for record in records {
            let record = record?;
            let result = model.probe(&record);
            collector.record(&record, &result);
            progress.inc(1);
        }

        progress.finish_and_clear();
        Ok(collector)
    }

    /// Replay the trace file at `path` against a fresh cache.
    pub fn run_trace(&self, path: &Path) -> Result<StatisticsCollector> {
        let wrap = |source: TraceError| Error::Trace {
            path: path.to_path_buf(),
            source,
        };
        info!(path = %path.display(), "replaying trace");
        let reader = TraceReader::open(path).map_err(wrap)?;
        let collector = self.run_records(reader).map_err(wrap)?;
        let stats = collector.snapshot();
        info!(
            path = %path.display(),
            accesses = stats.total_accesses,
            misses = stats.misses,
            "trace finished"
        );
        Ok(collector)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {pos} records [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar
    }
}

/// Run every trace named in `config`, printing one report per trace and, if asked for, a
/// combined report at the end.
///
/// # Errors
///
/// Fails before any trace is read if the geometry is invalid, and aborts on the first trace that
/// cannot be opened or contains a malformed line.
pub fn run_simulation(config: &Config) -> Result<()> {
    let configuration = config.geometry()?;
    debug!(?configuration, "validated cache geometry");
    let simulation = Simulation::build(configuration, config.progress);

    let mut total = Statistics::new();
    for path in &config.traces {
        let collector = simulation.run_trace(path)?;
        println!("trace: {}", path.display());
        println!("{}", collector.report(&configuration));
        total += collector.snapshot();
    }

    if config.summary {
        println!("combined over {} trace(s)", config.traces.len());
        println!("{}", report::Report::build(&configuration, &total));
    }
    Ok(())
}
