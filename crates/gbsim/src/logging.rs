use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Crates whose events follow `--log-level`. Everything else is capped at warn.
const SIMULATOR_TARGETS: &[&str] = &[
    "gbsim",
    "gbsim_transport",
    "gbsim_frame",
    "gbsim_protocol",
    "gbsim_svc",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Ordered from least to most verbose.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Level in effect once `--verbose` is applied.
    pub fn with_verbose(self, verbose: bool) -> Self {
        if verbose {
            self.max(LogLevel::Debug)
        } else {
            self
        }
    }
}

fn simulator_targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_targets(SIMULATOR_TARGETS.iter().map(|target| (*target, level)))
        .with_default(level.min(LevelFilter::WARN))
}

/// Log to stderr with thread names, so router workers show up as
/// `gbsim-cport-N`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = simulator_targets(level);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .try_init(),
    };
}
