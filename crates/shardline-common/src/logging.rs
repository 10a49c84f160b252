//! Logging configuration and initialization
//!
//! Every Shardline binary installs its `tracing` subscriber through this
//! module. Console output goes to stderr so that reports printed on stdout stay
//! machine readable; file output rotates daily through `tracing-appender`.
//!
//! Library code never initializes logging; it only emits events with
//! structured fields:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! # let (shard, committed, chunk) = ("ds_0", 100usize, 3usize);
//! info!(shard = %shard, committed, "Shard job completed");
//! warn!(shard = %shard, chunk, "Chunk rolled back");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use shardline_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::console(LogLevel::Warn)
//!         .with_filter("sqlx=warn")
//!         .merge_vars(|key| std::env::var(key).ok())?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub const ENV_LEVEL: &str = "LOG_LEVEL";
pub const ENV_OUTPUT: &str = "LOG_OUTPUT";
pub const ENV_FORMAT: &str = "LOG_FORMAT";
pub const ENV_DIR: &str = "LOG_DIR";
pub const ENV_FILE_PREFIX: &str = "LOG_FILE_PREFIX";
/// Extra `EnvFilter` directives, comma separated
pub const ENV_FILTER: &str = "LOG_FILTER";
pub const ENV_INCLUDE_LOCATION: &str = "LOG_INCLUDE_LOCATION";
pub const ENV_INCLUDE_THREAD_IDS: &str = "LOG_INCLUDE_THREAD_IDS";
pub const ENV_INCLUDE_TARGETS: &str = "LOG_INCLUDE_TARGETS";

/// Match `raw` case-insensitively against a table of accepted spellings
fn parse_choice<T: Copy>(what: &str, raw: &str, choices: &[(&str, T)]) -> Result<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    match choices.iter().find(|(name, _)| *name == wanted) {
        Some((_, value)) => Ok(*value),
        None => bail!("Invalid {}: '{}'", what, raw),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    parse_choice(
        name,
        raw,
        &[
            ("true", true),
            ("1", true),
            ("yes", true),
            ("on", true),
            ("false", false),
            ("0", false),
            ("no", false),
            ("off", false),
        ],
    )
}

/// Minimum severity that gets through the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log level",
            s,
            &[
                ("trace", LogLevel::Trace),
                ("debug", LogLevel::Debug),
                ("info", LogLevel::Info),
                ("warn", LogLevel::Warn),
                ("warning", LogLevel::Warn),
                ("error", LogLevel::Error),
            ],
        )
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// stderr only
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn writes_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log output",
            s,
            &[
                ("console", LogOutput::Console),
                ("stderr", LogOutput::Console),
                ("file", LogOutput::File),
                ("both", LogOutput::Both),
                ("all", LogOutput::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log format",
            s,
            &[
                ("text", LogFormat::Text),
                ("pretty", LogFormat::Text),
                ("json", LogFormat::Json),
            ],
        )
    }
}

/// Subscriber settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Used only when `output` includes files
    pub log_dir: PathBuf,
    /// Daily files are named `<prefix>.<date>`
    pub log_file_prefix: String,
    /// e.g. `sqlx=warn,shardline_core=debug`
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "shardline".to_string(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// stderr logging at `level`
    pub fn console(level: LogLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Add daily rotated files under `dir`, keeping console output
    pub fn with_file(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.log_dir = dir.into();
        self.log_file_prefix = prefix.into();
        self.output = LogOutput::Both;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter_directives = Some(directives.into());
        self
    }

    /// Defaults refined by the `LOG_*` process environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_vars(|key| std::env::var(key).ok())
    }

    /// Override the fields whose `LOG_*` variable `lookup` finds
    ///
    /// Absent variables leave the field alone; malformed values are errors.
    pub fn merge_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LEVEL) {
            self.level = level.parse()?;
        }
        if let Some(output) = lookup(ENV_OUTPUT) {
            self.output = output.parse()?;
        }
        if let Some(format) = lookup(ENV_FORMAT) {
            self.format = format.parse()?;
        }
        if let Some(dir) = lookup(ENV_DIR) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = lookup(ENV_FILE_PREFIX) {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = lookup(ENV_FILTER) {
            self.filter_directives = Some(filter);
        }

        for (name, flag) in [
            (ENV_INCLUDE_LOCATION, &mut self.include_location),
            (ENV_INCLUDE_THREAD_IDS, &mut self.include_thread_ids),
            (ENV_INCLUDE_TARGETS, &mut self.include_targets),
        ] {
            if let Some(raw) = lookup(name) {
                *flag = parse_flag(name, &raw)?;
            }
        }

        Ok(self)
    }

    /// `RUST_LOG`, then the configured level, then extra directives
    fn filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(LevelFilter::from(self.level).into());

        let directives = self.filter_directives.as_deref().unwrap_or_default();
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed = directive
                .parse()
                .with_context(|| format!("Invalid filter directive '{}'", directive))?;
            filter = filter.add_directive(parsed);
        }

        Ok(filter)
    }
}

/// Keeps the non-blocking file writer alive
///
/// Dropping the guard flushes buffered file output, so binaries hold it for
/// the lifetime of `main`.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber described by `config`
///
/// Fails when a subscriber is already installed or a directive is invalid.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.output.writes_console() {
        layers.push(fmt_layer(config, std::io::stderr, true));
    }

    if config.output.writes_file() {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(fmt_layer(config, non_blocking, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard { _file: file_guard })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_level_spellings() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!(" warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid log level: 'loud'");
    }

    #[test]
    fn test_level_filter_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::INFO);
    }

    #[test]
    fn test_output_and_format_spellings() {
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert!("all".parse::<LogOutput>().unwrap().writes_file());
        assert!(!LogOutput::File.writes_console());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_merge_vars_keeps_absent_fields() {
        let config = LogConfig::console(LogLevel::Warn)
            .with_file("/tmp/shardline-logs", "shardline-test")
            .merge_vars(vars(&[(ENV_FORMAT, "json"), (ENV_INCLUDE_THREAD_IDS, "yes")]))
            .unwrap();

        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.output, LogOutput::Both);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_file_prefix, "shardline-test");
        assert!(config.include_thread_ids);
        assert!(config.include_targets);
    }

    #[test]
    fn test_merge_vars_rejects_malformed_values() {
        assert!(LogConfig::default().merge_vars(vars(&[(ENV_LEVEL, "nope")])).is_err());

        let err = LogConfig::default()
            .merge_vars(vars(&[(ENV_INCLUDE_LOCATION, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_INCLUDE_LOCATION));
    }

    #[test]
    fn test_filter_directives() {
        let config = LogConfig::default().with_filter("sqlx=warn, shardline_core=debug,");
        assert!(config.filter().is_ok());

        let broken = LogConfig::default().with_filter("shardline_core=verbose");
        assert!(broken.filter().is_err());
    }
}
