//! Diagnostic logging for the publisher binaries
//!
//! Logs go to stderr; stdout carries publish results only. The level applies
//! to this workspace's crates while HTTP and runtime dependencies stay at
//! `warn`, unless `RUST_LOG` or a full directive list says otherwise.
//!
//! Each platform of a multi-platform run executes inside a `publish` span
//! carrying a `platform` field, and trace steps are logged with `platform` and
//! `step` fields. The JSON layout puts those fields at the top level of every
//! line so a run can be filtered per platform.
//!
//! ```no_run
//! use libpublisher::logging::{LogFormat, LoggingConfig};
//!
//! let mut logging = LoggingConfig::from_env();
//! logging.format = LogFormat::Json;
//! logging.init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Log output format override
pub const LOG_FORMAT_ENV: &str = "CONTENT_PUBLISHER_LOG_FORMAT";
/// Log level override
pub const LOG_LEVEL_ENV: &str = "CONTENT_PUBLISHER_LOG_LEVEL";

/// Crates whose events follow the configured level
const OWN_CRATES: [&str; 2] = ["libpublisher", "publish_post"];

/// Level for everything else (reqwest, hyper, axum)
const DEPENDENCY_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event, no colors
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line with colors and source locations
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// A bare level (`info`) or a full directive list (`libpublisher=trace,hyper=debug`)
    pub level: String,
    /// Forces `debug` for the workspace crates
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings from `CONTENT_PUBLISHER_LOG_FORMAT` and `CONTENT_PUBLISHER_LOG_LEVEL`
    ///
    /// Unset or unparseable values fall back to text format at info level.
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);

        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self::new(format, level, false)
    }

    /// Filter directives for this configuration, ignoring `RUST_LOG`
    pub fn directives(&self) -> String {
        let level = if self.verbose {
            "debug"
        } else {
            self.level.trim()
        };

        // Full directive lists are taken as written
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }

        let mut directives = DEPENDENCY_LEVEL.to_string();
        for krate in OWN_CRATES {
            directives.push_str(&format!(",{}={}", krate, level));
        }
        directives
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(self.directives()).unwrap_or_else(|_| {
                EnvFilter::new(format!("{},libpublisher=info", DEPENDENCY_LEVEL))
            })
        })
    }

    /// Install the global subscriber
    ///
    /// Only the first call in a process has an effect; later calls are ignored.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder
                .with_ansi(false)
                .with_target(false)
                .try_init(),
        };

        if installed.is_err() {
            tracing::debug!("Logging already initialized, keeping the existing subscriber");
        }
    }
}

/// Install the subscriber described by the environment
pub fn init_default() {
    LoggingConfig::from_env().init();
}
