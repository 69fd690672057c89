//! Subscriber setup for binaries
//!
//! The library only emits spans and events; applications decide where they
//! go. Verbosity raises the level of this crate's targets while runtime
//! dependencies (ONNX Runtime, tract) stay at `warn` unless `-vvv`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const CRATE_TARGET: &str = "bgremove_lite";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored single-line output on stderr
    Console,
    /// Uncolored output for CI logs
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit directives; replace the verbosity mapping when set
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Level for this crate's targets: 0 warn, 1 info, 2 debug, 3+ trace
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Directives used when neither `RUST_LOG` nor an explicit filter is set
    pub fn default_directives(&self) -> String {
        let level = self.verbosity_to_filter();
        if self.verbosity >= 3 {
            level.to_string()
        } else {
            format!("warn,{CRATE_TARGET}={level}")
        }
    }

    /// `RUST_LOG`, then the explicit filter, then the verbosity mapping
    fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = match &self.env_filter {
            Some(directives) => directives.clone(),
            None => self.default_directives(),
        };
        Ok(EnvFilter::try_new(directives)?)
    }

    /// Install the global subscriber; fails if one is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let registry = Registry::default().with(self.build_filter()?);

        match self.format {
            TracingFormat::Console => registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(true)
                        .with_target(false)
                        .compact(),
                )
                .try_init()?,
            TracingFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(false)
                        .with_target(true)
                        .compact(),
                )
                .try_init()?,
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .try_init()?,
        }

        Ok(())
    }
}

/// Console subscriber at the given `-v` count
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::new().with_verbosity(verbosity).init()
}
