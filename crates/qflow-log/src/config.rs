//! Logging configuration and environment/preset construction.

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-oriented, multi-line, colorized when writing to a tty.
    Pretty,
    /// Single-line, human-oriented, no color.
    Compact,
    /// One JSON object per line — the format node-to-node log shipping uses.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone)]
pub enum Writer {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// Rolling file under the given directory, prefix `qflow.log`.
    File {
        /// Directory the rotated files are written into.
        directory: String,
    },
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// An `EnvFilter` directive string, e.g. `"qflow_execution=debug,info"`.
    pub level: String,
    /// Output encoding.
    pub format: Format,
    /// Output target.
    pub writer: Writer,
    /// Whether to colorize `Pretty`/`Compact` output. Ignored for `Json`.
    pub ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            writer: Writer::Stdout,
            ansi: true,
        }
    }
}

impl Config {
    /// Read `QFLOW_LOG` (falling back to `RUST_LOG`) for the filter string,
    /// and `QFLOW_LOG_FORMAT` (`pretty`/`json`/`compact`) for the format.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("QFLOW_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("QFLOW_LOG_FORMAT") {
            config.format = match format.to_lowercase().as_str() {
                "pretty" => Format::Pretty,
                "json" => Format::Json,
                _ => Format::Compact,
            };
        }

        config
    }

    /// Verbose, colorized, human-oriented — for a node run from a terminal.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            ansi: true,
            ..Self::default()
        }
    }

    /// JSON on stdout at info level — for a node run under a supervisor that
    /// ships logs onward.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            ansi: false,
            ..Self::default()
        }
    }

    /// Trace level, uncolored, for capture in test output.
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            ansi: false,
            ..Self::default()
        }
    }
}
