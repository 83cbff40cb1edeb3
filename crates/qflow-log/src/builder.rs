//! Builds and installs the process-global `tracing` subscriber.

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, Writer};
use crate::error::LogError;

/// Owns resources the installed subscriber depends on (e.g. a non-blocking
/// file writer's background thread). Must be kept alive for the process
/// lifetime; dropping it may silently stop log delivery.
#[must_use = "dropping the guard may stop log output"]
pub struct LoggerGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Builds a subscriber from a [`Config`] and installs it as the process
/// default.
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Start from an explicit configuration.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build the subscriber and install it globally.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter directive is malformed, the file
    /// writer's directory can't be opened, or a subscriber is already
    /// installed.
    pub fn build(self) -> Result<LoggerGuard, LogError> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|source| LogError::Filter {
            directive: self.config.level.clone(),
            source,
        })?;

        let ansi = self.config.ansi;
        let mut file_guard = None;

        macro_rules! init_with_writer {
            ($writer:expr) => {{
                let registry = Registry::default().with(filter);
                match self.config.format {
                    Format::Pretty => {
                        let layer = tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_ansi(ansi)
                            .with_writer($writer);
                        registry.with(layer).try_init()
                    }
                    Format::Compact => {
                        let layer = tracing_subscriber::fmt::layer()
                            .compact()
                            .with_ansi(ansi)
                            .with_writer($writer);
                        registry.with(layer).try_init()
                    }
                    Format::Json => {
                        let layer = tracing_subscriber::fmt::layer()
                            .json()
                            .with_ansi(false)
                            .with_writer($writer);
                        registry.with(layer).try_init()
                    }
                }
            }};
        }

        let init_result = match &self.config.writer {
            Writer::Stdout => init_with_writer!(std::io::stdout),
            Writer::Stderr => init_with_writer!(std::io::stderr),
            Writer::File { directory } => {
                let appender = tracing_appender::rolling::daily(directory, "qflow.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);
                init_with_writer!(non_blocking)
            }
        };

        init_result.map_err(|_| LogError::AlreadyInitialized)?;

        Ok(LoggerGuard {
            _file_guard: file_guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter_directive() {
        let config = Config {
            level: "not a valid directive!!".to_string(),
            ..Config::test()
        };
        let result = LoggerBuilder::from_config(config).build();
        assert!(matches!(result, Err(LogError::Filter { .. })));
    }
}
