use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::LoggingConfig;

impl LoggingConfig {
    /// Build the env filter: `RUST_LOG` wins, then the configured level, then `info`.
    pub fn env_filter(&self, verbose: bool) -> EnvFilter {
        let level = if verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes the file writer and must be kept alive for as long as
    /// the daemon logs.
    pub fn init_tracing(&self, verbose: bool) -> Result<Option<WorkerGuard>> {
        let console = if self.json {
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            fmt::layer().with_target(false).compact().boxed()
        };

        let (file, guard) = match &self.directory {
            Some(directory) => {
                std::fs::create_dir_all(directory)?;
                let appender = tracing_appender::rolling::daily(directory, "boltd.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(self.env_filter(verbose))
            .with(console)
            .with(file)
            .try_init()?;

        Ok(guard)
    }
}
