use rmx_config::{LogFormat, LoggingConfig};
use rmx_core::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

/// Initialize the tracing system
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to stderr
/// so that nothing interleaves with command output on stdout.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    match config.format {
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(is_tty())
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    }
    .map_err(|e| Error::configuration(format!("failed to initialize tracing: {e}")))
}

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            Error::configuration(format!("invalid log level '{}': {e}", config.level))
        })
}

/// Check if we're running in a TTY environment
fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Create a span covering one scrape
pub fn scrape_span(collectors: usize) -> Span {
    span!(Level::INFO, "scrape", collectors = %collectors)
}
