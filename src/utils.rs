#[cfg(feature = "logging")]
use crate::error::LoggingError;

/// Installs a global `tracing` subscriber printing to stderr, filtered by the
/// `RUST_LOG` environment variable (`warn` when unset).
///
/// Resolution logs its phases under the `pipeline_build` span, so
/// `RUST_LOG=tessera=debug` is usually what you want when a pipeline comes
/// out different than expected.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}
