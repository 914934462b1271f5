//! Logging setup

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Logs go to stderr so they never mix
/// with chat output on stdout.
pub fn setup_logger(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            default_level
        )
        .into()
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
