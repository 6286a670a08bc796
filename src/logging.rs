use tracing_subscriber::EnvFilter;

/// Install the global subscriber.  `RUST_LOG` controls filtering (default
/// `info`); records from the `log` facade used by the library crates are
/// forwarded.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "logs-json")]
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();

    #[cfg(not(feature = "logs-json"))]
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}
