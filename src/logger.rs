use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LOG_ENV: &str = "PACEKEEPER_LOG";

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Installs the global subscriber. `PACEKEEPER_LOG` wins over `RUST_LOG`;
/// an unparsable filter falls back to the default level.
pub fn init_logging(verbose: bool) {
    let filter = std::env::var(LOG_ENV)
        .or_else(|_missing| std::env::var("RUST_LOG"))
        .map_or_else(
            |_missing| default_filter(verbose),
            |value| EnvFilter::try_new(value).unwrap_or_else(|_invalid| default_filter(verbose)),
        );

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}
