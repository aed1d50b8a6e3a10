use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise logging to stderr.
/// - `RUST_LOG` wins when set
/// - otherwise "warn,hutemp_core=info,hutemp=info", or debug with `--verbose`
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "info,hutemp_core=debug,hutemp=debug"
    } else {
        "warn,hutemp_core=info,hutemp=info"
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
