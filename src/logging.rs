// Tracing setup for the binary

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ytgrab=info,ytgrab_lib=info";
const VERBOSE_FILTER: &str = "ytgrab=debug,ytgrab_lib=debug";

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
