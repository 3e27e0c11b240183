//! stderr logging for the CLI.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,studyroom_core=info";

/// Install the global subscriber. `STUDYROOM_LOG` takes precedence over
/// `RUST_LOG`; an unparsable filter falls back to the default.
pub fn init() {
    let directives = std::env::var("STUDYROOM_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
