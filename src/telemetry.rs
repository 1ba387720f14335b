//! Logging initialization
//!
//! One explicit setup call instead of ambient per-function verbosity
//! flags; per-check detail is controlled through `RUST_LOG` directives.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber: `RUST_LOG`-driven filtering with an
/// INFO default, formatted to stdout.
///
/// Safe to call more than once; only the first call installs. Test
/// binaries can therefore call it from every test.
pub fn init_logging() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
