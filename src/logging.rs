//! Logging setup shared by the binaries.
//!
//! Logs go to stderr so the compass display on stdout stays readable.
//! `RUST_LOG` overrides the default level.

use std::error::Error;

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}
