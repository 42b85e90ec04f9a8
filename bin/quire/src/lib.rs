//! Quire CLI library.
//!
//! The command implementations behind the `quire` binary, exposed as a
//! library so they can be driven from tests and other tools.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use quire::cmd;
//!
//! // Build the site in the current directory into `dist/`
//! cmd::build::run(Path::new("."), None, Path::new("dist"), false).unwrap();
//! ```

pub mod cmd;

pub use quire_core::Config;
pub use quire_generator::{BuildStats, Builder};

/// Initialize tracing with the specified verbosity level.
///
/// `0` logs at INFO, `1` at DEBUG and `2` or more at TRACE. `RUST_LOG`
/// directives take precedence.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}
