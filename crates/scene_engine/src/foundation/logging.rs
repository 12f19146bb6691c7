//! Logging utilities
//!
//! The ECS core logs through the `log` facade. Hosts call one of the init
//! functions once at startup to install `env_logger` as the backend.

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    if env_logger::try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Initialize the logging system with a default filter
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized, ignoring level '{}'", level);
    }
}
