//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// `RUST_LOG` wins when it is set; otherwise `level` (e.g. `"info"`,
/// `"scene_engine=debug"`) is used as the filter. Calling this more than once
/// is harmless, which keeps tests and embedding applications simple.
pub fn init(level: &str) {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filter) => builder.parse_filters(&filter),
        Err(_) => builder.parse_filters(level),
    };

    if builder.try_init().is_err() {
        log::trace!("Logger already initialized, keeping existing configuration");
    }
}
