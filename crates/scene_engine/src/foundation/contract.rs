//! Contract violation reporting
//!
//! Programming errors (operating on a deleted entity, registering a duplicate
//! name, configuring a misaligned storage stride) are not runtime conditions
//! the caller can recover from. They are logged with context and the current
//! thread panics.

/// Log a contract violation and abort the current operation.
#[track_caller]
pub fn violation(message: impl AsRef<str>) -> ! {
    let message = message.as_ref();
    let location = std::panic::Location::caller();
    log::error!("Contract violation at {}: {}", location, message);
    panic!("contract violation: {message}");
}

/// Assert a contract condition, reporting a violation when it does not hold.
#[track_caller]
pub fn require(condition: bool, message: impl FnOnce() -> String) {
    if !condition {
        violation(message());
    }
}
