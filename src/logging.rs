//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Binaries and tests call [`init`]
//! once to print them, filtered by `RUST_LOG`.

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init() -> Result<(), SetGlobalDefaultError> {
    install(EnvFilter::from_default_env())
}

/// Install a formatting subscriber with an explicit filter such as
/// `"planout_experiments=debug"`.
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_with_filter(filter: &str) -> Result<(), SetGlobalDefaultError> {
    install(EnvFilter::new(filter))
}

fn install(filter: EnvFilter) -> Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_with_filter("planout_experiments=debug");
        assert!(init().is_err());
    }
}
