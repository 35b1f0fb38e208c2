//! Tracing subscriber setup for hosts and tests.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"battlemap_server=debug"`).
///
/// Returns `false` if a global subscriber was already installed, which makes
/// it safe to call from every test.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("debug"));
    }
}
