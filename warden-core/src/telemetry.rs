//! Log subscriber setup for binaries and tests embedding the runtime

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_directive` (e.g. `"info"` or `"warden_core=debug"`)
/// when `RUST_LOG` is unset or invalid. Returns `false` if a global
/// subscriber was already installed, which is harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .try_init()
        .is_ok()
}
