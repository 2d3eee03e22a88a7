//! Logging setup for processes embedding the tuning service.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a console `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to `debug` or `info` depending on `verbose`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(verbose, "tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        init_tracing(false);
        assert!(!init_tracing(true));
    }
}
