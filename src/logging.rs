use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global fmt subscriber. Verbosity comes from `RUST_LOG`
/// (`info` when unset), e.g. `RUST_LOG=rag_deadlock=debug` to see every
/// grant, deferral and finishing process. Safe to call more than once.
pub fn setup_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another subscriber may already be installed (e.g. by a test harness).
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
