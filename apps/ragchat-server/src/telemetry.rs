use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=info,lance=warn,lancedb=warn";

/// Console logging filtered by `RUST_LOG`. Safe to call more than once.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).compact().try_init();
}
