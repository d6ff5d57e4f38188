use tracing_subscriber::EnvFilter;

/// Installs a compact stderr subscriber. `filter` uses `EnvFilter` syntax;
/// an unparsable filter falls back to `info`.
pub fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("[drivemove] invalid log filter {filter:?}: {err}; using info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
