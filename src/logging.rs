use anyhow::{Context as _, Result};
use tracing_subscriber::{
    EnvFilter, FmtSubscriber,
    fmt::{format::FmtSpan, time::LocalTime},
};

/// Installs the global console subscriber.
///
/// `RUST_LOG` takes precedence. Without it, `default_directive` (the `log` setting of the
/// configuration) decides what is shown. Closed spans are reported, so the startup span
/// shows how long registration and binding took.
pub fn init_logging(default_directive: &str) -> Result<()> {
    let (filter, source) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, "RUST_LOG"),
        Err(_) => {
            let filter = EnvFilter::try_new(default_directive)
                .with_context(|| format!("invalid log directive {default_directive:?}"))?;
            (filter, "configuration")
        }
    };
    let directive = filter.to_string();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .pretty()
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("a global log subscriber is already installed")?;

    tracing::info!("Logging {} (from {})", directive, source);
    Ok(())
}
