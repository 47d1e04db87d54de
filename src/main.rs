use anyhow::Context as _;
use tracing::{error, info, info_span};
use waypost::{
    config::{CONFIG_ENV, Config},
    server::ProxyServer,
    upstream::Registry,
};

mod logging;

#[tokio::main]
async fn main() {
    // logging is configured from the file, so nothing is logged before it loads
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV));
    let config = match Config::load_or_default(path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("waypost: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.log) {
        eprintln!("waypost: cannot set up logging: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("failed to start reverse proxy server: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let server = {
        let _span = info_span!("waypost_startup").entered();

        let registry = Registry::new(config.services).context("invalid upstream registry")?;
        ProxyServer::bind(config.listen.as_str(), registry).await?
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("proxy server stopped");
    Ok(())
}
