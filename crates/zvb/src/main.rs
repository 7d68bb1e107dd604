use std::sync::Arc;

use tracing::info;

use zvb_core::{
    api::{locate::HttpLocator, HttpApiClient},
    bot::Backends,
    config::Config,
    restart::Systemctl,
};

#[tokio::main]
async fn main() -> Result<(), zvb_core::Error> {
    zvb_core::logging::init("zvb")?;

    let cfg = Arc::new(Config::load()?);
    info!(dir = %cfg.paths.dir.display(), "config loaded");

    let backends = Backends {
        api: Arc::new(HttpApiClient::new(cfg.api.clone())?),
        services: Arc::new(Systemctl::default()),
        locator: Arc::new(HttpLocator::new(cfg.ip_lookup_url.clone())?),
    };

    zvb_telegram::router::run_polling(cfg, backends)
        .await
        .map_err(|e| zvb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
