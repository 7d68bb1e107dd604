use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::warn;

use crate::{errors::Error, Result};

/// Public-facing location of this server, shown in menus and account cards.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub isp: String,
    /// Public IP address.
    #[serde(default)]
    pub query: String,
}

impl IpInfo {
    pub fn unknown() -> Self {
        Self {
            city: "N/A".to_string(),
            isp: "N/A".to_string(),
            query: "N/A".to_string(),
        }
    }
}

/// Port for the geolocation lookup. Never fails: unknown fields read `N/A`.
#[async_trait]
pub trait ServerLocator: Send + Sync {
    async fn locate(&self) -> IpInfo;
}

const CACHE_TTL: Duration = Duration::from_secs(600);

/// ip-api.com style lookup with a short timeout and a small cache.
pub struct HttpLocator {
    url: String,
    http: reqwest::Client,
    cache: Mutex<Option<(Instant, IpInfo)>>,
}

impl HttpLocator {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            cache: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<IpInfo> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::External(format!("ip lookup failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "ip lookup returned status {}",
                resp.status().as_u16()
            )));
        }
        resp.json::<IpInfo>()
            .await
            .map_err(|e| Error::External(format!("ip lookup json error: {e}")))
    }
}

#[async_trait]
impl ServerLocator for HttpLocator {
    async fn locate(&self) -> IpInfo {
        let mut cache = self.cache.lock().await;
        if let Some((at, info)) = cache.as_ref() {
            if at.elapsed() < CACHE_TTL {
                return info.clone();
            }
        }

        match self.fetch().await {
            Ok(info) => {
                *cache = Some((Instant::now(), info.clone()));
                info
            }
            Err(e) => {
                warn!(error = %e, "server location unavailable");
                IpInfo::unknown()
            }
        }
    }
}
