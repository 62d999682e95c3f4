use std::sync::Arc;

use anyhow::{Context, Result};

use crate::common::config::AppConfig;
use crate::remote::{FtpConnector, RemoteConnector};
use crate::server::limit::RateLimiter;
use crate::transfer::{Relay, SourceAcquirer, StagingArea};

/// Shared, cheaply clonable handler state. Nothing in here is mutated per request
/// except the rate-limit table.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub staging: StagingArea,
    pub relay: Relay,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Production wiring: FTP connector built from `config.remote`.
    pub fn new(config: AppConfig) -> Result<Self> {
        let connector = FtpConnector::new(Arc::new(config.remote.clone()))
            .context("Failed to prepare FTP connector")?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// Same wiring with a caller-supplied remote backend.
    pub fn with_connector(config: AppConfig, remote: Arc<dyn RemoteConnector>) -> Result<Self> {
        let staging_dir = config.staging.resolved_dir();
        let staging = StagingArea::new(&staging_dir).with_context(|| {
            format!("Failed to create staging directory {}", staging_dir.display())
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("ftprelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let acquirer = SourceAcquirer::new(staging.clone(), http, config.sniff);
        let relay = Relay::new(acquirer, staging.clone(), remote);
        let limiter = RateLimiter::new(&config.server.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            staging,
            relay,
            limiter,
        })
    }
}
