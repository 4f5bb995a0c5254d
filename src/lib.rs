pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod scan;

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub use config::Config;
pub use error::{ErrorKind, Result, ScanClientError};
pub use gateway::{ApiClient, DirectoryUpload, ScanGateway, ScanKind, ScanTarget};
pub use models::{ScanFinding, ScanSummary};
pub use scan::{ScanController, ScanEvent, ScanSession, SessionStatus};

pub const DEFAULT_ANTIVIRUS_URL: &str = "http://localhost:8080/api/antivirus";
pub const DEFAULT_NETWORK_SECURITY_URL: &str = "http://localhost:8080/api/network-security";
pub const CONFIG_FILE_NAME: &str = "avscan.toml";

/// The API client plus the one scan controller that drives sessions through it.
#[derive(Clone)]
pub struct AntivirusService {
    pub config: Config,
    pub client: Arc<ApiClient>,
    pub scans: Arc<ScanController<ApiClient>>,
}

impl AntivirusService {
    /// Builds the service and hands back the receiving end of its scan events.
    pub fn new(config: Config) -> Result<(Self, UnboundedReceiver<ScanEvent>)> {
        let client = Arc::new(ApiClient::new(&config)?);
        let (tx, rx) = unbounded_channel();
        let scans = Arc::new(ScanController::with_events(
            client.clone(),
            config.poll_interval(),
            tx,
        ));

        Ok((
            Self {
                config,
                client,
                scans,
            },
            rx,
        ))
    }

    pub async fn start_scan(&self, target: ScanTarget) -> Result<ScanSession> {
        self.scans.start(target).await
    }

    pub async fn stop_scan(&self) -> ScanSession {
        self.scans.stop().await
    }

    pub async fn session(&self) -> ScanSession {
        self.scans.snapshot().await
    }
}
