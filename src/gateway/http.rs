use std::path::Path;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    error::{Result, ScanClientError, Service},
    gateway::{
        upload::{single_file_form, DirectoryUpload},
        ScanGateway, ScanTarget, SessionStartResult,
    },
    models::{DirectoryScanReport, ScanFinding, ScanStatus, SystemStatus},
};

/// HTTP client for the antivirus and network-security APIs.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    antivirus_url: String,
    network_security_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            antivirus_url: config.antivirus_url.trim_end_matches('/').to_string(),
            network_security_url: config
                .network_security_url
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub(crate) fn antivirus(&self, path: &str) -> String {
        format!("{}/{path}", self.antivirus_url)
    }

    pub(crate) fn network_security(&self, path: &str) -> String {
        format!("{}/{path}", self.network_security_url)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Sends the request and turns any non-success status into a normalized error.
    pub(crate) async fn send(&self, request: RequestBuilder, service: Service) -> Result<Response> {
        debug!("sending {request:?}");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("non-success response {status} from {service:?} api: {body}");
        Err(ScanClientError::from_response(status, &body, service))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        service: Service,
    ) -> Result<T> {
        let response = self.send(request, service).await?;
        Ok(response.json().await?)
    }

    /// Like `send_json` but an empty body is fine and yields `None`.
    pub(crate) async fn send_optional_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        service: Service,
    ) -> Result<Option<T>> {
        let response = self.send(request, service).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    pub async fn scan_file(&self, path: &Path) -> Result<ScanFinding> {
        let form = single_file_form(path).await?;
        let request = self.client.post(self.antivirus("scan/file")).multipart(form);
        self.send_json(request, Service::Antivirus).await
    }

    pub async fn scan_directory(&self, upload: &DirectoryUpload) -> Result<DirectoryScanReport> {
        let form = upload.to_form().await?;
        let request = self
            .client
            .post(self.antivirus("scan/directory"))
            .multipart(form);
        self.send_json(request, Service::Antivirus).await
    }

    pub async fn start_system_scan(&self) -> Result<Vec<ScanFinding>> {
        let request = self.client.post(self.antivirus("scan/system"));
        Ok(self
            .send_optional_json(request, Service::Antivirus)
            .await?
            .unwrap_or_default())
    }

    pub async fn system_scan_status(&self) -> Result<ScanStatus> {
        let request = self.client.get(self.antivirus("scan/system/status"));
        self.send_json(request, Service::Antivirus).await
    }

    pub async fn stop_system_scan(&self) -> Result<()> {
        let request = self.client.post(self.antivirus("scan/system/stop"));
        self.send(request, Service::Antivirus).await?;
        Ok(())
    }

    pub async fn scan_history(&self) -> Result<Vec<ScanFinding>> {
        let request = self.client.get(self.antivirus("history"));
        self.send_json(request, Service::Antivirus).await
    }

    pub async fn infected_files(&self) -> Result<Vec<ScanFinding>> {
        let request = self.client.get(self.antivirus("infected"));
        self.send_json(request, Service::Antivirus).await
    }

    pub async fn system_status(&self) -> Result<SystemStatus> {
        let request = self.client.get(self.antivirus("system/status"));
        self.send_json(request, Service::Antivirus).await
    }
}

#[async_trait]
impl ScanGateway for ApiClient {
    async fn start_scan(&self, target: &ScanTarget) -> Result<SessionStartResult> {
        match target {
            ScanTarget::File(path) => {
                let finding = self.scan_file(path).await?;
                Ok(SessionStartResult::Completed(vec![finding]))
            }
            ScanTarget::Directory(upload) => {
                let report = self.scan_directory(upload).await?;
                debug!(
                    "directory scan: {} files, {} infected, {} skipped",
                    report.total_files, report.infected_files, report.skipped_files
                );
                Ok(SessionStartResult::Completed(report.results))
            }
            ScanTarget::System => Ok(SessionStartResult::Started(
                self.start_system_scan().await?,
            )),
        }
    }

    async fn poll_status(&self) -> Result<ScanStatus> {
        self.system_scan_status().await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stop_system_scan().await
    }

    async fn fetch_results(&self) -> Result<Vec<ScanFinding>> {
        self.scan_history().await
    }
}
