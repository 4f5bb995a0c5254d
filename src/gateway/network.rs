use crate::{
    error::{Result, Service},
    gateway::ApiClient,
    models::{
        BlockedDomain, DomainActionResponse, DomainRequest, NetworkScanResult, NetworkStatus,
        ToggleRequest,
    },
};

// None of these touch scan session state, and each one is safe to retry.
impl ApiClient {
    pub async fn network_status(&self) -> Result<NetworkStatus> {
        let request = self.http().get(self.network_security("status"));
        self.send_json(request, Service::NetworkSecurity).await
    }

    /// Runs a network security scan on the server and waits for its report.
    pub async fn scan_network(&self) -> Result<NetworkScanResult> {
        let request = self
            .http()
            .post(self.network_security("scan"))
            .json(&serde_json::json!({}));
        let result: NetworkScanResult = self.send_json(request, Service::NetworkSecurity).await?;
        log::info!(
            "network scan {}: {} threats, {} vulnerabilities",
            result.status.as_deref().unwrap_or("finished"),
            result.threats,
            result.vulnerabilities.len()
        );
        Ok(result)
    }

    pub async fn toggle_firewall(&self, enabled: bool) -> Result<()> {
        self.toggle("firewall/toggle", enabled).await
    }

    pub async fn toggle_web_protection(&self, enabled: bool) -> Result<()> {
        self.toggle("web-protection/toggle", enabled).await
    }

    pub async fn block_domain(
        &self,
        domain: &str,
        reason: Option<&str>,
    ) -> Result<DomainActionResponse> {
        self.domain_action("block", DomainRequest { domain, reason })
            .await
    }

    /// Uses `POST /unblock`, the form the backend controller actually serves.
    pub async fn unblock_domain(&self, domain: &str) -> Result<DomainActionResponse> {
        self.domain_action(
            "unblock",
            DomainRequest {
                domain,
                reason: None,
            },
        )
        .await
    }

    pub async fn blocked_domains(&self) -> Result<Vec<BlockedDomain>> {
        let request = self.http().get(self.network_security("blocked"));
        self.send_json(request, Service::NetworkSecurity).await
    }

    async fn toggle(&self, path: &str, enabled: bool) -> Result<()> {
        log::info!("setting {path} to {enabled}");
        let request = self
            .http()
            .post(self.network_security(path))
            .json(&ToggleRequest { enabled });
        self.send(request, Service::NetworkSecurity).await?;
        Ok(())
    }

    async fn domain_action(
        &self,
        path: &str,
        body: DomainRequest<'_>,
    ) -> Result<DomainActionResponse> {
        let request = self
            .http()
            .post(self.network_security(path))
            .json(&body);
        let response = self
            .send_optional_json::<DomainActionResponse>(request, Service::NetworkSecurity)
            .await?
            .unwrap_or(DomainActionResponse {
                success: true,
                ..Default::default()
            });

        if let Some(warning) = &response.warning {
            log::warn!("{path} {}: {warning}", body.domain);
        }
        Ok(response)
    }
}
