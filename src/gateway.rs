//! The seam between the scan controller and the scanning backend.
//!
//! [`ScanGateway`] is the four calls the controller needs to drive one scan
//! attempt. [`ApiClient`] implements it over HTTP and also carries the
//! read-only and network-security calls that don't touch session state.

pub mod http;
pub mod network;
pub mod upload;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{ScanFinding, ScanStatus},
};

pub use http::ApiClient;
pub use upload::{DirectoryUpload, UploadEntry};

/// What the user asked to scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanTarget {
    File(PathBuf),
    Directory(DirectoryUpload),
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    File,
    Directory,
    System,
}

impl ScanKind {
    /// File and directory scans answer with their results; a system scan runs on after the request returns.
    pub fn is_synchronous(self) -> bool {
        !matches!(self, ScanKind::System)
    }
}

impl ScanTarget {
    pub fn kind(&self) -> ScanKind {
        match self {
            ScanTarget::File(_) => ScanKind::File,
            ScanTarget::Directory(_) => ScanKind::Directory,
            ScanTarget::System => ScanKind::System,
        }
    }
}

/// What the backend said when a scan was started.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStartResult {
    /// The scan already finished and these are its findings.
    Completed(Vec<ScanFinding>),
    /// The scan is running server side. The body is kept because it may be the elevation sentinel.
    Started(Vec<ScanFinding>),
}

impl SessionStartResult {
    pub fn findings(&self) -> &[ScanFinding] {
        match self {
            SessionStartResult::Completed(findings) | SessionStartResult::Started(findings) => {
                findings
            }
        }
    }

    pub fn into_findings(self) -> Vec<ScanFinding> {
        match self {
            SessionStartResult::Completed(findings) | SessionStartResult::Started(findings) => {
                findings
            }
        }
    }
}

#[async_trait]
pub trait ScanGateway: Send + Sync + 'static {
    async fn start_scan(&self, target: &ScanTarget) -> Result<SessionStartResult>;

    /// Must be side-effect free on the server's scan state.
    async fn poll_status(&self) -> Result<ScanStatus>;

    /// Asks the server to cancel. Calling it with nothing running is not an error.
    async fn stop_scan(&self) -> Result<()>;

    async fn fetch_results(&self) -> Result<Vec<ScanFinding>>;
}
