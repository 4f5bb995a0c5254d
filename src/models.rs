use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// `threatType` value the backend uses for files it could not scan.
pub const THREAT_TYPE_ERROR: &str = "ERROR";
/// `threatType` value the backend uses for advisory results.
pub const THREAT_TYPE_WARNING: &str = "WARNING";
/// Substring of `threatDetails` that marks the elevation sentinel.
pub const ELEVATION_MARKER: &str = "Administrator privileges required";

/// One file's scan outcome as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFinding {
    pub file_path: String,
    #[serde(default)]
    pub infected: bool,
    #[serde(default)]
    pub threat_type: Option<String>,
    #[serde(default)]
    pub threat_details: Option<String>,
    // history rows carry the persisted columns as well
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub scan_date_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
}

// depending on the server's Jackson setup timestamps arrive as ISO strings or as
// component arrays; anything we can't read is dropped rather than failing the row
fn deserialize_lenient_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<NaiveDateTime>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_local_datetime))
}

// LocalDateTime.toString() drops the seconds when they are zero
fn parse_local_datetime(s: &str) -> Option<NaiveDateTime> {
    s.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatClass {
    Clean,
    Infected,
    /// The file could not be scanned; not a malware classification.
    ScanError,
    Warning,
}

impl ScanFinding {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            infected: false,
            threat_type: None,
            threat_details: None,
            id: None,
            scan_date_time: None,
            scan_type: None,
            action_taken: None,
        }
    }

    pub fn is_scan_error(&self) -> bool {
        self.threat_type.as_deref() == Some(THREAT_TYPE_ERROR)
    }

    pub fn classify(&self) -> ThreatClass {
        if self.infected {
            ThreatClass::Infected
        } else {
            match self.threat_type.as_deref() {
                Some(THREAT_TYPE_ERROR) => ThreatClass::ScanError,
                Some(THREAT_TYPE_WARNING) => ThreatClass::Warning,
                _ => ThreatClass::Clean,
            }
        }
    }

    /// True for a `WARNING` finding whose details carry the elevation marker.
    pub fn is_elevation_warning(&self) -> bool {
        self.threat_type.as_deref() == Some(THREAT_TYPE_WARNING)
            && self
                .threat_details
                .as_deref()
                .is_some_and(|details| details.contains(ELEVATION_MARKER))
    }
}

/// The elevation sentinel is exactly one finding, and that finding is an elevation warning.
pub fn is_elevation_sentinel(findings: &[ScanFinding]) -> bool {
    matches!(findings, [only] if only.is_elevation_warning())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryScanReport {
    pub total_files: u64,
    pub infected_files: u64,
    pub skipped_files: u64,
    pub clean_files: u64,
    pub error_files: u64,
    pub results: Vec<ScanFinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub is_running: bool,
}

/// Derived counts over a completed result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total_files: usize,
    pub threats: usize,
    pub errors: usize,
    pub clean: usize,
}

impl ScanSummary {
    pub fn from_findings(findings: &[ScanFinding]) -> Self {
        let mut summary = ScanSummary {
            total_files: findings.len(),
            ..Default::default()
        };
        for finding in findings {
            if finding.infected {
                summary.threats += 1;
            }
            if finding.is_scan_error() {
                summary.errors += 1;
            } else if !finding.infected {
                summary.clean += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStatus {
    pub system_protected: bool,
    pub realtime_protection: bool,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<MemoryUsage>,
    pub disk_usage: Vec<DiskUsage>,
    pub last_update: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskUsage {
    pub name: String,
    pub total: u64,
    pub used: u64,
}

impl DiskUsage {
    /// Fraction of the disk in use, 0.0 for a disk that reports no capacity.
    pub fn used_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityControls {
    pub firewall_enabled: bool,
    pub web_protection_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkStatus {
    pub firewall_enabled: Option<bool>,
    pub web_protection_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_controls: Option<SecurityControls>,
    pub active_threats: u64,
    pub active_connections: u64,
    pub blocked_attempts: u64,
    pub blocked_domains: Vec<BlockedDomain>,
    pub recent_connections: Vec<ConnectionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl NetworkStatus {
    // older backends put the toggles at the top level, newer ones nest them
    pub fn firewall_enabled(&self) -> bool {
        self.firewall_enabled
            .or(self.security_controls.as_ref().map(|c| c.firewall_enabled))
            .unwrap_or(false)
    }

    pub fn web_protection_enabled(&self) -> bool {
        self.web_protection_enabled
            .or(self
                .security_controls
                .as_ref()
                .map(|c| c.web_protection_enabled))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockedDomain {
    pub domain: String,
    #[serde(
        deserialize_with = "deserialize_lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub blocked_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionRecord {
    pub domain: Option<String>,
    pub ip: Option<String>,
    pub protocol: Option<String>,
    pub secure: Option<bool>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainActionResponse {
    pub success: bool,
    pub message: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

/// Outcome of an on-demand network security scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkScanResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub threats: u64,
    pub vulnerabilities: Vec<NetworkVulnerability>,
    #[serde(
        deserialize_with = "deserialize_lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub scan_time: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub open_ports: Vec<String>,
    pub suspicious_connections: Vec<String>,
    pub firewall_enabled: bool,
    pub web_protection_enabled: bool,
    pub active_threats: u64,
    pub blocked_attempts: u64,
}

impl NetworkScanResult {
    pub fn is_clean(&self) -> bool {
        self.threats == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkVulnerability {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DomainRequest<'a> {
    pub domain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}
