use crate::{
    gateway::ScanKind,
    models::{ScanFinding, ScanSummary},
};

pub const STOPPED_BY_USER: &str = "Scan stopped by user";
pub const ELEVATION_MESSAGE: &str =
    "This application requires administrator privileges for a full system scan.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Requesting,
    Running,
    Stopping,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Requesting, Running and Stopping all hold the controller.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionStatus::Requesting | SessionStatus::Running | SessionStatus::Stopping
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Client side view of one scan attempt.
///
/// `generation` increases with every start; completions tagged with an older
/// generation are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub generation: u64,
    pub kind: Option<ScanKind>,
    pub status: SessionStatus,
    pub progress_percent: u8,
    pub needs_elevation: bool,
    pub results: Option<Vec<ScanFinding>>,
    pub error_message: Option<String>,
    /// A stop request the server refused. The session still ends as stopped.
    pub stop_error: Option<String>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            generation: 0,
            kind: None,
            status: SessionStatus::Idle,
            progress_percent: 0,
            needs_elevation: false,
            results: None,
            error_message: None,
            stop_error: None,
        }
    }
}

impl ScanSession {
    /// Results are only handed out once the session completed.
    pub fn results(&self) -> Option<&[ScanFinding]> {
        match self.status {
            SessionStatus::Completed => self.results.as_deref(),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<ScanSummary> {
        self.results().map(ScanSummary::from_findings)
    }

    pub(crate) fn begin(&mut self, kind: ScanKind) -> u64 {
        *self = ScanSession {
            generation: self.generation + 1,
            kind: Some(kind),
            status: SessionStatus::Requesting,
            ..Default::default()
        };
        self.generation
    }

    pub(crate) fn complete(&mut self, findings: Vec<ScanFinding>) {
        self.status = SessionStatus::Completed;
        self.progress_percent = 100;
        self.results = Some(findings);
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.error_message = Some(message.into());
    }

    pub(crate) fn require_elevation(&mut self) {
        self.needs_elevation = true;
        self.results = None;
        self.fail(ELEVATION_MESSAGE);
    }
}
