use reqwest::StatusCode;
use serde::Deserialize;

pub const NETWORK_MESSAGE: &str =
    "Could not connect to the server. Please check if the server is running.";
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied. Please check server configuration.";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Internal server error: The scan could not be completed. Please check server logs for details.";

#[derive(Debug, thiserror::Error)]
pub enum ScanClientError {
    #[error("{}", NETWORK_MESSAGE)]
    Network(String),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{}", ACCESS_DENIED_MESSAGE)]
    AccessDenied,

    #[error("A scan is already in progress")]
    ScanInProgress,

    #[error("Could not decode server response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("No files to scan in {0}")]
    EmptyDirectory(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Error: could not get $HOME value")]
    NoHomeDir,

    #[error("Could not serialize config")]
    ConfigSerializationFail(#[from] toml::ser::Error),

    #[error("Could not parse config file")]
    ConfigParseError(#[from] Box<figment::Error>),
}

pub type Result<T> = std::result::Result<T, ScanClientError>;

/// Coarse classification handed to whoever renders the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Rejected,
    AccessDenied,
    Local,
}

impl ScanClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanClientError::Network(_) => ErrorKind::Network,
            ScanClientError::Rejected { .. } => ErrorKind::Rejected,
            ScanClientError::AccessDenied => ErrorKind::AccessDenied,
            _ => ErrorKind::Local,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Builds the error for a non-success response. `body` is the raw response text.
    pub fn from_response(status: StatusCode, body: &str, service: Service) -> Self {
        if status == StatusCode::FORBIDDEN && service == Service::NetworkSecurity {
            return ScanClientError::AccessDenied;
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    INTERNAL_ERROR_MESSAGE.to_string()
                } else {
                    format!("Request failed with status {}", status.as_u16())
                }
            });

        ScanClientError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

impl From<reqwest::Error> for ScanClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ScanClientError::InvalidRequest(e.to_string())
        } else if e.is_decode() {
            ScanClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ScanClientError::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            // connect failures, timeouts, resets: nothing usable came back
            ScanClientError::Network(e.to_string())
        }
    }
}

/// Which backend surface a request went to; 403 only means "access denied" on one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Antivirus,
    NetworkSecurity,
}

// the backend is inconsistent about where it puts the human readable text
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    threat_details: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [self.message, self.error, self.threat_details]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(403, r#"{"message":"nope"}"#, Service::NetworkSecurity, ErrorKind::AccessDenied, ACCESS_DENIED_MESSAGE; "forbidden on network security")]
    #[test_case(403, r#"{"message":"nope"}"#, Service::Antivirus, ErrorKind::Rejected, "nope"; "forbidden elsewhere keeps server text")]
    #[test_case(400, r#"{"error":"No files provided for scanning"}"#, Service::Antivirus, ErrorKind::Rejected, "No files provided for scanning"; "error field")]
    #[test_case(400, r#"{"message":"","error":"No files provided for scanning"}"#, Service::Antivirus, ErrorKind::Rejected, "No files provided for scanning"; "blank message falls through to error")]
    #[test_case(400, r#"{"filePath":"No file","infected":false,"threatType":"ERROR","threatDetails":"No file provided or file is empty"}"#, Service::Antivirus, ErrorKind::Rejected, "No file provided or file is empty"; "finding shaped body")]
    #[test_case(500, "", Service::Antivirus, ErrorKind::Rejected, INTERNAL_ERROR_MESSAGE; "empty internal error")]
    #[test_case(404, "<html>", Service::Antivirus, ErrorKind::Rejected, "Request failed with status 404"; "non json body")]
    fn normalizes_responses(
        status: u16,
        body: &str,
        service: Service,
        kind: ErrorKind,
        message: &str,
    ) {
        let err =
            ScanClientError::from_response(StatusCode::from_u16(status).unwrap(), body, service);
        assert_eq!(err.kind(), kind);
        assert_eq!(err.message(), message);
    }

    #[test]
    fn network_errors_use_fixed_message() {
        let err = ScanClientError::Network("connection refused".into());
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.message(), NETWORK_MESSAGE);
    }
}
