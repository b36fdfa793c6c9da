//! Error types for the portal subsystem.

use thiserror::Error;

/// Errors that can occur while talking to the portal or interpreting its pages.
#[derive(Debug, Error, Clone)]
pub enum PortalError {
    /// The portal refused the supplied credentials
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The session is unknown, was destroyed, or was logged out server-side
    #[error("Session invalid: {reason}")]
    SessionInvalid { reason: String },

    /// The session outlived its inactivity budget
    #[error("Session expired")]
    SessionExpired,

    /// A single request exceeded the hard timeout
    #[error("Portal timed out: {url}")]
    PortalTimeout { url: String },

    /// DNS or connection failure
    #[error("Portal unreachable: {message}")]
    PortalUnreachable { message: String },

    /// Non-transient HTTP failure (non-2xx, non-5xx)
    #[error("Portal rejected request to {url} with status {status}")]
    PortalRejected { status: u16, url: String },

    /// The portal kept answering with 5xx after every retry
    #[error("Portal server error {status} from {url} after {attempts} attempts")]
    PortalServerError {
        status: u16,
        url: String,
        attempts: u32,
    },

    /// Expected postback fields were not present in the document
    #[error("Malformed document: {message}")]
    MalformedDocument { message: String },

    /// The page did not match the expected table structure
    #[error("Unexpected page shape: {message}")]
    UnexpectedPageShape { message: String },

    /// One report card cycle could not be loaded or parsed
    #[error("Report card cycle '{cycle}' failed: {source}")]
    CycleFailed {
        cycle: String,
        #[source]
        source: Box<PortalError>,
    },

    /// The requested course index is outside the course list
    #[error("Invalid course index {index} (student has {count} courses)")]
    InvalidCourseIndex { index: usize, count: usize },

    /// Caller input violated the request schema
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl PortalError {
    /// Returns true if this error means the caller has to log in again.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            PortalError::AuthenticationFailed { .. }
                | PortalError::SessionInvalid { .. }
                | PortalError::SessionExpired
        )
    }

    /// Returns true if this error is transient and the transport may retry it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortalError::PortalTimeout { .. }
                | PortalError::PortalUnreachable { .. }
                | PortalError::PortalServerError { .. }
        )
    }

    /// Returns true if this error was caused by the caller rather than the portal.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PortalError::InvalidCourseIndex { .. } | PortalError::InvalidInput { .. }
        )
    }

    pub(crate) fn session_invalid(reason: impl Into<String>) -> Self {
        PortalError::SessionInvalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn page_shape(message: impl Into<String>) -> Self {
        PortalError::UnexpectedPageShape {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        PortalError::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if err.is_timeout() {
            PortalError::PortalTimeout { url }
        } else {
            PortalError::PortalUnreachable {
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for PortalError {
    fn from(err: url::ParseError) -> Self {
        PortalError::InvalidInput {
            message: format!("bad portal URL: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reauth_classification() {
        assert!(PortalError::SessionExpired.needs_reauth());
        assert!(PortalError::session_invalid("logged out").needs_reauth());
        assert!(!PortalError::page_shape("no table").needs_reauth());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PortalError::PortalTimeout { url: "x".into() }.is_retryable());
        assert!(!PortalError::PortalRejected {
            status: 403,
            url: "x".into()
        }
        .is_retryable());
        assert!(!PortalError::invalid_input("bad").is_retryable());
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(PortalError::InvalidCourseIndex { index: 5, count: 2 }.is_caller_error());
        assert!(PortalError::invalid_input("blank username").is_caller_error());
        assert!(!PortalError::session_invalid("logged out").is_caller_error());
        assert!(!PortalError::PortalTimeout { url: "x".into() }.is_caller_error());
    }

    #[test]
    fn test_cycle_failure_names_cycle() {
        let err = PortalError::CycleFailed {
            cycle: "Cycle 2".to_string(),
            source: Box::new(PortalError::page_shape("missing grade column")),
        };
        let msg = err.to_string();
        assert!(msg.contains("Cycle 2"));
        assert!(msg.contains("missing grade column"));
    }
}
