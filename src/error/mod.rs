mod retry;

pub use retry::{RetryPolicy, with_timeout};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// Error taxonomy for chat operations.
///
/// Transport and server failures (`Connection`, `Timeout`, `Api`) are the
/// only retryable categories. `Cancelled` is not an error condition for the
/// user; callers swallow it and reset state silently.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("operation timed out: {message}")]
    Timeout { message: String },

    #[error("server error: {message}")]
    Api { status: Option<u16>, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid input: {message}")]
    Validation { message: String },

    #[error("malformed response: {message}")]
    Format { message: String },

    #[error("illegal operation: {message}")]
    State { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

/// Classification of a `ChatError`, used for retry decisions and reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Api,
    Cancellation,
    Validation,
    Format,
    State,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Api => "api",
            ErrorKind::Cancellation => "cancellation",
            ErrorKind::Validation => "validation",
            ErrorKind::Format => "format",
            ErrorKind::State => "state",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Connection { .. } => ErrorKind::Connection,
            ChatError::Timeout { .. } => ErrorKind::Timeout,
            ChatError::Api { .. } => ErrorKind::Api,
            ChatError::Cancelled => ErrorKind::Cancellation,
            ChatError::Validation { .. } => ErrorKind::Validation,
            ChatError::Format { .. } => ErrorKind::Format,
            ChatError::State { .. } => ErrorKind::State,
            ChatError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Only transport and server failures are worth retrying. Everything
    /// else either reflects caller input, a programming error, or an
    /// explicit user decision.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Api
        )
    }

    /// Short message suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Connection { message } => {
                if message.contains("dns") || message.contains("resolve") {
                    "Could not find the server. Check the server address.".to_string()
                } else if message.contains("refused") {
                    "The server refused the connection. Is it running?".to_string()
                } else {
                    "Could not reach the server.".to_string()
                }
            }
            ChatError::Timeout { .. } => "The server took too long to respond.".to_string(),
            ChatError::Api { status, .. } => match status {
                Some(404) => "The requested model was not found on the server.".to_string(),
                Some(code) => format!("The server returned an error (HTTP {}).", code),
                None => "The server returned an error.".to_string(),
            },
            ChatError::Cancelled => "Cancelled.".to_string(),
            ChatError::Validation { message } => message.clone(),
            ChatError::Format { .. } => "The server sent a response we could not read.".to_string(),
            ChatError::State { message } => message.clone(),
            ChatError::Unknown { .. } => "Something went wrong.".to_string(),
        }
    }

    /// Recovery suggestions paired with the user message, keyed by category.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self.kind() {
            ErrorKind::Connection => vec![
                "Check that the model server is running",
                "Verify the server address in settings",
                "Check your network connection",
            ],
            ErrorKind::Timeout => vec![
                "Try again once the model has finished loading",
                "Use a smaller model or shorter prompt",
            ],
            ErrorKind::Api => vec![
                "Verify the selected model is installed on the server",
                "Check the server logs for details",
            ],
            ErrorKind::Validation => vec!["Adjust the input and try again"],
            ErrorKind::Format => vec!["Try again", "Update the model server"],
            ErrorKind::Cancellation | ErrorKind::State | ErrorKind::Unknown => {
                vec!["Try again"]
            }
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string().to_lowercase();

        if err.is_timeout() {
            return ChatError::Timeout {
                message: err.to_string(),
            };
        }
        if err.is_connect() {
            return ChatError::Connection {
                message: err.to_string().to_lowercase(),
            };
        }
        if let Some(status) = err.status() {
            return ChatError::Api {
                status: Some(status.as_u16()),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return ChatError::Format {
                message: err.to_string(),
            };
        }
        // reqwest folds DNS failures into opaque transport errors on some
        // platforms; substring-match as a last resort.
        if message.contains("dns") || message.contains("resolve") || message.contains("refused") {
            return ChatError::Connection { message };
        }

        ChatError::Unknown {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Format {
            message: err.to_string(),
        }
    }
}

/// A classified, logged failure ready to surface to the UI.
/// Derived on demand, never persisted.
#[derive(Clone, Debug)]
pub struct ErrorReport {
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
    pub suggestions: Vec<&'static str>,
    pub can_retry: bool,
}

/// Classify and log a failure, producing the report to surface.
///
/// Every error passes through here before its user-facing message is shown:
/// the correlation id in the log line is the one in the report, so a user
/// complaint can be matched to the log.
pub fn report(operation: &str, err: &ChatError) -> ErrorReport {
    let correlation_id = Uuid::new_v4();
    let kind = err.kind();

    match kind {
        ErrorKind::Cancellation => {
            // Not a failure from the user's point of view; keep it quiet.
            warn!(
                correlation_id = %correlation_id,
                operation = operation,
                "operation cancelled"
            );
        }
        _ => {
            error!(
                correlation_id = %correlation_id,
                operation = operation,
                kind = kind.as_str(),
                error = %err,
                "operation failed"
            );
        }
    }

    ErrorReport {
        correlation_id,
        timestamp: Utc::now(),
        operation: operation.to_string(),
        kind,
        message: err.user_message(),
        suggestions: err.recovery_suggestions(),
        can_retry: err.is_retryable(),
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let retryable = [
            ChatError::Connection {
                message: "refused".into(),
            },
            ChatError::Timeout {
                message: "deadline".into(),
            },
            ChatError::Api {
                status: Some(500),
                message: "boom".into(),
            },
        ];
        for err in retryable {
            assert!(err.is_retryable(), "{:?} should be retryable", err);
        }

        let not_retryable = [
            ChatError::Cancelled,
            ChatError::Validation {
                message: "empty".into(),
            },
            ChatError::Format {
                message: "bad json".into(),
            },
            ChatError::State {
                message: "busy".into(),
            },
            ChatError::Unknown { message: "?".into() },
        ];
        for err in not_retryable {
            assert!(!err.is_retryable(), "{:?} should not be retryable", err);
        }
    }

    #[test]
    fn test_connection_refinement_in_user_message() {
        let dns = ChatError::Connection {
            message: "failed to resolve host (dns error)".into(),
        };
        assert!(dns.user_message().contains("find the server"));

        let refused = ChatError::Connection {
            message: "connection refused".into(),
        };
        assert!(refused.user_message().contains("refused"));
    }

    #[test]
    fn test_report_carries_classification() {
        let err = ChatError::Api {
            status: Some(404),
            message: "model missing".into(),
        };
        let rep = report("send_message", &err);

        assert_eq!(rep.kind, ErrorKind::Api);
        assert_eq!(rep.operation, "send_message");
        assert!(rep.can_retry);
        assert!(!rep.suggestions.is_empty());
        assert!(rep.message.contains("model"));
    }
}
