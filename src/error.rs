//! Error types for the interception engine.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error code carried by simulated connection failures.
pub const ECONNREFUSED: &str = "ECONNREFUSED";

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FakewebError>;

/// Errors surfaced to code issuing requests through the engine.
#[derive(Debug, Error)]
pub enum FakewebError {
    /// The network is disabled and nothing covers this request.
    #[error("FAKEWEB: Unhandled {method} request to {url}")]
    UnhandledRequest { method: String, url: String },

    /// The request target could not be turned into a URL.
    #[error("FAKEWEB: Invalid request")]
    InvalidRequest,

    /// A rule registered with `exception` was hit.
    #[error(transparent)]
    ConnectionRefused(#[from] ConnectionError),

    /// A file-backed body could not be read.
    #[error("failed to read fixture {}: {source}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    /// The caller asked for a JSON body that does not parse.
    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exceeded {limit} redirects while requesting {url}")]
    TooManyRedirects { url: String, limit: usize },

    /// A call was forwarded but no real client is attached.
    #[error("no upstream client configured for {method} request to {url}")]
    NoUpstream { method: String, url: String },
}

impl FakewebError {
    /// Whether this is a policy violation (an unhandled or invalid request).
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            FakewebError::UnhandledRequest { .. } | FakewebError::InvalidRequest
        )
    }

    /// The connection error code, if this is a simulated transport failure.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            FakewebError::ConnectionRefused(err) => Some(err.code),
            _ => None,
        }
    }
}

/// Transport-level connection failure, shaped like a refused `connect(2)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connect {code}")]
pub struct ConnectionError {
    pub code: &'static str,
    pub errno: &'static str,
    pub syscall: &'static str,
}

impl ConnectionError {
    /// A refused connection.
    pub fn refused() -> Self {
        Self {
            code: ECONNREFUSED,
            errno: ECONNREFUSED,
            syscall: "connect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_message_names_method_and_url() {
        let err = FakewebError::UnhandledRequest {
            method: "POST".to_string(),
            url: "http://www.test.com:80/".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "FAKEWEB: Unhandled POST request to http://www.test.com:80/"
        );
        assert!(err.is_policy_violation());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_connection_refused_code() {
        let err: FakewebError = ConnectionError::refused().into();
        assert_eq!(err.code(), Some("ECONNREFUSED"));
        assert_eq!(err.to_string(), "connect ECONNREFUSED");
        assert!(!err.is_policy_violation());
    }
}
