//! Probe API module.
//!
//! The only code that speaks the remote probe-management protocol.

mod client;
mod models;

pub use client::*;
pub use models::*;

use crate::auth::TokenError;
use thiserror::Error;

/// Probe API error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid probe API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to add auth headers: {0}")]
    Auth(#[from] TokenError),
    #[error("failed to send HTTP request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to unmarshal response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to check existing probe: {0}")]
    Lookup(#[source] Box<ProbeError>),
}

impl ProbeError {
    /// HTTP status of an API error, looking through lookup wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeError::Api { status, .. } => Some(*status),
            ProbeError::Lookup(inner) => inner.status(),
            _ => None,
        }
    }

    /// The service was reached and rejected the request.
    pub fn is_api_error(&self) -> bool {
        self.status().is_some()
    }

    /// The probe service or the token issuer could not be reached at all.
    pub fn is_transport(&self) -> bool {
        match self {
            ProbeError::Transport(_) | ProbeError::Auth(TokenError::Transport(_)) => true,
            ProbeError::Lookup(inner) => inner.is_transport(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_carries_status_and_body() {
        let err = ProbeError::Api {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API request failed with status 503: upstream unavailable"
        );
        assert_eq!(err.status(), Some(503));
        assert!(err.is_api_error());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_lookup_wrapping_keeps_classification() {
        let err = ProbeError::Lookup(Box::new(ProbeError::Api {
            status: 500,
            body: "boom".to_string(),
        }));
        assert!(err.to_string().starts_with("failed to check existing probe"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_rejected_credentials_are_not_transport() {
        let err = ProbeError::from(TokenError::Status {
            status: 401,
            body: "invalid_client".to_string(),
        });
        assert!(!err.is_transport());
        assert!(!err.is_api_error());
    }

    #[test]
    fn test_auth_error_is_distinguishable() {
        let err = ProbeError::from(TokenError::EmptyToken);
        assert!(err.to_string().starts_with("failed to add auth headers"));
        assert!(!err.is_api_error());
        assert!(!err.is_transport());
    }
}
