use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Every way an entitlement check can fail to produce a decision.
///
/// A denial is *not* an error: "not subscribed" is a successful resolution
/// with `granted = false`. These variants cover the cases where no decision
/// could be reached at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementError {
    #[error("Authentication missing: no credential presented")]
    AuthenticationMissing,
    #[error("Authentication invalid: {0}")]
    AuthenticationInvalid(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl EntitlementError {
    pub fn code(&self) -> &'static str {
        match self {
            EntitlementError::AuthenticationMissing => "authentication_missing",
            EntitlementError::AuthenticationInvalid(_) => "authentication_invalid",
            EntitlementError::Storage(_) => "storage_error",
            EntitlementError::InvalidResponse(_) => "invalid_response",
            EntitlementError::Network(_) => "network_error",
            EntitlementError::Cache(_) => "cache_error",
            EntitlementError::Config(_) => "config_error",
        }
    }

    /// Rebuild an error from the structured body of a non-2xx verification
    /// response.
    pub fn from_wire(code: &str, message: String) -> Self {
        match code {
            "authentication_missing" => EntitlementError::AuthenticationMissing,
            "authentication_invalid" => EntitlementError::AuthenticationInvalid(message),
            "storage_error" => EntitlementError::Storage(message),
            "invalid_response" => EntitlementError::InvalidResponse(message),
            _ => EntitlementError::Network(message),
        }
    }

    /// The principal has to sign in again; retrying the same credential is
    /// pointless.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            EntitlementError::AuthenticationMissing | EntitlementError::AuthenticationInvalid(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EntitlementError::Storage(_)
                | EntitlementError::InvalidResponse(_)
                | EntitlementError::Network(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EntitlementError::AuthenticationMissing
            | EntitlementError::AuthenticationInvalid(_) => StatusCode::UNAUTHORIZED,
            EntitlementError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            EntitlementError::InvalidResponse(_) | EntitlementError::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            EntitlementError::Cache(_) | EntitlementError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON body attached to every non-2xx response of the verification API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl IntoResponse for EntitlementError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for EntitlementError {
    fn from(err: config::ConfigError) -> Self {
        EntitlementError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for EntitlementError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EntitlementError::InvalidResponse(err.to_string())
        } else {
            EntitlementError::Network(err.to_string())
        }
    }
}

impl From<redis::RedisError> for EntitlementError {
    fn from(err: redis::RedisError) -> Self {
        EntitlementError::Cache(err.to_string())
    }
}

impl From<std::io::Error> for EntitlementError {
    fn from(err: std::io::Error) -> Self {
        EntitlementError::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_retried() {
        assert!(EntitlementError::AuthenticationMissing.is_authentication());
        assert!(!EntitlementError::AuthenticationMissing.is_retryable());
        assert!(!EntitlementError::AuthenticationInvalid("expired jwt".into()).is_retryable());
        assert!(EntitlementError::Network("timeout".into()).is_retryable());
        assert!(EntitlementError::Storage("down".into()).is_retryable());
    }

    #[test]
    fn wire_codes_map_back_to_variants() {
        for err in [
            EntitlementError::AuthenticationMissing,
            EntitlementError::AuthenticationInvalid("bad".into()),
            EntitlementError::Storage("bad".into()),
            EntitlementError::InvalidResponse("bad".into()),
            EntitlementError::Network("bad".into()),
        ] {
            let back = EntitlementError::from_wire(err.code(), "bad".into());
            assert_eq!(back.code(), err.code());
        }
        assert_eq!(
            EntitlementError::from_wire("teapot", "x".into()),
            EntitlementError::Network("x".into())
        );
    }

    #[test]
    fn storage_failure_is_service_unavailable() {
        let resp = EntitlementError::Storage("all tiers failed".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = EntitlementError::AuthenticationMissing.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
