use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{error, warn};

use crate::{
    types::{EntitlementDecision, VerifyResponse},
    utils::error::{EntitlementError, ErrorBody},
};

/// Client end of the verification boundary.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self) -> Result<EntitlementDecision, EntitlementError>;
}

/// Calls the verification endpoint with the session's bearer credential.
pub struct HttpVerifier {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpVerifier {
    pub fn new(
        url: String,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EntitlementError> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .use_rustls_tls()
            .build()?;

        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn verify(&self) -> Result<EntitlementDecision, EntitlementError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(EntitlementError::AuthenticationMissing)?;

        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Verification endpoint unreachable");
                EntitlementError::Network(e.to_string())
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| {
            error!(error = %e, "Verification response body lost");
            EntitlementError::Network(e.to_string())
        })?;

        if !status.is_success() {
            warn!(status = %status, "Verification endpoint returned non-2xx");
            return Err(error_from_status(status, &body));
        }

        parse_decision(&body)
    }
}

pub fn parse_decision(body: &[u8]) -> Result<EntitlementDecision, EntitlementError> {
    let resp: VerifyResponse = serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, "Failed to parse verification response");
        EntitlementError::InvalidResponse(e.to_string())
    })?;

    EntitlementDecision::try_from(resp)
}

fn error_from_status(status: StatusCode, body: &[u8]) -> EntitlementError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();

    match (status, parsed) {
        (_, Some(err)) => EntitlementError::from_wire(&err.code, err.error),
        (StatusCode::UNAUTHORIZED, None) => {
            EntitlementError::AuthenticationInvalid("credential rejected".to_string())
        }
        (status, None) => {
            EntitlementError::Network(format!("verification endpoint returned HTTP {}", status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Tier;

    #[tokio::test]
    async fn missing_token_never_hits_the_network() {
        let verifier = HttpVerifier::new(
            "http://127.0.0.1:9/api/entitlements".into(),
            None,
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(
            verifier.verify().await.unwrap_err(),
            EntitlementError::AuthenticationMissing
        );
    }

    #[test]
    fn parses_granted_body() {
        let decision = parse_decision(
            br#"{"access":true,"type":"paid","expires_at":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(decision.granted);
        assert_eq!(decision.tier, Some(Tier::Paid));
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        let err = parse_decision(b"<html>gateway</html>").unwrap_err();
        assert!(matches!(err, EntitlementError::InvalidResponse(_)));
    }

    #[test]
    fn structured_error_bodies_keep_their_kind() {
        let err = error_from_status(
            StatusCode::UNAUTHORIZED,
            br#"{"error":"jwt expired","code":"authentication_invalid","status":401}"#,
        );
        assert_eq!(err, EntitlementError::AuthenticationInvalid("jwt expired".into()));

        let err = error_from_status(
            StatusCode::SERVICE_UNAVAILABLE,
            br#"{"error":"all 4 tier lookups failed","code":"storage_error","status":503}"#,
        );
        assert!(matches!(err, EntitlementError::Storage(_)));
    }

    #[test]
    fn bare_status_codes_fall_back() {
        assert!(matches!(
            error_from_status(StatusCode::UNAUTHORIZED, b""),
            EntitlementError::AuthenticationInvalid(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::BAD_GATEWAY, b"upstream"),
            EntitlementError::Network(_)
        ));
    }
}
