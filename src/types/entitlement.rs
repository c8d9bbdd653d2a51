use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Tier,
    utils::{constants, error::EntitlementError},
};

/// The authenticated identity being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    /// Lowercased part of the email after the last `@`.
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
    }
}

/// Point-in-time outcome of resolving a principal's entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDecision {
    pub granted: bool,
    pub tier: Option<Tier>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EntitlementDecision {
    pub fn granted(tier: Tier, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            granted: true,
            tier: Some(tier),
            expires_at,
            pending_validation: false,
            message: None,
        }
    }

    pub fn dev() -> Self {
        Self::granted(Tier::Dev, None)
    }

    pub fn expired(tier: Tier, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            granted: false,
            tier: Some(tier),
            expires_at,
            pending_validation: false,
            message: Some(constants::MSG_EXPIRED.to_string()),
        }
    }

    pub fn pending(tier: Tier, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            granted: false,
            tier: Some(tier),
            expires_at,
            pending_validation: true,
            message: Some(constants::MSG_PENDING_VALIDATION.to_string()),
        }
    }

    pub fn none() -> Self {
        Self {
            granted: false,
            tier: None,
            expires_at: None,
            pending_validation: false,
            message: Some(constants::MSG_NO_ENTITLEMENT.to_string()),
        }
    }

    /// Matched but not approved yet: neither access nor a plain denial.
    pub fn is_pending(&self) -> bool {
        !self.granted && self.pending_validation
    }

    pub fn is_denied(&self) -> bool {
        !self.granted && !self.pending_validation
    }

    pub fn to_response(&self) -> VerifyResponse {
        VerifyResponse {
            access: self.granted,
            tier: self.tier.map(|t| t.as_str().to_string()),
            expires_at: self.expires_at,
            pending_validation: self.pending_validation,
            message: self.message.clone(),
        }
    }
}

/// Body of a successful verification response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub access: bool,
    #[serde(rename = "type")]
    pub tier: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TryFrom<VerifyResponse> for EntitlementDecision {
    type Error = EntitlementError;

    fn try_from(resp: VerifyResponse) -> Result<Self, Self::Error> {
        let tier = resp
            .tier
            .as_deref()
            .map(str::parse::<Tier>)
            .transpose()
            .map_err(EntitlementError::InvalidResponse)?;

        if resp.access && tier.is_none() {
            return Err(EntitlementError::InvalidResponse(
                "access granted without a tier".to_string(),
            ));
        }

        Ok(EntitlementDecision {
            granted: resp.access,
            tier,
            expires_at: resp.expires_at,
            pending_validation: resp.pending_validation,
            message: resp.message,
        })
    }
}
