use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "entitlement_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Dev,
    Paid,
    Trial,
    Ambassador,
    Beta,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Dev => "dev",
            Tier::Paid => "paid",
            Tier::Trial => "trial",
            Tier::Ambassador => "ambassador",
            Tier::Beta => "beta",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Tier::Dev),
            "paid" => Ok(Tier::Paid),
            "trial" => Ok(Tier::Trial),
            "ambassador" => Ok(Tier::Ambassador),
            "beta" => Ok(Tier::Beta),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "entitlement_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Canceled,
    Pending,
}

/// One row of the `entitlements` table. Written by billing and ops, only
/// ever read here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub id: Uuid,
    pub principal_id: String,
    pub tier: Tier,
    pub status: RecordStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only meaningful for the trial tier.
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub promo_code: Option<String>,
    /// Only meaningful for the beta tier.
    pub pending_validation: bool,
}

impl EntitlementRecord {
    pub fn new(principal_id: impl Into<String>, tier: Tier, status: RecordStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id: principal_id.into(),
            tier,
            status,
            expires_at: None,
            trial_end: None,
            created_at: Utc::now(),
            promo_code: None,
            pending_validation: false,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_trial_end(mut self, at: DateTime<Utc>) -> Self {
        self.trial_end = Some(at);
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_promo_code(mut self, code: impl Into<String>) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    pub fn pending_validation(mut self) -> Self {
        self.pending_validation = true;
        self
    }

    /// Trials end at `trial_end` when it is set; everything else at
    /// `expires_at`. `None` never expires.
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        match self.tier {
            Tier::Trial => self.trial_end.or(self.expires_at),
            _ => self.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_expiry().is_some_and(|exp| exp <= now)
    }

    pub fn is_pending_validation(&self) -> bool {
        self.tier == Tier::Beta && self.pending_validation
    }
}
