use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::{
    access::policy::SpecialAccessPolicy,
    db::{
        models::{EntitlementRecord, RecordStatus, Tier},
        store::EntitlementStore,
    },
    types::{EntitlementDecision, Principal},
    utils::{error::EntitlementError, logs_fmt::abbrev},
};

/// Evaluation order. The first tier that produces an outcome decides.
pub const PRIORITY: [Tier; 5] = [
    Tier::Dev,
    Tier::Paid,
    Tier::Trial,
    Tier::Ambassador,
    Tier::Beta,
];

enum TierOutcome {
    /// Nothing for this tier, move on.
    Absent,
    /// The lookup failed; counts as absent unless every lookup fails.
    Unavailable,
    Decided(EntitlementDecision),
}

pub struct Resolver {
    store: Arc<dyn EntitlementStore>,
    policy: Arc<SpecialAccessPolicy>,
}

impl Resolver {
    pub fn new(store: Arc<dyn EntitlementStore>, policy: Arc<SpecialAccessPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &SpecialAccessPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn EntitlementStore> {
        &self.store
    }

    pub async fn resolve(
        &self,
        principal: &Principal,
    ) -> Result<EntitlementDecision, EntitlementError> {
        self.resolve_at(principal, Utc::now()).await
    }

    /// Resolve as of `now`.
    ///
    /// A matched tier always ends the walk, including when its record has
    /// expired: an expired paid subscriber is denied even if a lower tier
    /// would have granted access. Errors only when every store lookup
    /// failed.
    #[instrument(skip(self, principal), fields(principal = %principal.id))]
    pub async fn resolve_at(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<EntitlementDecision, EntitlementError> {
        let mut queried = 0usize;
        let mut failed = 0usize;

        for tier in PRIORITY {
            let outcome = match tier {
                Tier::Dev => self.evaluate_dev(),
                _ => {
                    let outcome = self.evaluate_stored(principal, tier, now).await;
                    if !matches!(outcome, TierOutcome::Decided(_)) {
                        queried += 1;
                    }
                    outcome
                }
            };

            match outcome {
                TierOutcome::Decided(decision) => {
                    debug!(
                        tier = %tier,
                        granted = decision.granted,
                        pending = decision.pending_validation,
                        "Entitlement resolved"
                    );
                    return Ok(decision);
                }
                TierOutcome::Unavailable => failed += 1,
                TierOutcome::Absent => {}
            }
        }

        if queried > 0 && failed == queried {
            warn!(
                email = %abbrev(&principal.email),
                failed,
                "Every tier lookup failed"
            );
            return Err(EntitlementError::Storage(format!(
                "all {} tier lookups failed",
                failed
            )));
        }

        Ok(EntitlementDecision::none())
    }

    fn evaluate_dev(&self) -> TierOutcome {
        if self.policy.is_development() {
            TierOutcome::Decided(EntitlementDecision::dev())
        } else {
            TierOutcome::Absent
        }
    }

    async fn evaluate_stored(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> TierOutcome {
        if self.policy.is_bypassed(principal, tier) {
            debug!(tier = %tier, "Special access bypass");
            return TierOutcome::Decided(EntitlementDecision::granted(tier, None));
        }

        match self
            .store
            .find_latest(&principal.id, tier, RecordStatus::Active)
            .await
        {
            Ok(Some(record)) => TierOutcome::Decided(decide(&record, now)),
            Ok(None) => TierOutcome::Absent,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Tier lookup failed, skipping tier");
                TierOutcome::Unavailable
            }
        }
    }
}

/// Outcome for a matched active record. Expiry is checked before anything
/// else, pending beta approval included.
pub fn decide(record: &EntitlementRecord, now: DateTime<Utc>) -> EntitlementDecision {
    let expires_at = record.effective_expiry();

    if record.is_expired_at(now) {
        return EntitlementDecision::expired(record.tier, expires_at);
    }

    if record.is_pending_validation() {
        return EntitlementDecision::pending(record.tier, expires_at);
    }

    EntitlementDecision::granted(record.tier, expires_at)
}
