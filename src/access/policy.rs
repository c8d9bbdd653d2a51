use std::collections::{HashMap, HashSet};

use crate::{
    access::resolver::PRIORITY,
    db::models::Tier,
    types::Principal,
    utils::config::{SpecialAccessConfig, TierAccessConfig},
};

/// Identities and email domains that bypass stored entitlements for one
/// tier.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    identities: HashSet<String>,
    domains: HashSet<String>,
}

impl AccessList {
    pub fn new<I, D>(identities: I, domains: D) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            identities: identities
                .into_iter()
                .map(|i| i.as_ref().trim().to_ascii_lowercase())
                .filter(|i| !i.is_empty())
                .collect(),
            domains: domains
                .into_iter()
                .map(|d| {
                    d.as_ref()
                        .trim()
                        .trim_start_matches('@')
                        .to_ascii_lowercase()
                })
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.domains.is_empty()
    }

    /// Exact match on the principal id or email, or on the email's domain.
    pub fn matches(&self, principal: &Principal) -> bool {
        if self.identities.contains(&principal.id.to_ascii_lowercase())
            || self.identities.contains(&principal.email.trim().to_ascii_lowercase())
        {
            return true;
        }

        principal
            .email_domain()
            .is_some_and(|domain| self.domains.contains(&domain))
    }
}

impl From<&TierAccessConfig> for AccessList {
    fn from(cfg: &TierAccessConfig) -> Self {
        AccessList::new(cfg.identity_list(), cfg.domain_list())
    }
}

/// Static bypass rules, fixed at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct SpecialAccessPolicy {
    development: bool,
    lists: HashMap<Tier, AccessList>,
}

impl SpecialAccessPolicy {
    pub fn new(development: bool) -> Self {
        Self {
            development,
            lists: HashMap::new(),
        }
    }

    /// The dev tier is governed by the environment flag alone and cannot
    /// carry an allow-list.
    pub fn with_tier(mut self, tier: Tier, list: AccessList) -> Self {
        if tier != Tier::Dev && !list.is_empty() {
            self.lists.insert(tier, list);
        }
        self
    }

    pub fn from_config(cfg: &SpecialAccessConfig) -> Self {
        Self::new(cfg.dev_mode)
            .with_tier(Tier::Paid, AccessList::from(&cfg.paid))
            .with_tier(Tier::Trial, AccessList::from(&cfg.trial))
            .with_tier(Tier::Ambassador, AccessList::from(&cfg.ambassador))
            .with_tier(Tier::Beta, AccessList::from(&cfg.beta))
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    pub fn is_bypassed(&self, principal: &Principal, tier: Tier) -> bool {
        match tier {
            Tier::Dev => self.development,
            _ => self
                .lists
                .get(&tier)
                .is_some_and(|list| list.matches(principal)),
        }
    }

    /// Highest-priority tier the principal is bypassed into, if any.
    pub fn special_tier(&self, principal: &Principal) -> Option<Tier> {
        PRIORITY
            .iter()
            .copied()
            .find(|tier| self.is_bypassed(principal, *tier))
    }

    pub fn has_special_access(&self, principal: &Principal) -> bool {
        self.special_tier(principal).is_some()
    }
}
