use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::{
    access::policy::SpecialAccessPolicy,
    client::{
        monitor::{EntitlementMonitor, MonitorState},
        navigation::NavigationContext,
    },
    db::models::Tier,
    types::Principal,
    utils::{
        constants::{LOADING_DEBOUNCE_MS, MSG_NO_ENTITLEMENT, REDIRECT_COUNTDOWN_MS},
        error::EntitlementError,
    },
};

/// What the gated screen should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Short waits render nothing to avoid a loading flash.
    Blank,
    Loading,
    Granted {
        tier: Option<Tier>,
        expires_at: Option<DateTime<Utc>>,
    },
    AwaitingApproval,
    Denied {
        message: String,
        offers_url: String,
    },
    Redirect {
        to: String,
    },
    VerificationFailed {
        error: EntitlementError,
        retry_count: u32,
        support_contact: String,
    },
    ReauthenticationRequired {
        error: EntitlementError,
    },
}

#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub offers_url: String,
    pub support_contact: String,
    pub loading_debounce: Duration,
    pub redirect_countdown: Duration,
}

impl GuardSettings {
    pub fn new(offers_url: impl Into<String>, support_contact: impl Into<String>) -> Self {
        Self {
            offers_url: offers_url.into(),
            support_contact: support_contact.into(),
            loading_debounce: Duration::from_millis(LOADING_DEBOUNCE_MS),
            redirect_countdown: Duration::from_millis(REDIRECT_COUNTDOWN_MS),
        }
    }
}

pub struct AccessGuard {
    policy: Arc<SpecialAccessPolicy>,
    settings: GuardSettings,
}

impl AccessGuard {
    pub fn new(policy: Arc<SpecialAccessPolicy>, settings: GuardSettings) -> Self {
        Self { policy, settings }
    }

    /// View for `state` after it has been current for `elapsed`.
    pub fn view(&self, state: &MonitorState, elapsed: Duration) -> GuardView {
        match state {
            MonitorState::Idle | MonitorState::Checking => {
                if elapsed < self.settings.loading_debounce {
                    GuardView::Blank
                } else {
                    GuardView::Loading
                }
            }
            MonitorState::Resolved(decision) if decision.granted => GuardView::Granted {
                tier: decision.tier,
                expires_at: decision.expires_at,
            },
            MonitorState::Resolved(decision) if decision.pending_validation => {
                GuardView::AwaitingApproval
            }
            MonitorState::Resolved(decision) => {
                if elapsed < self.settings.redirect_countdown {
                    GuardView::Denied {
                        message: decision
                            .message
                            .clone()
                            .unwrap_or_else(|| MSG_NO_ENTITLEMENT.to_string()),
                        offers_url: self.settings.offers_url.clone(),
                    }
                } else {
                    GuardView::Redirect {
                        to: self.settings.offers_url.clone(),
                    }
                }
            }
            MonitorState::Failed { error, .. } if error.is_authentication() => {
                GuardView::ReauthenticationRequired {
                    error: error.clone(),
                }
            }
            MonitorState::Failed { error, retry_count } => GuardView::VerificationFailed {
                error: error.clone(),
                retry_count: *retry_count,
                support_contact: self.settings.support_contact.clone(),
            },
        }
    }

    /// When the current view can change on its own, without a new state.
    fn next_deadline(&self, state: &MonitorState, elapsed: Duration) -> Option<Duration> {
        let limit = match state {
            MonitorState::Idle | MonitorState::Checking => self.settings.loading_debounce,
            MonitorState::Resolved(d) if d.is_denied() => self.settings.redirect_countdown,
            _ => return None,
        };
        (elapsed < limit).then(|| limit - elapsed)
    }

    /// Gate `principal`. Special-access identities are admitted here, before
    /// `mount` is called, so no monitor or network call is ever involved
    /// for them.
    pub fn mount<F>(&self, principal: &Principal, mount: F) -> GuardSession<'_>
    where
        F: FnOnce() -> EntitlementMonitor,
    {
        self.mount_at(principal, None, mount)
    }

    /// Like `mount`, for a session that lands on `nav`. A payment return
    /// starts the monitor with a forced refresh instead of the cache.
    pub fn mount_at<F>(
        &self,
        principal: &Principal,
        nav: Option<&NavigationContext>,
        mount: F,
    ) -> GuardSession<'_>
    where
        F: FnOnce() -> EntitlementMonitor,
    {
        if let Some(tier) = self.policy.special_tier(principal) {
            info!(principal = %principal.id, tier = %tier, "Special access, monitor not mounted");
            return GuardSession {
                guard: self,
                inner: Mounted::Bypassed(tier),
                last: None,
            };
        }

        let monitor = mount();
        let states = monitor.subscribe();
        match nav {
            Some(nav) => monitor.start_at(nav),
            None => monitor.start(),
        }

        GuardSession {
            guard: self,
            inner: Mounted::Monitored {
                monitor,
                states,
                since: Instant::now(),
            },
            last: None,
        }
    }
}

enum Mounted {
    Bypassed(Tier),
    Monitored {
        monitor: EntitlementMonitor,
        states: watch::Receiver<MonitorState>,
        since: Instant,
    },
}

/// A mounted guard: yields view transitions until teardown.
pub struct GuardSession<'g> {
    guard: &'g AccessGuard,
    inner: Mounted,
    last: Option<GuardView>,
}

impl GuardSession<'_> {
    pub fn is_bypassed(&self) -> bool {
        matches!(self.inner, Mounted::Bypassed(_))
    }

    /// The "retry" action on the failure view.
    pub fn retry(&self) {
        if let Mounted::Monitored { monitor, .. } = &self.inner {
            monitor.force_refresh();
        }
    }

    pub fn current(&self) -> GuardView {
        match &self.inner {
            Mounted::Bypassed(tier) => GuardView::Granted {
                tier: Some(*tier),
                expires_at: None,
            },
            Mounted::Monitored { states, since, .. } => {
                let state = states.borrow().clone();
                self.guard.view(&state, since.elapsed())
            }
        }
    }

    /// Next view that differs from the last one returned. `None` once
    /// nothing can change any more.
    pub async fn next_view(&mut self) -> Option<GuardView> {
        loop {
            let view = self.current();
            if self.last.as_ref() != Some(&view) {
                debug!(?view, "Guard view changed");
                self.last = Some(view.clone());
                return Some(view);
            }

            let Mounted::Monitored { states, since, .. } = &mut self.inner else {
                return None;
            };

            let state = states.borrow().clone();
            let deadline = self
                .guard
                .next_deadline(&state, since.elapsed())
                .map(|wait| Instant::now() + wait);

            tokio::select! {
                changed = states.changed() => match changed {
                    Ok(()) => {
                        if *states.borrow() != state {
                            *since = Instant::now();
                        }
                    }
                    // Monitor gone: only a pending countdown can still move.
                    Err(_) => match deadline {
                        Some(at) => sleep_until(at).await,
                        None => return None,
                    },
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            }
        }
    }

    pub async fn unmount(self) {
        if let Mounted::Monitored { monitor, .. } = self.inner {
            monitor.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::policy::AccessList;
    use crate::types::EntitlementDecision;

    fn guard(policy: SpecialAccessPolicy) -> AccessGuard {
        AccessGuard::new(
            Arc::new(policy),
            GuardSettings::new("/offers", "help@app.example"),
        )
    }

    #[test]
    fn short_checks_render_nothing() {
        let g = guard(SpecialAccessPolicy::default());
        assert_eq!(
            g.view(&MonitorState::Checking, Duration::from_millis(1999)),
            GuardView::Blank
        );
        assert_eq!(
            g.view(&MonitorState::Checking, Duration::from_secs(2)),
            GuardView::Loading
        );
        assert_eq!(g.view(&MonitorState::Idle, Duration::ZERO), GuardView::Blank);
    }

    #[test]
    fn pending_beta_awaits_approval_without_redirect() {
        let g = guard(SpecialAccessPolicy::default());
        let state = MonitorState::Resolved(EntitlementDecision::pending(Tier::Beta, None));
        assert_eq!(g.view(&state, Duration::ZERO), GuardView::AwaitingApproval);
        assert_eq!(g.view(&state, Duration::from_secs(60)), GuardView::AwaitingApproval);
    }

    #[test]
    fn denial_redirects_after_countdown() {
        let g = guard(SpecialAccessPolicy::default());
        let state = MonitorState::Resolved(EntitlementDecision::expired(Tier::Paid, None));
        assert_eq!(
            g.view(&state, Duration::from_millis(1499)),
            GuardView::Denied {
                message: "expired".into(),
                offers_url: "/offers".into()
            }
        );
        assert_eq!(
            g.view(&state, Duration::from_millis(1500)),
            GuardView::Redirect { to: "/offers".into() }
        );
    }

    #[test]
    fn failure_is_not_denial() {
        let g = guard(SpecialAccessPolicy::default());
        let state = MonitorState::Failed {
            error: EntitlementError::Network("timeout".into()),
            retry_count: 3,
        };
        assert_eq!(
            g.view(&state, Duration::from_secs(10)),
            GuardView::VerificationFailed {
                error: EntitlementError::Network("timeout".into()),
                retry_count: 3,
                support_contact: "help@app.example".into(),
            }
        );
    }

    #[test]
    fn auth_failure_asks_for_sign_in() {
        let g = guard(SpecialAccessPolicy::default());
        let state = MonitorState::Failed {
            error: EntitlementError::AuthenticationMissing,
            retry_count: 0,
        };
        assert!(matches!(
            g.view(&state, Duration::ZERO),
            GuardView::ReauthenticationRequired { .. }
        ));
    }

    #[tokio::test]
    async fn special_access_never_mounts_monitor() {
        let g = guard(SpecialAccessPolicy::new(false).with_tier(
            Tier::Paid,
            AccessList::new(["vip@app.example"], Vec::<String>::new()),
        ));
        let principal = Principal::new("vip", "vip@app.example");

        let mut session = g.mount(&principal, || panic!("monitor must not be mounted"));
        assert!(session.is_bypassed());
        assert_eq!(
            session.next_view().await,
            Some(GuardView::Granted {
                tier: Some(Tier::Paid),
                expires_at: None
            })
        );
        assert_eq!(session.next_view().await, None);
    }
}
