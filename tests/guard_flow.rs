//! Guard + monitor + resolver end to end, with the verification call made
//! in-process and time paused.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use entitled::{
    access::{AccessList, Resolver, SpecialAccessPolicy},
    client::{
        AccessGuard, EntitlementCache, EntitlementMonitor, GuardSession, GuardSettings, GuardView,
        MemoryKv, MonitorConfig, NavigationContext, Verifier, clock::ManualClock,
    },
    db::{
        memory::MemoryStore,
        models::{EntitlementRecord, RecordStatus, Tier},
    },
    types::{EntitlementDecision, Principal},
    utils::error::EntitlementError,
};
use tokio::time::{Instant, timeout};

const OFFERS: &str = "/offers";
const SUPPORT: &str = "help@app.example";

/// Verification answered by a resolver in the same process.
struct LocalVerifier {
    resolver: Resolver,
    principal: Principal,
}

#[async_trait]
impl Verifier for LocalVerifier {
    async fn verify(&self) -> Result<EntitlementDecision, EntitlementError> {
        self.resolver.resolve(&self.principal).await
    }
}

struct UnreachableVerifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Verifier for UnreachableVerifier {
    async fn verify(&self) -> Result<EntitlementDecision, EntitlementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EntitlementError::Network("connection refused".into()))
    }
}

fn principal() -> Principal {
    Principal::new("user-42", "grace@lab.example")
}

fn guard(policy: SpecialAccessPolicy) -> AccessGuard {
    AccessGuard::new(Arc::new(policy), GuardSettings::new(OFFERS, SUPPORT))
}

fn monitor_over(store: Arc<MemoryStore>) -> EntitlementMonitor {
    let verifier = LocalVerifier {
        resolver: Resolver::new(store, Arc::new(SpecialAccessPolicy::new(false))),
        principal: principal(),
    };
    let cache = EntitlementCache::new(
        Arc::new(MemoryKv::new()),
        Arc::new(ManualClock::at(1_700_000_000_000)),
        600_000,
    );
    EntitlementMonitor::spawn(Arc::new(verifier), cache, MonitorConfig::new("user-42"))
}

/// Pull views until one matches, collecting everything seen on the way.
async fn until<F>(session: &mut GuardSession<'_>, mut done: F) -> Vec<GuardView>
where
    F: FnMut(&GuardView) -> bool,
{
    let mut seen = Vec::new();
    timeout(Duration::from_secs(120), async {
        while let Some(view) = session.next_view().await {
            let stop = done(&view);
            seen.push(view);
            if stop {
                break;
            }
        }
    })
    .await
    .expect("guard never reached the expected view");
    seen
}

#[tokio::test(start_paused = true)]
async fn pending_beta_waits_then_admits_after_approval() {
    let store = Arc::new(MemoryStore::with_records([EntitlementRecord::new(
        "user-42",
        Tier::Beta,
        RecordStatus::Active,
    )
    .with_promo_code("EARLYBIRD")
    .pending_validation()]));

    let guard = guard(SpecialAccessPolicy::new(false));
    let mut session = guard.mount(&principal(), || monitor_over(store.clone()));

    let seen = until(&mut session, |v| *v == GuardView::AwaitingApproval).await;
    assert_eq!(seen.first(), Some(&GuardView::Blank));
    assert!(!seen.iter().any(|v| matches!(v, GuardView::Redirect { .. })));

    store
        .insert(
            EntitlementRecord::new("user-42", Tier::Beta, RecordStatus::Active)
                .created(Utc::now() + chrono::Duration::seconds(5)),
        )
        .await;
    session.retry();

    let seen = until(&mut session, |v| matches!(v, GuardView::Granted { .. })).await;
    assert_eq!(
        seen.last(),
        Some(&GuardView::Granted {
            tier: Some(Tier::Beta),
            expires_at: None,
        })
    );

    session.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn special_access_skips_monitor_entirely() {
    let verifier = Arc::new(UnreachableVerifier {
        calls: AtomicUsize::new(0),
    });
    let mounted = AtomicBool::new(false);

    let policy = SpecialAccessPolicy::new(false).with_tier(
        Tier::Paid,
        AccessList::new(["Grace@Lab.example"], Vec::<String>::new()),
    );
    let guard = guard(policy);

    let mut session = guard.mount(&principal(), || {
        mounted.store(true, Ordering::SeqCst);
        EntitlementMonitor::spawn(
            verifier.clone(),
            EntitlementCache::new(Arc::new(MemoryKv::new()), Arc::new(ManualClock::at(0)), 600_000),
            MonitorConfig::new("user-42"),
        )
    });

    assert!(session.is_bypassed());
    assert_eq!(
        session.next_view().await,
        Some(GuardView::Granted {
            tier: Some(Tier::Paid),
            expires_at: None,
        })
    );
    assert_eq!(session.next_view().await, None);
    assert!(!mounted.load(Ordering::SeqCst));
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn denial_redirects_after_countdown() {
    let expired = EntitlementRecord::new("user-42", Tier::Paid, RecordStatus::Active)
        .expiring(Utc::now() - chrono::Duration::days(1));
    let store = Arc::new(MemoryStore::with_records([
        expired,
        EntitlementRecord::new("user-42", Tier::Ambassador, RecordStatus::Active),
    ]));

    let guard = guard(SpecialAccessPolicy::new(false));
    let mounted_at = Instant::now();
    let mut session = guard.mount(&principal(), || monitor_over(store));

    let seen = until(&mut session, |v| matches!(v, GuardView::Denied { .. })).await;
    assert_eq!(
        seen.last(),
        Some(&GuardView::Denied {
            message: "expired".into(),
            offers_url: OFFERS.into(),
        })
    );

    let view = session.next_view().await;
    assert_eq!(view, Some(GuardView::Redirect { to: OFFERS.into() }));
    assert!(mounted_at.elapsed() >= Duration::from_millis(1500));

    session.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn storage_outage_surfaces_failure_with_support_contact() {
    let store = Arc::new(MemoryStore::new());
    store.fail_all().await;

    let guard = guard(SpecialAccessPolicy::new(false));
    let mut session = guard.mount(&principal(), || monitor_over(store.clone()));

    let started = Instant::now();
    let seen = until(&mut session, |v| {
        matches!(v, GuardView::VerificationFailed { retry_count: 3, .. })
    })
    .await;

    assert!(seen.contains(&GuardView::Blank));
    assert!(started.elapsed() >= Duration::from_millis(1000 + 2000 + 4000));
    match seen.last() {
        Some(GuardView::VerificationFailed {
            error,
            support_contact,
            ..
        }) => {
            assert!(matches!(error, EntitlementError::Storage(_)));
            assert_eq!(support_contact, SUPPORT);
        }
        other => panic!("unexpected view {:?}", other),
    }

    // One initial attempt plus three retries, four tiers each.
    assert_eq!(store.queries(), 4 * 4);

    session.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn checkout_return_skips_cached_denial() {
    let store = Arc::new(MemoryStore::with_records([EntitlementRecord::new(
        "user-42",
        Tier::Paid,
        RecordStatus::Active,
    )]));
    let verifier = LocalVerifier {
        resolver: Resolver::new(store, Arc::new(SpecialAccessPolicy::new(false))),
        principal: principal(),
    };
    let cache = EntitlementCache::new(
        Arc::new(MemoryKv::new()),
        Arc::new(ManualClock::at(1_700_000_000_000)),
        600_000,
    );
    cache.set(&EntitlementDecision::none()).await.unwrap();

    let guard = guard(SpecialAccessPolicy::new(false));
    let nav = NavigationContext::parse("https://app.example/course?payment=success").unwrap();
    let mut session = guard.mount_at(&principal(), Some(&nav), || {
        EntitlementMonitor::spawn(Arc::new(verifier), cache, MonitorConfig::new("user-42"))
    });

    let seen = until(&mut session, |v| matches!(v, GuardView::Granted { .. })).await;
    assert!(!seen.iter().any(|v| matches!(v, GuardView::Denied { .. })));
    assert!(!seen.iter().any(|v| matches!(v, GuardView::Redirect { .. })));
    assert_eq!(
        seen.last(),
        Some(&GuardView::Granted {
            tier: Some(Tier::Paid),
            expires_at: None,
        })
    );

    session.unmount().await;
}
