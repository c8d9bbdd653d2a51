use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{cache::EntitlementCache, navigation::NavigationContext, verifier::Verifier},
    types::EntitlementDecision,
    utils::{
        constants::{BASE_BACKOFF_MS, DEFAULT_REFRESH_INTERVAL_MS, MAX_RETRIES},
        error::EntitlementError,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Checking,
    Resolved(EntitlementDecision),
    Failed {
        error: EntitlementError,
        retry_count: u32,
    },
}

impl MonitorState {
    pub fn is_settled(&self) -> bool {
        matches!(self, MonitorState::Resolved(_) | MonitorState::Failed { .. })
    }
}

/// Wait before retry number `retry_count + 1`: 1s, 2s, 4s, ...
pub fn backoff_delay(retry_count: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << retry_count.min(16)))
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Logged with every failure.
    pub principal_id: String,
    pub development: bool,
    pub refresh_interval: Duration,
    pub max_retries: u32,
}

impl MonitorConfig {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            development: false,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            max_retries: MAX_RETRIES,
        }
    }

    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    pub fn refresh_every(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    /// `force` skips the cache, as when landing back from checkout.
    Start { force: bool },
    ForceRefresh,
}

/// Handle to a running monitor task. Dropping it tears the task down.
pub struct EntitlementMonitor {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<MonitorState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EntitlementMonitor {
    pub fn spawn(
        verifier: Arc<dyn Verifier>,
        cache: EntitlementCache,
        config: MonitorConfig,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(MonitorState::Idle);
        let cancel = CancellationToken::new();

        let task = MonitorTask {
            verifier,
            cache,
            config,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(task.run(rx));

        Self {
            commands,
            state,
            cancel,
            task: Some(task),
        }
    }

    pub fn start(&self) {
        self.send(Command::Start { force: false });
    }

    /// Start on the page the session landed on. A payment return skips the
    /// cached decision so the pre-payment answer is never shown.
    pub fn start_at(&self, nav: &NavigationContext) {
        let force = nav.payment_completed();
        if force {
            info!(path = nav.url().path(), "Starting after payment return, cache skipped");
        }
        self.send(Command::Start { force });
    }

    /// Drop the cached decision and verify again. Also the manual retry.
    pub fn force_refresh(&self) {
        self.send(Command::ForceRefresh);
    }

    /// Returns whether the navigation triggered a refresh.
    pub fn on_navigation(&self, nav: &NavigationContext) -> bool {
        if nav.payment_completed() {
            info!(path = nav.url().path(), "Payment return detected, refreshing entitlement");
            self.force_refresh();
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    /// Wait for the next `Resolved` or `Failed` state, or return the last
    /// state once the monitor is gone.
    pub async fn settled(&self) -> MonitorState {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(MonitorState::is_settled).await {
            return state.clone();
        }
        let last = rx.borrow().clone();
        last
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "Monitor already torn down, command dropped");
        }
    }
}

impl Drop for EntitlementMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type Verification = BoxFuture<'static, Result<EntitlementDecision, EntitlementError>>;

/// Mutable bookkeeping owned by the task loop.
#[derive(Default)]
struct Flight {
    in_flight: Option<Verification>,
    /// Retry count of the verification in flight.
    attempt: u32,
    /// When to fire the next retry and the count it will carry.
    retry: Option<(Instant, u32)>,
}

struct MonitorTask {
    verifier: Arc<dyn Verifier>,
    cache: EntitlementCache,
    config: MonitorConfig,
    state: watch::Sender<MonitorState>,
    cancel: CancellationToken,
}

impl MonitorTask {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut flight = Flight::default();
        // Armed by the first start; an unstarted monitor never refreshes.
        let mut refresh: Option<Interval> = None;

        loop {
            let retry_at = flight.retry.map(|(at, _)| at);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                result = async {
                    match flight.in_flight.as_mut() {
                        Some(call) => call.await,
                        None => std::future::pending().await,
                    }
                }, if flight.in_flight.is_some() => {
                    flight.in_flight = None;
                    self.complete(&mut flight, result).await;
                }

                command = commands.recv() => match command {
                    Some(Command::Start { force }) => {
                        if refresh.is_none() {
                            refresh = Some(self.refresh_timer());
                        }
                        if force {
                            self.force_refresh(&mut flight).await;
                        } else {
                            self.start(&mut flight).await;
                        }
                    }
                    Some(Command::ForceRefresh) => self.force_refresh(&mut flight).await,
                    None => break,
                },

                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    if let Some((_, next)) = flight.retry.take() {
                        debug!(retry_count = next, "Retrying entitlement verification");
                        self.begin_check(&mut flight, next);
                    }
                }

                _ = async {
                    match refresh.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                }, if refresh.is_some() => {
                    if !self.config.development {
                        debug!("Periodic entitlement refresh");
                        self.force_refresh(&mut flight).await;
                    }
                }
            }
        }

        debug!(principal = %self.config.principal_id, "Entitlement monitor stopped");
    }

    fn refresh_timer(&self) -> Interval {
        let period = self.config.refresh_interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    async fn start(&self, flight: &mut Flight) {
        if self.config.development {
            self.transition(MonitorState::Resolved(EntitlementDecision::dev()));
            return;
        }

        if flight.in_flight.is_some() {
            debug!("Start coalesced onto in-flight verification");
            return;
        }

        if let Some(decision) = self.cache.get().await {
            debug!(granted = decision.granted, "Serving cached entitlement");
            flight.retry = None;
            flight.attempt = 0;
            self.transition(MonitorState::Resolved(decision));
            return;
        }

        flight.retry = None;
        self.begin_check(flight, 0);
    }

    async fn force_refresh(&self, flight: &mut Flight) {
        if self.config.development {
            self.transition(MonitorState::Resolved(EntitlementDecision::dev()));
            return;
        }

        if let Err(e) = self.cache.invalidate().await {
            warn!(
                principal = %self.config.principal_id,
                error = %e,
                "Failed to invalidate entitlement cache"
            );
        }

        flight.retry = None;
        flight.attempt = 0;

        if flight.in_flight.is_some() {
            debug!("Refresh coalesced onto in-flight verification");
            return;
        }

        self.begin_check(flight, 0);
    }

    fn begin_check(&self, flight: &mut Flight, attempt: u32) {
        if !self.transition(MonitorState::Checking) {
            return;
        }

        flight.attempt = attempt;
        let verifier = self.verifier.clone();
        flight.in_flight = Some(Box::pin(async move { verifier.verify().await }));
    }

    async fn complete(
        &self,
        flight: &mut Flight,
        result: Result<EntitlementDecision, EntitlementError>,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(decision) => {
                if let Err(e) = self.cache.set(&decision).await {
                    warn!(
                        principal = %self.config.principal_id,
                        error = %e,
                        "Failed to cache entitlement decision"
                    );
                }

                info!(
                    principal = %self.config.principal_id,
                    granted = decision.granted,
                    tier = ?decision.tier,
                    "Entitlement verified"
                );

                flight.attempt = 0;
                flight.retry = None;
                self.transition(MonitorState::Resolved(decision));
            }
            Err(error) => {
                let retry_count = flight.attempt;
                error!(
                    principal = %self.config.principal_id,
                    error = %error,
                    retry_count,
                    "Entitlement verification failed"
                );

                if error.is_retryable() && retry_count < self.config.max_retries {
                    let delay = backoff_delay(retry_count);
                    debug!(delay_ms = delay.as_millis() as u64, "Scheduling verification retry");
                    flight.retry = Some((Instant::now() + delay, retry_count + 1));
                } else if error.is_retryable() {
                    warn!(
                        principal = %self.config.principal_id,
                        "Verification retries exhausted, waiting for manual retry"
                    );
                }

                self.transition(MonitorState::Failed { error, retry_count });
            }
        }
    }

    /// Publish `next` unless the monitor has been torn down.
    fn transition(&self, next: MonitorState) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.state.send_replace(next);
        true
    }
}
