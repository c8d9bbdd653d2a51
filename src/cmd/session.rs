use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::{
    access::policy::SpecialAccessPolicy,
    client::{
        guard::{AccessGuard, GuardSettings, GuardView},
        monitor::{EntitlementMonitor, MonitorConfig},
        navigation::NavigationContext,
        verifier::{HttpVerifier, Verifier},
    },
    cmd::open_cache,
    types::Principal,
    utils::{config::ClientConfig, constants::MAX_RETRIES},
};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Call the verification endpoint once and print the decision
    Verify {
        /// Bearer token; falls back to ENTITLED_TOKEN
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Mount the access guard and print every view change
    Watch {
        /// Principal identifier, for logs and allow-list matching
        #[arg(short, long)]
        principal_id: String,

        /// Principal email, for allow-list matching
        #[arg(short, long, default_value = "")]
        email: String,

        /// Bearer token; falls back to ENTITLED_TOKEN
        #[arg(short, long)]
        token: Option<String>,

        /// Page URL the session starts on, e.g. a checkout return URL
        #[arg(long)]
        location: Option<String>,

        /// Exit once the guard settles instead of watching for changes
        #[arg(long)]
        once: bool,
    },
}

impl SessionCommands {
    pub async fn execute(&self) -> Result<()> {
        let cfg = ClientConfig::load()?;

        match self {
            SessionCommands::Verify { token } => {
                let verifier = verifier(&cfg, token.clone())?;
                let decision = verifier.verify().await?;
                println!("{}", serde_json::to_string_pretty(&decision.to_response())?);
                Ok(())
            }

            SessionCommands::Watch {
                principal_id,
                email,
                token,
                location,
                once,
            } => {
                let principal = Principal::new(principal_id.clone(), email.clone());
                watch(&cfg, principal, token.clone(), location.as_deref(), *once).await
            }
        }
    }
}

fn verifier(cfg: &ClientConfig, token: Option<String>) -> Result<HttpVerifier> {
    let token = token.or_else(|| cfg.token.clone());
    Ok(HttpVerifier::new(
        cfg.verify_url.clone(),
        token,
        Duration::from_millis(cfg.request_timeout_ms),
    )?)
}

async fn watch(
    cfg: &ClientConfig,
    principal: Principal,
    token: Option<String>,
    location: Option<&str>,
    once: bool,
) -> Result<()> {
    let policy = Arc::new(SpecialAccessPolicy::from_config(&cfg.access));
    let guard = AccessGuard::new(
        policy.clone(),
        GuardSettings::new(cfg.offers_url.clone(), cfg.support_contact.clone()),
    );

    let verifier = Arc::new(verifier(cfg, token)?);
    let cache = open_cache(cfg).await?;
    let monitor_cfg = MonitorConfig::new(principal.id.clone())
        .development(policy.is_development())
        .refresh_every(Duration::from_millis(cfg.refresh_interval_ms));

    let nav = location.map(NavigationContext::parse).transpose()?;
    let mut session = guard.mount_at(&principal, nav.as_ref(), || {
        EntitlementMonitor::spawn(verifier, cache, monitor_cfg)
    });

    info!(principal = %principal.id, "Watching entitlement; type `retry` to force a refresh");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            view = session.next_view() => match view {
                Some(view) => {
                    println!("{}", describe(&view));
                    if once && is_final(&view) {
                        break;
                    }
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == "retry" => session.retry(),
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
        }
    }

    session.unmount().await;
    Ok(())
}

/// Whether the guard will stay on `view` without user action. A failure
/// is only settled once its retries are spent.
fn is_final(view: &GuardView) -> bool {
    match view {
        GuardView::Blank | GuardView::Loading | GuardView::Denied { .. } => false,
        GuardView::VerificationFailed {
            error, retry_count, ..
        } => *retry_count >= MAX_RETRIES || !error.is_retryable(),
        _ => true,
    }
}

fn describe(view: &GuardView) -> String {
    match view {
        GuardView::Blank => "...".to_string(),
        GuardView::Loading => "Checking your access...".to_string(),
        GuardView::Granted { tier, expires_at } => {
            let tier = tier.map(|t| t.to_string()).unwrap_or_default();
            match expires_at {
                Some(at) => format!("Access granted ({}) until {}", tier, at.to_rfc3339()),
                None => format!("Access granted ({})", tier),
            }
        }
        GuardView::AwaitingApproval => {
            "Your beta access is awaiting approval. We'll let you in as soon as it's confirmed."
                .to_string()
        }
        GuardView::Denied {
            message,
            offers_url,
        } => format!("Access denied: {}. Redirecting to {}...", message, offers_url),
        GuardView::Redirect { to } => format!("Redirect -> {}", to),
        GuardView::VerificationFailed {
            error,
            retry_count,
            support_contact,
        } => format!(
            "Could not verify your access ({}; {} retries). Type `retry` or contact {}.",
            error, retry_count, support_contact
        ),
        GuardView::ReauthenticationRequired { error } => {
            format!("Please sign in again ({})", error)
        }
    }
}
