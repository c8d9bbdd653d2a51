use std::sync::Arc;

use axum::{
    Extension,
    extract::{Json, State},
    response::IntoResponse,
};
use tracing::{error, info};

use crate::{
    backend::{AppState, metrics::METRICS},
    types::{Principal, VerifyResponse},
    utils::{error::EntitlementError, logs_fmt::abbrev},
};

pub async fn verify_entitlement_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<VerifyResponse>, EntitlementError> {
    let timer = std::time::Instant::now();

    let result = state.resolver.resolve(&principal).await;

    METRICS
        .resolve_duration
        .observe(timer.elapsed().as_secs_f64());

    let decision = match result {
        Ok(decision) => decision,
        Err(e) => {
            METRICS.storage_failures.inc();
            error!(
                principal = %principal.id,
                error = %e,
                "Entitlement resolution failed"
            );
            return Err(e);
        }
    };

    if decision.granted {
        METRICS.decisions_granted.inc();
    } else if decision.pending_validation {
        METRICS.decisions_pending.inc();
    } else {
        METRICS.decisions_denied.inc();
    }

    info!(
        principal = %principal.id,
        email = %abbrev(&principal.email),
        granted = decision.granted,
        tier = ?decision.tier,
        duration_ms = timer.elapsed().as_secs_f64() * 1000.0,
        "Entitlement verification request"
    );

    Ok(Json(decision.to_response()))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_ok = state.resolver.store().health_check().await.is_ok();
    let status = if store_ok { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "store": store_ok,
        "development": state.resolver.policy().is_development(),
        "service": "entitled-server"
    }))
}
