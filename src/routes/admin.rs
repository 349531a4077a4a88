// Admin routes: catalog management, results, promotions feed, reconciliation.
// Every handler takes `AdminAccess`, so a configured admin token is enforced
// before the body is read.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use std::collections::BTreeMap;

use crate::app_state::SharedState;
use crate::error::EngineError;
use crate::handlers::{run_blocking, ApiError, ApiResult};
use crate::ledger::ReconcileReport;
use crate::models::{ApiEventData, EventResultRequest, PriceUpdateRequest};
use crate::odds::{EventView, NewEvent, OddsSnapshot, Outcome};
use crate::promotions::Promotion;
use crate::routes::auth::AdminAccess;
use crate::settlement::Resolution;

// ===== EVENTS & ODDS =====

/// POST /api/Admin/events
pub async fn publish_event(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Json(payload): Json<NewEvent>,
) -> Result<(StatusCode, Json<EventView>), ApiError> {
    let view = run_blocking(&state, move |s| s.catalog.publish_event(payload)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /api/Admin/odds/:outcome_id
pub async fn update_price(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(outcome_id): Path<String>,
    Json(payload): Json<PriceUpdateRequest>,
) -> ApiResult<OddsSnapshot> {
    let snapshot =
        run_blocking(&state, move |s| s.catalog.update_price(&outcome_id, payload.price)).await?;
    Ok(Json(snapshot))
}

/// POST /api/Admin/odds/:outcome_id/suspend
pub async fn suspend_outcome(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(outcome_id): Path<String>,
) -> ApiResult<Outcome> {
    let outcome = run_blocking(&state, move |s| s.catalog.suspend(&outcome_id)).await?;
    Ok(Json(outcome))
}

/// POST /api/Admin/odds/:outcome_id/resume
pub async fn resume_outcome(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(outcome_id): Path<String>,
) -> ApiResult<Outcome> {
    let outcome = run_blocking(&state, move |s| s.catalog.resume(&outcome_id)).await?;
    Ok(Json(outcome))
}

/// GET /api/Admin/odds/:outcome_id/history
pub async fn price_history(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(outcome_id): Path<String>,
) -> ApiResult<Vec<OddsSnapshot>> {
    let history = run_blocking(&state, move |s| s.catalog.price_history(&outcome_id)).await?;
    Ok(Json(history))
}

/// GET /api/Admin/events/unresolved
pub async fn unresolved_events(
    _admin: AdminAccess,
    State(state): State<SharedState>,
) -> ApiResult<Vec<ApiEventData>> {
    let events = run_blocking(&state, |s| s.catalog.unresolved_events()).await?;
    Ok(Json(events.into_iter().map(ApiEventData::from).collect()))
}

// ===== SETTLEMENT =====

/// POST /api/Admin/update-event-result
pub async fn update_event_result(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Json(payload): Json<EventResultRequest>,
) -> ApiResult<Resolution> {
    let mut scores = BTreeMap::new();
    for entry in payload.scores {
        if scores.insert(entry.outcome_id.clone(), entry.score).is_some() {
            return Err(EngineError::Validation(format!(
                "outcome {} is scored twice",
                entry.outcome_id
            ))
            .into());
        }
    }
    let event_id = payload.event_id;
    let resolution =
        run_blocking(&state, move |s| s.settlement.resolve_event(&event_id, &scores)).await?;
    Ok(Json(resolution))
}

/// POST /api/Admin/events/:id/void
pub async fn void_event(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
) -> ApiResult<Resolution> {
    let resolution = run_blocking(&state, move |s| s.settlement.void_event(&event_id)).await?;
    Ok(Json(resolution))
}

// ===== PROMOTIONS FEED =====

/// PUT /api/Admin/promotions
pub async fn upsert_promotion(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Json(payload): Json<Promotion>,
) -> ApiResult<Promotion> {
    let promotion = run_blocking(&state, move |s| {
        s.promotions.upsert(&payload)?;
        Ok(payload)
    })
    .await?;
    Ok(Json(promotion))
}

// ===== RECONCILIATION =====

/// GET /api/Admin/reconcile/:account
pub async fn reconcile(
    _admin: AdminAccess,
    State(state): State<SharedState>,
    Path(account_id): Path<String>,
) -> ApiResult<ReconcileReport> {
    let report = run_blocking(&state, move |s| s.ledger.reconcile(&account_id)).await?;
    Ok(Json(report))
}
