// HTTP request handlers for the player-facing sportsbook API

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app_state::{AppState, SharedState};
use crate::error::{EngineError, EngineResult, ErrorCategory};
use crate::ledger::LedgerTransaction;
use crate::models::*;
use crate::routes::auth::AccountId;
use crate::slips::{Slip, SlipRequest, SlipSummary};

/// Optional header carrying the client's idempotency key
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// ===== ERROR RESPONSES =====

/// An engine error on its way to the client as `{code, message, retryable}`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) | EngineError::OutcomeNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AccountExists(_)
        | EngineError::IdempotencyKeyReused(_)
        | EngineError::EventAlreadyResolved(_) => StatusCode::CONFLICT,
        other => match other.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Business => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Integrity | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(code = err.code(), "request failed: {}", err);
        }
        let body = ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run engine work on the blocking pool; sled calls and event locks block.
pub async fn run_blocking<T, F>(state: &SharedState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError(EngineError::Integrity(format!("worker task failed: {}", e))))?
        .map_err(ApiError)
}

// ===== HEALTH =====

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sportsbook-ledger",
        "timestamp": Utc::now(),
    }))
}

// ===== FUNDS =====

/// POST /api/Players/deposit
pub async fn deposit(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
    Json(payload): Json<AmountRequest>,
) -> ApiResult<BalanceResponse> {
    let tx = run_blocking(&state, move |s| s.ledger.deposit(&account_id, payload.amount)).await?;
    Ok(Json(BalanceResponse {
        transaction_id: tx.id,
        balance: tx.resulting_balance,
    }))
}

/// POST /api/Players/withdraw
pub async fn withdraw(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
    Json(payload): Json<AmountRequest>,
) -> ApiResult<BalanceResponse> {
    let tx = run_blocking(&state, move |s| s.ledger.withdraw(&account_id, payload.amount)).await?;
    Ok(Json(BalanceResponse {
        transaction_id: tx.id,
        balance: tx.resulting_balance,
    }))
}

/// GET /api/Players/transactions
pub async fn get_transactions(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
) -> ApiResult<Vec<LedgerTransaction>> {
    let history = run_blocking(&state, move |s| s.ledger.history(&account_id)).await?;
    Ok(Json(history))
}

// ===== BET SLIPS =====

/// POST /api/Players/betslips
/// The idempotency key may come in the body or the `Idempotency-Key` header;
/// the body wins when both are present.
pub async fn submit_slip(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
    headers: HeaderMap,
    Json(payload): Json<SubmitSlipRequest>,
) -> Result<(StatusCode, Json<SubmitSlipResponse>), ApiError> {
    let header_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let request = SlipRequest {
        account_id,
        stake: payload.amount,
        outcome_ids: payload.odds_ids,
        promotion_id: payload.promotion_id.filter(|p| !p.trim().is_empty()),
        idempotency_key: payload.idempotency_key.or(header_key),
    };

    let response = run_blocking(&state, move |s| {
        let account_id = request.account_id.clone();
        let receipt = s.acceptance.submit(request)?;
        let account_balance = s.ledger.balance(&account_id)?;
        Ok(SubmitSlipResponse {
            receipt,
            account_balance,
        })
    })
    .await?;

    let status = if response.receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

/// GET /api/Players/betslips
pub async fn get_my_slips(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
) -> ApiResult<Vec<SlipSummary>> {
    let summaries =
        run_blocking(&state, move |s| s.slips.summaries_for_account(&account_id)).await?;
    Ok(Json(summaries))
}

/// GET /api/Players/betslips/:id
pub async fn get_slip(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
    Path(slip_id): Path<String>,
) -> ApiResult<Slip> {
    let slip = run_blocking(&state, move |s| s.slips.get_for_account(&slip_id, &account_id)).await?;
    Ok(Json(slip))
}

// ===== PROMOTIONS =====

/// GET /api/Promotions/me
pub async fn get_my_promotions(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
) -> ApiResult<Vec<PromotionView>> {
    use crate::promotions::PromotionSource;

    let promotions = run_blocking(&state, |s| s.promotions.promotions()).await?;
    let now = Utc::now();
    Ok(Json(
        promotions
            .into_iter()
            .map(|p| PromotionView::for_account(p, &account_id, now))
            .collect(),
    ))
}

// ===== ODDS =====

/// GET /api/Odds/:sport
pub async fn get_odds(
    State(state): State<SharedState>,
    Path(sport): Path<String>,
) -> ApiResult<Vec<ApiEventData>> {
    let events = run_blocking(&state, move |s| s.catalog.events_for_sport(&sport)).await?;
    Ok(Json(events.into_iter().map(ApiEventData::from).collect()))
}
