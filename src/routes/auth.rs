// Caller identity for the sportsbook API.
// Sessions are issued by the auth gateway in front of this service; the
// gateway forwards the authenticated account id in `X-Account-Id`.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::Json,
};

use crate::app_state::SharedState;
use crate::error::EngineError;
use crate::handlers::{run_blocking, ApiError, ApiResult};
use crate::ids::validate_id;
use crate::models::{PlayerResponse, RegisterRequest};

pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

// ===== EXTRACTORS =====

/// The authenticated account making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                EngineError::Unauthorized(format!("missing {} header", ACCOUNT_HEADER))
            })?;

        validate_id("account", raw).map_err(|_| {
            EngineError::Unauthorized(format!("malformed {} header", ACCOUNT_HEADER))
        })?;
        Ok(AccountId(raw.to_string()))
    }
}

/// Guard for `/api/Admin/*`. Open when no admin token is configured.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[async_trait]
impl FromRequestParts<SharedState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Ok(AdminAccess);
        };
        let given = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                EngineError::Unauthorized(format!("missing {} header", ADMIN_TOKEN_HEADER))
            })?;
        if given != expected {
            tracing::warn!("admin request with a wrong token");
            return Err(EngineError::Forbidden("admin token rejected".into()).into());
        }
        Ok(AdminAccess)
    }
}

// ===== ROUTE HANDLERS =====

/// POST /api/Players
/// Opens an account with a zero balance.
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PlayerResponse>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(EngineError::Validation("name is required".into()).into());
    }
    let account = run_blocking(&state, move |s| {
        s.ledger.open_account(&payload.id, &payload.name, &payload.last_name)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(PlayerResponse::from(account))))
}

/// GET /api/Players/me
pub async fn me(
    State(state): State<SharedState>,
    AccountId(account_id): AccountId,
) -> ApiResult<PlayerResponse> {
    let account = run_blocking(&state, move |s| s.ledger.account(&account_id)).await?;
    Ok(Json(PlayerResponse::from(account)))
}
