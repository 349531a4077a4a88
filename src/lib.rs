//! Sportsbook bet-slip ledger: odds catalog, slip acceptance and settlement
//! over a transactional sled store, served through axum.

pub mod app_state;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod ledger;
pub mod models;
pub mod money;
pub mod odds;
pub mod promotions;
pub mod routes;
pub mod settlement;
pub mod slips;
pub mod store;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use app_state::{AppState, SharedState};
pub use config::{Config, StakeDebit};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use ledger::{Account, Ledger, LedgerTransaction, TxKind};
pub use odds::{Event, EventStatus, NewEvent, NewOutcome, OddsCatalog, OutcomeKind};
pub use promotions::{BonusType, Promotion, PromotionBook, PromotionSource};
pub use settlement::{Resolution, SettlementEngine};
pub use slips::{AcceptanceEngine, BetResult, Receipt, Slip, SlipBook, SlipRequest};
pub use store::Store;

/// Every route of the service with CORS and request tracing applied.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // ===== PLAYERS =====
        .route("/api/Players", post(routes::auth::register))
        .route("/api/Players/me", get(routes::auth::me))
        .route("/api/Players/deposit", post(handlers::deposit))
        .route("/api/Players/withdraw", post(handlers::withdraw))
        .route("/api/Players/transactions", get(handlers::get_transactions))
        .route(
            "/api/Players/betslips",
            post(handlers::submit_slip).get(handlers::get_my_slips),
        )
        .route("/api/Players/betslips/:id", get(handlers::get_slip))
        // ===== CATALOG & PROMOTIONS =====
        .route("/api/Promotions/me", get(handlers::get_my_promotions))
        .route("/api/Odds/:sport", get(handlers::get_odds))
        // ===== ADMIN =====
        .route("/api/Admin/events", post(routes::admin::publish_event))
        .route("/api/Admin/events/unresolved", get(routes::admin::unresolved_events))
        .route("/api/Admin/events/:id/void", post(routes::admin::void_event))
        .route("/api/Admin/odds/:outcome_id", post(routes::admin::update_price))
        .route("/api/Admin/odds/:outcome_id/suspend", post(routes::admin::suspend_outcome))
        .route("/api/Admin/odds/:outcome_id/resume", post(routes::admin::resume_outcome))
        .route("/api/Admin/odds/:outcome_id/history", get(routes::admin::price_history))
        .route("/api/Admin/update-event-result", post(routes::admin::update_event_result))
        .route("/api/Admin/promotions", put(routes::admin::upsert_promotion))
        .route("/api/Admin/reconcile/:account", get(routes::admin::reconcile))
        // ===== HEALTH =====
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
