// Sportsbook Ledger - Main Entry Point
// Slip acceptance and settlement over a transactional sled store

use std::net::SocketAddr;

use sportsbook_ledger::{build_router, AppState, Config, SharedState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🎲 Sportsbook Ledger");
    println!("═══════════════════════════════════════════════\n");

    let config = Config::from_env();
    config.log_status();

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(bind = %config.bind_addr, "invalid bind address: {}", e);
            std::process::exit(1);
        }
    };

    let state: SharedState = match AppState::open(config) {
        Ok(state) => state.shared(),
        Err(e) => {
            tracing::error!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    let shutdown_state = state.clone();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n╔════════════════════════════════════════════╗");
    println!("║   🚀 SERVER RUNNING                        ║");
    println!("║   📡 http://{:<31}║", addr);
    println!("╚════════════════════════════════════════════╝\n");

    println!("📋 Player Endpoints (X-Account-Id header):");
    println!("   POST /api/Players                 - Open account");
    println!("   GET  /api/Players/me              - Name and balance");
    println!("   POST /api/Players/deposit         - Deposit funds");
    println!("   POST /api/Players/withdraw        - Withdraw funds");
    println!("   GET  /api/Players/transactions    - Ledger history");
    println!("   POST /api/Players/betslips        - Submit bet slip");
    println!("   GET  /api/Players/betslips        - My bet slips");
    println!("   GET  /api/Players/betslips/:id    - Bet slip detail");
    println!("   GET  /api/Promotions/me           - Promotions and availability");
    println!("   GET  /api/Odds/:sport             - Open events with odds");
    println!("\n🔧 Admin Endpoints (X-Admin-Token when configured):");
    println!("   POST /api/Admin/events                 - Publish event");
    println!("   POST /api/Admin/odds/:id               - New price version");
    println!("   POST /api/Admin/odds/:id/suspend       - Suspend outcome");
    println!("   POST /api/Admin/odds/:id/resume        - Resume outcome");
    println!("   GET  /api/Admin/odds/:id/history       - Price history");
    println!("   POST /api/Admin/update-event-result    - Resolve event");
    println!("   POST /api/Admin/events/:id/void        - Void event");
    println!("   GET  /api/Admin/events/unresolved      - Unresolved events");
    println!("   PUT  /api/Admin/promotions             - Promotions feed");
    println!("   GET  /api/Admin/reconcile/:account     - Ledger reconciliation\n");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        tracing::error!("server error: {}", e);
    }

    println!("💾 Flushing database...");
    match shutdown_state.store.flush() {
        Ok(bytes) => tracing::info!(bytes, "database flushed"),
        Err(e) => tracing::error!("failed to flush database: {}", e),
    }
    println!("👋 Goodbye!\n");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    println!("\n\n🛑 Shutdown signal received...");
}
