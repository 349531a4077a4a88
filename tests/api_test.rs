// HTTP surface tests: the router is driven in-process, no listener needed.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use tower::ServiceExt;

use sportsbook_ledger::{build_router, AppState, Config};

struct TestApp {
    router: Router,
}

impl TestApp {
    fn new(config: Config) -> Self {
        let state = AppState::temporary(config).unwrap().shared();
        Self {
            router: build_router(state),
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn player(
        &self,
        method: &str,
        uri: &str,
        account: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.call(method, uri, &[("x-account-id", account)], body).await
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, &[], body).await
    }
}

/// Decimal fields serialize as strings; accept numbers too.
fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {}", other),
    }
}

async fn seeded() -> TestApp {
    let app = TestApp::new(Config::default());

    let (status, _) = app
        .call(
            "POST",
            "/api/Players",
            &[],
            Some(json!({ "id": "alice", "name": "Alice", "lastName": "Nowak" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .player("POST", "/api/Players/deposit", "alice", Some(json!({ "amount": "100.00" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["balance"]), dec!(100.00));

    for (id, home, away) in [("e1", "1.50", "2.40"), ("e2", "2.00", "1.70")] {
        let (status, _) = app
            .admin(
                "POST",
                "/api/Admin/events",
                Some(json!({
                    "id": id,
                    "sport": "soccer",
                    "name": format!("{} home vs away", id),
                    "startsAt": "2026-11-01T15:00:00Z",
                    "outcomes": [
                        { "id": format!("{}-home", id), "label": "Home", "price": home },
                        { "id": format!("{}-away", id), "label": "Away", "price": away }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(Config::default());
    let (status, body) = app.call("GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_me_requires_account_header() {
    let app = seeded().await;

    let (status, body) = app.call("GET", "/api/Players/me", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["retryable"], false);

    let (status, body) = app.player("GET", "/api/Players/me", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["lastName"], "Nowak");
    assert_eq!(decimal(&body["accountBalance"]), dec!(100.00));
}

#[tokio::test]
async fn test_odds_board_shape() {
    let app = seeded().await;
    let (status, body) = app.call("GET", "/api/Odds/soccer", &[], None).await;
    assert_eq!(status, StatusCode::OK);

    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventId"], "e1");
    assert_eq!(events[0]["odds"][0]["oddId"], "e1-home");
    assert_eq!(events[0]["odds"][0]["teamName"], "Home");
    assert_eq!(decimal(&events[0]["odds"][0]["oddsValue"]), dec!(1.50));
}

#[tokio::test]
async fn test_slip_flow_over_http() {
    let app = seeded().await;

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "20", "oddsIds": ["e1-home", "e2-home"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["combinedOdds"]), dec!(3.00));
    assert_eq!(decimal(&body["potentialWin"]), dec!(60.00));
    assert_eq!(decimal(&body["accountBalance"]), dec!(80.00));
    let slip_id = body["slipId"].as_str().unwrap().to_string();

    let (status, body) = app.player("GET", "/api/Players/betslips", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], slip_id.as_str());
    assert_eq!(body[0]["result"], "Pending");
    assert_eq!(body[0]["selectionCount"], 2);

    for (event, home, away) in [("e1", 2, 1), ("e2", 1, 0)] {
        let (status, _) = app
            .admin(
                "POST",
                "/api/Admin/update-event-result",
                Some(json!({
                    "eventId": event,
                    "scores": [
                        { "outcomeId": format!("{}-home", event), "score": home },
                        { "outcomeId": format!("{}-away", event), "score": away }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .player("GET", &format!("/api/Players/betslips/{}", slip_id), "alice", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Won");
    assert_eq!(body["selections"][1]["result"], "Won");

    let (_, body) = app.player("GET", "/api/Players/me", "alice", None).await;
    assert_eq!(decimal(&body["accountBalance"]), dec!(140.00));

    let (status, body) = app.admin("GET", "/api/Admin/reconcile/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);
}

#[tokio::test]
async fn test_rejections_carry_reason_codes() {
    let app = seeded().await;

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "500", "oddsIds": ["e1-home"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "10", "oddsIds": ["e1-home", "e1-away"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_EVENT_SELECTION");

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "0", "oddsIds": ["e1-home"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STAKE");

    let (_, body) = app.player("GET", "/api/Players/me", "alice", None).await;
    assert_eq!(decimal(&body["accountBalance"]), dec!(100.00));
}

#[tokio::test]
async fn test_idempotency_header_replays() {
    let app = seeded().await;
    let headers = [("x-account-id", "alice"), ("idempotency-key", "tap-1")];
    let body = json!({ "amount": "20", "oddsIds": ["e1-home"] });

    let uri = "/api/Players/betslips";
    let (first_status, first) = app.call("POST", uri, &headers, Some(body.clone())).await;
    let (second_status, second) = app.call("POST", uri, &headers, Some(body)).await;
    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["slipId"], second["slipId"]);
    assert_eq!(second["replayed"], true);
    assert_eq!(decimal(&second["accountBalance"]), dec!(80.00));

    let (status, body) = app
        .call(
            "POST",
            "/api/Players/betslips",
            &headers,
            Some(json!({ "amount": "30", "oddsIds": ["e1-home"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "IDEMPOTENCY_KEY_REUSED");
}

#[tokio::test]
async fn test_foreign_slip_is_forbidden() {
    let app = seeded().await;
    app.call(
        "POST",
        "/api/Players",
        &[],
        Some(json!({ "id": "bob", "name": "Bob", "lastName": "Kowal" })),
    )
    .await;

    let (_, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "20", "oddsIds": ["e1-home"] })),
        )
        .await;
    let slip_id = body["slipId"].as_str().unwrap().to_string();

    let (status, body) = app
        .player("GET", &format!("/api/Players/betslips/{}", slip_id), "bob", None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_promotions_listing_and_application() {
    let app = seeded().await;
    let (status, _) = app
        .admin(
            "PUT",
            "/api/Admin/promotions",
            Some(json!({
                "id": "double",
                "promotionName": "Double stake",
                "bonusType": "percentage",
                "bonusValue": "100",
                "dateStart": "2020-01-01T00:00:00Z",
                "dateEnd": "2099-12-31T23:59:59Z"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.player("GET", "/api/Promotions/me", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["promotionName"], "Double stake");
    assert_eq!(body[0]["availability"], "available");

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "25", "oddsIds": ["e2-home"], "promotionId": "double" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["effectiveStake"]), dec!(50));
    assert_eq!(decimal(&body["potentialWin"]), dec!(100.00));
    assert_eq!(decimal(&body["accountBalance"]), dec!(50.00));
}

#[tokio::test]
async fn test_admin_token_is_enforced_when_configured() {
    let app = TestApp::new(Config {
        admin_token: Some("s3cret".into()),
        ..Config::default()
    });

    let (status, _) = app.call("GET", "/api/Admin/events/unresolved", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call("GET", "/api/Admin/events/unresolved", &[("x-admin-token", "wrong")], None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("GET", "/api/Admin/events/unresolved", &[("x-admin-token", "s3cret")], None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_price_admin_routes() {
    let app = seeded().await;

    let (status, body) = app
        .admin("POST", "/api/Admin/odds/e1-home", Some(json!({ "price": "1.65" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);

    let (status, body) = app
        .admin("POST", "/api/Admin/odds/e1-home", Some(json!({ "price": "1000.01" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, body) = app.admin("GET", "/api/Admin/odds/e1-home/history", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = app.admin("POST", "/api/Admin/odds/e1-away/suspend", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "suspended");

    let (status, body) = app
        .player(
            "POST",
            "/api/Players/betslips",
            "alice",
            Some(json!({ "amount": "10", "oddsIds": ["e1-away"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "OUTCOME_UNAVAILABLE");

    let (status, body) = app.admin("POST", "/api/Admin/events/e2/void", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "voided");
}
