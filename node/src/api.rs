//! # REST API
//!
//! Builds the axum router that exposes the vault node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/status`              | Node status summary                  |
//! | POST   | `/deposits`            | Submit a deposit event to the engine |
//! | GET    | `/vaults/:key`         | Vault by key or invoice id           |
//! | GET    | `/oracle/rate`         | Current oracle quote                 |
//! | PUT    | `/oracle/rate`         | Publish a new rate                   |
//! | PUT    | `/trustlines/:account` | Record an account's trustline limit  |
//! | GET    | `/transfers/:id`       | Emitted settlement transfer by id    |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pegvault_protocol::amount::{Amount, Ratio};
use pegvault_protocol::asset::StablecoinIdentity;
use pegvault_protocol::credential::{CredentialCheck, TrustlineRegistry};
use pegvault_protocol::engine::transition::is_liquidatable;
use pegvault_protocol::engine::{DepositEvent, Engine, EngineResult, ErrorCategory};
use pegvault_protocol::oracle::{FeedOracle, PriceQuote};
use pegvault_protocol::settlement::TransferId;
use pegvault_protocol::storage::VaultDb;
use pegvault_protocol::vault::{AccountId, VaultKey};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub engine: Arc<Engine>,
    /// The feed the engine reads its rate from.
    pub oracle: Arc<FeedOracle>,
    /// The registry the engine checks credentials against.
    pub trustlines: Arc<TrustlineRegistry>,
    /// Vault records and the settlement outbox.
    pub db: VaultDb,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/deposits", post(deposit_handler))
        .route("/vaults/:key", get(vault_handler))
        .route("/oracle/rate", get(rate_handler).put(publish_rate_handler))
        .route("/trustlines/:account", put(trustline_handler))
        .route("/transfers/:id", get(transfer_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub engine_account: AccountId,
    pub stablecoin: StablecoinIdentity,
    pub new_ratio: Ratio,
    pub liquidation_ratio: Ratio,
    /// `None` until a rate has been published.
    pub rate: Option<PriceQuote>,
    pub deposits_accepted: u64,
    pub deposits_rejected: u64,
    pub transfers_emitted: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /vaults/:key`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultResponse {
    pub key: VaultKey,
    /// The 32-byte form a liquidator quotes as a takeover target.
    pub invoice_id: String,
    pub account: AccountId,
    /// `None` when the vault was opened without a source tag.
    pub source_tag: Option<u32>,
    pub debt: Amount,
    pub collateral: Amount,
    /// Debt over collateral value at the current rate. Absent without a
    /// rate or when the ratio is unbounded.
    pub debt_ratio: Option<Amount>,
    /// Absent without a rate.
    pub liquidatable: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRateRequest {
    pub rate: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrustlineRequest {
    pub limit: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrustlineResponse {
    pub account: AccountId,
    pub limit: u64,
    pub authorized: bool,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

/// HTTP status for an engine result.
fn result_status(result: &EngineResult) -> StatusCode {
    match result.category {
        None => StatusCode::OK,
        Some(ErrorCategory::Precondition) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorCategory::NoSuchVault) => StatusCode::NOT_FOUND,
        Some(ErrorCategory::NotYetLiquidatable)
        | Some(ErrorCategory::InsufficientTakeoverDeposit) => StatusCode::CONFLICT,
        Some(ErrorCategory::Emission) => StatusCode::BAD_GATEWAY,
        Some(ErrorCategory::Arithmetic)
        | Some(ErrorCategory::InternalComputation)
        | Some(ErrorCategory::Storage) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.engine.config();
    Json(StatusResponse {
        version: state.version.clone(),
        engine_account: config.engine_account,
        stablecoin: config.stablecoin,
        new_ratio: config.risk.new_ratio,
        liquidation_ratio: config.risk.liquidation_ratio,
        rate: state.oracle.latest(),
        deposits_accepted: state.metrics.deposits_accepted_total.get(),
        deposits_rejected: state.metrics.deposits_rejected_total.get(),
        transfers_emitted: state.db.transfer_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /deposits` — runs one deposit through the engine.
///
/// The body is always an [`EngineResult`]; the HTTP status mirrors its
/// category.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(event): Json<DepositEvent>,
) -> impl IntoResponse {
    let started = Instant::now();
    let result = state.engine.on_deposit(&event);
    state
        .metrics
        .deposit_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    state.metrics.observe(&result);

    (result_status(&result), Json(result))
}

/// `GET /vaults/:key` — accepts the 48-hex-char key or 64-hex-char invoice id.
async fn vault_handler(Path(key): Path<String>, State(state): State<AppState>) -> Response {
    let key: VaultKey = match key.parse() {
        Ok(key) => key,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid vault key: {e}")),
    };

    let vault = match state.engine.vault(&key) {
        Ok(Some(vault)) => vault,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("No vault at {key}")),
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}"))
        }
    };

    let quote = state.oracle.latest();
    let liquidation_ratio = state.engine.config().risk.liquidation_ratio;
    let debt_ratio = quote.and_then(|q| vault.debt_ratio(q.rate).ok().flatten());
    let liquidatable =
        quote.and_then(|q| is_liquidatable(&vault, q.rate, liquidation_ratio).ok());

    let resp = VaultResponse {
        key,
        invoice_id: hex::encode_upper(key.to_invoice_id()),
        account: key.account,
        source_tag: (!key.tag.is_none()).then_some(key.tag.0),
        debt: vault.debt,
        collateral: vault.collateral,
        debt_ratio,
        liquidatable,
    };
    (StatusCode::OK, Json(resp)).into_response()
}

/// `GET /oracle/rate` — the latest published quote.
async fn rate_handler(State(state): State<AppState>) -> Response {
    match state.oracle.latest() {
        Some(quote) => (StatusCode::OK, Json(quote)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No rate published"),
    }
}

/// `PUT /oracle/rate` — publishes a new rate.
async fn publish_rate_handler(
    State(state): State<AppState>,
    Json(req): Json<PublishRateRequest>,
) -> Response {
    if !req.rate.is_positive() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Rate must be positive, got {}", req.rate),
        );
    }
    let quote = state.oracle.publish(req.rate);
    (StatusCode::OK, Json(quote)).into_response()
}

/// `PUT /trustlines/:account` — records the account's trustline limit.
async fn trustline_handler(
    Path(account): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TrustlineRequest>,
) -> Response {
    let account: AccountId = match account.parse() {
        Ok(account) => account,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid account: {e}")),
    };

    state.trustlines.set_limit(account, req.limit);
    let resp = TrustlineResponse {
        account,
        limit: req.limit,
        authorized: state.trustlines.has_authorization(&account),
    };
    (StatusCode::OK, Json(resp)).into_response()
}

/// `GET /transfers/:id` — an emitted transfer from the outbox.
async fn transfer_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    let id: TransferId = match id.parse() {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid transfer id: {e}")),
    };

    match state.db.get_transfer(&id) {
        Ok(Some(transfer)) => (StatusCode::OK, Json(transfer)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Transfer not found: {id}")),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use pegvault_protocol::config::{EngineConfig, REQUIRED_TRUSTLINE_LIMIT};
    use pegvault_protocol::settlement::OutboxEmitter;
    use pegvault_protocol::vault::SourceTag;
    use tower::ServiceExt;

    const ENGINE: AccountId = AccountId([0xEE; 20]);
    const ALICE: AccountId = AccountId([0xA1; 20]);
    const BOB: AccountId = AccountId([0xB0; 20]);

    /// Creates a test AppState backed by a temporary database, rate 1, and
    /// trustlines for Alice and Bob.
    fn test_app_state() -> AppState {
        let db = VaultDb::open_temporary().expect("temp db");
        let oracle = Arc::new(FeedOracle::with_rate(Amount::from_integer(1)));
        let trustlines = Arc::new(TrustlineRegistry::new());
        trustlines.set_limit(ALICE, REQUIRED_TRUSTLINE_LIMIT);
        trustlines.set_limit(BOB, REQUIRED_TRUSTLINE_LIMIT);

        let engine = Arc::new(Engine::new(
            EngineConfig::new(ENGINE),
            Arc::new(db.clone()),
            oracle.clone(),
            trustlines.clone(),
            Arc::new(OutboxEmitter::new(db.clone())),
        ));

        AppState {
            version: "0.1.0-test".into(),
            engine,
            oracle,
            trustlines,
            db,
            metrics: Arc::new(crate::metrics::NodeMetrics::new().expect("metrics")),
        }
    }

    async fn send(router: &Router, method: &str, path: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        let req = match body {
            Some(json) => builder.body(Body::from(serde_json::to_vec(&json).unwrap())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn reserve_deposit(sender: AccountId, amount: &str) -> serde_json::Value {
        serde_json::json!({
            "asset": { "kind": "reserve" },
            "amount": amount,
            "sender": sender.to_hex(),
            "source_tag": 1,
        })
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, json) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn deposit_mints_and_vault_is_readable() {
        let router = create_router(test_app_state());
        let (status, json) = send(&router, "POST", "/deposits", Some(reserve_deposit(ALICE, "200"))).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["accepted"], true);
        assert_eq!(json["note"], "Stablecoin minted");

        let key = VaultKey::new(ALICE, SourceTag(1));
        let (status, vault) = send(&router, "GET", &format!("/vaults/{key}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(vault["debt"], "100");
        assert_eq!(vault["collateral"], "200");
        assert_eq!(vault["debt_ratio"], "0.5");
        assert_eq!(vault["liquidatable"], false);
        assert_eq!(vault["source_tag"], 1);

        // The invoice-id form addresses the same vault.
        let invoice = hex::encode(key.to_invoice_id());
        let (status, _) = send(&router, "GET", &format!("/vaults/{invoice}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let transfer_id = json["transfer_id"].as_str().unwrap().to_string();
        let (status, transfer) = send(&router, "GET", &format!("/transfers/{transfer_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transfer["transfer"]["payout"]["stablecoin"]["amount"], "100");
    }

    #[tokio::test]
    async fn rejected_deposit_maps_category_to_status() {
        let router = create_router(test_app_state());
        let stranger = AccountId([0x42; 20]);
        let (status, json) = send(&router, "POST", "/deposits", Some(reserve_deposit(stranger, "10"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["accepted"], false);
        assert_eq!(json["committed"], false);
        assert_eq!(json["code"], 102);
        assert_eq!(json["category"], "precondition");
    }

    #[tokio::test]
    async fn takeover_of_healthy_vault_conflicts() {
        let router = create_router(test_app_state());
        send(&router, "POST", "/deposits", Some(reserve_deposit(ALICE, "200"))).await;

        let target = VaultKey::new(ALICE, SourceTag(1));
        let mut event = reserve_deposit(BOB, "300");
        event["takeover_target"] = serde_json::Value::String(hex::encode(target.to_invoice_id()));
        let (status, json) = send(&router, "POST", "/deposits", Some(event.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], 300);

        // Halve the rate: 100 / (200 × 0.5) = 1 > 5/6.
        let (status, _) = send(&router, "PUT", "/oracle/rate", Some(serde_json::json!({ "rate": "0.5" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send(&router, "POST", "/deposits", Some(event)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["code"], 6);

        let (status, _) = send(&router, "GET", &format!("/vaults/{target}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn vault_endpoint_rejects_bad_keys() {
        let router = create_router(test_app_state());
        let (status, json) = send(&router, "GET", "/vaults/not-hex", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid vault key"));
    }

    #[tokio::test]
    async fn oracle_rate_roundtrip_and_validation() {
        let router = create_router(test_app_state());
        let (status, quote) = send(&router, "GET", "/oracle/rate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quote["rate"], "1");

        let (status, _) = send(&router, "PUT", "/oracle/rate", Some(serde_json::json!({ "rate": "0" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn trustline_update_controls_authorization() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let carol = AccountId([0xC0; 20]);

        let (status, json) = send(
            &router,
            "PUT",
            &format!("/trustlines/{carol}"),
            Some(serde_json::json!({ "limit": REQUIRED_TRUSTLINE_LIMIT })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["authorized"], true);
        assert!(state.trustlines.has_authorization(&carol));
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let state = test_app_state();
        let router = create_router(state);
        send(&router, "POST", "/deposits", Some(reserve_deposit(ALICE, "200"))).await;

        let (status, json) = send(&router, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["deposits_accepted"], 1);
        assert_eq!(json["transfers_emitted"], 1);
        assert_eq!(json["stablecoin"]["currency"], "USD");
        assert_eq!(json["engine_account"], ENGINE.to_hex());
    }

    #[tokio::test]
    async fn missing_transfer_is_404() {
        let router = create_router(test_app_state());
        let id = "00".repeat(32);
        let (status, _) = send(&router, "GET", &format!("/transfers/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
