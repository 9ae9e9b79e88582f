//! Prize-draw redemption backend
//!
//! Single-process service behind a token-gated prize roulette: users redeem
//! single-use tokens, a random draw picks a prize from a replenishable
//! pool, and every redemption lands in a remote spreadsheet-like store.
//! Runs two surfaces over one coordinator:
//!
//! - **Redemption** — `POST /redeem` validates a token, runs the draw, and
//!   records the outcome.
//! - **Administration** — `POST /admin/tokens` mints fresh single-use
//!   redemption links.
//! - **Probes** — liveness (`/health`) and readiness (`/status`).

use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod coordinator;
mod error;
mod ledger;
mod links;
mod metrics;
mod notify;
mod pool;
mod storage;

use config::AppConfig;
use coordinator::DrawCoordinator;
use metrics::Metrics;
use notify::TracingNotifier;
use storage::{StorageBackend, UserInfo};

/// Shared application state accessible from HTTP handlers.
struct AppState {
    coordinator: Arc<DrawCoordinator>,
    backend: Arc<dyn StorageBackend>,
    metrics: Arc<Metrics>,
    config: AppConfig,
}

/// Liveness probe — returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Readiness / status probe — backend variant, in-flight draws, counters.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "backend": data.backend.kind(),
        "in_flight_draws": data.coordinator.in_flight_count(),
        "metrics": data.metrics.to_json(),
    }))
}

#[derive(Deserialize)]
struct RedeemRequest {
    token: String,
    user_id: i64,
    username: Option<String>,
}

/// One redemption attempt: token in, draw outcome out.
async fn redeem(data: web::Data<AppState>, body: web::Json<RedeemRequest>) -> HttpResponse {
    let req = body.into_inner();
    let token = req.token.trim();
    if token.is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "token must not be empty"}));
    }

    let user = UserInfo {
        user_id: req.user_id,
        username: req.username,
    };
    let outcome = data.coordinator.redeem(token, &user).await;
    HttpResponse::Ok().json(outcome.to_json())
}

#[derive(Deserialize)]
struct GenerateRequest {
    count: u32,
}

/// Mint a batch of single-use redemption links. Tokens are persisted with
/// status `active` before the response is sent.
async fn generate_tokens(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<GenerateRequest>,
) -> HttpResponse {
    let supplied_key = req
        .headers()
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if supplied_key != data.config.admin_key {
        warn!("Rejected admin request with bad key");
        return HttpResponse::Unauthorized()
            .json(serde_json::json!({"error": "invalid admin key"}));
    }

    let count = body.count;
    if count == 0 || count > data.config.max_token_batch {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("count must be 1..={}", data.config.max_token_batch)
        }));
    }

    let tokens = links::mint_batch(count as usize);
    if let Err(err) = data.backend.add_tokens(&tokens).await {
        warn!(error = %err, "Token batch persistence failed");
        return HttpResponse::BadGateway()
            .json(serde_json::json!({"error": "could not persist tokens"}));
    }
    data.metrics.record_tokens_generated(count as u64);

    let urls: Vec<String> = tokens
        .iter()
        .map(|token| links::redemption_url(&data.config.link_base, token))
        .collect();

    info!(count, "Generated redemption links");
    HttpResponse::Ok().json(serde_json::json!({
        "count": count,
        "links": urls,
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let backend = storage::select_backend(&config);
    info!(backend = backend.kind(), "Storage backend selected");

    let metrics = Arc::new(Metrics::new());
    let coordinator = Arc::new(DrawCoordinator::new(
        backend.clone(),
        Arc::new(TracingNotifier),
        metrics.clone(),
    ));

    let port = config.http_port;
    let state = web::Data::new(AppState {
        coordinator,
        backend,
        metrics,
        config,
    });

    info!(addr = %format!("0.0.0.0:{port}"), "Starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/status", web::get().to(status))
            .route("/redeem", web::post().to(redeem))
            .route("/admin/tokens", web::post().to(generate_tokens))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
