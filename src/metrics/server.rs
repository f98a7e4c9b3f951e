//! HTTP server for the dashboard API, health checks and Prometheus metrics
//!
//! Ledger errors are mapped to status codes by downcasting the `anyhow`
//! error: not-found variants become 404, conflicts 409, bad input 400 and
//! everything else a generic 500.

use crate::error::LedgerError;
use crate::rating::difficulty::rank_nodes;
use crate::rating::{ReportingPeriod, SortKey};
use crate::service::health::{HealthCheck, HealthStatus};
use crate::service::ledger::WarLedger;
use crate::types::{NodeEntry, NodeId, SeasonNumber, WarNumber};
use anyhow::{Context, Result};
use axum::{
    extract::{MatchedPath, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
    pub service_name: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            service_name: "warboard".to_string(),
        }
    }
}

/// Shared state for request handlers
#[derive(Clone)]
pub struct ServerState {
    pub ledger: Arc<WarLedger>,
    pub service_name: String,
}

/// HTTP server with broadcast-driven graceful shutdown
pub struct HttpServer {
    config: HttpServerConfig,
    state: ServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, ledger: Arc<WarLedger>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = ServerState {
            ledger,
            service_name: config.service_name.clone(),
        };

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid HTTP server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("HTTP server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping HTTP server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }

        Ok(())
    }
}

/// Build the router over shared state
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/players", get(players_handler))
        .route("/api/battlegroups", get(battlegroups_handler))
        .route("/api/difficulty", get(difficulty_handler))
        .route("/api/difficulty/recalculate", post(recalculate_handler))
        .route("/api/streaks", get(streaks_handler))
        .route("/api/seasons", get(seasons_handler).post(start_season_handler))
        .route("/api/entries", post(entry_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .with_state(state)
}

/// Error wrapper turning ledger failures into HTTP responses
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.downcast_ref::<LedgerError>() {
            Some(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            Some(e @ LedgerError::Conflict { .. }) => (StatusCode::CONFLICT, e.to_string()),
            Some(
                e @ (LedgerError::InvalidRequest { .. } | LedgerError::Import { .. }),
            ) => (StatusCode::BAD_REQUEST, e.to_string()),
            _ => {
                error!("Request failed: {:#}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process request".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn track_requests(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;
    state
        .ledger
        .metrics()
        .record_http_request(&route, response.status().as_u16(), start.elapsed());
    response
}

async fn root_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/metrics",
            "/api/dashboard",
            "/api/players",
            "/api/battlegroups",
            "/api/difficulty",
            "/api/difficulty/recalculate",
            "/api/streaks",
            "/api/seasons",
            "/api/entries"
        ]
    }))
}

async fn health_handler(State(state): State<ServerState>) -> Response {
    debug!("Health check requested");

    match HealthCheck::check(&state.ledger, &state.service_name).await {
        Ok(health) => {
            let status = match health.status {
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };
            (status, Json(health)).into_response()
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.service_name,
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    let registry = state.ledger.metrics().registry();
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            debug!("Serving {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                output,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Ranking and reporting filters
#[derive(Debug, Default, Deserialize)]
struct RankingQuery {
    sort: Option<String>,
    season: Option<SeasonNumber>,
    war: Option<WarNumber>,
}

impl RankingQuery {
    fn sort_key(&self) -> std::result::Result<SortKey, LedgerError> {
        self.sort.as_deref().map_or(Ok(SortKey::default()), str::parse)
    }

    fn period(&self) -> ReportingPeriod {
        ReportingPeriod {
            season: self.season,
            war: self.war,
        }
    }
}

async fn dashboard_handler(
    State(state): State<ServerState>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<impl IntoResponse> {
    let dashboard = state.ledger.dashboard(query.sort_key()?, query.period())?;
    Ok(Json(dashboard))
}

async fn players_handler(
    State(state): State<ServerState>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<impl IntoResponse> {
    let dashboard = state.ledger.dashboard(query.sort_key()?, query.period())?;
    Ok(Json(dashboard.players))
}

async fn battlegroups_handler(
    State(state): State<ServerState>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ledger.battlegroups(query.period())?))
}

async fn difficulty_handler(State(state): State<ServerState>) -> ApiResult<impl IntoResponse> {
    let table = state.ledger.difficulty_table()?;
    let ranking: Vec<serde_json::Value> = rank_nodes(&table)
        .into_iter()
        .map(|(node, value)| json!({ "node": node, "currentValue": value }))
        .collect();
    Ok(Json(json!({ "table": table, "ranking": ranking })))
}

async fn recalculate_handler(State(state): State<ServerState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ledger.recalculate_difficulty().await?))
}

async fn streaks_handler(State(state): State<ServerState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.ledger.streaks()?))
}

async fn seasons_handler(State(state): State<ServerState>) -> ApiResult<impl IntoResponse> {
    let current = state.ledger.seasons().current_season()?;
    let seasons = state.ledger.seasons().list_seasons().await?;
    Ok(Json(json!({ "current": current, "seasons": seasons })))
}

#[derive(Debug, Deserialize)]
struct StartSeasonRequest {
    season: SeasonNumber,
    description: Option<String>,
}

async fn start_season_handler(
    State(state): State<ServerState>,
    Json(request): Json<StartSeasonRequest>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state
        .ledger
        .start_new_season(request.season, request.description)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "archived": snapshot.season,
            "snapshotId": snapshot.id,
            "current": request.season
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryRequest {
    player: String,
    node: NodeId,
    deaths: Option<u32>,
    bonuses_remaining: Option<u8>,
    war: Option<WarNumber>,
}

async fn entry_handler(
    State(state): State<ServerState>,
    Json(request): Json<EntryRequest>,
) -> ApiResult<impl IntoResponse> {
    let entry = match (request.deaths, request.bonuses_remaining) {
        (Some(deaths), _) => NodeEntry::fight(request.node, deaths, request.war),
        (None, Some(bonuses)) => NodeEntry::from_bonuses(request.node, bonuses, request.war),
        (None, None) => NodeEntry::fight(request.node, 0, request.war),
    };

    state.ledger.record_entry(&request.player, entry).await?;
    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::MetricsCollector;
    use crate::storage::{InMemoryLedgerStorage, InMemorySeasonArchive};
    use crate::types::Battlegroup;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt; // for oneshot

    fn create_test_state() -> ServerState {
        let ledger = WarLedger::new(
            &AppConfig::default(),
            Arc::new(InMemoryLedgerStorage::new()),
            Arc::new(InMemorySeasonArchive::new()),
            Arc::new(MetricsCollector::new().unwrap()),
        )
        .unwrap();

        ServerState {
            ledger: Arc::new(ledger),
            service_name: "warboard".to_string(),
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> StatusCode {
        app.oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (status, body) = get(create_router(create_test_state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "warboard");
    }

    #[tokio::test]
    async fn test_health_endpoint_reports_degraded_when_empty() {
        let (status, body) = get(create_router(create_test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(create_test_state());
        get(app.clone(), "/api/players").await;

        let response = app
            .oneshot(HttpRequest::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("warboard_http_requests_total"));
        assert!(text.contains("warboard_rating_computations_total"));
    }

    #[tokio::test]
    async fn test_players_sorting() {
        let state = create_test_state();
        for (name, bg) in [("Aria", Battlegroup::Bg1), ("Bram", Battlegroup::Bg2)] {
            state
                .ledger
                .administer("add", |roster| roster.add_custom_player(name, bg))
                .await
                .unwrap();
        }
        state
            .ledger
            .record_entry("Bram", NodeEntry::fight(4, 0, Some(1)))
            .await
            .unwrap();

        let app = create_router(state);
        let (status, body) = get(app.clone(), "/api/players?sort=kills").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Bram");
        assert_eq!(body[0]["totalKills"], 1);

        let (status, body) = get(app, "/api/players?sort=elo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("elo"));
    }

    #[tokio::test]
    async fn test_recalculate_endpoint() {
        let app = create_router(create_test_state());
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/difficulty/recalculate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = get(app, "/api/difficulty").await;
        assert!(body["table"]["lastRecalculated"].is_string());
        assert_eq!(body["ranking"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_entry_errors_map_to_status_codes() {
        let app = create_router(create_test_state());

        let status = post_json(
            app.clone(),
            "/api/entries",
            json!({ "player": "Nobody", "node": 3 }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let status = post_json(app, "/api/seasons", json!({ "season": 60 })).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_seasons_endpoint() {
        let app = create_router(create_test_state());
        let status = post_json(app.clone(), "/api/seasons", json!({ "season": 61 })).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = get(app, "/api/seasons").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"]["number"], 61);
        assert_eq!(body["seasons"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_404_handling() {
        let (status, _) = get(create_router(create_test_state()), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_config_default() {
        let config = HttpServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }
}
