//! Axum HTTP server: hop endpoint, dry-run and admin API, graceful shutdown.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::HopperConfig;
use crate::pools::PoolLoader;
use crate::probe::http::HttpProbe;
use crate::probe::policy::{ReachabilityPolicy, RuntimePolicy};
use crate::probe::Prober;
use crate::progress::{HopEvent, ProgressSink, RecordingSink, TracingSink};
use crate::sequencer::{self, HopError, Navigation, Sequencer};
use crate::stats::HopStats;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: HopperConfig,
    pub loader: PoolLoader,
    pub probe: HttpProbe,
    pub policy: RuntimePolicy,
    pub stats: HopStats,
}

/// Inbound continuation state. Kept raw so malformed values get a proper error.
#[derive(Debug, Deserialize)]
struct HopQuery {
    #[serde(rename = "poolIndex")]
    pool_index: Option<String>,
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_hop))
        .route("/api/hop", get(handle_dry_run))
        .route("/api/stats", get(handle_get_stats))
        .route("/api/policy", get(handle_get_policy).put(handle_set_policy))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "domain-hopper listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("domain-hopper shut down gracefully");
    Ok(())
}

/// Raw `poolIndex` of the inbound query. A query string that does not
/// deserialize (e.g. a repeated `poolIndex`) is an invalid continuation.
fn continuation(
    query: Result<Query<HopQuery>, QueryRejection>,
    RawQuery(raw): RawQuery,
) -> Result<Option<String>, HopError> {
    match query {
        Ok(Query(query)) => Ok(query.pool_index),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected hop query string");
            Err(HopError::InvalidContinuation {
                raw: raw.unwrap_or_default(),
            })
        }
    }
}

/// Run one hop: parse continuation state, load the pool document fresh,
/// probe, and produce the navigation. Every error terminates the hop.
async fn execute_hop(
    state: &AppState,
    continuation: Result<Option<String>, HopError>,
    hop_id: &str,
    sink: &dyn ProgressSink,
) -> Result<Navigation, HopError> {
    let raw_pool_index = continuation.as_ref().ok().and_then(|p| p.as_deref());
    let span = hop_tracing::hop_request_span!(hop_id, raw_pool_index);

    async {
        state.stats.inc_hops();

        let result = async {
            let start_index = sequencer::parse_pool_index(continuation?.as_deref())?;
            let config = state.loader.load().await?;
            let prober = Prober::new(&state.probe, config.probe_timeout(), state.policy.get());
            Sequencer::new(&config, prober, sink).run(start_index).await
        }
        .await;

        let span = tracing::Span::current();
        match &result {
            Ok(navigation) => {
                span.record("outcome", navigation.kind.as_str());
                state.stats.record_navigation(navigation.kind);
            }
            Err(e) => {
                span.record("outcome", e.kind());
                state.stats.inc_failed();
                sink.emit(HopEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }
    .instrument(span)
    .await
}

fn error_status(err: &HopError) -> StatusCode {
    match err {
        HopError::ConfigLoad(_) => StatusCode::BAD_GATEWAY,
        HopError::NoAvailableDomain { .. } => StatusCode::SERVICE_UNAVAILABLE,
        HopError::PoolIndexOutOfRange { .. } | HopError::InvalidContinuation { .. } => {
            StatusCode::BAD_REQUEST
        }
    }
}

/// GET / — run a hop and redirect the visitor.
async fn handle_hop(
    State(state): State<Arc<AppState>>,
    raw: RawQuery,
    query: Result<Query<HopQuery>, QueryRejection>,
) -> Response {
    let hop_id = Uuid::new_v4().to_string();

    match execute_hop(&state, continuation(query, raw), &hop_id, &TracingSink).await {
        Ok(navigation) => (
            StatusCode::FOUND,
            [
                (header::LOCATION, navigation.target_url),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
        )
            .into_response(),
        Err(e) => (
            error_status(&e),
            axum::Json(serde_json::json!({
                "error": e.kind(),
                "message": e.to_string(),
                "hop_id": hop_id,
            })),
        )
            .into_response(),
    }
}

/// GET /api/hop — run a hop and report it instead of redirecting.
async fn handle_dry_run(
    State(state): State<Arc<AppState>>,
    raw: RawQuery,
    query: Result<Query<HopQuery>, QueryRejection>,
) -> Response {
    let hop_id = Uuid::new_v4().to_string();
    let sink = RecordingSink::new();

    let result = execute_hop(&state, continuation(query, raw), &hop_id, &sink).await;
    let events = sink.into_events();

    match result {
        Ok(navigation) => axum::Json(serde_json::json!({
            "hop_id": hop_id,
            "navigation": navigation,
            "events": events,
        }))
        .into_response(),
        Err(e) => (
            error_status(&e),
            axum::Json(serde_json::json!({
                "error": e.kind(),
                "message": e.to_string(),
                "hop_id": hop_id,
                "events": events,
            })),
        )
            .into_response(),
    }
}

/// GET /api/stats — return hop counters.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.stats.snapshot()).into_response()
}

/// GET /api/policy — return the active reachability policy.
async fn handle_get_policy(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(serde_json::json!({ "policy": state.policy.get() })).into_response()
}

/// PUT /api/policy — change the reachability policy for subsequent hops.
async fn handle_set_policy(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let policy_str = match payload.get("policy").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({ "error": "missing 'policy' field" })),
            )
                .into_response();
        }
    };

    let policy: ReachabilityPolicy = match policy_str.parse() {
        Ok(p) => p,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({ "error": message })),
            )
                .into_response();
        }
    };

    state.policy.set(policy);
    tracing::info!(policy = %policy_str, "Reachability policy changed");
    axum::Json(serde_json::json!({ "policy": policy })).into_response()
}

/// Health check endpoint, so hop servers can themselves sit in a pool.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::{PoolsConfig, ProbeConfig};

    struct Fixture {
        router: Router,
        state: AppState,
        health_host: String,
        dir: tempfile::TempDir,
    }

    async fn serve_health() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/health", get(handle_health));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    async fn refused_host() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    async fn fixture_with(document: Option<serde_json::Value>, live: &str, dead: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.json");
        let document = document.unwrap_or_else(|| {
            serde_json::json!({
                "domainPools": [
                    { "name": "entry", "type": "intermediate", "domains": [format!("http://{dead}"), format!("http://{live}")] },
                    { "name": "landing", "type": "target", "domains": [format!("http://{live}")] }
                ],
                "jumpDelayMs": 0,
                "timeoutMs": 2000
            })
        });
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let config = HopperConfig {
            pools: PoolsConfig {
                source: path.to_str().unwrap().to_string(),
                fetch_timeout_ms: 1000,
            },
            probe: ProbeConfig::default(),
            ..HopperConfig::default()
        };

        let state = AppState {
            loader: PoolLoader::new(reqwest::Client::new(), &config.pools),
            probe: HttpProbe::new(&config.probe).unwrap(),
            policy: RuntimePolicy::new(ReachabilityPolicy::SuccessStatus),
            stats: HopStats::new(),
            config,
        };

        Fixture {
            router: router(state.clone()),
            state,
            health_host: live.to_string(),
            dir,
        }
    }

    async fn fixture() -> Fixture {
        let live = serve_health().await;
        let dead = refused_host().await;
        fixture_with(None, &live, &dead).await
    }

    async fn get_uri(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(resp: &Response) -> String {
        resp.headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_origin_hop_chains_to_next_pool() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/").await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        // IP literal hosts are not rotated.
        assert_eq!(
            location(&resp),
            format!("http://{}?poolIndex=1", fx.health_host)
        );
    }

    #[tokio::test]
    async fn test_continuation_hop_finalizes() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/?poolIndex=1").await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), format!("http://{}", fx.health_host));
    }

    #[tokio::test]
    async fn test_out_of_range_index() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/?poolIndex=2").await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get(header::LOCATION).is_none());
        let body = json_body(resp).await;
        assert_eq!(body["error"], "pool_index_out_of_range");
    }

    #[tokio::test]
    async fn test_malformed_index() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/?poolIndex=first").await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "invalid_continuation");
    }

    #[tokio::test]
    async fn test_repeated_index_is_invalid_continuation() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/?poolIndex=1&poolIndex=0").await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get(header::LOCATION).is_none());
        let body = json_body(resp).await;
        assert_eq!(body["error"], "invalid_continuation");
        assert!(body["hop_id"].is_string());

        let resp = get_uri(&fx.router, "/api/hop?poolIndex=1&poolIndex=0").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["events"][0]["event"], "failed");

        let stats = fx.state.stats.snapshot();
        assert_eq!(stats.hops, 2);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_no_available_domain() {
        let dead = refused_host().await;
        let document = serde_json::json!({
            "domainPools": [
                { "name": "entry", "type": "target", "domains": [format!("http://{dead}")] }
            ],
            "jumpDelayMs": 0,
            "timeoutMs": 2000
        });
        let fx = fixture_with(Some(document), "unused", &dead).await;

        let resp = get_uri(&fx.router, "/").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(resp).await["error"], "no_available_domain");
    }

    #[tokio::test]
    async fn test_missing_document() {
        let fx = fixture().await;
        std::fs::remove_file(fx.dir.path().join("domains.json")).unwrap();

        let resp = get_uri(&fx.router, "/").await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(resp).await["error"], "config_load");
    }

    #[tokio::test]
    async fn test_dry_run_reports_events() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/api/hop?poolIndex=0").await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["navigation"]["kind"], "chain");
        assert_eq!(body["navigation"]["next_index"], 1);

        let events = body["events"].as_array().unwrap();
        assert_eq!(events[0]["event"], "step");
        assert_eq!(events[0]["current"], 1);
        assert_eq!(events[0]["total"], 3);
        assert!(events
            .iter()
            .any(|e| e["event"] == "domain_status" && e["status"] == "unavailable"));
        assert!(events.iter().any(|e| e["event"] == "resolved"));
    }

    #[tokio::test]
    async fn test_dry_run_failure_includes_events() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/api/hop?poolIndex=9").await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["events"][0]["event"], "failed");
    }

    #[tokio::test]
    async fn test_stats_count_outcomes() {
        let fx = fixture().await;
        get_uri(&fx.router, "/").await;
        get_uri(&fx.router, "/?poolIndex=1").await;
        get_uri(&fx.router, "/?poolIndex=7").await;

        let body = json_body(get_uri(&fx.router, "/api/stats").await).await;
        assert_eq!(body["hops"], 3);
        assert_eq!(body["chained"], 1);
        assert_eq!(body["finalized"], 1);
        assert_eq!(body["failed"], 1);
    }

    #[tokio::test]
    async fn test_policy_roundtrip() {
        let fx = fixture().await;

        let put = |body: &str| {
            Request::builder()
                .method("PUT")
                .uri("/api/policy")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let resp = fx.router.clone().oneshot(put(r#"{"policy": "wide-open"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = fx.router.clone().oneshot(put(r#"{"policy": "any-settled"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fx.state.policy.get(), ReachabilityPolicy::AnySettled);

        let body = json_body(get_uri(&fx.router, "/api/policy").await).await;
        assert_eq!(body["policy"], "any-settled");
    }

    #[tokio::test]
    async fn test_liberal_policy_accepts_refused_domain() {
        let fx = fixture().await;
        fx.state.policy.set(ReachabilityPolicy::AnySettled);

        let body = json_body(get_uri(&fx.router, "/api/hop").await).await;
        let events = body["events"].as_array().unwrap();
        let resolved = events.iter().find(|e| e["event"] == "resolved").unwrap();
        // The refused domain is listed first and counts as settled.
        assert_ne!(resolved["domain"], format!("http://{}", fx.health_host));
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture().await;
        let resp = get_uri(&fx.router, "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
