//! HTTP control API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use ontoagg_core::scheduler::{Aggregator, RunReport};
use ontoagg_core::store::TripleStore;
use ontoagg_core::{AggregationError, Period};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared by the handlers and the scheduler loop
pub struct AppState<S: TripleStore> {
    /// Held for the whole of a run; runs never overlap
    pub aggregator: Mutex<Aggregator<S>>,
    last_run: RwLock<Option<RunReport>>,
}

impl<S: TripleStore> AppState<S> {
    pub fn new(aggregator: Aggregator<S>) -> Self {
        Self {
            aggregator: Mutex::new(aggregator),
            last_run: RwLock::new(None),
        }
    }

    /// Remember the report of a finished run
    pub fn record(&self, report: RunReport) {
        *self.last_run.write() = Some(report);
    }

    pub fn last_run(&self) -> Option<RunReport> {
        self.last_run.read().clone()
    }
}

/// Create the API router
pub fn create_router<S: TripleStore + 'static>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health))
        .route("/ping", get(ping))

        // Runs
        .route("/aggregate/:period", post(aggregate::<S>))
        .route("/runs/last", get(last_run::<S>))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: ontoagg_core::VERSION.to_string(),
    })
}

async fn ping() -> &'static str {
    "pong"
}

/// Run one period now for the latest completed window.
///
/// Answers 409 when the period is not due for that window or the window
/// was aggregated before.
async fn aggregate<S: TripleStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(period): Path<String>,
) -> Result<Json<RunReport>, ApiError> {
    let period: Period = period
        .parse()
        .map_err(|e: AggregationError| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let aggregator = state
        .aggregator
        .try_lock()
        .map_err(|_| api_error(StatusCode::CONFLICT, "an aggregation run is already active"))?;

    info!(%period, "manual aggregation requested");
    match aggregator.run_latest(period, Utc::now()).await {
        Ok(report) if report.already_aggregated => Err(api_error(
            StatusCode::CONFLICT,
            format!("{} window ending {} already aggregated", period, report.until),
        )),
        Ok(report) => {
            state.record(report.clone());
            Ok(Json(report))
        }
        Err(e @ AggregationError::NotScheduled { .. }) => {
            info!(%period, "manual aggregation rejected: {}", e);
            Err(api_error(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => {
            error!(%period, "aggregation run failed: {}", e);
            let status = if e.is_retryable() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err(api_error(status, e.to_string()))
        }
    }
}

async fn last_run<S: TripleStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<RunReport>, ApiError> {
    state
        .last_run()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no aggregation run finished yet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ontoagg_core::config::OntoAggConfig;
    use ontoagg_core::store::{SparqlBinding, SparqlResults, SparqlValue};
    use ontoagg_core::Result;
    use tower::ServiceExt;

    #[derive(Clone, Copy)]
    struct EmptyStore {
        reachable: bool,
        aggregated: bool,
    }

    impl TripleStore for EmptyStore {
        async fn query(&self, sparql: &str) -> Result<SparqlResults> {
            if !self.reachable {
                return Err(AggregationError::Transport("connection refused".into()));
            }
            let mut results = SparqlResults::default();
            if self.aggregated && sparql.contains("SELECT ?existing") {
                let value = SparqlValue::iri("http://example.org/ontoagg#aggregation_1");
                results.results.bindings = vec![SparqlBinding::from([("existing".to_string(), value)])];
            }
            Ok(results)
        }

        async fn update(&self, _sparql: &str) -> Result<()> {
            Ok(())
        }
    }

    fn state_with(store: EmptyStore) -> Arc<AppState<EmptyStore>> {
        let aggregator = Aggregator::new(store, &OntoAggConfig::default()).unwrap();
        Arc::new(AppState::new(aggregator))
    }

    fn state(reachable: bool) -> Arc<AppState<EmptyStore>> {
        state_with(EmptyStore {
            reachable,
            aggregated: false,
        })
    }

    async fn send(router: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(create_router(state(true)), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], ontoagg_core::VERSION);
    }

    #[tokio::test]
    async fn test_manual_run_is_reported() {
        let state = state(true);
        let (status, _) = send(create_router(state.clone()), "GET", "/runs/last").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(create_router(state.clone()), "POST", "/aggregate/day").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period"], "DAY");
        assert_eq!(body["superseded"], 0);
        assert_eq!(body["already_aggregated"], false);

        let (status, last) = send(create_router(state), "GET", "/runs/last").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(last["run_id"], body["run_id"]);
    }

    #[tokio::test]
    async fn test_week_outside_cadence_conflicts() {
        let state = state(true);
        let (status, body) = send(create_router(state.clone()), "POST", "/aggregate/week").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("not due"));
        assert!(state.last_run().is_none());
    }

    #[tokio::test]
    async fn test_aggregated_window_conflicts() {
        let state = state_with(EmptyStore {
            reachable: true,
            aggregated: true,
        });
        let (status, body) = send(create_router(state.clone()), "POST", "/aggregate/day").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already aggregated"));
        assert!(state.last_run().is_none());
    }

    #[tokio::test]
    async fn test_unknown_period_rejected() {
        let (status, body) = send(create_router(state(true)), "POST", "/aggregate/hour").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("hour"));
    }

    #[tokio::test]
    async fn test_concurrent_run_conflicts() {
        let state = state(true);
        let _running = state.aggregator.lock().await;
        let (status, _) = send(create_router(state.clone()), "POST", "/aggregate/day").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_bad_gateway() {
        let state = state(false);
        let (status, _) = send(create_router(state.clone()), "POST", "/aggregate/day").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(state.last_run().is_none());
    }
}
