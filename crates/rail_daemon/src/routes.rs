use crate::activity::ActivityEntry;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use rail_core::{Command, CommandOutcome, EventEnvelope, MetricsSnapshot, OperatorId};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const HTTP_OPERATOR: &str = "operator";

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, "http://localhost:5173")
}

pub fn make_router_with_cors(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    match cors_origin.parse::<axum::http::HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(err) => tracing::warn!("ignoring invalid CORS origin {cors_origin:?}: {err}"),
    }

    Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/snapshot", get(snapshot_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/alerts", get(alerts_handler))
        .route("/api/v1/activity", get(activity_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/command", post(command_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let daemon = app_state.sim.lock();
    let state = daemon.sim.state();
    Json(serde_json::json!({
        "now_ms": state.meta.now_ms,
        "animating": state.animating,
        "global_stop_active": state.global_stop.in_progress(),
        "content_version": state.meta.content_version,
        "risk_level": daemon.sim.assessment().risk_level,
    }))
}

pub async fn snapshot_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let daemon = app_state.sim.lock();
    let snapshot = daemon.sim.snapshot();
    drop(daemon);
    match serde_json::to_string(&snapshot) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        ),
        Err(err) => {
            tracing::error!("snapshot serialization failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                r#"{"error":"serialization failed"}"#.to_string(),
            )
        }
    }
}

pub async fn metrics_handler(State(app_state): State<AppState>) -> Json<Vec<MetricsSnapshot>> {
    let daemon = app_state.sim.lock();
    Json(daemon.metrics_history.iter().cloned().collect())
}

async fn alerts_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let daemon = app_state.sim.lock();
    let active_ids = daemon.alert_engine.active_alert_ids();
    Json(serde_json::json!({ "active_alerts": active_ids }))
}

async fn activity_handler(State(app_state): State<AppState>) -> Json<Vec<ActivityEntry>> {
    let daemon = app_state.sim.lock();
    Json(daemon.activity.entries().cloned().collect())
}

pub async fn command_handler(
    State(app_state): State<AppState>,
    Json(command): Json<Command>,
) -> Json<serde_json::Value> {
    let (outcome, events) = {
        let mut daemon = app_state.sim.lock();
        let now = app_state.clock.now_ms().max(daemon.sim.now_ms());
        let mut events = daemon.advance_to(now);
        let (outcome, applied) =
            daemon.submit(&OperatorId(HTTP_OPERATOR.to_string()), command);
        events.extend(applied);
        (outcome, events)
    };
    if !events.is_empty() {
        let _ = app_state.event_tx.send(events);
    }
    // New timers may be due before the loop's current sleep ends.
    app_state.wake.notify_one();

    match outcome {
        CommandOutcome::Applied => Json(serde_json::json!({ "applied": true })),
        CommandOutcome::Rejected(reason) => {
            tracing::debug!("command rejected: {reason}");
            Json(serde_json::json!({
                "applied": false,
                "reason": reason,
                "message": reason.to_string(),
            }))
        }
    }
}

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let sim = app_state.sim.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_millis(200));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await; // discard the immediate first tick
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("event stream lagged, {skipped} batches dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let now_ms = sim.lock().sim.now_ms();
                    let hb = serde_json::json!({"heartbeat": true, "now_ms": now_ms});
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}
