use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use pulsemon_common::types::{ComponentHealth, HealthStatus};
use pulsemon_storage::SampleQuery;
use pulsemon_telemetry::aggregate::{compute_aggregate, compute_session_metrics};
use pulsemon_telemetry::recorder::SampleScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

/// Uniform API response envelope
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: status.as_u16() as i32,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthOverview {
    overall: HealthStatus,
    components: Vec<ComponentHealth>,
    active_alerts: usize,
    uptime_secs: i64,
}

/// Current component health and overall status, recomputed synchronously.
pub async fn get_health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let (components, overall) = state.compute_health();
    let active_alerts = state.lock_alerts().len();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthOverview {
            overall,
            components,
            active_alerts,
            uptime_secs: (Utc::now() - state.start_time).num_seconds(),
        },
    )
}

/// Active (non-expired) alerts, highest severity first.
pub async fn get_active_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let alerts = state.lock_alerts().active_alerts();
    success_response(StatusCode::OK, &trace_id, alerts)
}

#[derive(Deserialize)]
pub struct AcknowledgeBody {
    pub who: String,
}

#[derive(Serialize)]
struct AcknowledgeResult {
    success: bool,
}

pub async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(body): Json<AcknowledgeBody>,
) -> impl IntoResponse {
    match state.acknowledge_alert(&alert_id, &body.who) {
        Some(_) => success_response(
            StatusCode::OK,
            &trace_id,
            AcknowledgeResult { success: true },
        ),
        None => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            &format!("unknown alert id: {alert_id}"),
        ),
    }
}

#[derive(Deserialize)]
pub struct TrendsParams {
    /// Comma-separated metric keys; omitted means all.
    pub metrics: Option<String>,
}

pub async fn get_trends(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<TrendsParams>,
) -> impl IntoResponse {
    let metrics: Vec<String> = params
        .metrics
        .map(|m| {
            m.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    success_response(StatusCode::OK, &trace_id, state.compute_trends(&metrics))
}

#[derive(Deserialize)]
pub struct ForecastParams {
    pub horizon_hours: Option<f64>,
}

pub async fn get_forecasts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ForecastParams>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        state.compute_forecasts(params.horizon_hours),
    )
}

#[derive(Deserialize)]
pub struct OperationParams {
    pub lookback_secs: Option<i64>,
}

/// On-demand aggregate for one operation over an optional lookback window.
/// Reads are "as of" the last completed flush.
pub async fn get_operation_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Query(params): Query<OperationParams>,
) -> impl IntoResponse {
    let to = Utc::now();
    let from = to - Duration::seconds(params.lookback_secs.unwrap_or(3600).max(1));

    let recorder = state.recorder.clone();
    let result = recorder.track("compute_operation_metrics", SampleScope::default(), || {
        state.storage.query_samples(&SampleQuery {
            operation: Some(operation.clone()),
            session_id: None,
            from,
            to,
        })
    });

    match result {
        Ok(samples) => success_response(
            StatusCode::OK,
            &trace_id,
            compute_aggregate(&operation, &samples, from, to),
        ),
        Err(e) => {
            tracing::error!(operation, error = %e, "Failed to query samples for aggregate");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage query failed",
            )
        }
    }
}

/// On-demand metrics for one session, including the artifact count read
/// from storage.
pub async fn get_session_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let to = Utc::now();
    // Sessions are short-lived relative to raw retention; scan it all.
    let from = to - Duration::days(state.config.aggregation.raw_retention_days as i64);

    let samples = match state.storage.query_samples(&SampleQuery {
        operation: None,
        session_id: Some(session_id.clone()),
        from,
        to,
    }) {
        Ok(samples) => samples,
        Err(e) => {
            tracing::error!(session_id, error = %e, "Failed to query session samples");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage query failed",
            );
        }
    };

    let artifact_count = state
        .storage
        .count_session_artifacts(&session_id)
        .unwrap_or_else(|e| {
            tracing::warn!(session_id, error = %e, "Failed to count session artifacts");
            0
        });

    match compute_session_metrics(&session_id, &samples, artifact_count) {
        Some(metrics) => success_response(StatusCode::OK, &trace_id, metrics),
        None => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            &format!("no samples recorded for session {session_id}"),
        ),
    }
}
