//! HTTP endpoints
//!
//! REST trigger API for the call agent.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use call_agent_core::{CallControl, Lead};
use call_agent_orchestrator::{Admission, CallOutcome, CallStatusReport, OrchestratorError};
use call_agent_persistence::LeadStore;

use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState, cors_enabled: bool, cors_origins: &[String]) -> Router {
    let cors_layer = build_cors_layer(cors_origins, cors_enabled);

    Router::new()
        // Lead-created trigger
        .route("/api/leads", post(create_lead))
        .route("/api/leads/queue-pending", post(queue_pending_leads))
        // Call lifecycle
        .route("/api/calls", get(list_active_calls))
        .route("/api/calls/:id", get(get_call))
        .route("/api/calls/:id/events", post(call_event))
        .route("/api/calls/:id/end", post(force_end_call))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct CreateLeadRequest {
    name: String,
    phone: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    consent: bool,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateLeadResponse {
    lead_id: Uuid,
    admission: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Lead-created notification: store the lead and, when consented, ask for
/// admission right away.
async fn create_lead(
    State(state): State<AppState>,
    Json(request): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<CreateLeadResponse>), StatusCode> {
    if request.name.trim().is_empty() || request.phone.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let mut lead = Lead::new(request.name.trim(), request.phone.trim());
    lead.email = request.email;
    lead.notes = request.notes;
    if request.consent {
        lead = lead.with_consent();
    }

    state
        .leads
        .create(&lead)
        .await
        .map_err(|e| internal_error("lead create", e))?;

    if !lead.consent_given {
        return Ok((
            StatusCode::CREATED,
            Json(CreateLeadResponse {
                lead_id: lead.id,
                admission: "not_queued",
                call_id: None,
                reason: Some("consent_missing"),
            }),
        ));
    }

    match state.orchestrator.queue_call(lead.id).await {
        Ok(Admission::Accepted { call_id }) => Ok((
            StatusCode::ACCEPTED,
            Json(CreateLeadResponse {
                lead_id: lead.id,
                admission: "accepted",
                call_id: Some(call_id),
                reason: None,
            }),
        )),
        Ok(Admission::Deferred { reason }) => Ok((
            StatusCode::ACCEPTED,
            Json(CreateLeadResponse {
                lead_id: lead.id,
                admission: "deferred",
                call_id: None,
                reason: Some(reason.as_str()),
            }),
        )),
        Err(e) => Err(orchestrator_error(e)),
    }
}

/// Admin sweep: admit waiting consented leads up to the policy limits.
async fn queue_pending_leads(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let queued = state
        .orchestrator
        .queue_pending_leads(50)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(serde_json::json!({ "queued": queued })))
}

#[derive(Debug, Deserialize)]
struct CallEventRequest {
    /// `answered`, `completed`, `failed` or `no_answer`
    status: String,
    #[serde(default)]
    duration_secs: Option<u32>,
}

/// Call-status notification from the switch side. Idempotent under duplicate
/// delivery of the same call id.
async fn call_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CallEventRequest>,
) -> Result<StatusCode, StatusCode> {
    match request.status.as_str() {
        "answered" => {
            state
                .orchestrator
                .on_call_answered(id)
                .await
                .map_err(orchestrator_error)?;
        }
        "completed" | "failed" | "no_answer" => {
            let outcome = match request.status.as_str() {
                "completed" => CallOutcome::Completed,
                "no_answer" => CallOutcome::NoAnswer,
                _ => CallOutcome::Failed,
            };
            state
                .orchestrator
                .on_call_ended(id, outcome, request.duration_secs, Some("switch notification"))
                .await
                .map_err(orchestrator_error)?;
        }
        _ => return Err(StatusCode::UNPROCESSABLE_ENTITY),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Live state for in-flight calls, persisted record for finished ones.
async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state
        .orchestrator
        .get_call_status(id)
        .await
        .map_err(orchestrator_error)?
    {
        Some(CallStatusReport::Live {
            call_id,
            state,
            elapsed_secs,
        }) => Ok(Json(serde_json::json!({
            "call_id": call_id,
            "live": true,
            "state": state.as_str(),
            "elapsed_secs": elapsed_secs,
        }))),
        Some(CallStatusReport::Finished(record)) => Ok(Json(serde_json::json!({
            "call_id": record.id,
            "live": false,
            "state": record.status.as_str(),
            "started_at": record.started_at,
            "ended_at": record.ended_at,
            "duration_secs": record.duration_secs,
        }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn list_active_calls(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.orchestrator.active_calls();
    Json(serde_json::json!({
        "count": calls.len(),
        "calls": calls,
    }))
}

/// Administrative force-end.
async fn force_end_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    if state
        .orchestrator
        .get_call_status(id)
        .await
        .map_err(orchestrator_error)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    state
        .orchestrator
        .force_end_call(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_calls": state.orchestrator.active_count(),
        "active_sessions": state.engine.active_session_count(),
    }))
}

/// Ready only while the switch control connection is up; admission rejects
/// new calls while it is down anyway.
async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.control.is_connected() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn orchestrator_error(err: OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::LeadNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::ConsentMissing(_) => StatusCode::CONFLICT,
        OrchestratorError::CeilingReached => StatusCode::TOO_MANY_REQUESTS,
        OrchestratorError::Persistence(e) => {
            tracing::error!(error = %e, "Persistence error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        OrchestratorError::Telephony(e) => {
            tracing::error!(error = %e, "Telephony error");
            StatusCode::BAD_GATEWAY
        }
    }
}

fn internal_error(context: &str, err: impl std::fmt::Display) -> StatusCode {
    tracing::error!(context = %context, error = %err, "Request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
