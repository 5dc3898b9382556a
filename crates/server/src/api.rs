//! JSON API routes for the approval workflow engine.
//!
//! Endpoints:
//! - `POST /api/v1/requests`                    — submit an approval request
//! - `GET  /api/v1/requests`                    — list requests (filterable)
//! - `GET  /api/v1/requests/{id}`               — fetch one request
//! - `POST /api/v1/requests/{id}/decision`      — approve or reject
//! - `POST /api/v1/requests/{id}/archive`       — archive a terminal request
//! - `POST /api/v1/delegations`                 — propose a delegation
//! - `GET  /api/v1/delegations`                 — list delegations
//! - `GET  /api/v1/delegations/{id}`            — fetch one delegation
//! - `POST /api/v1/delegations/{id}/decision`   — approve or reject a proposal
//! - `POST /api/v1/delegations/{id}/revoke`     — revoke a delegation
//! - `GET  /api/v1/settings`                    — current approval settings
//! - `PUT  /api/v1/settings`                    — replace approval settings
//!
//! The acting user is taken from the `x-actor-id` header; authentication
//! itself happens upstream of this service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crewflow_core::domain::delegation::{Delegation, DelegationId, DelegationScope};
use crewflow_core::domain::request::{
    ApprovalRequest, DecisionAction, RequestId, RequestPriority, RequestStatus,
};
use crewflow_core::domain::settings::ApprovalSettings;
use crewflow_core::errors::{ApplicationError, InterfaceError};
use crewflow_db::RequestFilter;

use crate::services::{
    CreateDelegationInput, DecideRequestInput, DelegationService, RequestService, SettingsService,
    SubmitRequestInput,
};

#[derive(Clone)]
pub struct AppState {
    pub requests: Arc<RequestService>,
    pub delegations: Arc<DelegationService>,
    pub settings: Arc<SettingsService>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Request / Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub request_type: String,
    pub priority: Option<String>,
    pub amount: Option<Decimal>,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub action: String,
    pub comment: Option<String>,
    pub expected_version: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub requester_id: Option<String>,
    pub approver_id: Option<String>,
    pub include_archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDelegationBody {
    pub delegate_id: String,
    #[serde(default)]
    pub scope: DelegationScope,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DelegationDecisionBody {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsBody {
    pub expected_version: u32,
    pub settings: ApprovalSettings,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/decision", post(decide_request))
        .route("/api/v1/requests/{id}/archive", post(archive_request))
        .route("/api/v1/delegations", post(create_delegation).get(list_delegations))
        .route("/api/v1/delegations/{id}", get(get_delegation))
        .route("/api/v1/delegations/{id}/decision", post(decide_delegation))
        .route("/api/v1/delegations/{id}/revoke", post(revoke_delegation))
        .route("/api/v1/settings", get(get_settings).put(update_settings))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request handlers
// ---------------------------------------------------------------------------

async fn submit_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequestBody>,
) -> Result<(StatusCode, Json<ApprovalRequest>), ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;

    let priority = match body.priority {
        Some(raw) => Some(RequestPriority::parse(&raw).ok_or_else(|| {
            bad_request(format!("unrecognized priority `{raw}`"), &correlation_id)
        })?),
        None => None,
    };

    let input = SubmitRequestInput {
        requester_id: actor,
        request_type: body.request_type,
        priority,
        amount: body.amount,
        days: body.days,
    };
    let request = state
        .requests
        .submit(input, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    let correlation_id = new_correlation_id();

    let status = match query.status {
        Some(raw) => Some(RequestStatus::parse(&raw).ok_or_else(|| {
            bad_request(format!("unrecognized status `{raw}`"), &correlation_id)
        })?),
        None => None,
    };
    let filter = RequestFilter {
        status,
        requester_id: query.requester_id,
        approver_id: query.approver_id,
        include_archived: query.include_archived.unwrap_or(false),
    };

    let requests = state.requests.list(&filter).await.map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let correlation_id = new_correlation_id();
    let request = state
        .requests
        .get(&RequestId(id))
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(request))
}

async fn decide_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DecisionBody>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;

    // Only the two caller-facing verbs are accepted here; escalation and
    // expiry are recorded by the scheduler alone.
    let action = match DecisionAction::parse(&body.action) {
        Some(action @ (DecisionAction::Approve | DecisionAction::Reject)) => action,
        _ => {
            return Err(bad_request(
                format!("unrecognized decision action `{}`", body.action),
                &correlation_id,
            ))
        }
    };

    let input = DecideRequestInput {
        actor_id: actor,
        action,
        comment: body.comment,
        expected_version: body.expected_version,
    };
    let request = state
        .requests
        .decide(&RequestId(id), input, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(request))
}

async fn archive_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;
    let request = state
        .requests
        .archive(&RequestId(id), &actor, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(request))
}

// ---------------------------------------------------------------------------
// Delegation handlers
// ---------------------------------------------------------------------------

async fn create_delegation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateDelegationBody>,
) -> Result<(StatusCode, Json<Delegation>), ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;

    let input = CreateDelegationInput {
        delegate_id: body.delegate_id,
        scope: body.scope,
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        reason: body.reason,
    };
    let delegation = state
        .delegations
        .create(&actor, input, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

async fn list_delegations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Delegation>>, ApiError> {
    let correlation_id = new_correlation_id();
    let delegations = state.delegations.list().await.map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(delegations))
}

async fn get_delegation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Delegation>, ApiError> {
    let correlation_id = new_correlation_id();
    let delegation = state
        .delegations
        .get(&DelegationId(id))
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(delegation))
}

async fn decide_delegation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DelegationDecisionBody>,
) -> Result<Json<Delegation>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;

    let approve = match body.action.trim().to_ascii_lowercase().as_str() {
        "approve" => true,
        "reject" => false,
        other => {
            return Err(bad_request(
                format!("unrecognized delegation action `{other}`"),
                &correlation_id,
            ))
        }
    };

    let delegation = state
        .delegations
        .decide(&DelegationId(id), &actor, approve, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(delegation))
}

async fn revoke_delegation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Delegation>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;
    let delegation = state
        .delegations
        .revoke(&DelegationId(id), &actor, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(delegation))
}

// ---------------------------------------------------------------------------
// Settings handlers
// ---------------------------------------------------------------------------

async fn get_settings(State(state): State<AppState>) -> Result<Json<ApprovalSettings>, ApiError> {
    let correlation_id = new_correlation_id();
    let settings = state.settings.get().await.map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(settings))
}

async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsBody>,
) -> Result<Json<ApprovalSettings>, ApiError> {
    let correlation_id = new_correlation_id();
    let actor = actor_id(&headers, &correlation_id)?;
    let settings = state
        .settings
        .update(&actor, body.settings, body.expected_version, &correlation_id)
        .await
        .map_err(|e| fail(e, &correlation_id))?;
    Ok(Json(settings))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn actor_id(headers: &HeaderMap, correlation_id: &str) -> Result<String, ApiError> {
    headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| bad_request("the x-actor-id header is required".to_owned(), correlation_id))
}

fn bad_request(message: String, correlation_id: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: message, correlation_id: correlation_id.to_owned() }),
    )
}

fn fail(application_error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = application_error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id,
            error = %interface,
            "request failed with a server error"
        );
    }
    (
        status,
        Json(ErrorBody {
            error: interface.user_message().to_owned(),
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}
