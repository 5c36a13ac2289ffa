//! HTTP route handlers.
//!
//! All endpoints speak JSON. Handlers are thin: read the request, call the
//! gateway at the current instant, render cards. Domain errors become
//! [`ApiError`] responses.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::AccountSummary;
use crate::gateway::{Gateway, OpenLeg, ParlayCard};
use crate::types::{DisplayRef, ErrorKind, LegOutcome, ParlayError, UserId};

pub type AppState = Arc<Gateway>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Domain(ParlayError),
    /// The request could not be read: bad JSON, wrong field types, bad path.
    Malformed(String),
}

impl From<ParlayError> for ApiError {
    fn from(e: ParlayError) -> Self {
        Self::Domain(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Domain(e) => e.kind(),
            ApiError::Malformed(_) => ErrorKind::Validation,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain(ParlayError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Domain(ParlayError::NotOwner) => StatusCode::FORBIDDEN,
            other => match other.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Policy | ErrorKind::State => StatusCode::CONFLICT,
                ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn user_message(&self) -> String {
        match self {
            ApiError::Domain(e) => e.user_message(),
            ApiError::Malformed(detail) => format!("Bad request: {detail}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Domain(e) if status.is_server_error() => {
                warn!(error = %e, "Request failed on storage");
            }
            ApiError::Malformed(detail) => debug!(detail = %detail, "Rejected malformed request"),
            ApiError::Domain(_) => {}
        }
        let body = ErrorBody {
            error: self.user_message(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `Json` whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Query` whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Legs either as a list or as `(a) (b)` text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegsInput {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    pub user_id: UserId,
    pub stake: i64,
    pub legs: LegsInput,
    /// `MM/DD/YYYY HH:MM AM/PM` in the reference zone.
    pub deadline: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MarkLegRequest {
    pub user_id: UserId,
    pub outcome: LegOutcome,
}

#[derive(Debug, Deserialize)]
pub struct PickLegRequest {
    pub user_id: UserId,
    pub leg_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct DisplayRequest {
    pub user_id: UserId,
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RulesResponse {
    pub rules: String,
    pub timezone: &'static str,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/rules
pub async fn get_rules(State(gw): State<AppState>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: gw.rules(),
        timezone: gw.zone().name(),
    })
}

/// POST /api/bets
pub async fn create_bet(
    State(gw): State<AppState>,
    ApiJson(req): ApiJson<BetRequest>,
) -> Result<(StatusCode, Json<ParlayCard>), ApiError> {
    let now = gw.now();
    let parlay = match &req.legs {
        LegsInput::List(legs) => {
            gw.create_parlay_command(&req.user_id, req.stake, legs, &req.deadline, now)
                .await?
        }
        LegsInput::Text(text) => {
            gw.bet_command(&req.user_id, req.stake, text, &req.deadline, now)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(gw.card(&parlay, &now))))
}

/// GET /api/users/:user_id/parlays
pub async fn list_parlays(
    State(gw): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Json<Vec<ParlayCard>> {
    let now = gw.now();
    let parlays = gw.list_active_parlays_command(&user_id).await;
    Json(parlays.iter().map(|p| gw.card(p, &now)).collect())
}

/// GET /api/users/:user_id/summary
pub async fn get_summary(
    State(gw): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Json<AccountSummary> {
    Json(gw.account_summary_command(&user_id, gw.now()).await)
}

/// GET /api/parlays/:id/legs?user_id=
pub async fn get_open_legs(
    State(gw): State<AppState>,
    ApiPath(parlay_id): ApiPath<String>,
    ApiQuery(q): ApiQuery<UserQuery>,
) -> Result<Json<Vec<OpenLeg>>, ApiError> {
    Ok(Json(gw.open_legs(&q.user_id, &parlay_id).await?))
}

/// POST /api/parlays/:id/legs/:index
pub async fn mark_leg(
    State(gw): State<AppState>,
    ApiPath((parlay_id, index)): ApiPath<(String, usize)>,
    ApiJson(req): ApiJson<MarkLegRequest>,
) -> Result<Json<ParlayCard>, ApiError> {
    let now = gw.now();
    let parlay = gw
        .select_leg_action(&req.user_id, &parlay_id, index, req.outcome, now)
        .await?;
    Ok(Json(gw.card(&parlay, &now)))
}

/// POST /api/parlays/:id/pick
pub async fn pick_leg(
    State(gw): State<AppState>,
    ApiPath(parlay_id): ApiPath<String>,
    ApiJson(req): ApiJson<PickLegRequest>,
) -> Result<Json<OpenLeg>, ApiError> {
    Ok(Json(
        gw.pick_leg(&req.user_id, &parlay_id, req.leg_index, gw.now())
            .await?,
    ))
}

/// POST /api/parlays/:id/apply
pub async fn apply_outcome(
    State(gw): State<AppState>,
    ApiPath(parlay_id): ApiPath<String>,
    ApiJson(req): ApiJson<MarkLegRequest>,
) -> Result<Json<ParlayCard>, ApiError> {
    let now = gw.now();
    let parlay = gw
        .apply_outcome(&req.user_id, &parlay_id, req.outcome, now)
        .await?;
    Ok(Json(gw.card(&parlay, &now)))
}

/// POST /api/parlays/:id/resolve
pub async fn resolve_now(
    State(gw): State<AppState>,
    ApiPath(parlay_id): ApiPath<String>,
    ApiJson(req): ApiJson<UserQuery>,
) -> Result<Json<ParlayCard>, ApiError> {
    let now = gw.now();
    let parlay = gw.resolve_now_action(&req.user_id, &parlay_id, now).await?;
    Ok(Json(gw.card(&parlay, &now)))
}

/// POST /api/parlays/:id/display
pub async fn attach_display(
    State(gw): State<AppState>,
    ApiPath(parlay_id): ApiPath<String>,
    ApiJson(req): ApiJson<DisplayRequest>,
) -> Result<Json<ParlayCard>, ApiError> {
    let display = DisplayRef {
        channel_id: req.channel_id,
        message_id: req.message_id,
    };
    let parlay = gw.attach_display(&req.user_id, &parlay_id, display).await?;
    Ok(Json(gw.card(&parlay, &gw.now())))
}
