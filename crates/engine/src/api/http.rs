//! HTTP routes.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use worldarchitect_domain::{CampaignId, StateMergeError, UserId};
use worldarchitect_shared::{
    CampaignDetailResponse, CampaignListResponse, CampaignSummary, CreateCampaignRequest,
    CreateCampaignResponse, ErrorResponse, ExportQuery, InteractionRequest, InteractionResponse,
    StoryPageQuery, SuccessResponse, UpdateCampaignRequest,
};

use crate::app::App;
use crate::infrastructure::model_invoker::ModelUnavailableError;
use crate::use_cases::campaign::ExportFormat;
use crate::use_cases::{CampaignError, InteractionError};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/{id}",
            get(get_campaign).patch(update_campaign),
        )
        .route("/api/campaigns/{id}/interaction", post(interact))
        .route("/api/campaigns/{id}/export", get(export_campaign))
}

async fn health() -> &'static str {
    "OK"
}

/// Caller identity taken from the `X-User-Id` header.
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;

        UserId::new(raw)
            .map(CurrentUser)
            .map_err(|_| ApiError::Unauthorized("Invalid X-User-Id header".to_string()))
    }
}

// =============================================================================
// Campaigns
// =============================================================================

async fn list_campaigns(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let campaigns = app.use_cases.campaign.crud.list(&user_id).await?;
    Ok(Json(CampaignListResponse {
        success: true,
        campaigns: campaigns.iter().map(CampaignSummary::from).collect(),
    }))
}

async fn create_campaign(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let created = app.use_cases.campaign.create.execute(user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            success: true,
            campaign_id: created.campaign.id.to_uuid(),
            opening_story: created.opening,
        }),
    ))
}

async fn get_campaign(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<StoryPageQuery>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let page = app
        .use_cases
        .campaign
        .crud
        .get(
            CampaignId::from_uuid(id),
            &user_id,
            query.page(),
            query.page_size(),
        )
        .await?;

    Ok(Json(CampaignDetailResponse {
        campaign: page.campaign,
        story: page.turns,
        total_turns: page.total_turns,
        page: page.page,
        page_size: page.page_size,
        has_older: page.has_older,
        game_state: page.state,
    }))
}

async fn update_campaign(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCampaignRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    app.use_cases
        .campaign
        .crud
        .rename(CampaignId::from_uuid(id), &user_id, request.title)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn export_campaign(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let format = query
        .format
        .as_deref()
        .unwrap_or_default()
        .parse::<ExportFormat>()?;

    let story = app
        .use_cases
        .campaign
        .export
        .execute(CampaignId::from_uuid(id), &user_id, format)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", story.filename),
            ),
        ],
        story.content,
    ))
}

// =============================================================================
// Interaction
// =============================================================================

async fn interact(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<InteractionRequest>,
) -> Result<Json<InteractionResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = app
        .use_cases
        .interaction
        .execute(
            CampaignId::from_uuid(id),
            &user_id,
            &request.input,
            request.mode,
        )
        .await?;

    let response = outcome.response;
    Ok(Json(InteractionResponse {
        success: true,
        narrative: response.narrative,
        entities_mentioned: response.entities_mentioned,
        state_updates: response.state_updates,
        debug_info: response.debug_info,
        planning_block: response.planning_block,
        session_header: response.session_header,
        location_confirmed: response.location_confirmed,
        resources: response.resources,
        dice_rolls: response.dice_rolls,
        user_scene_number: outcome.user_scene_number,
    }))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden,
    ModelUnavailable(ModelUnavailableError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg, false)),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg, false))
            }
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorResponse::new(msg, false))
            }
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new("Access denied", false),
            ),
            ApiError::ModelUnavailable(e) => {
                tracing::error!(error = %e, "Narrator unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new(
                        "The story engine is temporarily unavailable. Please try again.",
                        !e.is_auth_failure(),
                    ),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal error", false),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        match e {
            CampaignError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CampaignError::Forbidden(_) => ApiError::Forbidden,
            CampaignError::InvalidInput(msg) => ApiError::BadRequest(msg),
            CampaignError::UnsupportedFormat(_) | CampaignError::Configuration(_) => {
                ApiError::BadRequest(e.to_string())
            }
            CampaignError::ModelUnavailable(e) => ApiError::ModelUnavailable(e),
            CampaignError::State(e) => state_error(e),
            CampaignError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<InteractionError> for ApiError {
    fn from(e: InteractionError) -> Self {
        match e {
            InteractionError::NotFound(_) => ApiError::NotFound(e.to_string()),
            InteractionError::Forbidden(_) => ApiError::Forbidden,
            InteractionError::Configuration(_) => ApiError::BadRequest(e.to_string()),
            InteractionError::ModelUnavailable(e) => ApiError::ModelUnavailable(e),
            InteractionError::State(e) => state_error(e),
            InteractionError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

fn state_error(e: StateMergeError) -> ApiError {
    ApiError::Internal(e.to_string())
}
