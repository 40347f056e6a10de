//! Response bodies returned by the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use worldarchitect_domain::{Campaign, GameState, PlanningBlock, StoryTurn};

/// `POST /api/campaigns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignResponse {
    pub success: bool,
    pub campaign_id: Uuid,
    pub opening_story: StoryTurn,
}

/// One row of `GET /api/campaigns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
}

impl From<&Campaign> for CampaignSummary {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.to_uuid(),
            title: campaign.title.clone(),
            created_at: campaign.created_at,
            last_played: campaign.last_played,
        }
    }
}

/// `GET /api/campaigns/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDetailResponse {
    pub campaign: Campaign,
    pub story: Vec<StoryTurn>,
    pub total_turns: u32,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    pub has_older: bool,
    pub game_state: GameState,
}

/// `POST /api/campaigns/{id}/interaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub success: bool,
    pub narrative: String,
    #[serde(default)]
    pub entities_mentioned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_updates: Option<serde_json::Value>,
    /// Present only while the campaign is in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_block: Option<PlanningBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_confirmed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(default)]
    pub dice_rolls: Vec<String>,
    pub user_scene_number: u32,
}

/// Generic `{ "success": true }` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// `GET /api/campaigns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignListResponse {
    pub success: bool,
    pub campaigns: Vec<CampaignSummary>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// The same request may succeed if sent again later.
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            error: error.into(),
            retryable,
        }
    }
}
