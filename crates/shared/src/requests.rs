//! Request bodies and query strings accepted by the HTTP API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use worldarchitect_domain::{InteractionMode, PromptBundle};

/// Largest page of story turns a client can request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// `POST /api/campaigns`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// The player's campaign description.
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub prompt: String,
    #[serde(default)]
    pub selected_prompts: Vec<PromptBundle>,
    #[serde(default)]
    pub use_default_world: bool,
    /// Setting lore supplied by the client instead of the default world.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_lore: Option<String>,
}

/// `PATCH /api/campaigns/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCampaignRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
}

/// `POST /api/campaigns/{id}/interaction`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InteractionRequest {
    #[validate(length(min = 1, max = 10000))]
    pub input: String,
    #[serde(default)]
    pub mode: InteractionMode,
}

/// Story pagination for `GET /api/campaigns/{id}`.
///
/// Page 1 is the most recent page; omitting `page_size` returns every turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoryPageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl StoryPageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size.map(|size| size.clamp(1, MAX_PAGE_SIZE))
    }
}

/// `GET /api/campaigns/{id}/export`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_mode_defaults_to_character() {
        let request: InteractionRequest =
            serde_json::from_str(r#"{"input": "I open the door"}"#).expect("valid body");
        assert_eq!(request.mode, InteractionMode::Character);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn empty_input_and_long_titles_fail_validation() {
        let request = InteractionRequest {
            input: String::new(),
            mode: InteractionMode::God,
        };
        assert!(request.validate().is_err());

        let update = UpdateCampaignRequest {
            title: "t".repeat(201),
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn create_request_accepts_minimal_body() {
        let request: CreateCampaignRequest =
            serde_json::from_str(r#"{"title": "Ashes", "prompt": "A burned city"}"#)
                .expect("valid body");
        assert!(request.selected_prompts.is_empty());
        assert!(!request.use_default_world);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn page_query_clamps_values() {
        let query = StoryPageQuery {
            page: Some(0),
            page_size: Some(10_000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), Some(MAX_PAGE_SIZE));
    }
}
