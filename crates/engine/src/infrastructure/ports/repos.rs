//! Persistence port.

use async_trait::async_trait;
use serde_json::Value;
use worldarchitect_domain::{Campaign, CampaignId, StoryTurn, UserId};

use super::RepoError;

// =============================================================================
// Campaign Storage
// =============================================================================

/// Campaign documents, their append-only story and the current game state.
///
/// The state is handed back as the raw stored document so that a corrupt
/// document reaches the state merger instead of being replaced here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepo: Send + Sync {
    /// Insert or replace the campaign record.
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), RepoError>;
    async fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, RepoError>;
    /// Campaigns owned by `user_id`, most recently played first.
    async fn list_campaigns(&self, user_id: &UserId) -> Result<Vec<Campaign>, RepoError>;

    /// Append turns. Sequence numbers are chosen by the caller and never rewritten.
    async fn append_turns(&self, id: CampaignId, turns: &[StoryTurn]) -> Result<(), RepoError>;
    /// Every turn of the campaign in sequence order.
    async fn list_turns(&self, id: CampaignId) -> Result<Vec<StoryTurn>, RepoError>;
    /// Turns whose sequence lies in `start..end`, in sequence order.
    async fn list_turns_range(
        &self,
        id: CampaignId,
        start: u32,
        end: u32,
    ) -> Result<Vec<StoryTurn>, RepoError>;
    async fn count_turns(&self, id: CampaignId) -> Result<u32, RepoError>;

    async fn get_state(&self, id: CampaignId) -> Result<Option<Value>, RepoError>;
    async fn save_state(&self, id: CampaignId, state: &Value) -> Result<(), RepoError>;
}
