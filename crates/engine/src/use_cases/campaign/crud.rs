//! Campaign listing, story paging and renaming.

use std::sync::Arc;

use worldarchitect_domain::{Campaign, CampaignId, GameState, StoryTurn, UserId};

use crate::infrastructure::ports::CampaignRepo;

use super::{load_owned, CampaignError};

/// One page of a campaign's story with the current state.
#[derive(Debug, Clone)]
pub struct CampaignPage {
    pub campaign: Campaign,
    /// Turns of this page in sequence order.
    pub turns: Vec<StoryTurn>,
    pub total_turns: u32,
    pub page: u32,
    pub page_size: Option<u32>,
    /// Earlier turns exist beyond this page.
    pub has_older: bool,
    pub state: GameState,
}

pub struct CampaignCrud {
    repo: Arc<dyn CampaignRepo>,
}

impl CampaignCrud {
    pub fn new(repo: Arc<dyn CampaignRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, user_id: &UserId) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.repo.list_campaigns(user_id).await?)
    }

    /// Page 1 holds the most recent turns. Without a page size the whole
    /// story is returned.
    pub async fn get(
        &self,
        id: CampaignId,
        user_id: &UserId,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<CampaignPage, CampaignError> {
        let campaign = load_owned(self.repo.as_ref(), id, user_id).await?;
        let total_turns = self.repo.count_turns(id).await?;

        let (turns, page, has_older) = match page_size {
            Some(size) => {
                let page = page.max(1);
                let (start, end) = page_bounds(total_turns, page, size);
                let turns = if start < end {
                    self.repo.list_turns_range(id, start, end).await?
                } else {
                    Vec::new()
                };
                (turns, page, start > 0)
            }
            None => (self.repo.list_turns(id).await?, 1, false),
        };

        let state = match self.repo.get_state(id).await? {
            Some(document) => GameState::from_document(&document)?,
            None => GameState::default(),
        };

        Ok(CampaignPage {
            campaign,
            turns,
            total_turns,
            page,
            page_size,
            has_older,
            state,
        })
    }

    pub async fn rename(
        &self,
        id: CampaignId,
        user_id: &UserId,
        title: String,
    ) -> Result<Campaign, CampaignError> {
        let mut campaign = load_owned(self.repo.as_ref(), id, user_id).await?;
        campaign.rename(title)?;
        self.repo.save_campaign(&campaign).await?;

        tracing::info!(campaign_id = %id, title = %campaign.title, "Campaign renamed");
        Ok(campaign)
    }
}

/// Sequence range `start..end` of `page` counted back from the newest turn.
fn page_bounds(total: u32, page: u32, size: u32) -> (u32, u32) {
    let skipped = (page - 1).saturating_mul(size);
    let end = total.saturating_sub(skipped);
    (end.saturating_sub(size), end)
}
