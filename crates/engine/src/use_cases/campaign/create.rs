//! Create a campaign and generate its opening scene.

use std::sync::Arc;

use worldarchitect_domain::{Campaign, GameState, InteractionMode, StoryTurn, UserId};
use worldarchitect_shared::CreateCampaignRequest;

use crate::infrastructure::ports::{CampaignRepo, ClockPort};
use crate::use_cases::narrative::Narrator;

use super::CampaignError;

/// A stored campaign together with its opening turn.
#[derive(Debug, Clone)]
pub struct CreatedCampaign {
    pub campaign: Campaign,
    pub opening: StoryTurn,
    pub state: GameState,
}

pub struct CreateCampaign {
    repo: Arc<dyn CampaignRepo>,
    narrator: Arc<Narrator>,
    clock: Arc<dyn ClockPort>,
}

impl CreateCampaign {
    pub fn new(
        repo: Arc<dyn CampaignRepo>,
        narrator: Arc<Narrator>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            repo,
            narrator,
            clock,
        }
    }

    /// Nothing is persisted unless the opening scene was generated.
    pub async fn execute(
        &self,
        user_id: UserId,
        request: CreateCampaignRequest,
    ) -> Result<CreatedCampaign, CampaignError> {
        let now = self.clock.now();
        let campaign = Campaign::new(user_id, request.title, request.prompt, now)?
            .with_selected_prompts(request.selected_prompts)
            .with_default_world(request.use_default_world)
            .with_world_lore(request.world_lore);

        let initial = GameState::default();
        let context = self.narrator.context(&campaign);
        let payload = self.narrator.builder().build_opening(&context, &initial)?;
        let narration = self.narrator.narrate(&payload).await?;

        let response = narration.parsed.response.without_debug_content();

        let mut state = match response.state_updates.as_ref() {
            Some(updates) => initial.apply_updates(updates).unwrap_or_else(|e| {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    error = %e,
                    "Opening state updates rejected, starting from an empty state"
                );
                initial.clone()
            }),
            None => initial.clone(),
        };
        state.stamp(now);

        let opening = StoryTurn::narrator(
            0,
            InteractionMode::Character,
            response.narrative.clone(),
            now,
            response.structured_fields(),
        )
        .with_scene_number(1);

        self.repo.save_campaign(&campaign).await?;
        self.repo
            .append_turns(campaign.id, std::slice::from_ref(&opening))
            .await?;
        self.repo.save_state(campaign.id, &state.to_document()?).await?;

        tracing::info!(
            campaign_id = %campaign.id,
            user_id = %campaign.user_id,
            model = %narration.model,
            "Campaign created"
        );

        Ok(CreatedCampaign {
            campaign,
            opening,
            state,
        })
    }
}
