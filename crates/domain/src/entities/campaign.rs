//! Campaign entity - a user's ongoing story.
//!
//! Story turns are not embedded; they live in their own append-only sequence
//! keyed by campaign id (see [`StoryTurn`](super::StoryTurn)).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, DomainError, UserId};

/// Longest accepted campaign title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Instruction bundles that can be switched on for a campaign's narrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptBundle {
    /// Storytelling style and pacing.
    Narrative,
    /// Dice, combat and character-sheet rules.
    Mechanics,
    /// Calibration of tone and difficulty against the player's intent.
    Calibration,
}

impl PromptBundle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::Mechanics => "mechanics",
            Self::Calibration => "calibration",
        }
    }
}

/// A campaign owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub title: String,
    /// The player's description of the campaign they want to play.
    pub prompt: String,
    pub selected_prompts: Vec<PromptBundle>,
    pub use_default_world: bool,
    /// Setting lore attached at creation time, if any.
    #[serde(default)]
    pub world_lore: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        prompt: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: CampaignId::new(),
            user_id,
            title: validate_title(title.into())?,
            prompt: prompt.into().trim().to_string(),
            selected_prompts: Vec::new(),
            use_default_world: false,
            world_lore: None,
            created_at: now,
            last_played: now,
        })
    }

    pub fn with_selected_prompts(mut self, prompts: Vec<PromptBundle>) -> Self {
        let mut unique = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            if !unique.contains(&prompt) {
                unique.push(prompt);
            }
        }
        self.selected_prompts = unique;
        self
    }

    pub fn with_default_world(mut self, use_default_world: bool) -> Self {
        self.use_default_world = use_default_world;
        self
    }

    pub fn with_world_lore(mut self, lore: Option<String>) -> Self {
        self.world_lore = lore
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        self
    }

    pub fn rename(&mut self, title: impl Into<String>) -> Result<(), DomainError> {
        self.title = validate_title(title.into())?;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_played = now;
    }

    /// Whether the campaign carries anything a narrator could open a story from.
    pub fn has_story_seed(&self) -> bool {
        !self.prompt.is_empty() || self.world_lore.is_some()
    }
}

fn validate_title(title: String) -> Result<String, DomainError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("Campaign title cannot be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::validation(format!(
            "Campaign title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").expect("valid user")
    }

    #[test]
    fn new_campaign_trims_title_and_prompt() {
        let now = Utc::now();
        let campaign = Campaign::new(user(), "  The Sunken Crown ", "  A heist in Waterdeep ", now)
            .expect("valid campaign");

        assert_eq!(campaign.title, "The Sunken Crown");
        assert_eq!(campaign.prompt, "A heist in Waterdeep");
        assert_eq!(campaign.created_at, now);
        assert_eq!(campaign.last_played, now);
        assert!(campaign.has_story_seed());
    }

    #[test]
    fn rejects_blank_and_oversized_titles() {
        let now = Utc::now();
        assert!(Campaign::new(user(), "   ", "prompt", now).is_err());
        assert!(Campaign::new(user(), "x".repeat(MAX_TITLE_LEN + 1), "prompt", now).is_err());
    }

    #[test]
    fn selected_prompts_are_deduplicated_in_order() {
        let campaign = Campaign::new(user(), "Title", "prompt", Utc::now())
            .expect("valid campaign")
            .with_selected_prompts(vec![
                PromptBundle::Mechanics,
                PromptBundle::Narrative,
                PromptBundle::Mechanics,
            ]);

        assert_eq!(
            campaign.selected_prompts,
            vec![PromptBundle::Mechanics, PromptBundle::Narrative]
        );
    }

    #[test]
    fn blank_lore_is_dropped_and_no_seed_without_prompt_or_lore() {
        let campaign = Campaign::new(user(), "Title", "   ", Utc::now())
            .expect("valid campaign")
            .with_world_lore(Some("  ".to_string()));

        assert!(campaign.world_lore.is_none());
        assert!(!campaign.has_story_seed());
    }

    #[test]
    fn rename_validates() {
        let mut campaign = Campaign::new(user(), "Old", "prompt", Utc::now()).expect("valid");
        campaign.rename(" New ").expect("rename succeeds");
        assert_eq!(campaign.title, "New");
        assert!(campaign.rename("").is_err());
        assert_eq!(campaign.title, "New");
    }
}
