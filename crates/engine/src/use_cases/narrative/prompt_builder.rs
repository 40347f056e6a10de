//! Prompt construction for narrator turns.
//!
//! Pure: takes the campaign, its state and history and produces the system
//! instruction plus chat history sent to the model.

use worldarchitect_domain::{Actor, Campaign, GameState, InteractionMode, PromptBundle, StoryTurn};

use crate::infrastructure::ports::{ChatMessage, LlmRequest};
use crate::prompt_templates::{
    bundle_text, DEBUG_MODE_OFF, DEBUG_MODE_ON, DEFAULT_WORLD_LORE, NARRATOR_ROLE,
    OPENING_INSTRUCTION, OPENING_MARKER, RESPONSE_SCHEMA,
};

/// Characters per token used for budget estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Message sent as the player's turn when the opening scene is requested.
pub const OPENING_REQUEST: &str = "Begin the campaign.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    /// The campaign lacks the inputs a narrator needs to start from.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// How much conversation history a prompt may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryBudget {
    pub max_tokens: usize,
    /// Most recent turns that are never dropped.
    pub keep_recent: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            max_tokens: 40_000,
            keep_recent: 10,
        }
    }
}

/// Campaign-level inputs to the system instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignContext {
    pub title: String,
    pub description: String,
    pub selected_prompts: Vec<PromptBundle>,
    pub world_lore: Option<String>,
}

impl CampaignContext {
    /// Context for `campaign`. `default_lore` stands in for the built-in world
    /// when the campaign asked for it; `None` selects the bundled setting.
    pub fn from_campaign(campaign: &Campaign, default_lore: Option<&str>) -> Self {
        let world_lore = campaign.world_lore.clone().or_else(|| {
            campaign
                .use_default_world
                .then(|| default_lore.unwrap_or(DEFAULT_WORLD_LORE).to_string())
        });

        Self {
            title: campaign.title.clone(),
            description: campaign.prompt.clone(),
            selected_prompts: campaign.selected_prompts.clone(),
            world_lore,
        }
    }

    fn has_story_seed(&self) -> bool {
        !self.description.trim().is_empty()
            || self
                .world_lore
                .as_deref()
                .is_some_and(|lore| !lore.trim().is_empty())
    }
}

/// Everything needed for one narrator turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnInputs<'a> {
    pub campaign: &'a CampaignContext,
    pub state: &'a GameState,
    pub history: &'a [StoryTurn],
    /// Characters the narrative must account for.
    pub roster: &'a [String],
    pub input: &'a str,
    pub mode: InteractionMode,
}

/// The text sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub system_instruction: String,
    /// Chat history ending with the framed player message.
    pub history: Vec<ChatMessage>,
}

impl PromptPayload {
    pub fn to_request(&self) -> LlmRequest {
        LlmRequest::new(self.history.clone())
            .with_system_prompt(self.system_instruction.clone())
            .with_json_mode()
    }

    /// Same prompt with `instruction` appended to the final player message.
    pub fn with_extra_instruction(&self, instruction: &str) -> Self {
        let mut payload = self.clone();
        match payload.history.last_mut() {
            Some(last) => {
                last.content.push_str("\n\n");
                last.content.push_str(instruction);
            }
            None => payload.history.push(ChatMessage::user(instruction)),
        }
        payload
    }
}

/// Builds narrator prompts under a history budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    budget: HistoryBudget,
}

impl PromptBuilder {
    pub fn new(budget: HistoryBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> HistoryBudget {
        self.budget
    }

    /// Prompt for a player turn.
    pub fn build_turn(&self, inputs: TurnInputs<'_>) -> Result<PromptPayload, PromptError> {
        if inputs.history.is_empty() {
            ensure_story_seed(inputs.campaign)?;
        }

        let mut sections = vec![NARRATOR_ROLE.to_string()];
        sections.extend(campaign_sections(inputs.campaign));
        sections.push(state_section(inputs.state));
        sections.push(roster_section(inputs.roster));
        sections.push(debug_section(inputs.state).to_string());
        sections.push(RESPONSE_SCHEMA.to_string());

        let kept = truncate_history(inputs.history, self.budget);
        if kept.len() < inputs.history.len() {
            tracing::debug!(
                total_turns = inputs.history.len(),
                kept_turns = kept.len(),
                max_tokens = self.budget.max_tokens,
                "Truncated story history for prompt"
            );
        }

        let mut history: Vec<ChatMessage> = kept.into_iter().filter_map(turn_message).collect();
        history.push(ChatMessage::user(frame_user_input(inputs.mode, inputs.input)));

        Ok(PromptPayload {
            system_instruction: sections.join("\n\n"),
            history,
        })
    }

    /// Prompt for the opening scene of a new campaign.
    pub fn build_opening(
        &self,
        campaign: &CampaignContext,
        state: &GameState,
    ) -> Result<PromptPayload, PromptError> {
        ensure_story_seed(campaign)?;

        let mut sections = vec![OPENING_MARKER.to_string(), NARRATOR_ROLE.to_string()];
        sections.extend(campaign_sections(campaign));
        sections.push(OPENING_INSTRUCTION.to_string());
        sections.push(debug_section(state).to_string());
        sections.push(RESPONSE_SCHEMA.to_string());

        Ok(PromptPayload {
            system_instruction: sections.join("\n\n"),
            history: vec![ChatMessage::user(OPENING_REQUEST)],
        })
    }
}

fn ensure_story_seed(campaign: &CampaignContext) -> Result<(), PromptError> {
    if campaign.has_story_seed() {
        Ok(())
    } else {
        Err(PromptError::Configuration(format!(
            "campaign '{}' has neither a description nor world lore",
            campaign.title
        )))
    }
}

fn campaign_sections(campaign: &CampaignContext) -> Vec<String> {
    let mut sections = Vec::new();

    if !campaign.selected_prompts.is_empty() {
        let bundles: Vec<&str> = campaign
            .selected_prompts
            .iter()
            .map(|bundle| bundle_text(*bundle))
            .collect();
        sections.push(format!("## Instructions\n{}", bundles.join("\n\n")));
    }

    if let Some(lore) = campaign
        .world_lore
        .as_deref()
        .filter(|lore| !lore.trim().is_empty())
    {
        sections.push(format!("## World lore\n{}", lore.trim()));
    }

    let mut header = format!("## Campaign\nTitle: {}", campaign.title);
    if !campaign.description.trim().is_empty() {
        header.push_str(&format!("\nDescription: {}", campaign.description.trim()));
    }
    sections.push(header);

    sections
}

fn state_section(state: &GameState) -> String {
    let document = serde_json::to_string_pretty(state).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to serialize game state for prompt");
        "{}".to_string()
    });
    format!("## Current game state\n```json\n{document}\n```")
}

fn roster_section(roster: &[String]) -> String {
    if roster.is_empty() {
        "## Characters present\nNo other characters are recorded at this location.".to_string()
    } else {
        format!(
            "## Characters present\n{}\nAccount for every character listed here in the \
             narrative and list them in entities_mentioned.",
            roster.join(", ")
        )
    }
}

fn debug_section(state: &GameState) -> &'static str {
    if state.debug_mode {
        DEBUG_MODE_ON
    } else {
        DEBUG_MODE_OFF
    }
}

fn turn_message(turn: &StoryTurn) -> Option<ChatMessage> {
    match turn.actor {
        Actor::User => Some(ChatMessage::user(turn.text.clone())),
        Actor::Narrator => Some(ChatMessage::assistant(turn.text.clone())),
        Actor::System => None,
    }
}

/// The player's input as sent to the model for `mode`.
pub fn frame_user_input(mode: InteractionMode, input: &str) -> String {
    let input = input.trim();
    match mode {
        InteractionMode::Character => format!(
            "Main character: {input}. Continue the story in about 300 words and add details \
             for narrative, descriptions of scenes, and character dialogue."
        ),
        InteractionMode::God => format!(
            "GOD MODE: {input}\nApply this directly to the world. Do not roll dice and do not \
             advance the story beyond the requested change."
        ),
        InteractionMode::Think => format!(
            "THINK MODE: {input}\nThe character pauses to think. Do not advance time or the \
             world; answer with a planning_block of options."
        ),
    }
}

/// Token estimate for a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Turns kept under `budget`, oldest dropped first.
///
/// The opening turn (sequence 0) and the last `keep_recent` turns are always
/// kept, even when they alone exceed the budget.
pub fn truncate_history(turns: &[StoryTurn], budget: HistoryBudget) -> Vec<&StoryTurn> {
    let mut total: usize = turns.iter().map(|turn| estimate_tokens(&turn.text)).sum();
    if total <= budget.max_tokens {
        return turns.iter().collect();
    }

    let recent_start = turns.len().saturating_sub(budget.keep_recent);
    let mut keep = vec![true; turns.len()];

    for (index, turn) in turns.iter().enumerate().take(recent_start) {
        if total <= budget.max_tokens {
            break;
        }
        if turn.sequence == 0 {
            continue;
        }
        keep[index] = false;
        total -= estimate_tokens(&turn.text);
    }

    turns
        .iter()
        .zip(keep)
        .filter_map(|(turn, kept)| kept.then_some(turn))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use worldarchitect_domain::{TurnStructuredFields, UserId};

    use super::*;

    fn context(description: &str, lore: Option<&str>) -> CampaignContext {
        CampaignContext {
            title: "Ashes of Varn".to_string(),
            description: description.to_string(),
            selected_prompts: vec![PromptBundle::Narrative, PromptBundle::Mechanics],
            world_lore: lore.map(str::to_string),
        }
    }

    /// Alternating user/narrator turns, each `chars` characters long.
    fn turns(count: u32, chars: usize) -> Vec<StoryTurn> {
        let now = Utc::now();
        (0..count)
            .map(|sequence| {
                let text = "x".repeat(chars);
                if sequence % 2 == 0 {
                    StoryTurn::narrator(
                        sequence,
                        InteractionMode::Character,
                        text,
                        now,
                        TurnStructuredFields::default(),
                    )
                } else {
                    StoryTurn::user(sequence, InteractionMode::Character, text, now)
                }
            })
            .collect()
    }

    fn sequences(turns: &[&StoryTurn]) -> Vec<u32> {
        turns.iter().map(|turn| turn.sequence).collect()
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn history_within_budget_is_untouched() {
        let history = turns(6, 40);
        let kept = truncate_history(&history, HistoryBudget::default());
        assert_eq!(kept.len(), 6);
    }

    #[test]
    fn truncation_keeps_opening_and_recent_turns() {
        // 10 turns of 100 tokens each; budget allows 4.
        let history = turns(10, 400);
        let budget = HistoryBudget {
            max_tokens: 400,
            keep_recent: 3,
        };

        let kept = truncate_history(&history, budget);

        assert_eq!(sequences(&kept), vec![0, 7, 8, 9]);
    }

    #[test]
    fn protected_turns_survive_even_over_budget() {
        let history = turns(6, 400);
        let budget = HistoryBudget {
            max_tokens: 100,
            keep_recent: 4,
        };

        let kept = truncate_history(&history, budget);

        assert_eq!(sequences(&kept), vec![0, 2, 3, 4, 5]);
    }

    #[test]
    fn oldest_unprotected_turns_go_first() {
        let history = turns(8, 400);
        let budget = HistoryBudget {
            max_tokens: 600,
            keep_recent: 2,
        };

        let kept = truncate_history(&history, budget);

        assert_eq!(sequences(&kept), vec![0, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn modes_are_framed() {
        assert!(frame_user_input(InteractionMode::Character, "I draw my sword")
            .starts_with("Main character: I draw my sword. Continue the story"));
        assert!(frame_user_input(InteractionMode::God, "Make it night").starts_with("GOD MODE: Make it night"));
        assert!(frame_user_input(InteractionMode::Think, "What are my options?")
            .starts_with("THINK MODE: What are my options?"));
    }

    #[test]
    fn turn_prompt_carries_state_roster_and_history() {
        let ctx = context("A city of ash and embers", None);
        let mut state = GameState::default();
        state.world_data.current_location_name = Some("Ember Gate".to_string());
        let history = turns(2, 20);
        let roster = vec!["Mara Voss".to_string()];

        let payload = PromptBuilder::default()
            .build_turn(TurnInputs {
                campaign: &ctx,
                state: &state,
                history: &history,
                roster: &roster,
                input: "I knock",
                mode: InteractionMode::Character,
            })
            .expect("prompt builds");

        assert!(payload.system_instruction.starts_with(NARRATOR_ROLE));
        assert!(payload.system_instruction.contains("Ember Gate"));
        assert!(payload.system_instruction.contains("Mara Voss"));
        assert!(payload.system_instruction.contains("Description: A city of ash and embers"));
        assert!(payload.system_instruction.contains(DEBUG_MODE_OFF));
        assert_eq!(payload.history.len(), 3);
        assert!(payload.history[2].content.starts_with("Main character: I knock."));

        let request = payload.to_request();
        assert!(request.json_mode);
        assert_eq!(request.system_prompt.as_deref(), Some(payload.system_instruction.as_str()));
    }

    #[test]
    fn new_campaign_without_description_or_lore_is_a_configuration_error() {
        let ctx = context("  ", None);
        let state = GameState::default();

        let err = PromptBuilder::default()
            .build_opening(&ctx, &state)
            .unwrap_err();
        assert!(matches!(err, PromptError::Configuration(_)));

        let err = PromptBuilder::default()
            .build_turn(TurnInputs {
                campaign: &ctx,
                state: &state,
                history: &[],
                roster: &[],
                input: "Hello",
                mode: InteractionMode::Character,
            })
            .unwrap_err();
        assert!(matches!(err, PromptError::Configuration(_)));
    }

    #[test]
    fn lore_alone_is_enough_to_open() {
        let ctx = context("", Some("The Shattered Reach"));
        let payload = PromptBuilder::default()
            .build_opening(&ctx, &GameState::default())
            .expect("lore is a story seed");

        assert!(payload.system_instruction.starts_with(OPENING_MARKER));
        assert!(payload.system_instruction.contains("## World lore\nThe Shattered Reach"));
        assert_eq!(payload.history, vec![ChatMessage::user(OPENING_REQUEST)]);
    }

    #[test]
    fn default_world_supplies_lore() {
        let user = UserId::new("alice").expect("valid user");
        let campaign = Campaign::new(user, "Reach", "", Utc::now())
            .expect("valid campaign")
            .with_default_world(true);

        let bundled = CampaignContext::from_campaign(&campaign, None);
        assert_eq!(bundled.world_lore.as_deref(), Some(DEFAULT_WORLD_LORE));

        let from_file = CampaignContext::from_campaign(&campaign, Some("Custom lore"));
        assert_eq!(from_file.world_lore.as_deref(), Some("Custom lore"));
    }

    #[test]
    fn extra_instruction_is_appended_to_last_message() {
        let payload = PromptPayload {
            system_instruction: "sys".to_string(),
            history: vec![ChatMessage::user("GOD MODE: rain")],
        };

        let repaired = payload.with_extra_instruction("Include Borin.");
        assert_eq!(repaired.history[0].content, "GOD MODE: rain\n\nInclude Borin.");
        assert_eq!(payload.history[0].content, "GOD MODE: rain");
    }
}
