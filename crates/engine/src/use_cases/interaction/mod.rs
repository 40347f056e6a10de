//! Player turn: the full narrative/state reconciliation pipeline.
//!
//! Load campaign, story and state; build the prompt; invoke the model; parse;
//! check present characters (one repair pass at most); merge state updates;
//! persist the user turn, the narrator turn and the new state.
//!
//! Nothing is written unless a narrator reply was obtained.

use std::sync::Arc;

use worldarchitect_domain::{
    CampaignId, GameState, InteractionMode, StateMergeError, StoryTurn, UserId,
};

use crate::infrastructure::model_invoker::ModelUnavailableError;
use crate::infrastructure::ports::{CampaignRepo, ClockPort, RepoError};
use crate::prompt_templates::entity_repair_instruction;
use crate::use_cases::campaign::{load_owned, AccessError};
use crate::use_cases::narrative::{
    expected_entities, validate_entities, EntityValidationResult, Narration, NarrativeResponse,
    Narrator, ParseQuality, PlayerCharacterPolicy, PromptError, PromptPayload, TurnInputs,
};

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),
    #[error("Campaign {0} belongs to another user")]
    Forbidden(CampaignId),
    #[error(transparent)]
    Configuration(#[from] PromptError),
    #[error(transparent)]
    ModelUnavailable(#[from] ModelUnavailableError),
    #[error(transparent)]
    State(#[from] StateMergeError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl From<AccessError> for InteractionError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotFound(id) => Self::NotFound(id),
            AccessError::Forbidden(id) => Self::Forbidden(id),
            AccessError::Repo(e) => Self::Repo(e),
        }
    }
}

/// What the player sees after a turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: NarrativeResponse,
    pub user_scene_number: u32,
    pub quality: ParseQuality,
    pub model: String,
    pub validation: EntityValidationResult,
    pub dual_pass_used: bool,
    pub state: GameState,
}

pub struct PlayTurn {
    repo: Arc<dyn CampaignRepo>,
    narrator: Arc<Narrator>,
    clock: Arc<dyn ClockPort>,
    policy: PlayerCharacterPolicy,
}

impl PlayTurn {
    pub fn new(
        repo: Arc<dyn CampaignRepo>,
        narrator: Arc<Narrator>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            repo,
            narrator,
            clock,
            policy: PlayerCharacterPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PlayerCharacterPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn execute(
        &self,
        id: CampaignId,
        user_id: &UserId,
        input: &str,
        mode: InteractionMode,
    ) -> Result<TurnOutcome, InteractionError> {
        let mut campaign = load_owned(self.repo.as_ref(), id, user_id).await?;
        let history = self.repo.list_turns(id).await?;

        // Corrupt state stops the turn here, before any write.
        let state = match self.repo.get_state(id).await? {
            Some(document) => GameState::from_document(&document)?,
            None => GameState::default(),
        };

        let roster = expected_entities(&state, self.policy);
        let context = self.narrator.context(&campaign);
        let payload = self.narrator.builder().build_turn(TurnInputs {
            campaign: &context,
            state: &state,
            history: &history,
            roster: &roster,
            input,
            mode,
        })?;

        let first = self.narrator.narrate(&payload).await?;
        let (narration, validation, dual_pass_used) = self
            .reconcile_entities(&payload, first, &roster, state.debug_mode)
            .await;

        let quality = narration.parsed.quality;
        let response = present(narration.parsed.response, state.debug_mode);

        let updates = match (mode, response.state_updates.as_ref()) {
            // Planning turns never advance the world.
            (InteractionMode::Think, Some(_)) => {
                tracing::debug!(campaign_id = %id, "Ignoring state updates on a think turn");
                None
            }
            (_, updates) => updates,
        };
        let next_state = match updates {
            Some(updates) => match state.apply_updates(updates) {
                Ok(mut merged) => {
                    if merged != state {
                        merged.stamp(self.clock.now());
                    }
                    merged
                }
                Err(e) => {
                    tracing::warn!(
                        campaign_id = %id,
                        error = %e,
                        "State updates rejected, keeping previous state"
                    );
                    state.clone()
                }
            },
            None => state.clone(),
        };

        let now = self.clock.now();
        let sequence = u32::try_from(history.len()).unwrap_or(u32::MAX);
        let user_scene_number = scene_number(&history);

        let user_turn = StoryTurn::user(sequence, mode, input, now);
        let narrator_turn = StoryTurn::narrator(
            sequence.saturating_add(1),
            mode,
            response.narrative.clone(),
            now,
            response.structured_fields(),
        )
        .with_scene_number(user_scene_number);

        self.repo
            .append_turns(id, &[user_turn, narrator_turn])
            .await?;
        self.repo.save_state(id, &next_state.to_document()?).await?;
        campaign.touch(now);
        self.repo.save_campaign(&campaign).await?;

        tracing::info!(
            campaign_id = %id,
            sequence,
            mode = mode.as_str(),
            model = %narration.model,
            quality = quality.as_str(),
            missing_entities = validation.missing.len(),
            dual_pass = dual_pass_used,
            "Turn completed"
        );

        Ok(TurnOutcome {
            response,
            user_scene_number,
            quality,
            model: narration.model,
            validation,
            dual_pass_used,
            state: next_state,
        })
    }

    /// Validate the first reply and, if characters are missing, ask once more.
    ///
    /// The second reply is kept only when it has a real narrative and leaves
    /// out strictly fewer characters. A failed second call keeps the first.
    async fn reconcile_entities(
        &self,
        payload: &PromptPayload,
        first: Narration,
        roster: &[String],
        debug_mode: bool,
    ) -> (Narration, EntityValidationResult, bool) {
        let first_check = check(&first, roster, debug_mode);
        if !first_check.needs_repair() {
            return (first, first_check, false);
        }

        let repair = payload.with_extra_instruction(&entity_repair_instruction(&first_check.missing));
        let second = match self.narrator.narrate(&repair).await {
            Ok(second) => second,
            Err(e) => {
                tracing::warn!(error = %e, "Entity repair pass failed, keeping first response");
                return (first, first_check, true);
            }
        };

        let second_check = check(&second, roster, debug_mode);
        let improved = !second.parsed.response.is_placeholder()
            && second_check.missing.len() < first_check.missing.len();

        tracing::info!(
            missing_before = first_check.missing.len(),
            missing_after = second_check.missing.len(),
            adopted = improved,
            "Entity repair pass finished"
        );

        if improved {
            (second, second_check, true)
        } else {
            (first, first_check, true)
        }
    }
}

fn check(narration: &Narration, roster: &[String], debug_mode: bool) -> EntityValidationResult {
    let response = present(narration.parsed.response.clone(), debug_mode);
    validate_entities(roster, &response.entities_mentioned, &response.narrative)
}

/// Response as shown to the player.
fn present(response: NarrativeResponse, debug_mode: bool) -> NarrativeResponse {
    if debug_mode {
        response
    } else {
        response.without_debug_content()
    }
}

/// Narrator scenes seen so far, including the one being produced.
fn scene_number(history: &[StoryTurn]) -> u32 {
    let seen = history.iter().filter(|turn| turn.is_narrator()).count();
    u32::try_from(seen).unwrap_or(u32::MAX).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{LlmError, LlmResponse, MockCampaignRepo, MockLlmPort};
    use crate::use_cases::narrative::{narrator_for_tests, PLACEHOLDER_NARRATIVE};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use worldarchitect_domain::{Campaign, TurnStructuredFields};

    fn owner() -> UserId {
        UserId::new("owner").expect("valid user")
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn campaign() -> Campaign {
        Campaign::new(owner(), "Ashes", "A burned city", now()).expect("valid campaign")
    }

    fn opening() -> StoryTurn {
        StoryTurn::narrator(
            0,
            InteractionMode::Character,
            "Smoke hangs over the square.",
            now(),
            TurnStructuredFields::default(),
        )
        .with_scene_number(1)
    }

    fn reply(body: Value) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            content: body.to_string(),
            usage: None,
        })
    }

    /// Turns and state written by the use case.
    #[derive(Default)]
    struct Written {
        turns: Vec<StoryTurn>,
        state: Option<Value>,
    }

    fn repo(campaign: Campaign, state: Value, written: Arc<Mutex<Written>>) -> MockCampaignRepo {
        let mut repo = MockCampaignRepo::new();
        repo.expect_get_campaign()
            .returning(move |_| Ok(Some(campaign.clone())));
        repo.expect_list_turns().returning(|_| Ok(vec![opening()]));
        repo.expect_get_state()
            .returning(move |_| Ok(Some(state.clone())));

        let turns_sink = Arc::clone(&written);
        repo.expect_append_turns().returning(move |_, turns| {
            turns_sink
                .lock()
                .expect("lock")
                .turns
                .extend_from_slice(turns);
            Ok(())
        });
        let state_sink = Arc::clone(&written);
        repo.expect_save_state().returning(move |_, state| {
            state_sink.lock().expect("lock").state = Some(state.clone());
            Ok(())
        });
        repo.expect_save_campaign().returning(|_| Ok(()));
        repo
    }

    fn play_turn(repo: MockCampaignRepo, llm: MockLlmPort) -> PlayTurn {
        PlayTurn::new(
            Arc::new(repo),
            Arc::new(narrator_for_tests(llm)),
            Arc::new(FixedClock(now())),
        )
    }

    fn tavern_state() -> Value {
        json!({
            "player_character_data": {"name": "Sera"},
            "world_data": {"current_location_name": "Tavern"},
            "npc_data": {
                "Aria": {"location": "Tavern"},
                "Borin": {"location": "Tavern"}
            }
        })
    }

    #[tokio::test]
    async fn turn_appends_both_turns_and_merges_state() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        llm.expect_generate().times(1).returning(|_, _| {
            reply(json!({
                "narrative": "Aria and Borin look up as the door bangs open.",
                "entities_mentioned": ["Aria", "Borin"],
                "state_updates": {"world_data": {"rumors": {"append": "A dragon was seen"}}}
            }))
        });

        let use_case = play_turn(repo(campaign, tavern_state(), Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "I kick the door open", InteractionMode::Character)
            .await
            .expect("turn completed");

        assert_eq!(outcome.user_scene_number, 2);
        assert!(outcome.validation.success());
        assert!(!outcome.dual_pass_used);

        let written = written.lock().expect("lock");
        let sequences: Vec<u32> = written.turns.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert!(!written.turns[0].is_narrator());
        assert!(written.turns[1].is_narrator());

        let state = written.state.as_ref().expect("state saved");
        assert_eq!(state["world_data"]["rumors"], json!(["A dragon was seen"]));
        assert!(!state["last_state_update_timestamp"].is_null());
    }

    #[tokio::test]
    async fn repeated_mission_reports_do_not_duplicate() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        llm.expect_generate().times(1).returning(|_, _| {
            reply(json!({
                "narrative": "The reeve repeats her plea.",
                "state_updates": {
                    "custom_campaign_state": {
                        "active_missions": {"find_the_lamb": {"title": "Find the lamb", "status": "active"}}
                    }
                }
            }))
        });

        let state = json!({
            "custom_campaign_state": {
                "active_missions": [{"mission_id": "find_the_lamb", "title": "Find the lamb"}]
            }
        });
        let use_case = play_turn(repo(campaign, state, Arc::clone(&written)), llm);
        use_case
            .execute(id, &owner(), "I ask about work", InteractionMode::Character)
            .await
            .expect("turn completed");

        let written = written.lock().expect("lock");
        let missions = written.state.as_ref().expect("state saved")["custom_campaign_state"]
            ["active_missions"]
            .as_array()
            .cloned()
            .expect("missions list");
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0]["status"], "active");
    }

    #[tokio::test]
    async fn all_models_failing_writes_nothing() {
        let campaign = campaign();
        let id = campaign.id;

        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_, _| Err(LlmError::Server { status: 503, message: "busy".into() }));

        let mut repo = MockCampaignRepo::new();
        repo.expect_get_campaign()
            .returning(move |_| Ok(Some(campaign.clone())));
        repo.expect_list_turns().returning(|_| Ok(vec![opening()]));
        repo.expect_get_state().returning(|_| Ok(None));
        repo.expect_append_turns().never();
        repo.expect_save_state().never();
        repo.expect_save_campaign().never();

        let result = play_turn(repo, llm)
            .execute(id, &owner(), "I wait", InteractionMode::Character)
            .await;

        assert!(matches!(result, Err(InteractionError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn corrupt_state_fails_before_the_model_is_called() {
        let campaign = campaign();
        let id = campaign.id;

        let mut llm = MockLlmPort::new();
        llm.expect_generate().never();

        let mut repo = MockCampaignRepo::new();
        repo.expect_get_campaign()
            .returning(move |_| Ok(Some(campaign.clone())));
        repo.expect_list_turns().returning(|_| Ok(vec![opening()]));
        repo.expect_get_state()
            .returning(|_| Ok(Some(json!(["not", "a", "state"]))));
        repo.expect_append_turns().never();
        repo.expect_save_state().never();

        let result = play_turn(repo, llm)
            .execute(id, &owner(), "I wait", InteractionMode::Character)
            .await;

        assert!(matches!(
            result,
            Err(InteractionError::State(StateMergeError::CorruptState(_)))
        ));
    }

    #[tokio::test]
    async fn repair_pass_is_adopted_when_it_finds_more_characters() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        let mut seq = mockall::Sequence::new();
        llm.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                reply(json!({"narrative": "Aria waves.", "entities_mentioned": ["Aria"]}))
            });
        llm.expect_generate()
            .withf(|_, request| {
                request
                    .last_user_message()
                    .is_some_and(|m| m.contains("Borin"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                reply(json!({
                    "narrative": "Aria waves while Borin polishes a mug.",
                    "entities_mentioned": ["Aria", "Borin"]
                }))
            });

        let use_case = play_turn(repo(campaign, tavern_state(), Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "I look around", InteractionMode::Character)
            .await
            .expect("turn completed");

        assert!(outcome.dual_pass_used);
        assert!(outcome.validation.success());
        assert_eq!(outcome.response.narrative, "Aria waves while Borin polishes a mug.");
    }

    #[tokio::test]
    async fn placeholder_repair_is_discarded_and_retry_happens_once() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        let mut seq = mockall::Sequence::new();
        llm.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| reply(json!({"narrative": "The fire crackles."})));
        llm.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| reply(json!({"narrative": ""})));

        let use_case = play_turn(repo(campaign, tavern_state(), Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "I warm my hands", InteractionMode::Character)
            .await
            .expect("turn completed");

        assert!(outcome.dual_pass_used);
        assert_eq!(outcome.response.narrative, "The fire crackles.");
        assert_eq!(outcome.validation.missing, vec!["Aria".to_string(), "Borin".to_string()]);
        assert_ne!(outcome.response.narrative, PLACEHOLDER_NARRATIVE);
    }

    #[tokio::test]
    async fn debug_content_is_hidden_outside_debug_mode() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        llm.expect_generate().times(1).returning(|_, _| {
            reply(json!({
                "narrative": "You swing.[DEBUG_START]DC 12 vs 15[DEBUG_END] The blade bites.",
                "debug_info": {"dm_notes": ["roll was high"]}
            }))
        });

        let use_case = play_turn(repo(campaign, json!({}), Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "I attack", InteractionMode::Character)
            .await
            .expect("turn completed");

        assert!(!outcome.response.narrative.contains("DEBUG"));
        assert!(outcome.response.debug_info.is_none());
        let written = written.lock().expect("lock");
        assert!(written.turns[1].structured.debug_info.is_none());
    }

    #[tokio::test]
    async fn invalid_state_updates_keep_the_previous_state() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        llm.expect_generate().times(1).returning(|_, _| {
            reply(json!({"narrative": "Nothing changes.", "state_updates": ["oops"]}))
        });

        let previous = json!({"world_data": {"current_location_name": "Tavern"}});
        let use_case = play_turn(repo(campaign, previous, Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "I wait", InteractionMode::Character)
            .await
            .expect("turn completed");

        assert_eq!(outcome.state.current_location(), Some("Tavern"));
        assert!(outcome.state.last_state_update_timestamp.is_none());
    }

    #[tokio::test]
    async fn think_turns_do_not_change_the_state() {
        let campaign = campaign();
        let id = campaign.id;
        let written = Arc::new(Mutex::new(Written::default()));

        let mut llm = MockLlmPort::new();
        llm.expect_generate().times(1).returning(|_, _| {
            reply(json!({
                "narrative": "You weigh your options.",
                "state_updates": {"world_data": {"current_location_name": "Docks"}}
            }))
        });

        let previous = json!({"world_data": {"current_location_name": "Tavern"}});
        let use_case = play_turn(repo(campaign, previous, Arc::clone(&written)), llm);
        let outcome = use_case
            .execute(id, &owner(), "Should I leave?", InteractionMode::Think)
            .await
            .expect("turn completed");

        assert_eq!(outcome.state.current_location(), Some("Tavern"));
        assert!(outcome.state.last_state_update_timestamp.is_none());
        let written = written.lock().expect("lock");
        let saved = written.state.as_ref().expect("state saved");
        assert_eq!(saved["world_data"]["current_location_name"], "Tavern");
        assert_eq!(written.turns.len(), 2);
    }

    #[test]
    fn scene_number_counts_narrator_turns() {
        let history = vec![
            opening(),
            StoryTurn::user(1, InteractionMode::Character, "hi", now()),
        ];
        assert_eq!(scene_number(&history), 2);
        assert_eq!(scene_number(&[]), 1);
    }
}
