//! Deterministic narrator used when the engine runs with `TESTING=true`.
//!
//! Produces well-formed JSON responses without network access so the full
//! pipeline (parsing, validation, merging, persistence) can be exercised.

use async_trait::async_trait;
use serde_json::json;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse, TokenUsage};
use crate::prompt_templates::OPENING_MARKER;

/// Narrator stand-in that echoes the player's action back as story text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedNarrator;

impl ScriptedNarrator {
    pub fn new() -> Self {
        Self
    }

    fn opening() -> serde_json::Value {
        json!({
            "narrative": "Morning mist lifts over the village of Brindlemere. Innkeeper Mara Voss sets a warm mug before you and asks where your road leads.",
            "entities_mentioned": ["Mara Voss"],
            "location_confirmed": "Brindlemere",
            "session_header": "Session 1 | Brindlemere | Morning",
            "state_updates": {
                "player_character_data": {"name": "Adventurer", "hp_current": 10, "hp_max": 10},
                "npc_data": {
                    "Mara Voss": {"name": "Mara Voss", "role": "innkeeper", "present": true, "location": "Brindlemere"}
                },
                "world_data": {"current_location_name": "Brindlemere", "world_time": "Day 1, morning"}
            },
            "planning_block": {
                "thinking": "The player has just arrived.",
                "choices": {
                    "ask_about_rumors": {"text": "Ask about rumors", "description": "Lean in and ask Mara what travelers have been saying.", "risk_level": "safe"},
                    "explore_village": {"text": "Explore the village", "description": "Head out into the square.", "risk_level": "low"}
                }
            }
        })
    }

    fn continuation(action: &str) -> serde_json::Value {
        json!({
            "narrative": format!("You act: {action}. The world shifts in response, and the story moves on."),
            "entities_mentioned": [],
            "state_updates": {},
            "planning_block": {
                "thinking": "Offer a simple way forward.",
                "choices": {
                    "continue": {"text": "Continue", "description": "Press on with your current course.", "risk_level": "low"}
                }
            }
        })
    }
}

#[async_trait]
impl LlmPort for ScriptedNarrator {
    async fn generate(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let is_opening = request
            .system_prompt
            .as_deref()
            .is_some_and(|prompt| prompt.contains(OPENING_MARKER));

        let body = if is_opening {
            Self::opening()
        } else {
            let action = request.last_user_message().unwrap_or_default();
            Self::continuation(action)
        };

        tracing::debug!(model = %model, opening = is_opening, "Serving scripted narrator response");

        let content = body.to_string();
        let completion_tokens = u32::try_from(content.len() / 4).unwrap_or(u32::MAX);
        Ok(LlmResponse {
            content,
            usage: Some(TokenUsage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
            }),
        })
    }
}
