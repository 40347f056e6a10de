//! StoryTurn entity - immutable, append-only record of one exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, PlanningBlock};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    /// The model narrator. Serialized as `gemini` to match stored history.
    #[serde(rename = "gemini")]
    Narrator,
    System,
}

/// How the player's input should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// The player acts as their character.
    #[default]
    Character,
    /// The player edits the world directly.
    God,
    /// The player plans without advancing the story.
    Think,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::God => "god",
            Self::Think => "think",
        }
    }
}

impl std::str::FromStr for InteractionMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" | "" => Ok(Self::Character),
            "god" => Ok(Self::God),
            "think" => Ok(Self::Think),
            other => Err(DomainError::parse(format!("Unknown interaction mode: {other}"))),
        }
    }
}

/// Structured side-channel fields a narrator turn may carry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnStructuredFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities_mentioned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_updates: Option<serde_json::Value>,
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dice_rolls: Vec<String>,
}

/// One entry in a campaign's story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryTurn {
    /// Position in the story, starting at 0.
    pub sequence: u32,
    pub actor: Actor,
    pub mode: InteractionMode,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Narrator turns only: how many narrator scenes the player has seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_scene_number: Option<u32>,
    #[serde(default, flatten)]
    pub structured: TurnStructuredFields,
}

impl StoryTurn {
    pub fn user(
        sequence: u32,
        mode: InteractionMode,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            actor: Actor::User,
            mode,
            text: text.into(),
            timestamp,
            user_scene_number: None,
            structured: TurnStructuredFields::default(),
        }
    }

    pub fn narrator(
        sequence: u32,
        mode: InteractionMode,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
        structured: TurnStructuredFields,
    ) -> Self {
        Self {
            sequence,
            actor: Actor::Narrator,
            mode,
            text: text.into(),
            timestamp,
            user_scene_number: None,
            structured,
        }
    }

    pub fn with_scene_number(mut self, scene: u32) -> Self {
        self.user_scene_number = Some(scene);
        self
    }

    pub fn is_narrator(&self) -> bool {
        self.actor == Actor::Narrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrator_actor_serializes_as_gemini() {
        let turn = StoryTurn::narrator(
            1,
            InteractionMode::Character,
            "The door creaks.",
            Utc::now(),
            TurnStructuredFields {
                entities_mentioned: vec!["Mira".into()],
                ..Default::default()
            },
        );

        let value = serde_json::to_value(&turn).expect("serializes");
        assert_eq!(value["actor"], "gemini");
        assert_eq!(value["mode"], "character");
        assert_eq!(value["entities_mentioned"][0], "Mira");
        assert!(value.get("planning_block").is_none());

        let back: StoryTurn = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, turn);
    }

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("GOD".parse::<InteractionMode>(), Ok(InteractionMode::God));
        assert_eq!(" think ".parse::<InteractionMode>(), Ok(InteractionMode::Think));
        assert_eq!("".parse::<InteractionMode>(), Ok(InteractionMode::Character));
        assert!("dream".parse::<InteractionMode>().is_err());
    }
}
