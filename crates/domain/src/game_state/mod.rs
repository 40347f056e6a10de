//! Game state document.
//!
//! One current snapshot per campaign. The typed sections below are the parts
//! the engine reasons about; everything else the narrator writes is kept in
//! the `extra` maps and round-trips untouched.

mod lenient;
mod merge;
mod missions;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use merge::{merge_state_updates, StateMergeError, APPEND_KEY, DELETE_TOKEN};
pub use missions::{normalize_missions, upsert_missions, Mission};

/// Schema version written into new documents.
pub const CURRENT_STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    CURRENT_STATE_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default = "default_version")]
    pub game_state_version: u32,
    #[serde(default)]
    pub player_character_data: PlayerCharacterData,
    /// NPC roster keyed by name.
    #[serde(default)]
    pub npc_data: BTreeMap<String, NpcRecord>,
    #[serde(default)]
    pub world_data: WorldData,
    #[serde(default)]
    pub custom_campaign_state: CustomCampaignState,
    #[serde(default)]
    pub combat_state: CombatState,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub debug_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state_update_timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            game_state_version: CURRENT_STATE_VERSION,
            player_character_data: PlayerCharacterData::default(),
            npc_data: BTreeMap::new(),
            world_data: WorldData::default(),
            custom_campaign_state: CustomCampaignState::default(),
            combat_state: CombatState::default(),
            debug_mode: false,
            last_state_update_timestamp: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerCharacterData {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NpcRecord {
    /// Display name when it differs from the roster key.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    /// `Some(false)` when the NPC has left the scene.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_bool"
    )]
    pub present: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub location: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub role: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_i64"
    )]
    pub hp_current: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_i64"
    )]
    pub hp_max: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const FRIENDLY_ROLES: &[&str] = &["ally", "companion", "party", "party_member", "friend"];
const DEFEATED_STATUSES: &[&str] = &["defeated", "dead", "deceased", "killed", "slain"];

impl NpcRecord {
    pub fn is_friendly(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| FRIENDLY_ROLES.contains(&r.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_defeated(&self) -> bool {
        let by_hp = self.hp_current.map(|hp| hp <= 0).unwrap_or(false);
        let by_status = self
            .status
            .as_deref()
            .map(|s| DEFEATED_STATUSES.contains(&s.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        by_hp || by_status
    }

    /// Defeated and not on the player's side.
    pub fn is_defeated_enemy(&self) -> bool {
        self.is_defeated() && !self.is_friendly()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldData {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub current_location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_time: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "lenient::object"
    )]
    pub factions: Map<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "lenient::object"
    )]
    pub time_events: Map<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::value_list"
    )]
    pub rumors: Vec<Value>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::value_list"
    )]
    pub background_events: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomCampaignState {
    /// Established facts. Only ever appended to.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::string_list"
    )]
    pub core_memories: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "missions::deserialize_missions"
    )]
    pub active_missions: Vec<Mission>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CombatState {
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub in_combat: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub combat_session_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "is_zero",
        deserialize_with = "lenient::u32_or_zero"
    )]
    pub current_round: u32,
    #[serde(
        default,
        skip_serializing_if = "is_zero",
        deserialize_with = "lenient::u32_or_zero"
    )]
    pub current_turn_index: u32,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::value_list"
    )]
    pub initiative_order: Vec<Value>,
    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "lenient::object"
    )]
    pub combatants: Map<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::value_list"
    )]
    pub combat_log: Vec<Value>,
    /// Outcome of the last fight; survives the end of combat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_summary: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl CombatState {
    /// State after a fight: nothing but the summary is kept.
    pub fn ended(summary: Option<Value>) -> Self {
        Self {
            combat_summary: summary,
            ..Self::default()
        }
    }

    /// Whether any field that only has meaning during a fight is set.
    pub fn has_combat_only_fields(&self) -> bool {
        self.in_combat
            || self.combat_session_id.is_some()
            || self.current_round > 0
            || self.current_turn_index > 0
            || !self.initiative_order.is_empty()
            || !self.combatants.is_empty()
            || !self.combat_log.is_empty()
            || !self.extra.is_empty()
    }
}

impl GameState {
    /// Read a persisted document.
    ///
    /// Fails instead of substituting an empty state so a bad read can never
    /// be written back over the real one.
    pub fn from_document(document: &Value) -> Result<Self, StateMergeError> {
        if !document.is_object() {
            return Err(StateMergeError::CorruptState(format!(
                "expected an object, found {}",
                json_kind(document)
            )));
        }
        serde_json::from_value(document.clone())
            .map_err(|e| StateMergeError::CorruptState(e.to_string()))
    }

    pub fn to_document(&self) -> Result<Value, StateMergeError> {
        serde_json::to_value(self).map_err(|e| StateMergeError::Serialization(e.to_string()))
    }

    pub fn current_location(&self) -> Option<&str> {
        self.world_data
            .current_location_name
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn player_character_name(&self) -> Option<&str> {
        self.player_character_data
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// NPCs the narrative is expected to account for at the current location.
    ///
    /// Excludes NPCs marked absent, defeated NPCs and NPCs recorded at a
    /// different location. NPCs without a recorded location are assumed to
    /// be with the party.
    pub fn present_npc_names(&self) -> Vec<String> {
        let here = self.current_location().map(str::to_lowercase);
        self.npc_data
            .iter()
            .filter(|(_, npc)| npc.present != Some(false))
            .filter(|(_, npc)| !npc.is_defeated())
            .filter(|(_, npc)| {
                let there = npc
                    .location
                    .as_deref()
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty());
                match (&here, there) {
                    (Some(here), Some(there)) => *here == there,
                    _ => true,
                }
            })
            .map(|(key, npc)| {
                npc.name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(key)
                    .to_string()
            })
            .collect()
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_state_update_timestamp = Some(now);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_state_round_trips_through_document() {
        let state = GameState::default();
        let doc = state.to_document().expect("serializes");
        assert_eq!(GameState::from_document(&doc).expect("deserializes"), state);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let doc = json!({
            "game_state_version": 1,
            "player_character_data": {"name": "Kira", "level": 3},
            "world_data": {"current_location_name": "Docks", "weather": "fog"},
            "campaign_notes": ["keep me"]
        });

        let state = GameState::from_document(&doc).expect("valid");
        assert_eq!(state.player_character_data.extra["level"], 3);
        assert_eq!(state.world_data.extra["weather"], "fog");
        assert_eq!(state.extra["campaign_notes"][0], "keep me");

        let back = state.to_document().expect("serializes");
        assert_eq!(back["campaign_notes"][0], "keep me");
    }

    #[test]
    fn legacy_mission_map_is_read_as_list() {
        let doc = json!({
            "custom_campaign_state": {
                "active_missions": {"m1": {"title": "Escort the caravan"}}
            }
        });

        let state = GameState::from_document(&doc).expect("valid");
        assert_eq!(state.custom_campaign_state.active_missions.len(), 1);
        assert_eq!(state.custom_campaign_state.active_missions[0].mission_id, "m1");

        let back = state.to_document().expect("serializes");
        assert!(back["custom_campaign_state"]["active_missions"].is_array());
    }

    #[test]
    fn non_object_documents_are_corrupt() {
        assert!(matches!(
            GameState::from_document(&json!("oops")),
            Err(StateMergeError::CorruptState(_))
        ));
        assert!(matches!(
            GameState::from_document(&Value::Null),
            Err(StateMergeError::CorruptState(_))
        ));
    }

    #[test]
    fn wrongly_typed_section_is_corrupt() {
        let doc = json!({"npc_data": "not a map"});
        assert!(matches!(
            GameState::from_document(&doc),
            Err(StateMergeError::CorruptState(_))
        ));
    }

    #[test]
    fn present_npcs_filter_by_presence_location_and_defeat() {
        let doc = json!({
            "world_data": {"current_location_name": "The Rusty Anchor"},
            "npc_data": {
                "Mira": {"location": "the rusty anchor"},
                "Old Tom": {},
                "Goblin": {"hp_current": "0"},
                "Captain Vey": {"location": "Harbor"},
                "Sela": {"present": false},
                "bram": {"name": "Bram Ironfoot", "present": "yes"}
            }
        });

        let state = GameState::from_document(&doc).expect("valid");
        assert_eq!(
            state.present_npc_names(),
            vec!["Mira".to_string(), "Old Tom".to_string(), "Bram Ironfoot".to_string()]
        );
    }

    #[test]
    fn friendly_npcs_are_not_defeated_enemies() {
        let npc = NpcRecord {
            role: Some("Companion".into()),
            hp_current: Some(0),
            ..Default::default()
        };
        assert!(npc.is_defeated());
        assert!(!npc.is_defeated_enemy());
    }
}
