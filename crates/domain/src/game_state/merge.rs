//! Applying a turn's `state_updates` payload to the previous game state.
//!
//! Field rules:
//! - objects merge recursively; scalars and arrays overwrite
//! - `{"append": x}` appends `x` (or each element of `x`) to a list
//! - [`DELETE_TOKEN`] removes a key
//! - `rumors`, `background_events`, `combat_log` are additive lists
//! - `factions`, `time_events` merge by key (a list of named objects is keyed by `name`)
//! - `active_missions` upsert by id or title and are stored as a list
//! - `core_memories` are append-only and deduplicated
//! - a combat-ended signal clears combat-only state and drops defeated enemies

use serde_json::{Map, Value};

use super::{normalize_missions, upsert_missions, CombatState, GameState};

/// Value that removes the key it is assigned to.
pub const DELETE_TOKEN: &str = "__DELETE__";

/// Wrapper key requesting an append instead of an overwrite.
pub const APPEND_KEY: &str = "append";

const ADDITIVE_LIST_KEYS: &[&str] = &["rumors", "background_events", "combat_log"];
const KEYED_MERGE_KEYS: &[&str] = &["factions", "time_events"];
const MISSIONS_KEY: &str = "active_missions";
const CORE_MEMORIES_KEY: &str = "core_memories";
const COMBAT_ENDED_KEY: &str = "combat_ended";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateMergeError {
    /// The stored document could not be read. Never recovered silently.
    #[error("Stored game state is corrupt: {0}")]
    CorruptState(String),

    /// The update payload cannot be applied.
    #[error("Invalid state updates: {0}")]
    InvalidUpdates(String),

    #[error("Game state serialization failed: {0}")]
    Serialization(String),
}

/// Combine a persisted state document with a turn's updates.
pub fn merge_state_updates(
    previous: &Value,
    updates: &Value,
) -> Result<GameState, StateMergeError> {
    GameState::from_document(previous)?.apply_updates(updates)
}

impl GameState {
    /// Produce the next state. `self` is left untouched.
    pub fn apply_updates(&self, updates: &Value) -> Result<GameState, StateMergeError> {
        let mut updates = match updates {
            Value::Null => return Ok(self.clone()),
            Value::Object(map) if map.is_empty() => return Ok(self.clone()),
            Value::Object(map) => map.clone(),
            other => {
                return Err(StateMergeError::InvalidUpdates(format!(
                    "expected an object, found {other}"
                )))
            }
        };

        let combat_ended = take_combat_end_signal(&mut updates);
        let combatants_before = self.combat_state.combatants.clone();

        let Value::Object(mut document) = self.to_document()? else {
            return Err(StateMergeError::Serialization(
                "game state did not serialize to an object".to_string(),
            ));
        };
        merge_objects(&mut document, updates);

        let mut next: GameState = serde_json::from_value(Value::Object(document))
            .map_err(|e| StateMergeError::InvalidUpdates(e.to_string()))?;

        if combat_ended {
            end_combat(&mut next, &combatants_before);
        }
        carry_core_memories(&mut next, &self.custom_campaign_state.core_memories);

        Ok(next)
    }
}

/// Detect and strip the signals that end a fight.
///
/// Signals: top-level `combat_ended: true`, `combat_state.combat_ended: true`,
/// or an explicit `combat_state.in_combat: false`.
fn take_combat_end_signal(updates: &mut Map<String, Value>) -> bool {
    let mut ended = is_truthy(updates.remove(COMBAT_ENDED_KEY));
    if let Some(Value::Object(combat)) = updates.get_mut("combat_state") {
        ended |= is_truthy(combat.remove(COMBAT_ENDED_KEY));
        ended |= matches!(combat.get("in_combat"), Some(Value::Bool(false)));
    }
    ended
}

fn is_truthy(value: Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn end_combat(state: &mut GameState, combatants_before: &Map<String, Value>) {
    let mut defeated: Vec<String> = state
        .npc_data
        .iter()
        .filter(|(_, npc)| npc.is_defeated_enemy())
        .map(|(name, _)| name.clone())
        .collect();

    for (name, combatant) in combatants_before.iter().chain(state.combat_state.combatants.iter()) {
        if combatant_is_defeated_enemy(combatant) && !defeated.contains(name) {
            defeated.push(name.clone());
        }
    }

    for name in &defeated {
        if state.npc_data.remove(name).is_some() {
            tracing::debug!(npc = %name, "Removed defeated enemy from roster");
        }
    }

    state.combat_state = CombatState::ended(state.combat_state.combat_summary.take());
}

fn combatant_is_defeated_enemy(combatant: &Value) -> bool {
    let hp_zero = match combatant.get("hp_current") {
        Some(Value::Number(n)) => n.as_f64().map(|hp| hp <= 0.0).unwrap_or(false),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|hp| hp <= 0.0).unwrap_or(false),
        _ => false,
    };
    let status_defeated = combatant
        .get("status")
        .and_then(Value::as_str)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "defeated" | "dead" | "slain"))
        .unwrap_or(false);
    let kind = combatant
        .get("type")
        .or_else(|| combatant.get("role"))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);
    let friendly = matches!(
        kind.as_deref(),
        Some("pc" | "player" | "ally" | "companion" | "party")
    );
    (hp_zero || status_defeated) && !friendly
}

fn merge_objects(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        merge_field(target, key, value);
    }
}

fn merge_field(target: &mut Map<String, Value>, key: String, value: Value) {
    if key == CORE_MEMORIES_KEY {
        append_core_memories(target, value);
        return;
    }

    if value.as_str() == Some(DELETE_TOKEN) {
        target.remove(&key);
        return;
    }

    if key == MISSIONS_KEY {
        let existing = normalize_missions(target.remove(&key).unwrap_or(Value::Null));
        let incoming = unwrap_append(value);
        let merged = upsert_missions(&existing, incoming);
        match serde_json::to_value(merged) {
            Ok(list) => {
                target.insert(key, list);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize merged missions"),
        }
        return;
    }

    if let Some(items) = append_request(&value) {
        append_items(target, key, items);
        return;
    }

    if ADDITIVE_LIST_KEYS.contains(&key.as_str()) {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return,
            other => vec![other],
        };
        append_items(target, key, items);
        return;
    }

    let value = if KEYED_MERGE_KEYS.contains(&key.as_str()) {
        match key_by_name(value) {
            Value::Object(keyed) => Value::Object(keyed),
            other => {
                tracing::warn!(
                    field = %key,
                    update = %other,
                    "Ignoring keyed update that is not a map or a list of named records"
                );
                return;
            }
        }
    } else {
        value
    };

    match value {
        Value::Object(incoming) => {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                merge_objects(existing, incoming);
            } else {
                // New objects still go through the rules so nested tokens apply.
                let mut fresh = Map::new();
                merge_objects(&mut fresh, incoming);
                target.insert(key, Value::Object(fresh));
            }
        }
        value => {
            target.insert(key, value);
        }
    }
}

/// Items requested by `{"append": x}`, if `value` is that shape.
fn append_request(value: &Value) -> Option<Vec<Value>> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    match map.get(APPEND_KEY)? {
        Value::Array(items) => Some(items.clone()),
        Value::Null => Some(Vec::new()),
        item => Some(vec![item.clone()]),
    }
}

fn unwrap_append(value: Value) -> Value {
    match append_request(&value) {
        Some(items) => Value::Array(items),
        None => value,
    }
}

fn append_items(target: &mut Map<String, Value>, key: String, items: Vec<Value>) {
    let entry = target.entry(key).or_insert(Value::Null);
    *entry = match entry.take() {
        Value::Array(mut existing) => {
            existing.extend(items);
            Value::Array(existing)
        }
        Value::Null => Value::Array(items),
        scalar => {
            let mut list = vec![scalar];
            list.extend(items);
            Value::Array(list)
        }
    };
}

fn append_core_memories(target: &mut Map<String, Value>, value: Value) {
    let incoming: Vec<String> = match unwrap_append(value) {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) if s != DELETE_TOKEN => vec![s],
        other => {
            tracing::warn!(
                update = %other,
                "Ignoring core_memories update; memories can only be appended"
            );
            return;
        }
    };

    let entry = target
        .entry(CORE_MEMORIES_KEY.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        let previous = entry.take();
        *entry = match previous {
            Value::String(s) => Value::Array(vec![Value::String(s)]),
            _ => Value::Array(Vec::new()),
        };
    }
    let Value::Array(memories) = entry else {
        return;
    };

    for memory in incoming {
        let memory = memory.trim().to_string();
        if memory.is_empty() {
            continue;
        }
        if memories.iter().any(|m| m.as_str() == Some(memory.as_str())) {
            continue;
        }
        memories.push(Value::String(memory));
    }
}

/// Memories from the previous state survive any update, including a delete or
/// overwrite of the section holding them. New ones follow in merge order.
fn carry_core_memories(next: &mut GameState, previous: &[String]) {
    if previous.is_empty() {
        return;
    }
    let current = std::mem::take(&mut next.custom_campaign_state.core_memories);
    let lost = previous.iter().filter(|m| !current.contains(m)).count();
    if lost > 0 {
        tracing::warn!(restored = lost, "Restored core memories removed by a state update");
    }
    let mut memories = previous.to_vec();
    for memory in current {
        if !memories.contains(&memory) {
            memories.push(memory);
        }
    }
    next.custom_campaign_state.core_memories = memories;
}

/// Turn `[{"name": "Guild", ...}]` into `{"Guild": {...}}` so lists of named
/// records merge by key like maps do.
fn key_by_name(value: Value) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    let all_named = items
        .iter()
        .all(|item| item.get("name").and_then(Value::as_str).is_some());
    if !all_named {
        return Value::Array(items);
    }
    let mut keyed = Map::new();
    for item in items {
        if let Some(name) = item.get("name").and_then(Value::as_str).map(str::to_string) {
            keyed.insert(name, item);
        }
    }
    Value::Object(keyed)
}
