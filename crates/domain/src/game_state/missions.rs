//! Mission list normalization.
//!
//! Older documents store `active_missions` as `{mission_id: mission}`, newer
//! ones as a list. Both are read; only the list form is ever written.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::lenient;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub mission_id: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub title: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub objective: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mission {
    /// Identity used to match repeated reports of the same mission.
    pub fn key(&self) -> Option<String> {
        let id = self.mission_id.trim();
        if !id.is_empty() {
            return Some(format!("id:{}", id.to_lowercase()));
        }
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            return Some(format!("title:{}", title.to_lowercase()));
        }
        None
    }
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::opt_string(deserializer)?.unwrap_or_default())
}

pub(crate) fn deserialize_missions<'de, D>(deserializer: D) -> Result<Vec<Mission>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(normalize_missions(Value::deserialize(deserializer)?))
}

/// Convert either representation into a mission list.
///
/// In map form the key becomes the `mission_id` when the entry has none.
/// Entries that are not objects, or have neither id nor title, are dropped.
pub fn normalize_missions(raw: Value) -> Vec<Mission> {
    let entries: Vec<(Option<String>, Value)> = match raw {
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        _ => Vec::new(),
    };

    let mut missions: Vec<Mission> = Vec::with_capacity(entries.len());
    for (map_key, value) in entries {
        let Value::Object(_) = value else {
            tracing::warn!(mission = %value, "Dropping mission entry that is not an object");
            continue;
        };
        let Ok(mut mission) = serde_json::from_value::<Mission>(value) else {
            continue;
        };
        if mission.mission_id.trim().is_empty() {
            if let Some(key) = map_key {
                mission.mission_id = key;
            }
        }
        if mission.key().is_none() {
            continue;
        }
        upsert(&mut missions, mission);
    }
    missions
}

/// Merge incoming missions into an existing list without duplicating.
///
/// A matching mission is updated field by field; the rest are appended in
/// the order reported.
pub fn upsert_missions(existing: &[Mission], incoming: Value) -> Vec<Mission> {
    let mut merged = existing.to_vec();
    for mission in normalize_missions(incoming) {
        upsert(&mut merged, mission);
    }
    merged
}

fn upsert(missions: &mut Vec<Mission>, incoming: Mission) {
    let key = incoming.key();
    let position = missions
        .iter()
        .position(|m| m.key().is_some() && m.key() == key)
        .or_else(|| {
            // A report by title alone still matches a mission stored with an id.
            let title = incoming.title.trim().to_lowercase();
            (!title.is_empty() && incoming.mission_id.trim().is_empty())
                .then(|| {
                    missions
                        .iter()
                        .position(|m| m.title.trim().to_lowercase() == title)
                })
                .flatten()
        });

    match position {
        Some(index) => {
            let current = &mut missions[index];
            if current.mission_id.trim().is_empty() {
                current.mission_id = incoming.mission_id;
            }
            if !incoming.title.trim().is_empty() {
                current.title = incoming.title;
            }
            if incoming.status.is_some() {
                current.status = incoming.status;
            }
            if incoming.objective.is_some() {
                current.objective = incoming.objective;
            }
            current.extra.extend(incoming.extra);
        }
        None => missions.push(incoming),
    }
}
