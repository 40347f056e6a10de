//! Planning block - the choice menu a narrator turn may offer the player.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How risky the narrator judges a choice to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    #[default]
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

/// One selectable next action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningChoice {
    /// Map key the frontend sends back when the choice is picked.
    #[serde(skip)]
    pub key: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pros: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    /// Picking this choice leaves think/god mode and resumes the story.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub switch_to_story_mode: bool,
}

/// Structured planning output attached to a narrator turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanningBlock {
    #[serde(default)]
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Choices in the order the narrator listed them.
    #[serde(
        default,
        serialize_with = "serialize_choices",
        deserialize_with = "deserialize_choices"
    )]
    pub choices: Vec<PlanningChoice>,
}

impl PlanningBlock {
    pub fn is_empty(&self) -> bool {
        self.thinking.trim().is_empty() && self.choices.is_empty()
    }

    pub fn choice(&self, key: &str) -> Option<&PlanningChoice> {
        self.choices.iter().find(|c| c.key == key)
    }
}

fn serialize_choices<S>(choices: &[PlanningChoice], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(choices.len()))?;
    for choice in choices {
        map.serialize_entry(&choice.key, choice)?;
    }
    map.end()
}

fn deserialize_choices<'de, D>(deserializer: D) -> Result<Vec<PlanningChoice>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ChoicesVisitor;

    impl<'de> Visitor<'de> for ChoicesVisitor {
        type Value = Vec<PlanningChoice>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of choice key to choice")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut choices = Vec::new();
            while let Some((key, mut choice)) = access.next_entry::<String, PlanningChoice>()? {
                if choice.text.trim().is_empty() {
                    continue;
                }
                choice.key = key;
                choices.push(choice);
            }
            Ok(choices)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(ChoicesVisitor)
}
