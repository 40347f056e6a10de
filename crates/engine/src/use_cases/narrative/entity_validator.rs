//! Entity presence validation.
//!
//! Checks that a narrator turn accounts for every character the game state
//! says is present. Matching rule, in order:
//!
//! - the normalized name equals a normalized `entities_mentioned` entry;
//! - the name's tokens appear as a contiguous run in the narrative or in a
//!   mentioned entry (so "Mara Voss" is found in "Captain Mara Voss");
//! - for multi-word names, the first token (three characters or more)
//!   appears on its own ("Mara" counts for "Mara Voss").
//!
//! Normalization trims, collapses whitespace and lowercases. Tokens split on
//! anything that is not a letter or digit.

use worldarchitect_domain::GameState;

/// Whether the player's own character must be accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerCharacterPolicy {
    /// The player character is never in the expected roster; the narrative is
    /// addressed to them in the second person.
    #[default]
    Exclude,
    /// The player character is expected like any present NPC.
    Require,
}

/// Outcome of checking one narrator turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityValidationResult {
    pub expected: Vec<String>,
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

impl EntityValidationResult {
    pub fn success(&self) -> bool {
        self.missing.is_empty()
    }

    /// A repair pass could recover the missing characters.
    pub fn needs_repair(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Names the narrative must account for, in roster order.
pub fn expected_entities(state: &GameState, policy: PlayerCharacterPolicy) -> Vec<String> {
    let mut expected = Vec::new();

    if policy == PlayerCharacterPolicy::Require {
        if let Some(name) = state.player_character_name() {
            expected.push(name.to_string());
        }
    }

    for name in state.present_npc_names() {
        let normalized = normalize_name(&name);
        if !expected.iter().any(|e| normalize_name(e) == normalized) {
            expected.push(name);
        }
    }

    expected
}

/// Compare the roster against what the narrator turn mentioned.
pub fn validate_entities(
    expected: &[String],
    mentioned: &[String],
    narrative: &str,
) -> EntityValidationResult {
    let mentioned_names: Vec<String> = mentioned.iter().map(|m| normalize_name(m)).collect();
    let mentioned_tokens: Vec<Vec<String>> = mentioned.iter().map(|m| tokenize(m)).collect();
    let narrative_tokens = tokenize(narrative);

    let mut result = EntityValidationResult {
        expected: expected.to_vec(),
        ..EntityValidationResult::default()
    };

    for name in expected {
        let normalized = normalize_name(name);
        let tokens = tokenize(name);

        let found = mentioned_names.contains(&normalized)
            || contains_run(&narrative_tokens, &tokens)
            || mentioned_tokens
                .iter()
                .any(|entry| contains_run(entry, &tokens))
            || first_name_match(&tokens, &narrative_tokens, &mentioned_tokens);

        if found {
            result.found.push(name.clone());
        } else {
            result.missing.push(name.clone());
        }
    }

    if !result.missing.is_empty() {
        tracing::warn!(
            missing = ?result.missing,
            expected = result.expected.len(),
            "Narrative left out characters expected to be present"
        );
    }

    result
}

pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

fn first_name_match(
    tokens: &[String],
    narrative_tokens: &[String],
    mentioned_tokens: &[Vec<String>],
) -> bool {
    let [first, _, ..] = tokens else {
        return false;
    };
    if first.chars().count() < 3 {
        return false;
    }
    narrative_tokens.contains(first) || mentioned_tokens.iter().any(|entry| entry.contains(first))
}
