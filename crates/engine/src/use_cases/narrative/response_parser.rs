//! Narrator response parser.
//!
//! The model is asked for a JSON object with a required `narrative` string and
//! optional side-channel fields. Output is frequently imperfect: fenced,
//! truncated, padded with prose or carrying trailing commas. Parsing degrades
//! through four stages and never fails:
//!
//! 1. strict JSON
//! 2. repaired JSON (fences stripped, trailing commas removed, brackets balanced)
//! 3. regex extraction of the `narrative` value, or the prose ahead of any broken object
//! 4. a fixed placeholder
//!
//! Whatever the stage, the narrative handed back never contains the raw JSON
//! envelope.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use worldarchitect_domain::{PlanningBlock, TurnStructuredFields};

/// Narrative shown when nothing readable could be recovered.
pub const PLACEHOLDER_NARRATIVE: &str = "[The story continues...]";

/// How the narrative was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseQuality {
    Strict,
    Repaired,
    Extracted,
    Placeholder,
}

impl ParseQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Repaired => "repaired",
            Self::Extracted => "extracted",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Typed narrator response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NarrativeResponse {
    pub narrative: String,
    pub entities_mentioned: Vec<String>,
    pub state_updates: Option<Value>,
    pub debug_info: Option<Value>,
    pub planning_block: Option<PlanningBlock>,
    pub session_header: Option<String>,
    pub location_confirmed: Option<String>,
    pub resources: Option<String>,
    pub dice_rolls: Vec<String>,
}

impl NarrativeResponse {
    pub fn placeholder() -> Self {
        Self {
            narrative: PLACEHOLDER_NARRATIVE.to_string(),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.narrative == PLACEHOLDER_NARRATIVE
    }

    /// Remove debug-only content: marker blocks in the narrative and `debug_info`.
    pub fn without_debug_content(mut self) -> Self {
        self.narrative = strip_debug_markers(&self.narrative);
        if self.narrative.trim().is_empty() {
            self.narrative = PLACEHOLDER_NARRATIVE.to_string();
        }
        self.debug_info = None;
        self
    }

    /// Structured fields as stored on the narrator turn.
    pub fn structured_fields(&self) -> TurnStructuredFields {
        TurnStructuredFields {
            entities_mentioned: self.entities_mentioned.clone(),
            state_updates: self.state_updates.clone(),
            debug_info: self.debug_info.clone(),
            planning_block: self.planning_block.clone(),
            session_header: self.session_header.clone(),
            location_confirmed: self.location_confirmed.clone(),
            resources: self.resources.clone(),
            dice_rolls: self.dice_rolls.clone(),
        }
    }
}

/// Parser output: the response and how it was recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNarrative {
    pub response: NarrativeResponse,
    pub quality: ParseQuality,
}

impl ParsedNarrative {
    fn new(response: NarrativeResponse, quality: ParseQuality) -> Self {
        let quality = if response.is_placeholder() {
            ParseQuality::Placeholder
        } else {
            quality
        };
        Self { response, quality }
    }
}

// Model-specific special tokens: <|...|>, [INST], [/INST], <<SYS>>, <</SYS>>
static SPECIAL_TOKENS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\|[^|>]+\|>|\[/?INST\]|<</?SYS>>").expect("valid regex")
});
static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));
// Captures the narrative string body up to its closing quote, or to the end of
// input when the response was cut off mid-string.
static NARRATIVE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"narrative"\s*:\s*"((?:[^"\\]|\\.)*)"#).expect("valid regex")
});
static ENTITIES_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"entities_mentioned"\s*:\s*\[([^\]]*)\]"#).expect("valid regex")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid regex"));
static DEBUG_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[DEBUG_[A-Z_]*START\].*?\[DEBUG_[A-Z_]*END\]").expect("valid regex")
});
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Parse raw model output into a [`NarrativeResponse`]. Never fails.
pub fn parse_narrative_response(raw: &str) -> ParsedNarrative {
    let cleaned = SPECIAL_TOKENS_RE.replace_all(raw, "");
    let text = cleaned.trim();

    if text.is_empty() {
        return ParsedNarrative::new(NarrativeResponse::placeholder(), ParseQuality::Placeholder);
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return from_object(object, ParseQuality::Strict);
    }

    if let Some(repaired) = repair_json(text) {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&repaired) {
            return from_object(object, ParseQuality::Repaired);
        }
    }

    if let Some(narrative) = extract_narrative_field(text) {
        let response = NarrativeResponse {
            narrative,
            entities_mentioned: extract_entities_field(text),
            ..NarrativeResponse::default()
        };
        return ParsedNarrative::new(response, ParseQuality::Extracted);
    }

    let unfenced = CODE_FENCE_RE.replace_all(text, "");
    // Anything from the first brace on is a broken envelope, not story text.
    let prose = match unfenced.find('{') {
        Some(start) => unfenced[..start].trim(),
        None => unfenced.trim(),
    };
    if !prose.is_empty() && !looks_like_json(prose) {
        let response = NarrativeResponse {
            narrative: prose.to_string(),
            ..NarrativeResponse::default()
        };
        return ParsedNarrative::new(response, ParseQuality::Extracted);
    }

    tracing::warn!(
        raw_len = raw.len(),
        "Narrator response had no recoverable narrative"
    );
    ParsedNarrative::new(NarrativeResponse::placeholder(), ParseQuality::Placeholder)
}

/// Remove `[DEBUG_*START]...[DEBUG_*END]` blocks.
pub fn strip_debug_markers(narrative: &str) -> String {
    let stripped = DEBUG_BLOCK_RE.replace_all(narrative, "");
    BLANK_LINES_RE
        .replace_all(stripped.trim(), "\n\n")
        .into_owned()
}

fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

fn from_object(mut object: Map<String, Value>, quality: ParseQuality) -> ParsedNarrative {
    let (narrative, quality) = match object.remove("narrative") {
        Some(Value::String(text)) => unwrap_nested_narrative(text, quality),
        Some(other) => {
            tracing::warn!(kind = json_kind(&other), "Dropping non-string narrative field");
            (String::new(), quality)
        }
        None => (String::new(), quality),
    };

    let response = NarrativeResponse {
        narrative: if narrative.trim().is_empty() {
            PLACEHOLDER_NARRATIVE.to_string()
        } else {
            narrative
        },
        entities_mentioned: object
            .remove("entities_mentioned")
            .map(|value| string_list("entities_mentioned", value, true))
            .unwrap_or_default(),
        state_updates: object
            .remove("state_updates")
            .and_then(|value| object_field("state_updates", value)),
        debug_info: object.remove("debug_info").and_then(debug_field),
        planning_block: object.remove("planning_block").and_then(planning_field),
        session_header: object
            .remove("session_header")
            .and_then(|value| text_field("session_header", value)),
        location_confirmed: object
            .remove("location_confirmed")
            .and_then(|value| text_field("location_confirmed", value)),
        resources: object
            .remove("resources")
            .and_then(|value| text_field("resources", value)),
        dice_rolls: object
            .remove("dice_rolls")
            .map(|value| string_list("dice_rolls", value, false))
            .unwrap_or_default(),
    };

    ParsedNarrative::new(response, quality)
}

/// A narrative string that is itself a serialized response object is unwrapped
/// so the envelope never reaches the player.
fn unwrap_nested_narrative(text: String, quality: ParseQuality) -> (String, ParseQuality) {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return (text, quality);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut inner)) => match inner.remove("narrative") {
            Some(Value::String(inner_text)) => (inner_text, ParseQuality::Repaired),
            _ => (text, quality),
        },
        _ => match extract_narrative_field(trimmed) {
            Some(inner_text) => (inner_text, ParseQuality::Extracted),
            None => (text, quality),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A list of strings, or a single string (comma-separated when `split_commas`).
fn string_list(field: &'static str, value: Value, split_commas: bool) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::String(text) if split_commas => text.split(',').map(str::to_string).collect(),
        Value::String(text) => vec![text],
        Value::Array(values) => values
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                other => {
                    tracing::warn!(field, kind = json_kind(&other), "Dropping non-string list entry");
                    None
                }
            })
            .collect(),
        other => {
            tracing::warn!(field, kind = json_kind(&other), "Dropping malformed list field");
            Vec::new()
        }
    };

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn object_field(field: &'static str, value: Value) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(map)),
        Value::Null => None,
        other => {
            tracing::warn!(field, kind = json_kind(&other), "Dropping non-object field");
            None
        }
    }
}

fn debug_field(value: Value) -> Option<Value> {
    match value {
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map)),
        Value::String(text) if !text.trim().is_empty() => Some(Value::String(text)),
        Value::Null | Value::Object(_) | Value::String(_) => None,
        other => {
            tracing::warn!(kind = json_kind(&other), "Dropping malformed debug_info");
            None
        }
    }
}

fn planning_field(value: Value) -> Option<PlanningBlock> {
    match value {
        Value::Null => None,
        Value::Object(_) => match serde_json::from_value::<PlanningBlock>(value) {
            Ok(block) if block.is_empty() => None,
            Ok(block) => Some(block),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed planning_block");
                None
            }
        },
        other => {
            tracing::warn!(kind = json_kind(&other), "Dropping non-object planning_block");
            None
        }
    }
}

fn text_field(field: &'static str, value: Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::String(_) | Value::Null => None,
        other => {
            tracing::warn!(field, kind = json_kind(&other), "Dropping non-string field");
            None
        }
    }
}

/// Best-effort repair of almost-JSON. Returns `None` when there is no object
/// to repair.
fn repair_json(text: &str) -> Option<String> {
    let unfenced = CODE_FENCE_RE.replace_all(text, "");
    let start = unfenced.find('{')?;
    let body = match unfenced.rfind('}') {
        Some(end) if end > start => &unfenced[start..=end],
        _ => &unfenced[start..],
    };
    Some(balance(body))
}

/// Drop trailing commas and close anything left open, ignoring string contents.
fn balance(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 8);
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in body.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                open.push('}');
                out.push(ch);
            }
            '[' => {
                open.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                if open.last() == Some(&ch) {
                    open.pop();
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(close) = open.pop() {
        trim_trailing_comma(&mut out);
        out.push(close);
    }
    out
}

fn trim_trailing_comma(out: &mut String) {
    let len = out.trim_end().len();
    if out[..len].ends_with(',') {
        out.truncate(len - 1);
    }
}

fn extract_narrative_field(text: &str) -> Option<String> {
    let captured = NARRATIVE_FIELD_RE.captures(text)?.get(1)?.as_str();
    let narrative = unescape_json_string(captured);
    let narrative = narrative.trim();
    (!narrative.is_empty()).then(|| narrative.to_string())
}

fn extract_entities_field(text: &str) -> Vec<String> {
    let Some(list) = ENTITIES_FIELD_RE.captures(text).and_then(|caps| caps.get(1)) else {
        return Vec::new();
    };
    QUOTED_RE
        .captures_iter(list.as_str())
        .filter_map(|caps| caps.get(1))
        .map(|item| unescape_json_string(item.as_str()).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Decode JSON string escapes, tolerating a body cut off mid-escape.
fn unescape_json_string(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn well_formed_response_keeps_narrative_exactly() {
        let raw = r#"{"narrative": "The goblin flees.\n\n  It does not look back.", "entities_mentioned": ["Goblin"]}"#;

        let parsed = parse_narrative_response(raw);

        assert_eq!(parsed.quality, ParseQuality::Strict);
        assert_eq!(
            parsed.response.narrative,
            "The goblin flees.\n\n  It does not look back."
        );
        assert_eq!(parsed.response.entities_mentioned, vec!["Goblin"]);
    }

    #[test]
    fn optional_fields_are_validated_individually() {
        let raw = json!({
            "narrative": "Rain falls on Ember Gate.",
            "entities_mentioned": "Mara Voss, Borin ,",
            "state_updates": {"world_data": {"current_location_name": "Ember Gate"}},
            "debug_info": 42,
            "planning_block": {
                "thinking": "Two ways in.",
                "choices": {"climb": {"text": "Climb the wall", "risk_level": "high"}}
            },
            "session_header": 7,
            "location_confirmed": "Ember Gate",
            "resources": "  ",
            "dice_rolls": "Athletics: 1d20+2 = 14"
        })
        .to_string();

        let response = parse_narrative_response(&raw).response;

        assert_eq!(response.entities_mentioned, vec!["Mara Voss", "Borin"]);
        assert_eq!(
            response.state_updates,
            Some(json!({"world_data": {"current_location_name": "Ember Gate"}}))
        );
        assert_eq!(response.debug_info, None);
        let planning = response.planning_block.expect("planning block kept");
        assert_eq!(planning.choices.len(), 1);
        assert_eq!(response.session_header, None);
        assert_eq!(response.location_confirmed.as_deref(), Some("Ember Gate"));
        assert_eq!(response.resources, None);
        assert_eq!(response.dice_rolls, vec!["Athletics: 1d20+2 = 14"]);
    }

    #[test]
    fn non_object_state_updates_are_dropped() {
        let raw = r#"{"narrative": "Quiet.", "state_updates": ["not", "an", "object"]}"#;
        let response = parse_narrative_response(raw).response;
        assert_eq!(response.state_updates, None);
        assert_eq!(response.narrative, "Quiet.");
    }

    #[test]
    fn fenced_json_with_trailing_commas_is_repaired() {
        let raw = "```json\n{\"narrative\": \"The bridge holds.\", \"dice_rolls\": [\"Balance: 15\",],}\n```";

        let parsed = parse_narrative_response(raw);

        assert_eq!(parsed.quality, ParseQuality::Repaired);
        assert_eq!(parsed.response.narrative, "The bridge holds.");
        assert_eq!(parsed.response.dice_rolls, vec!["Balance: 15"]);
    }

    #[test]
    fn prose_around_json_is_ignored() {
        let raw = "Here is the response:\n{\"narrative\": \"Torches gutter.\"}\nHope that helps!";

        let parsed = parse_narrative_response(raw);

        assert_eq!(parsed.quality, ParseQuality::Repaired);
        assert_eq!(parsed.response.narrative, "Torches gutter.");
    }

    #[test]
    fn truncated_response_is_closed_and_parsed() {
        let raw = r#"{"narrative": "The door swings open", "state_updates": {"world_data": {"current_location_name": "Vault""#;

        let parsed = parse_narrative_response(raw);

        assert_eq!(parsed.quality, ParseQuality::Repaired);
        assert_eq!(parsed.response.narrative, "The door swings open");
        assert_eq!(
            parsed.response.state_updates,
            Some(json!({"world_data": {"current_location_name": "Vault"}}))
        );
    }

    #[test]
    fn broken_json_falls_back_to_extracting_the_narrative() {
        let raw = r#"{"narrative": "Mara says \"welcome\".\nThe fire crackles.", "entities_mentioned": ["Mara"], "state_updates": {"a": }"#;

        let parsed = parse_narrative_response(raw);

        assert_eq!(parsed.quality, ParseQuality::Extracted);
        assert_eq!(
            parsed.response.narrative,
            "Mara says \"welcome\".\nThe fire crackles."
        );
        assert_eq!(parsed.response.entities_mentioned, vec!["Mara"]);
        assert!(!parsed.response.narrative.contains("\"narrative\""));
    }

    #[test]
    fn plain_prose_is_used_as_narrative() {
        let parsed = parse_narrative_response("The wind howls through the pass.");

        assert_eq!(parsed.quality, ParseQuality::Extracted);
        assert_eq!(parsed.response.narrative, "The wind howls through the pass.");
    }

    #[test]
    fn missing_or_empty_narrative_becomes_placeholder() {
        for raw in [
            r#"{"entities_mentioned": ["Mara"]}"#,
            r#"{"narrative": "   "}"#,
            "",
            "{\"state_updates\": {\"a\": ",
        ] {
            let parsed = parse_narrative_response(raw);
            assert_eq!(parsed.response.narrative, PLACEHOLDER_NARRATIVE, "input: {raw}");
            assert_eq!(parsed.quality, ParseQuality::Placeholder, "input: {raw}");
        }
    }

    #[test]
    fn nested_response_envelope_is_unwrapped() {
        let inner = json!({"narrative": "Snow falls.", "entities_mentioned": []}).to_string();
        let raw = json!({ "narrative": inner }).to_string();

        let parsed = parse_narrative_response(&raw);

        assert_eq!(parsed.response.narrative, "Snow falls.");
        assert_eq!(parsed.quality, ParseQuality::Repaired);
    }

    #[test]
    fn special_tokens_are_removed() {
        let raw = "<|start|>{\"narrative\": \"Dawn.\"}<|end|>";
        let parsed = parse_narrative_response(raw);
        assert_eq!(parsed.quality, ParseQuality::Strict);
        assert_eq!(parsed.response.narrative, "Dawn.");
    }

    #[test]
    fn debug_markers_are_stripped_outside_debug_mode() {
        let raw = json!({
            "narrative": "You strike.\n[DEBUG_START]Roll: 18 vs AC 15[DEBUG_END]\nThe orc staggers.\n[DEBUG_STATE_START]hp 7 -> 2[DEBUG_STATE_END]",
            "debug_info": {"dm_notes": ["orc is nearly dead"]}
        })
        .to_string();

        let parsed = parse_narrative_response(&raw);
        assert!(parsed.response.narrative.contains("[DEBUG_START]"));

        let visible = parsed.response.without_debug_content();
        assert_eq!(visible.narrative, "You strike.\n\nThe orc staggers.");
        assert_eq!(visible.debug_info, None);
    }

    #[test]
    fn narrative_made_only_of_debug_blocks_becomes_placeholder() {
        let response = NarrativeResponse {
            narrative: "[DEBUG_START]internal[DEBUG_END]".to_string(),
            ..NarrativeResponse::default()
        }
        .without_debug_content();
        assert!(response.is_placeholder());
    }

    #[test]
    fn broken_envelope_after_prose_is_cut_from_the_narrative() {
        let parsed = parse_narrative_response(
            "Sure, here is the turn:\n{\"entities_mentioned\": [\"Mara\"], \"state_updates\": {\"hp\": }}",
        );
        assert_eq!(parsed.quality, ParseQuality::Extracted);
        assert_eq!(parsed.response.narrative, "Sure, here is the turn:");
        assert!(!parsed.response.narrative.contains('{'));
    }

    #[test]
    fn broken_envelope_without_prose_becomes_the_placeholder() {
        let parsed =
            parse_narrative_response("```json\n{\"entities_mentioned\": [\"Mara\"], \"state_updates\": {\"hp\": }}\n```");
        assert_eq!(parsed.quality, ParseQuality::Placeholder);
        assert!(parsed.response.is_placeholder());
    }

    #[test]
    fn unescape_handles_unicode_and_truncation() {
        assert_eq!(unescape_json_string(r#"caf\u00e9 \"ok\""#), "café \"ok\"");
        assert_eq!(unescape_json_string(r"cut off\"), "cut off");
    }
}
