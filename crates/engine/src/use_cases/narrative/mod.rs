//! Narrative pipeline pieces: prompt construction, response parsing and
//! entity validation, plus the [`Narrator`] that ties them to the model.

pub mod entity_validator;
pub mod prompt_builder;
pub mod response_parser;

pub use entity_validator::{
    expected_entities, normalize_name, validate_entities, EntityValidationResult,
    PlayerCharacterPolicy,
};
pub use prompt_builder::{
    CampaignContext, HistoryBudget, PromptBuilder, PromptError, PromptPayload, TurnInputs,
};
pub use response_parser::{
    parse_narrative_response, NarrativeResponse, ParseQuality, ParsedNarrative,
    PLACEHOLDER_NARRATIVE,
};

use std::sync::Arc;

use worldarchitect_domain::Campaign;

use crate::infrastructure::model_invoker::{ModelInvoker, ModelUnavailableError};

/// A parsed narrator reply and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub parsed: ParsedNarrative,
    pub model: String,
}

/// Sends prompts through the model fallback chain and parses the replies.
pub struct Narrator {
    invoker: Arc<ModelInvoker>,
    models: Vec<String>,
    builder: PromptBuilder,
    default_lore: Option<String>,
}

impl Narrator {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        models: Vec<String>,
        builder: PromptBuilder,
        default_lore: Option<String>,
    ) -> Self {
        Self {
            invoker,
            models,
            builder,
            default_lore,
        }
    }

    pub fn builder(&self) -> &PromptBuilder {
        &self.builder
    }

    pub fn context(&self, campaign: &Campaign) -> CampaignContext {
        CampaignContext::from_campaign(campaign, self.default_lore.as_deref())
    }

    /// Invoke the model with `payload` and parse whatever comes back.
    pub async fn narrate(&self, payload: &PromptPayload) -> Result<Narration, ModelUnavailableError> {
        let output = self
            .invoker
            .invoke(&payload.to_request(), &self.models)
            .await?;

        let parsed = parse_narrative_response(&output.text);
        match parsed.quality {
            ParseQuality::Strict => {}
            quality => tracing::warn!(
                model = %output.model,
                quality = quality.as_str(),
                raw_len = output.text.len(),
                "Narrator response needed recovery"
            ),
        }

        Ok(Narration {
            parsed,
            model: output.model,
        })
    }
}

/// Narrator over `llm` with a single model id and the default history budget.
#[cfg(test)]
pub(crate) fn narrator_for_tests(
    llm: impl crate::infrastructure::ports::LlmPort + 'static,
) -> Narrator {
    Narrator::new(
        Arc::new(ModelInvoker::new(Arc::new(llm))),
        vec!["test-model".to_string()],
        PromptBuilder::default(),
        None,
    )
}
