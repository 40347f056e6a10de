//! Model invoker: walks an explicit list of model identifiers.
//!
//! Each identifier gets exactly one attempt. There is no backoff loop and no
//! state shared between calls; the caller owns the fallback order.

use std::sync::Arc;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, TokenUsage};

/// Successful model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub text: String,
    /// Identifier of the model that produced `text`.
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// One failed attempt against one model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub model: String,
    pub error: LlmError,
}

/// Every model identifier was tried (or the chain was cut short by an
/// authentication failure) without producing output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no model available after {} attempt(s)", .attempts.len())]
pub struct ModelUnavailableError {
    pub attempts: Vec<FailedAttempt>,
}

impl ModelUnavailableError {
    /// The chain stopped because the credentials were refused.
    pub fn is_auth_failure(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|attempt| attempt.error.is_auth())
    }
}

/// Wrapper that tries a request against each model identifier in turn.
pub struct ModelInvoker {
    llm: Arc<dyn LlmPort>,
}

impl ModelInvoker {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    /// Run `request` against `models` in order, returning the first success.
    ///
    /// JSON mode is always requested.
    pub async fn invoke(
        &self,
        request: &LlmRequest,
        models: &[String],
    ) -> Result<ModelOutput, ModelUnavailableError> {
        let mut attempts = Vec::new();

        for model in models {
            let request = request.clone().with_json_mode();

            match self.llm.generate(model, request).await {
                Ok(response) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            model = %model,
                            failed_attempts = attempts.len(),
                            "Model request succeeded on fallback model"
                        );
                    }
                    return Ok(ModelOutput {
                        text: response.content,
                        model: model.clone(),
                        usage: response.usage,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        model = %model,
                        error = %error,
                        transient = error.is_transient(),
                        "Model request failed"
                    );
                    let stop = error.is_auth();
                    attempts.push(FailedAttempt {
                        model: model.clone(),
                        error,
                    });
                    if stop {
                        tracing::error!(
                            model = %model,
                            "Model credentials rejected, not trying remaining models"
                        );
                        break;
                    }
                }
            }
        }

        tracing::error!(
            attempts = attempts.len(),
            models = models.len(),
            "Model request failed on every fallback model"
        );
        Err(ModelUnavailableError { attempts })
    }
}
