//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    model_invoker::ModelInvoker,
    ports::{CampaignRepo, ClockPort, LlmPort},
};
use crate::use_cases::{
    campaign::{CampaignCrud, CampaignUseCases, CreateCampaign, ExportCampaign},
    narrative::{HistoryBudget, PromptBuilder},
    Narrator, PlayTurn,
};

/// Narrator configuration resolved at startup.
#[derive(Debug, Clone, Default)]
pub struct NarratorSettings {
    /// Model identifiers, tried in order.
    pub models: Vec<String>,
    pub budget: HistoryBudget,
    /// Lore used for campaigns created with the default world.
    pub default_lore: Option<String>,
}

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub campaign: CampaignUseCases,
    pub interaction: PlayTurn,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        repo: Arc<dyn CampaignRepo>,
        llm: Arc<dyn LlmPort>,
        clock: Arc<dyn ClockPort>,
        settings: NarratorSettings,
    ) -> Self {
        let invoker = Arc::new(ModelInvoker::new(llm));
        let narrator = Arc::new(Narrator::new(
            invoker,
            settings.models,
            PromptBuilder::new(settings.budget),
            settings.default_lore,
        ));

        let campaign = CampaignUseCases::new(
            CreateCampaign::new(repo.clone(), narrator.clone(), clock.clone()),
            CampaignCrud::new(repo.clone()),
            ExportCampaign::new(repo.clone()),
        );
        let interaction = PlayTurn::new(repo, narrator, clock);

        Self {
            use_cases: UseCases {
                campaign,
                interaction,
            },
        }
    }
}
