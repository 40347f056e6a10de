//! Campaign use cases: creation with an opening scene, listing, paging
//! through the story, renaming and export.

mod create;
mod crud;
mod export;

pub use create::{CreateCampaign, CreatedCampaign};
pub use crud::{CampaignCrud, CampaignPage};
pub use export::{ExportCampaign, ExportFormat, ExportedStory};

use worldarchitect_domain::{Campaign, CampaignId, DomainError, StateMergeError, UserId};

use crate::infrastructure::model_invoker::ModelUnavailableError;
use crate::infrastructure::ports::{CampaignRepo, RepoError};
use crate::use_cases::narrative::PromptError;

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),
    #[error("Campaign {0} belongs to another user")]
    Forbidden(CampaignId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Configuration(#[from] PromptError),
    #[error(transparent)]
    ModelUnavailable(#[from] ModelUnavailableError),
    #[error(transparent)]
    State(#[from] StateMergeError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl From<AccessError> for CampaignError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotFound(id) => Self::NotFound(id),
            AccessError::Forbidden(id) => Self::Forbidden(id),
            AccessError::Repo(e) => Self::Repo(e),
        }
    }
}

impl From<DomainError> for CampaignError {
    fn from(e: DomainError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Container for campaign use cases.
pub struct CampaignUseCases {
    pub create: CreateCampaign,
    pub crud: CampaignCrud,
    pub export: ExportCampaign,
}

impl CampaignUseCases {
    pub fn new(create: CreateCampaign, crud: CampaignCrud, export: ExportCampaign) -> Self {
        Self {
            create,
            crud,
            export,
        }
    }
}

/// Why a campaign could not be opened for a user.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),
    #[error("Campaign {0} belongs to another user")]
    Forbidden(CampaignId),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

/// Load a campaign and check that `user_id` owns it.
pub async fn load_owned(
    repo: &dyn CampaignRepo,
    id: CampaignId,
    user_id: &UserId,
) -> Result<Campaign, AccessError> {
    let campaign = repo
        .get_campaign(id)
        .await?
        .ok_or(AccessError::NotFound(id))?;

    if campaign.user_id != *user_id {
        tracing::warn!(
            campaign_id = %id,
            user_id = %user_id.as_str(),
            "Rejected access to another user's campaign"
        );
        return Err(AccessError::Forbidden(id));
    }

    Ok(campaign)
}
