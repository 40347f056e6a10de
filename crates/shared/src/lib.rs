//! Wire contracts shared between the WorldArchitect engine and its clients.

pub mod requests;
pub mod responses;

pub use requests::{
    CreateCampaignRequest, ExportQuery, InteractionRequest, StoryPageQuery,
    UpdateCampaignRequest, MAX_PAGE_SIZE,
};
pub use responses::{
    CampaignDetailResponse, CampaignListResponse, CampaignSummary, CreateCampaignResponse,
    ErrorResponse, InteractionResponse, SuccessResponse,
};
