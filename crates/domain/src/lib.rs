//! WorldArchitect domain types.
//!
//! Pure data and rules: campaigns, story turns, planning blocks and the game
//! state document together with the merge rules that advance it. No I/O.

pub mod entities;
pub mod error;
pub mod game_state;
pub mod ids;

pub use entities::{
    Actor, Campaign, InteractionMode, PlanningBlock, PlanningChoice, PromptBundle, RiskLevel,
    StoryTurn, TurnStructuredFields, MAX_TITLE_LEN,
};
pub use error::DomainError;
pub use game_state::{
    merge_state_updates, normalize_missions, upsert_missions, CombatState, CustomCampaignState,
    GameState, Mission, NpcRecord, PlayerCharacterData, StateMergeError, WorldData,
    CURRENT_STATE_VERSION, DELETE_TOKEN,
};
pub use ids::{CampaignId, UserId};
