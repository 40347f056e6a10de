//! Domain entities - Core business objects with identity

mod campaign;
mod planning_block;
mod story_turn;

pub use campaign::{Campaign, PromptBundle, MAX_TITLE_LEN};
pub use planning_block::{PlanningBlock, PlanningChoice, RiskLevel};
pub use story_turn::{Actor, InteractionMode, StoryTurn, TurnStructuredFields};
