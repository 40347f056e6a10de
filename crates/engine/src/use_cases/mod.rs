//! Use cases - User story orchestration.
//!
//! Each module holds the use cases for one area. Use cases talk to
//! infrastructure only through the port traits.

pub mod campaign;
pub mod interaction;
pub mod narrative;

pub use campaign::{CampaignError, CampaignUseCases};
pub use interaction::{InteractionError, PlayTurn, TurnOutcome};
pub use narrative::Narrator;
