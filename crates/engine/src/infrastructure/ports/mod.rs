//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Campaign persistence (SQLite today, any document store tomorrow)
//! - Model calls (Gemini, or the deterministic narrator used in testing mode)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;

pub use error::{LlmError, RepoError};
pub use external::{ChatMessage, LlmPort, LlmRequest, LlmResponse, MessageRole, TokenUsage};
pub use repos::CampaignRepo;
pub use testing::ClockPort;

#[cfg(test)]
pub use external::MockLlmPort;
#[cfg(test)]
pub use repos::MockCampaignRepo;
#[cfg(test)]
pub use testing::MockClockPort;
