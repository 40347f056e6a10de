//! WorldArchitect Engine library.
//!
//! Server side of WorldArchitect: a language model narrates a tabletop
//! campaign while the engine keeps the game state consistent.
//!
//! ## Structure
//!
//! - `use_cases/` - Campaign creation, the turn pipeline and its narrative pieces
//! - `infrastructure/` - Ports plus their adapters (Gemini, SQLite, clock)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod prompt_templates;
pub mod use_cases;

pub use app::App;
