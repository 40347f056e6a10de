//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies, plus the
//! model invoker that sits directly on top of the model port.

pub mod clock;
pub mod config;
pub mod gemini;
pub mod mock_llm;
pub mod model_invoker;
pub mod ports;
pub mod sqlite_store;
