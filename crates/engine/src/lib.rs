//! Taleweaver Engine library.
//!
//! This crate contains all server-side code for the adventure session
//! engine.
//!
//! ## Structure
//!
//! - `use_cases/` - Session orchestration (state machine, reconstruction, enrichment)
//! - `infrastructure/` - Port traits and adapters (LLM, images, persistence, content)
//! - `api/` - HTTP and WebSocket entry points
//! - `prompts` - Prompt builders for generation and enrichment
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod prompts;
pub mod use_cases;

pub use app::App;
