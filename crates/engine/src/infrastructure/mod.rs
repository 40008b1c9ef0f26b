//! Infrastructure: port traits and their concrete adapters.

pub mod clock;
pub mod comfyui;
pub mod content;
pub mod identity;
pub mod ollama;
pub mod ports;
pub mod resilient_llm;
pub mod state_store;
pub mod telemetry;
