//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Adventure state persistence (could swap SQLite -> Postgres)
//! - LLM calls (could swap Ollama -> Claude/OpenAI)
//! - Image generation (could swap ComfyUI -> other)
//! - Lesson content (could swap the in-memory bank -> a CMS)
//! - Identity, telemetry, clock/random (for testing)

mod error;
mod external;
mod testing;

pub use error::{ImageGenError, LlmError, StoreError};
pub use external::{
    ChapterRequest, ChunkStream, ContentRepo, IdentityPort, ImageGenPort, ImageResult, LlmPort,
    NarrativePools, StateStorePort, StoredAdventure, TelemetryPort,
};
pub use testing::{ClockPort, RandomPort};

#[cfg(test)]
pub use external::{
    MockContentRepo, MockImageGenPort, MockLlmPort, MockStateStorePort, MockTelemetryPort,
};
#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};
