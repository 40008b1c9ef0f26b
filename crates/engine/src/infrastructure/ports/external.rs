//! External service port traits (LLM, image generation, persistence,
//! content, identity, telemetry).

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use taleweaver_domain::{AdventureId, QuestionRecord, UserId};

use super::error::{ImageGenError, LlmError, StoreError};

// =============================================================================
// LLM Types
// =============================================================================

/// A prompt-in request for the text generation backend.
#[derive(Debug, Clone)]
pub struct ChapterRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChapterRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Lazy sequence of prose chunks from the generation backend.
///
/// Restartable per call, never restartable mid-stream.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Start streaming one chapter's prose.
    async fn stream_chapter(&self, request: ChapterRequest) -> Result<ChunkStream, LlmError>;

    /// Single-shot generation, used by enrichment (summaries, visual
    /// extraction) and the synchronous fill at reveal time.
    async fn generate(&self, request: ChapterRequest) -> Result<String, LlmError>;
}

// =============================================================================
// Image Generation
// =============================================================================

/// A generated image, base64-encoded for the wire.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub base64: String,
    pub format: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenPort: Send + Sync {
    /// Generate one image. Callers bound this with a timeout and fall
    /// back to no image on expiry.
    async fn generate(&self, prompt: String) -> Result<ImageResult, ImageGenError>;
}

// =============================================================================
// Persistence
// =============================================================================

/// A persisted adventure as raw JSON plus its id.
#[derive(Debug, Clone)]
pub struct StoredAdventure {
    pub id: AdventureId,
    pub state: Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStorePort: Send + Sync {
    /// Upsert the state blob under `id`, indexed by the optional user
    /// and client resumption key.
    async fn store_state(
        &self,
        id: AdventureId,
        state: Value,
        user_id: Option<UserId>,
        client_key: Option<String>,
    ) -> Result<(), StoreError>;

    async fn get_state(&self, id: AdventureId) -> Result<Option<Value>, StoreError>;

    /// Most recent incomplete adventure for a user.
    async fn find_for_user(&self, user_id: UserId) -> Result<Option<StoredAdventure>, StoreError>;

    /// Most recent incomplete adventure for a client-generated key.
    async fn find_by_client_key(&self, key: String)
        -> Result<Option<StoredAdventure>, StoreError>;

    async fn mark_complete(&self, id: AdventureId) -> Result<(), StoreError>;
}

// =============================================================================
// Lesson Content
// =============================================================================

/// Selection pools for the server-authoritative narrative choices.
#[derive(Debug, Clone)]
pub struct NarrativePools {
    pub themes: Vec<String>,
    pub moral_teachings: Vec<String>,
    pub plot_twists: Vec<String>,
    pub settings: Vec<String>,
    pub characters: Vec<String>,
    pub objects: Vec<String>,
    pub events: Vec<String>,
    pub visuals: Vec<String>,
    pub sounds: Vec<String>,
    pub smells: Vec<String>,
}

/// Dependency-injected lesson content. No global caches: the engine
/// receives one of these at construction.
#[cfg_attr(test, mockall::automock)]
pub trait ContentRepo: Send + Sync {
    /// How many questions the bank holds for a topic.
    fn question_count(&self, topic: &str) -> usize;

    /// Up to `count` questions for a topic, in bank order.
    fn lesson_questions(&self, topic: &str, count: usize) -> Vec<QuestionRecord>;

    /// Topic used when the client doesn't name one.
    fn default_topic(&self) -> String;

    fn narrative_pools(&self) -> NarrativePools;
}

// =============================================================================
// Identity & Telemetry
// =============================================================================

/// Resolves an optional user identity from a connection's token.
pub trait IdentityPort: Send + Sync {
    fn optional_user_id(&self, token: Option<&str>) -> Option<UserId>;
}

/// Fire-and-forget event sink; failures are ignored by design.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetryPort: Send + Sync {
    fn log_event(&self, name: &str, fields: Value);
}
