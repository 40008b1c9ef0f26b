//! Application state and composition.

use std::sync::Arc;

use tokio::sync::mpsc;

use taleweaver_domain::UserId;

use crate::infrastructure::ports::{
    ClockPort, ContentRepo, IdentityPort, ImageGenPort, LlmPort, RandomPort, StateStorePort,
    TelemetryPort,
};
use crate::use_cases::session::{AdventureSession, OutboundFrame, SessionConfig};

/// Main application state.
///
/// Holds every injected port plus the session tunables. Passed to
/// HTTP/WebSocket handlers via Axum state; each connection gets its
/// own `AdventureSession` built from these.
pub struct App {
    pub llm: Arc<dyn LlmPort>,
    pub image_gen: Arc<dyn ImageGenPort>,
    pub store: Arc<dyn StateStorePort>,
    pub content: Arc<dyn ContentRepo>,
    pub telemetry: Arc<dyn TelemetryPort>,
    pub identity: Arc<dyn IdentityPort>,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
    pub session_config: SessionConfig,
}

impl App {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        image_gen: Arc<dyn ImageGenPort>,
        store: Arc<dyn StateStorePort>,
        content: Arc<dyn ContentRepo>,
        telemetry: Arc<dyn TelemetryPort>,
        identity: Arc<dyn IdentityPort>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            llm,
            image_gen,
            store,
            content,
            telemetry,
            identity,
            clock,
            random,
            session_config,
        }
    }

    /// Build the per-connection session state machine. The schedule
    /// sampler is seeded here, once per session.
    pub fn new_session(
        &self,
        outbound: mpsc::Sender<OutboundFrame>,
        user_id: Option<UserId>,
        client_key: Option<String>,
    ) -> AdventureSession {
        AdventureSession::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.image_gen),
            Arc::clone(&self.store),
            Arc::clone(&self.content),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.clock),
            self.session_config.clone(),
            outbound,
            user_id,
            client_key,
            self.random.next_seed(),
        )
    }
}
