//! The adventure session: orchestration, reconstruction, enrichment.

pub mod enrichment;
pub mod orchestrator;
pub mod reconstruct;
pub mod response_parser;


pub use enrichment::{BackgroundTaskCoordinator, EnrichmentArtifacts};
pub use orchestrator::{AdventureSession, OutboundFrame, SessionConfig, SessionPhase};
pub use reconstruct::reconstruct;
