//! WebSocket message types for Engine-Client communication
//!
//! This module contains all message types exchanged over the WebSocket
//! connection. The engine receives `ClientEnvelope` and emits
//! `ServerMessage` JSON events; while a chapter is streaming, raw text
//! frames (not JSON) are interleaved between events and carry the
//! prose chunks.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing variants requires major version bump
//! - Unknown choice payloads deserialize to `Unknown` for forward
//!   compatibility

use serde::{Deserialize, Serialize};

use taleweaver_domain::{AdventureStatistics, StatePatch};

// =============================================================================
// Client Messages (Client → Engine)
// =============================================================================

/// The envelope every client message arrives in.
///
/// `state` carries optional partial-state fields (chapter refinements,
/// metadata); the engine merges them through the authoritative-field
/// restore path before acting on `choice`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    pub choice: ClientChoice,
}

/// The `choice` field: a command keyword, or a picked story path.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientChoice {
    Command(String),
    Picked {
        chosen_path: String,
        choice_text: String,
    },
}

/// Recognized command keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceCommand {
    Start,
    RevealSummary,
    Unknown,
}

impl ClientChoice {
    /// Interpret a command keyword, if this choice is one.
    pub fn command(&self) -> Option<ChoiceCommand> {
        match self {
            Self::Command(word) => Some(match word.as_str() {
                "start" => ChoiceCommand::Start,
                "reveal_summary" => ChoiceCommand::RevealSummary,
                _ => ChoiceCommand::Unknown,
            }),
            Self::Picked { .. } => None,
        }
    }
}

/// Session configuration the client may supply with `"start"`.
///
/// Everything here is advisory: the server clamps and defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartConfig {
    #[serde(default)]
    pub story_length: Option<usize>,
    #[serde(default)]
    pub lesson_topic: Option<String>,
    #[serde(default)]
    pub agency: Option<AgencyPick>,
}

/// The player's agency selection made at session start.
#[derive(Debug, Clone, Deserialize)]
pub struct AgencyPick {
    pub category: taleweaver_domain::AgencyCategory,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Parse the envelope's `state` value into the patch the domain merge
/// understands. Unparseable input is treated as absent.
pub fn parse_state_patch(state: &serde_json::Value) -> Option<StatePatch> {
    serde_json::from_value(state.clone()).ok()
}

/// Parse the envelope's `state` value into a start-of-session config.
pub fn parse_start_config(state: Option<&serde_json::Value>) -> StartConfig {
    state
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

// =============================================================================
// Server Messages (Engine → Client)
// =============================================================================

/// Whether a connection picked up an existing adventure or starts fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdventureStatus {
    New,
    Existing,
}

/// One selectable option presented after a story chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    pub id: u32,
}

/// Payload of `story_complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCompleteState {
    pub stats: AdventureStatistics,
}

/// Messages from server (Engine) to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after connect: resumed or fresh session
    AdventureStatus { status: AdventureStatus },
    /// Sent when an existing adventure was reconstructed
    AdventureLoaded {
        current_chapter: u32,
        total_chapters: usize,
    },
    /// A chapter finished streaming; carries the full session state
    ChapterUpdate {
        current_chapter: u32,
        total_chapters: usize,
        state: serde_json::Value,
    },
    /// The branching options for the chapter just streamed
    Choices { choices: Vec<ChoiceOption> },
    /// Streaming is done, the client can drop its spinner
    HideLoader,
    /// Async image for one of the current choices
    ChoiceImageUpdate { choice_id: u32, image: String },
    /// Async image for the chapter scene
    ChapterImageUpdate { chapter_number: u32, image: String },
    /// The conclusion chapter streamed; quiz stats attached
    StoryComplete { state: StoryCompleteState },
    /// Final state persisted as complete; summary can be revealed
    SummaryReady { state_id: String },
    /// The summary chapter with the full final state
    SummaryComplete { state: serde_json::Value },
    /// Recoverable failure the client should display
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_command_parses() {
        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"choice": "start"}"#).expect("parses");
        assert_eq!(envelope.choice.command(), Some(ChoiceCommand::Start));
        assert!(envelope.state.is_none());
    }

    #[test]
    fn picked_choice_parses() {
        let envelope: ClientEnvelope = serde_json::from_str(
            r#"{"choice": {"chosen_path": "2", "choice_text": "Follow the river"}}"#,
        )
        .expect("parses");
        match envelope.choice {
            ClientChoice::Picked {
                chosen_path,
                choice_text,
            } => {
                assert_eq!(chosen_path, "2");
                assert_eq!(choice_text, "Follow the river");
            }
            other => panic!("expected picked choice, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_flagged_not_rejected() {
        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"choice": "do_a_flip"}"#).expect("parses");
        assert_eq!(envelope.choice.command(), Some(ChoiceCommand::Unknown));
    }

    #[test]
    fn server_messages_tag_with_snake_case_type() {
        let json = serde_json::to_string(&ServerMessage::HideLoader).expect("serializes");
        assert_eq!(json, r#"{"type":"hide_loader"}"#);

        let json = serde_json::to_string(&ServerMessage::AdventureStatus {
            status: AdventureStatus::Existing,
        })
        .expect("serializes");
        assert!(json.contains(r#""type":"adventure_status""#));
        assert!(json.contains(r#""status":"existing""#));
    }

    #[test]
    fn start_config_defaults_when_state_is_malformed() {
        let config = parse_start_config(Some(&serde_json::json!("not an object")));
        assert!(config.story_length.is_none());
        assert!(config.lesson_topic.is_none());
    }
}
