//! Taleweaver shared protocol types.
//!
//! Wire contract between the engine and any client. Both sides
//! depend on this crate; the engine additionally interleaves raw text
//! frames while a chapter streams.

pub mod messages;

pub use messages::{
    parse_start_config, parse_state_patch, AdventureStatus, AgencyPick, ChoiceCommand,
    ChoiceOption, ClientChoice, ClientEnvelope, ServerMessage, StartConfig, StoryCompleteState,
};
