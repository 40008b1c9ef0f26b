//! Server-authoritative narrative selections.
//!
//! These values are chosen once at session init and never overwritten
//! by client input. Each field carries a named placeholder default so
//! state reconstruction can fill holes in persisted data per-key.

use serde::{Deserialize, Serialize};

pub const DEFAULT_THEME: &str = "a journey of discovery";
pub const DEFAULT_MORAL_TEACHING: &str = "kindness makes us stronger";
pub const DEFAULT_PLOT_TWIST: &str = "a stranger turns out to be an old friend";

fn default_setting() -> String {
    "a wide green valley".to_string()
}

fn default_characters() -> String {
    "a curious traveler and a wise companion".to_string()
}

fn default_objects() -> String {
    "a weathered map".to_string()
}

fn default_events() -> String {
    "an unexpected storm".to_string()
}

fn default_visuals() -> String {
    "golden light through tall trees".to_string()
}

fn default_sounds() -> String {
    "wind moving through leaves".to_string()
}

fn default_smells() -> String {
    "rain on warm stone".to_string()
}

/// Narrative ingredients threaded through every chapter prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeElements {
    #[serde(default = "default_setting")]
    pub setting: String,
    #[serde(default = "default_characters")]
    pub characters: String,
    #[serde(default = "default_objects")]
    pub objects: String,
    #[serde(default = "default_events")]
    pub events: String,
}

impl Default for NarrativeElements {
    fn default() -> Self {
        Self {
            setting: default_setting(),
            characters: default_characters(),
            objects: default_objects(),
            events: default_events(),
        }
    }
}

/// Sensory texture requested from the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensoryDetails {
    #[serde(default = "default_visuals")]
    pub visuals: String,
    #[serde(default = "default_sounds")]
    pub sounds: String,
    #[serde(default = "default_smells")]
    pub smells: String,
}

impl Default for SensoryDetails {
    fn default() -> Self {
        Self {
            visuals: default_visuals(),
            sounds: default_sounds(),
            smells: default_smells(),
        }
    }
}

/// What kind of thing the player chose as their agency element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgencyCategory {
    Item,
    Companion,
    Role,
    Ability,
}

/// A player-chosen narrative element selected early in the adventure
/// and referenced throughout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyState {
    pub category: AgencyCategory,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Chapters whose text was checked to reference the agency element.
    #[serde(default)]
    pub referenced_chapters: Vec<u32>,
}

/// One foreshadowing hint dropped ahead of the plot twist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotTwistHint {
    pub chapter_number: u32,
    pub hint: String,
}

/// Tracks how far the plot twist has progressed through the arc.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlotTwistProgress {
    #[serde(default)]
    pub hints: Vec<PlotTwistHint>,
    #[serde(default)]
    pub revealed_in_chapter: Option<u32>,
}

impl PlotTwistProgress {
    pub fn is_revealed(&self) -> bool {
        self.revealed_in_chapter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrative_elements_fill_missing_keys_with_defaults() {
        let parsed: NarrativeElements =
            serde_json::from_str(r#"{"setting": "a floating city"}"#).expect("parses");
        assert_eq!(parsed.setting, "a floating city");
        assert_eq!(parsed.characters, default_characters());
        assert_eq!(parsed.objects, default_objects());
        assert_eq!(parsed.events, default_events());
    }

    #[test]
    fn sensory_details_fill_missing_keys_with_defaults() {
        let parsed: SensoryDetails = serde_json::from_str("{}").expect("parses");
        assert_eq!(parsed.visuals, default_visuals());
        assert_eq!(parsed.sounds, default_sounds());
        assert_eq!(parsed.smells, default_smells());
    }
}
