//! Taleweaver domain: adventure state, chapter planning, and the
//! invariants that hold them together.
//!
//! Pure data and pure logic only. No async, no I/O, no randomness of
//! its own (the planner takes an injected sampler).

pub mod adventure;
pub mod chapter;
pub mod error;
pub mod ids;
pub mod narrative;
pub mod planner;

pub use adventure::{
    AdventureSeed, AdventureState, AdventureStatistics, ChapterPatch, StatePatch,
};
pub use chapter::{
    AnswerOption, ChapterData, ChapterResponse, ChapterType, Choice, LessonResponse,
    QuestionRecord, StoryPhase, StoryResponse,
};
pub use error::DomainError;
pub use ids::{AdventureId, ConnectionId, QuestionId, UserId};
pub use narrative::{
    AgencyCategory, AgencyState, NarrativeElements, PlotTwistHint, PlotTwistProgress,
    SensoryDetails, DEFAULT_MORAL_TEACHING, DEFAULT_PLOT_TWIST, DEFAULT_THEME,
};
pub use planner::{determine_story_phase, plan_chapter_types, MIN_STORY_LENGTH};
