//! The adventure aggregate: one session's full state and its
//! mutation API.
//!
//! All structural invariants are enforced here, at the mutation
//! boundary. Enrichment artifacts (`chapter_summaries`,
//! `summary_chapter_titles`, `character_visuals`) are plain fields on
//! the serialized state; concurrent access to them is the engine's
//! concern and goes through a per-session lock there.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chapter::{
    ChapterData, ChapterResponse, ChapterType, Choice, QuestionRecord, StoryPhase,
};
use crate::error::DomainError;
use crate::ids::{AdventureId, UserId};
use crate::narrative::{
    AgencyState, NarrativeElements, PlotTwistProgress, SensoryDetails, DEFAULT_MORAL_TEACHING,
    DEFAULT_PLOT_TWIST, DEFAULT_THEME,
};
use crate::planner::determine_story_phase;

/// Quiz outcome totals, derived from recorded lesson responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdventureStatistics {
    pub questions_answered: u32,
    pub questions_correct: u32,
    pub chapters_completed: u32,
}

/// Everything the server knows about one adventure session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdventureState {
    pub id: AdventureId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Client-generated resumption key, when the client supplied one.
    #[serde(default)]
    pub client_key: Option<String>,

    pub story_length: usize,
    /// Decided once at init; immutable thereafter.
    pub planned_chapter_types: Vec<ChapterType>,
    /// Append-only, ordered by `chapter_number` (1-based, no gaps).
    #[serde(default)]
    pub chapters: Vec<ChapterData>,
    /// Derived from chapter index; recomputed, never independent truth.
    #[serde(default = "default_phase")]
    pub current_storytelling_phase: StoryPhase,

    // Server-authoritative narrative selections.
    pub selected_theme: String,
    pub selected_moral_teaching: String,
    pub selected_plot_twist: String,
    #[serde(default)]
    pub selected_narrative_elements: NarrativeElements,
    #[serde(default)]
    pub selected_sensory_details: SensoryDetails,
    #[serde(default)]
    pub lesson_topic: String,

    // Enrichment targets; index i corresponds to chapter i + 1.
    #[serde(default)]
    pub chapter_summaries: Vec<String>,
    #[serde(default)]
    pub summary_chapter_titles: Vec<String>,
    #[serde(default)]
    pub lesson_questions: Vec<Option<QuestionRecord>>,
    /// Character name -> visual description; merge-only.
    #[serde(default)]
    pub character_visuals: HashMap<String, String>,

    #[serde(default)]
    pub agency: Option<AgencyState>,
    #[serde(default)]
    pub plot_twist_progress: Option<PlotTwistProgress>,
    /// Side-channel facts; not structural truth, soft checks only.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_phase() -> StoryPhase {
    StoryPhase::Exposition
}

/// Inputs fixed at session start.
#[derive(Debug, Clone)]
pub struct AdventureSeed {
    pub id: AdventureId,
    pub user_id: Option<UserId>,
    pub client_key: Option<String>,
    pub story_length: usize,
    pub planned_chapter_types: Vec<ChapterType>,
    pub selected_theme: String,
    pub selected_moral_teaching: String,
    pub selected_plot_twist: String,
    pub selected_narrative_elements: NarrativeElements,
    pub selected_sensory_details: SensoryDetails,
    pub lesson_topic: String,
    pub agency: Option<AgencyState>,
    pub now: DateTime<Utc>,
}

/// A client-submitted partial update. Only chapter content/choice
/// refinements survive the merge; every other field listed here is
/// server-authoritative and gets restored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatePatch {
    #[serde(default)]
    pub chapters: Vec<ChapterPatch>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub selected_theme: Option<String>,
    #[serde(default)]
    pub selected_moral_teaching: Option<String>,
    #[serde(default)]
    pub selected_plot_twist: Option<String>,
    #[serde(default)]
    pub selected_narrative_elements: Option<NarrativeElements>,
    #[serde(default)]
    pub selected_sensory_details: Option<SensoryDetails>,
    #[serde(default)]
    pub planned_chapter_types: Option<Vec<ChapterType>>,
    #[serde(default)]
    pub story_length: Option<usize>,
}

/// Per-chapter refinement within a [`StatePatch`].
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterPatch {
    pub chapter_number: u32,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
}

/// Snapshot of the fields a client must never drift.
#[derive(Clone)]
struct Authoritative {
    selected_theme: String,
    selected_moral_teaching: String,
    selected_plot_twist: String,
    selected_narrative_elements: NarrativeElements,
    selected_sensory_details: SensoryDetails,
    planned_chapter_types: Vec<ChapterType>,
    story_length: usize,
    metadata: HashMap<String, serde_json::Value>,
}

impl AdventureState {
    pub fn new(seed: AdventureSeed) -> Result<Self, DomainError> {
        if seed.planned_chapter_types.len() != seed.story_length {
            return Err(DomainError::invalid_configuration(format!(
                "Planned schedule has {} entries for a {}-chapter story",
                seed.planned_chapter_types.len(),
                seed.story_length
            )));
        }
        let state = Self {
            id: seed.id,
            user_id: seed.user_id,
            client_key: seed.client_key,
            story_length: seed.story_length,
            planned_chapter_types: seed.planned_chapter_types,
            chapters: Vec::new(),
            current_storytelling_phase: StoryPhase::Exposition,
            selected_theme: seed.selected_theme,
            selected_moral_teaching: seed.selected_moral_teaching,
            selected_plot_twist: seed.selected_plot_twist,
            selected_narrative_elements: seed.selected_narrative_elements,
            selected_sensory_details: seed.selected_sensory_details,
            lesson_topic: seed.lesson_topic,
            chapter_summaries: Vec::new(),
            summary_chapter_titles: Vec::new(),
            lesson_questions: Vec::new(),
            character_visuals: HashMap::new(),
            agency: seed.agency,
            plot_twist_progress: Some(PlotTwistProgress::default()),
            metadata: HashMap::new(),
            is_complete: false,
            created_at: seed.now,
            updated_at: seed.now,
        };
        state.validate()?;
        Ok(state)
    }

    /// Chapter number the next append must carry.
    pub fn next_chapter_number(&self) -> u32 {
        self.chapters.len() as u32 + 1
    }

    /// Planned type for the next chapter, if the story isn't over.
    pub fn next_chapter_type(&self) -> Option<ChapterType> {
        self.planned_chapter_types.get(self.chapters.len()).copied()
    }

    pub fn chapter(&self, chapter_number: u32) -> Option<&ChapterData> {
        self.chapters
            .iter()
            .find(|c| c.chapter_number == chapter_number)
    }

    pub fn last_chapter(&self) -> Option<&ChapterData> {
        self.chapters.last()
    }

    /// True once all `story_length` planned chapters exist.
    pub fn all_chapters_generated(&self) -> bool {
        self.chapters.len() >= self.story_length
    }

    pub fn has_summary_chapter(&self) -> bool {
        self.chapters
            .iter()
            .any(|c| c.chapter_type == ChapterType::Summary)
    }

    /// Append the next chapter, enforcing sequence and shape.
    pub fn append_chapter(&mut self, chapter: ChapterData) -> Result<(), DomainError> {
        let expected = self.next_chapter_number();
        if chapter.chapter_number != expected {
            return Err(DomainError::Sequence {
                expected,
                actual: chapter.chapter_number,
            });
        }
        if self.chapters.len() >= self.story_length + 1 {
            return Err(DomainError::validation(format!(
                "Story already holds {} chapters (length {} plus summary)",
                self.chapters.len(),
                self.story_length
            )));
        }
        chapter.validate()?;

        // The phase tracks the newest story chapter; the appended
        // summary chapter stays in Return.
        let phase_chapter = chapter.chapter_number.min(self.story_length as u32);
        self.current_storytelling_phase = determine_story_phase(phase_chapter, self.story_length);
        self.chapters.push(chapter);
        Ok(())
    }

    /// Attach the client's response to an existing chapter.
    ///
    /// Re-recording the same kind overwrites (the client may retry);
    /// a response of the other kind is a conflict.
    pub fn record_response(
        &mut self,
        chapter_number: u32,
        response: ChapterResponse,
    ) -> Result<(), DomainError> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|c| c.chapter_number == chapter_number)
            .ok_or(DomainError::ChapterNotFound(chapter_number))?;

        let kind_matches_chapter = matches!(
            (&response, chapter.chapter_type),
            (ChapterResponse::Lesson(_), ChapterType::Lesson)
                | (
                    ChapterResponse::Story(_),
                    ChapterType::Story | ChapterType::Reflect
                )
        );
        if !kind_matches_chapter {
            return Err(DomainError::ConflictingResponse(chapter_number));
        }
        if let Some(existing) = &chapter.response {
            if existing.is_story() != response.is_story() {
                return Err(DomainError::ConflictingResponse(chapter_number));
            }
        }

        if let ChapterResponse::Lesson(lesson) = &response {
            if let Some(question) = &mut chapter.question {
                question.selected_answer = Some(lesson.answer.clone());
                question.was_correct = Some(lesson.is_correct);
            }
            let idx = chapter_number as usize - 1;
            if let Some(Some(record)) = self.lesson_questions.get_mut(idx) {
                record.selected_answer = Some(lesson.answer.clone());
                record.was_correct = Some(lesson.is_correct);
            }
        }
        chapter.response = Some(response);
        Ok(())
    }

    /// Store the question asked in a LESSON chapter at its slot in
    /// `lesson_questions` (index i corresponds to chapter i + 1).
    pub fn set_lesson_question(&mut self, chapter_number: u32, question: QuestionRecord) {
        let idx = chapter_number as usize - 1;
        if self.lesson_questions.len() <= idx {
            self.lesson_questions.resize(idx + 1, None);
        }
        self.lesson_questions[idx] = Some(question);
    }

    /// Merge a client-submitted partial update.
    ///
    /// Chapter content/choice refinements are applied; every
    /// server-authoritative field is restored afterwards, even when
    /// the merge fails partway. Structural violations roll the whole
    /// merge back and surface as a hard error.
    pub fn apply_client_patch(&mut self, patch: StatePatch) -> Result<(), DomainError> {
        let authoritative = self.snapshot_authoritative();
        let chapters_before = self.chapters.clone();

        let merge_result = self.merge_patch(patch);
        self.restore_authoritative(authoritative);

        match merge_result.and_then(|()| self.validate()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.chapters = chapters_before;
                Err(e)
            }
        }
    }

    fn merge_patch(&mut self, patch: StatePatch) -> Result<(), DomainError> {
        // Authoritative fields merge first so a mid-merge failure
        // still exercises the restore path.
        if let Some(theme) = patch.selected_theme {
            self.selected_theme = theme;
        }
        if let Some(moral) = patch.selected_moral_teaching {
            self.selected_moral_teaching = moral;
        }
        if let Some(twist) = patch.selected_plot_twist {
            self.selected_plot_twist = twist;
        }
        if let Some(elements) = patch.selected_narrative_elements {
            self.selected_narrative_elements = elements;
        }
        if let Some(details) = patch.selected_sensory_details {
            self.selected_sensory_details = details;
        }
        if let Some(types) = patch.planned_chapter_types {
            self.planned_chapter_types = types;
        }
        if let Some(len) = patch.story_length {
            self.story_length = len;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata.extend(metadata);
        }

        for chapter_patch in patch.chapters {
            let chapter = self
                .chapters
                .iter_mut()
                .find(|c| c.chapter_number == chapter_patch.chapter_number)
                .ok_or(DomainError::ChapterNotFound(chapter_patch.chapter_number))?;
            if let Some(content) = chapter_patch.content {
                chapter.content = content;
            }
            if let Some(choices) = chapter_patch.choices {
                chapter.choices = choices;
            }
            chapter.validate()?;
        }
        Ok(())
    }

    fn snapshot_authoritative(&self) -> Authoritative {
        Authoritative {
            selected_theme: self.selected_theme.clone(),
            selected_moral_teaching: self.selected_moral_teaching.clone(),
            selected_plot_twist: self.selected_plot_twist.clone(),
            selected_narrative_elements: self.selected_narrative_elements.clone(),
            selected_sensory_details: self.selected_sensory_details.clone(),
            planned_chapter_types: self.planned_chapter_types.clone(),
            story_length: self.story_length,
            metadata: self.metadata.clone(),
        }
    }

    fn restore_authoritative(&mut self, snapshot: Authoritative) {
        self.selected_theme = snapshot.selected_theme;
        self.selected_moral_teaching = snapshot.selected_moral_teaching;
        self.selected_plot_twist = snapshot.selected_plot_twist;
        self.selected_narrative_elements = snapshot.selected_narrative_elements;
        self.selected_sensory_details = snapshot.selected_sensory_details;
        self.planned_chapter_types = snapshot.planned_chapter_types;
        self.story_length = snapshot.story_length;
        self.metadata = snapshot.metadata;
    }

    /// Check every structural invariant. Called after each mutation.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.planned_chapter_types.len() != self.story_length {
            return Err(DomainError::validation(format!(
                "Schedule length {} does not match story length {}",
                self.planned_chapter_types.len(),
                self.story_length
            )));
        }
        let len = self.planned_chapter_types.len();
        if len < crate::planner::MIN_STORY_LENGTH {
            return Err(DomainError::validation(format!(
                "Story length {len} is below the minimum"
            )));
        }
        let anchors_ok = self.planned_chapter_types[0] == ChapterType::Story
            && self.planned_chapter_types[1] == ChapterType::Story
            && self.planned_chapter_types[len - 2] == ChapterType::Story
            && self.planned_chapter_types[len - 1] == ChapterType::Conclusion;
        if !anchors_ok {
            return Err(DomainError::validation(
                "Schedule anchors are wrong: openings and penultimate must be story, final must be conclusion",
            ));
        }

        if self.chapters.len() > self.story_length + 1 {
            return Err(DomainError::validation(format!(
                "{} chapters exceed story length {} plus summary",
                self.chapters.len(),
                self.story_length
            )));
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            if chapter.chapter_number != i as u32 + 1 {
                return Err(DomainError::validation(format!(
                    "Chapter at index {i} is numbered {}",
                    chapter.chapter_number
                )));
            }
            chapter.validate()?;
        }
        Ok(())
    }

    /// Soft consistency checks. These never block progression; the
    /// caller logs whatever comes back.
    pub fn soft_consistency_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let full_text: String = self
            .chapters
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if !self.chapters.is_empty() {
            for (label, value) in [
                ("setting", &self.selected_narrative_elements.setting),
                ("characters", &self.selected_narrative_elements.characters),
            ] {
                if !value.is_empty() && !full_text.contains(value.as_str()) {
                    warnings.push(format!(
                        "Tracked narrative element ({label}) not found verbatim in chapter text: {value}"
                    ));
                }
            }
        }

        if let Some(agency) = &self.agency {
            if !self.chapters.is_empty() && !full_text.contains(agency.name.as_str()) {
                warnings.push(format!(
                    "Agency element '{}' is not referenced in any chapter",
                    agency.name
                ));
            }
        }

        if let Some(progress) = &self.plot_twist_progress {
            if let Some(revealed) = progress.revealed_in_chapter {
                let climax_start = self.story_length as u32 - (self.story_length as u32 / 4);
                if revealed < climax_start {
                    warnings.push(format!(
                        "Plot twist revealed in chapter {revealed}, before the climax window"
                    ));
                }
            }
        }
        warnings
    }

    /// Derived quiz totals for the summary chapter and completion event.
    pub fn statistics(&self) -> AdventureStatistics {
        let mut answered = 0;
        let mut correct = 0;
        for chapter in &self.chapters {
            if let Some(ChapterResponse::Lesson(lesson)) = &chapter.response {
                answered += 1;
                if lesson.is_correct {
                    correct += 1;
                }
            }
        }
        let chapters_completed = self
            .chapters
            .iter()
            .filter(|c| {
                c.response.is_some()
                    || matches!(
                        c.chapter_type,
                        ChapterType::Conclusion | ChapterType::Summary
                    )
            })
            .count() as u32;
        AdventureStatistics {
            questions_answered: answered,
            questions_correct: correct,
            chapters_completed,
        }
    }

    /// Placeholder-filled seed used when persisted selections are
    /// missing entirely.
    pub fn default_selections() -> (String, String, String) {
        (
            DEFAULT_THEME.to_string(),
            DEFAULT_MORAL_TEACHING.to_string(),
            DEFAULT_PLOT_TWIST.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::{AnswerOption, LessonResponse, StoryResponse};
    use crate::ids::QuestionId;

    fn seed(story_length: usize) -> AdventureSeed {
        let mut plan = vec![ChapterType::Story; story_length];
        plan[story_length - 1] = ChapterType::Conclusion;
        // Position 2 is free only once the story is six chapters long.
        if story_length >= 6 {
            plan[2] = ChapterType::Lesson;
        }
        AdventureSeed {
            id: AdventureId::new(),
            user_id: None,
            client_key: None,
            story_length,
            planned_chapter_types: plan,
            selected_theme: "courage".into(),
            selected_moral_teaching: "help others".into(),
            selected_plot_twist: "the guide was the king".into(),
            selected_narrative_elements: NarrativeElements::default(),
            selected_sensory_details: SensoryDetails::default(),
            lesson_topic: "math".into(),
            agency: None,
            now: Utc::now(),
        }
    }

    fn story_chapter(n: u32) -> ChapterData {
        ChapterData::new(n, ChapterType::Story, format!("Chapter {n} text")).with_choices(vec![
            Choice::new(1, "Left"),
            Choice::new(2, "Right"),
            Choice::new(3, "Up"),
        ])
    }

    fn question() -> QuestionRecord {
        QuestionRecord {
            id: QuestionId::new(),
            topic: "math".into(),
            question: "2+2?".into(),
            answers: vec![
                AnswerOption {
                    text: "4".into(),
                    is_correct: true,
                },
                AnswerOption {
                    text: "5".into(),
                    is_correct: false,
                },
            ],
            explanation: None,
            selected_answer: None,
            was_correct: None,
        }
    }

    #[test]
    fn append_rejects_non_sequential_chapter_numbers() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("chapter 1");

        let err = state
            .append_chapter(story_chapter(3))
            .expect_err("gap must be rejected");
        assert_eq!(
            err,
            DomainError::Sequence {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn append_caps_at_story_length_plus_summary() {
        let mut state = AdventureState::new(seed(4)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");
        state.append_chapter(story_chapter(2)).expect("2");
        state
            .append_chapter(
                ChapterData::new(3, ChapterType::Lesson, "Lesson").with_question(question()),
            )
            .expect("3");
        state
            .append_chapter(ChapterData::new(4, ChapterType::Conclusion, "The end."))
            .expect("4");
        state
            .append_chapter(ChapterData::new(5, ChapterType::Summary, "Recap."))
            .expect("summary is the +1");

        let err = state
            .append_chapter(ChapterData::new(6, ChapterType::Summary, "Again?"))
            .expect_err("over capacity");
        assert!(matches!(err, DomainError::StateValidation(_)));
    }

    #[test]
    fn phase_follows_the_latest_chapter() {
        let mut state = AdventureState::new(seed(10)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");
        assert_eq!(state.current_storytelling_phase, StoryPhase::Exposition);
        state.append_chapter(story_chapter(2)).expect("2");
        assert_eq!(state.current_storytelling_phase, StoryPhase::Rising);
    }

    #[test]
    fn record_response_rejects_conflicting_kind() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");

        let err = state
            .record_response(
                1,
                ChapterResponse::Lesson(LessonResponse {
                    answer: "4".into(),
                    is_correct: true,
                }),
            )
            .expect_err("lesson response on a story chapter");
        assert_eq!(err, DomainError::ConflictingResponse(1));

        state
            .record_response(
                1,
                ChapterResponse::Story(StoryResponse {
                    chosen_path: "1".into(),
                    choice_text: "Left".into(),
                }),
            )
            .expect("story response fits");
    }

    #[test]
    fn record_response_requires_an_existing_chapter() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        let err = state
            .record_response(
                2,
                ChapterResponse::Story(StoryResponse {
                    chosen_path: "1".into(),
                    choice_text: "Left".into(),
                }),
            )
            .expect_err("no chapter 2 yet");
        assert_eq!(err, DomainError::ChapterNotFound(2));
    }

    #[test]
    fn lesson_response_patches_the_question_slot() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");
        state.append_chapter(story_chapter(2)).expect("2");
        let q = question();
        state
            .append_chapter(
                ChapterData::new(3, ChapterType::Lesson, "What is 2+2?")
                    .with_question(q.clone()),
            )
            .expect("3");
        state.set_lesson_question(3, q);

        state
            .record_response(
                3,
                ChapterResponse::Lesson(LessonResponse {
                    answer: "4".into(),
                    is_correct: true,
                }),
            )
            .expect("lesson answer");

        let stored = state.lesson_questions[2].as_ref().expect("slot filled");
        assert_eq!(stored.was_correct, Some(true));
        assert_eq!(state.statistics().questions_answered, 1);
        assert_eq!(state.statistics().questions_correct, 1);
    }

    #[test]
    fn client_patch_cannot_drift_authoritative_fields() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");

        let patch = StatePatch {
            selected_theme: Some("chaos".into()),
            story_length: Some(99),
            planned_chapter_types: Some(vec![ChapterType::Summary; 99]),
            metadata: Some(HashMap::from([(
                "injected".to_string(),
                serde_json::json!(true),
            )])),
            chapters: vec![ChapterPatch {
                chapter_number: 1,
                content: Some("Edited chapter text".into()),
                choices: None,
            }],
            ..StatePatch::default()
        };

        state.apply_client_patch(patch).expect("merge succeeds");

        assert_eq!(state.selected_theme, "courage");
        assert_eq!(state.story_length, 6);
        assert!(state.metadata.is_empty());
        assert_eq!(state.chapters[0].content, "Edited chapter text");
    }

    #[test]
    fn client_patch_with_wrong_choice_count_is_a_hard_error() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");

        let patch = StatePatch {
            chapters: vec![ChapterPatch {
                chapter_number: 1,
                content: None,
                choices: Some(vec![Choice::new(1, "Only one")]),
            }],
            ..StatePatch::default()
        };

        let err = state.apply_client_patch(patch).expect_err("structural");
        assert!(matches!(err, DomainError::StateValidation(_)));
        // Prior valid state is kept.
        assert_eq!(state.chapters[0].choices.len(), 3);
    }

    #[test]
    fn soft_warnings_do_not_block() {
        let mut state = AdventureState::new(seed(6)).expect("valid seed");
        state.append_chapter(story_chapter(1)).expect("1");
        let warnings = state.soft_consistency_warnings();
        // The default narrative elements are not in the test text.
        assert!(!warnings.is_empty());
        // And the state is still valid.
        state.validate().expect("still valid");
    }
}
