//! Chapter value objects: types, phases, questions, choices, responses.
//!
//! `ChapterType` and `StoryPhase` are the vocabulary the planner and the
//! session state machine speak. Both serialize as lowercase strings on
//! the wire and in persisted state; `FromStr` is the single place raw
//! strings are normalized into the tagged variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::QuestionId;

/// Governs a chapter's content shape and required choice count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    Story,
    Lesson,
    Conclusion,
    Reflect,
    Summary,
}

impl ChapterType {
    /// Number of choices a streamed chapter of this type must carry.
    /// `None` means the count is not structurally enforced.
    pub fn required_choice_count(&self) -> Option<usize> {
        match self {
            Self::Story => Some(3),
            Self::Conclusion | Self::Summary => Some(0),
            Self::Lesson | Self::Reflect => None,
        }
    }
}

impl fmt::Display for ChapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Story => "story",
            Self::Lesson => "lesson",
            Self::Conclusion => "conclusion",
            Self::Reflect => "reflect",
            Self::Summary => "summary",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ChapterType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "story" => Ok(Self::Story),
            "lesson" => Ok(Self::Lesson),
            "conclusion" => Ok(Self::Conclusion),
            "reflect" => Ok(Self::Reflect),
            "summary" => Ok(Self::Summary),
            other => Err(DomainError::parse(format!("Unknown chapter type: {other}"))),
        }
    }
}

/// Narrative-arc position, derived purely from chapter index and total
/// length. Never stored as independent truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryPhase {
    Exposition,
    Rising,
    Trials,
    Climax,
    Return,
}

impl fmt::Display for StoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exposition => "exposition",
            Self::Rising => "rising",
            Self::Trials => "trials",
            Self::Climax => "climax",
            Self::Return => "return",
        };
        write!(f, "{s}")
    }
}

/// One branching option presented at the end of a STORY chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: u32,
    pub text: String,
}

impl Choice {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// A single answer option on a quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub is_correct: bool,
}

/// A quiz question embedded in a LESSON chapter.
///
/// `selected_answer`/`was_correct` are patched in once the client
/// answers; they stay `None` for unanswered questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub topic: String,
    pub question: String,
    pub answers: Vec<AnswerOption>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub selected_answer: Option<String>,
    #[serde(default)]
    pub was_correct: Option<bool>,
}

impl QuestionRecord {
    /// The text of the correct answer, if the record has one marked.
    pub fn correct_answer(&self) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.is_correct)
            .map(|a| a.text.as_str())
    }

    /// Record the client's submitted answer, comparing it against the
    /// correct option (case-insensitive, whitespace-trimmed).
    pub fn record_answer(&mut self, submitted: &str) -> bool {
        let correct = self
            .correct_answer()
            .map(|c| c.trim().eq_ignore_ascii_case(submitted.trim()))
            .unwrap_or(false);
        self.selected_answer = Some(submitted.to_string());
        self.was_correct = Some(correct);
        correct
    }
}

/// The player's answer to a STORY chapter's branching choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryResponse {
    pub chosen_path: String,
    pub choice_text: String,
}

/// The player's answer to a LESSON chapter's question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonResponse {
    pub answer: String,
    pub is_correct: bool,
}

/// Response attached to a chapter once the client has answered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChapterResponse {
    Story(StoryResponse),
    Lesson(LessonResponse),
}

impl ChapterResponse {
    pub fn is_story(&self) -> bool {
        matches!(self, Self::Story(_))
    }

    pub fn is_lesson(&self) -> bool {
        matches!(self, Self::Lesson(_))
    }
}

/// One generated narrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterData {
    pub chapter_number: u32,
    pub chapter_type: ChapterType,
    pub content: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub question: Option<QuestionRecord>,
    #[serde(default)]
    pub response: Option<ChapterResponse>,
}

impl ChapterData {
    pub fn new(chapter_number: u32, chapter_type: ChapterType, content: impl Into<String>) -> Self {
        Self {
            chapter_number,
            chapter_type,
            content: content.into(),
            choices: Vec::new(),
            question: None,
            response: None,
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_question(mut self, question: QuestionRecord) -> Self {
        self.question = Some(question);
        self
    }

    /// Structural check: choice count must match the chapter type.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chapter_number == 0 {
            return Err(DomainError::validation("Chapter numbers are 1-based"));
        }
        if let Some(required) = self.chapter_type.required_choice_count() {
            if self.choices.len() != required {
                return Err(DomainError::validation(format!(
                    "{} chapter {} has {} choices, expected {}",
                    self.chapter_type,
                    self.chapter_number,
                    self.choices.len(),
                    required
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_type_round_trips_through_str() {
        for t in [
            ChapterType::Story,
            ChapterType::Lesson,
            ChapterType::Conclusion,
            ChapterType::Reflect,
            ChapterType::Summary,
        ] {
            assert_eq!(t.to_string().parse::<ChapterType>(), Ok(t));
        }
    }

    #[test]
    fn chapter_type_parse_is_case_insensitive() {
        assert_eq!("STORY".parse::<ChapterType>(), Ok(ChapterType::Story));
        assert_eq!(
            "Conclusion".parse::<ChapterType>(),
            Ok(ChapterType::Conclusion)
        );
    }

    #[test]
    fn unknown_chapter_type_is_a_parse_error() {
        assert!(matches!(
            "prologue".parse::<ChapterType>(),
            Err(DomainError::Parse(_))
        ));
    }

    #[test]
    fn story_chapter_requires_three_choices() {
        let chapter = ChapterData::new(1, ChapterType::Story, "Once upon a time...");
        assert!(chapter.validate().is_err());

        let chapter = chapter.with_choices(vec![
            Choice::new(1, "Go left"),
            Choice::new(2, "Go right"),
            Choice::new(3, "Climb up"),
        ]);
        assert!(chapter.validate().is_ok());
    }

    #[test]
    fn conclusion_chapter_must_have_no_choices() {
        let chapter = ChapterData::new(10, ChapterType::Conclusion, "The end.")
            .with_choices(vec![Choice::new(1, "Continue?")]);
        assert!(chapter.validate().is_err());
    }

    #[test]
    fn record_answer_compares_ignoring_case_and_whitespace() {
        let mut question = QuestionRecord {
            id: QuestionId::new(),
            topic: "math".into(),
            question: "What is 2 + 2?".into(),
            answers: vec![
                AnswerOption {
                    text: "Four".into(),
                    is_correct: true,
                },
                AnswerOption {
                    text: "Five".into(),
                    is_correct: false,
                },
            ],
            explanation: None,
            selected_answer: None,
            was_correct: None,
        };

        assert!(question.record_answer("  four "));
        assert_eq!(question.was_correct, Some(true));

        assert!(!question.record_answer("Five"));
        assert_eq!(question.was_correct, Some(false));
    }
}
