//! In-memory lesson content repository.
//!
//! The engine never reads content from globals: one `InMemoryContent`
//! is constructed at startup (from whatever the deployment loads into
//! it) and injected wherever questions or narrative pools are needed.

use std::collections::HashMap;

use taleweaver_domain::{AnswerOption, QuestionId, QuestionRecord};

use crate::infrastructure::ports::{ContentRepo, NarrativePools};

pub struct InMemoryContent {
    questions: HashMap<String, Vec<QuestionRecord>>,
    default_topic: String,
    pools: NarrativePools,
}

impl InMemoryContent {
    pub fn new(
        questions: HashMap<String, Vec<QuestionRecord>>,
        default_topic: impl Into<String>,
        pools: NarrativePools,
    ) -> Self {
        Self {
            questions,
            default_topic: default_topic.into(),
            pools,
        }
    }

    /// A small built-in bank, enough to run the engine without any
    /// external content configured.
    pub fn with_defaults() -> Self {
        let mut questions = HashMap::new();
        questions.insert(
            "arithmetic".to_string(),
            vec![
                question(
                    "arithmetic",
                    "What is 7 + 5?",
                    &[("12", true), ("10", false), ("13", false)],
                    "Adding 5 to 7 makes 12.",
                ),
                question(
                    "arithmetic",
                    "What is 9 - 4?",
                    &[("5", true), ("6", false), ("4", false)],
                    "Taking 4 away from 9 leaves 5.",
                ),
                question(
                    "arithmetic",
                    "What is 3 x 4?",
                    &[("12", true), ("7", false), ("9", false)],
                    "Three groups of four make 12.",
                ),
                question(
                    "arithmetic",
                    "What is half of 16?",
                    &[("8", true), ("6", false), ("12", false)],
                    "Sixteen split into two equal parts is 8 and 8.",
                ),
                question(
                    "arithmetic",
                    "What is 10 + 15?",
                    &[("25", true), ("20", false), ("30", false)],
                    "Ten and fifteen together make 25.",
                ),
            ],
        );

        Self::new(questions, "arithmetic", default_pools())
    }
}

impl ContentRepo for InMemoryContent {
    fn question_count(&self, topic: &str) -> usize {
        self.questions.get(topic).map(Vec::len).unwrap_or(0)
    }

    fn lesson_questions(&self, topic: &str, count: usize) -> Vec<QuestionRecord> {
        self.questions
            .get(topic)
            .map(|bank| bank.iter().take(count).cloned().collect())
            .unwrap_or_default()
    }

    fn default_topic(&self) -> String {
        self.default_topic.clone()
    }

    fn narrative_pools(&self) -> NarrativePools {
        self.pools.clone()
    }
}

fn question(
    topic: &str,
    text: &str,
    answers: &[(&str, bool)],
    explanation: &str,
) -> QuestionRecord {
    QuestionRecord {
        id: QuestionId::new(),
        topic: topic.to_string(),
        question: text.to_string(),
        answers: answers
            .iter()
            .map(|(text, is_correct)| AnswerOption {
                text: (*text).to_string(),
                is_correct: *is_correct,
            })
            .collect(),
        explanation: Some(explanation.to_string()),
        selected_answer: None,
        was_correct: None,
    }
}

fn default_pools() -> NarrativePools {
    NarrativePools {
        themes: vec![
            "courage in unfamiliar places".into(),
            "a journey of discovery".into(),
            "friendship tested by distance".into(),
            "curiosity rewarded".into(),
        ],
        moral_teachings: vec![
            "kindness makes us stronger".into(),
            "patience opens closed doors".into(),
            "honesty earns trust".into(),
        ],
        plot_twists: vec![
            "a stranger turns out to be an old friend".into(),
            "the map was drawn by the hero's grandmother".into(),
            "the feared storm guards a hidden garden".into(),
        ],
        settings: vec![
            "a wide green valley".into(),
            "a harbor town at dusk".into(),
            "a forest of paper lanterns".into(),
        ],
        characters: vec![
            "a curious traveler and a wise companion".into(),
            "twin siblings with one compass".into(),
        ],
        objects: vec!["a weathered map".into(), "a humming brass key".into()],
        events: vec![
            "an unexpected storm".into(),
            "a festival arriving early".into(),
        ],
        visuals: vec![
            "golden light through tall trees".into(),
            "mist rolling off cold water".into(),
        ],
        sounds: vec![
            "wind moving through leaves".into(),
            "distant bells across the water".into(),
        ],
        smells: vec!["rain on warm stone".into(), "bread from a far chimney".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bank_serves_its_topic() {
        let content = InMemoryContent::with_defaults();
        assert_eq!(content.default_topic(), "arithmetic");
        assert!(content.question_count("arithmetic") >= 3);
        assert_eq!(content.question_count("history"), 0);
    }

    #[test]
    fn lesson_questions_are_capped_at_count() {
        let content = InMemoryContent::with_defaults();
        let three = content.lesson_questions("arithmetic", 3);
        assert_eq!(three.len(), 3);
        // Asking for more than the bank holds returns the whole bank.
        let all = content.lesson_questions("arithmetic", 100);
        assert_eq!(all.len(), content.question_count("arithmetic"));
    }

    #[test]
    fn every_question_has_exactly_one_correct_answer() {
        let content = InMemoryContent::with_defaults();
        for q in content.lesson_questions("arithmetic", 100) {
            let correct = q.answers.iter().filter(|a| a.is_correct).count();
            assert_eq!(correct, 1, "question '{}'", q.question);
        }
    }
}
