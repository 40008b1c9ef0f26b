//! Rebuilds a valid `AdventureState` from possibly-corrupted
//! persisted data.
//!
//! Reconstruction never errors: every field has an explicit default
//! or repair, and `None` comes back only when the input is
//! fundamentally unusable (no workable `story_length`), which tells
//! the caller to start a fresh session instead of crashing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use taleweaver_domain::{
    plan_chapter_types, AdventureId, AdventureState, AgencyState, ChapterData, ChapterResponse,
    ChapterType, Choice, NarrativeElements, PlotTwistProgress, QuestionRecord, SensoryDetails,
    StoryPhase, UserId, DEFAULT_MORAL_TEACHING, DEFAULT_PLOT_TWIST, DEFAULT_THEME,
    MIN_STORY_LENGTH,
};

/// Rebuild a session state from a raw persisted blob.
///
/// `available_questions` feeds schedule regeneration when the planned
/// types were lost; `pick` is the session's seeded sampler.
pub fn reconstruct(
    raw: &Value,
    available_questions: usize,
    now: DateTime<Utc>,
    pick: &mut dyn FnMut(usize) -> usize,
) -> Option<AdventureState> {
    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => {
            tracing::warn!("Persisted state is not an object, starting fresh");
            return None;
        }
    };

    let story_length = match obj.get("story_length").and_then(Value::as_u64) {
        Some(len) if len as usize >= MIN_STORY_LENGTH => len as usize,
        Some(len) => {
            tracing::warn!(story_length = len, "Persisted story length is unusable");
            return None;
        }
        None => {
            tracing::warn!("Persisted state has no story length, starting fresh");
            return None;
        }
    };

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<AdventureId>().ok())
        .unwrap_or_default();
    let user_id = obj
        .get("user_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<UserId>().ok());
    let client_key = obj
        .get("client_key")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut chapters = rebuild_chapters(obj.get("chapters"), story_length);

    // The +1 slot is only ever a summary chapter.
    if chapters.len() > story_length + 1 {
        tracing::warn!(
            kept = story_length + 1,
            dropped = chapters.len() - story_length - 1,
            "Dropping chapters beyond the story length"
        );
        chapters.truncate(story_length + 1);
    }

    let planned_chapter_types = rebuild_schedule(
        obj.get("planned_chapter_types"),
        &mut chapters,
        story_length,
        available_questions,
        pick,
    );

    let current_storytelling_phase = chapters
        .last()
        .map(|c| {
            taleweaver_domain::determine_story_phase(
                c.chapter_number.min(story_length as u32),
                story_length,
            )
        })
        .unwrap_or(StoryPhase::Exposition);

    let state = AdventureState {
        id,
        user_id,
        client_key,
        story_length,
        planned_chapter_types,
        chapters,
        current_storytelling_phase,
        selected_theme: string_or(obj.get("selected_theme"), DEFAULT_THEME),
        selected_moral_teaching: string_or(
            obj.get("selected_moral_teaching"),
            DEFAULT_MORAL_TEACHING,
        ),
        selected_plot_twist: string_or(obj.get("selected_plot_twist"), DEFAULT_PLOT_TWIST),
        selected_narrative_elements: lenient::<NarrativeElements>(
            obj.get("selected_narrative_elements"),
        ),
        selected_sensory_details: lenient::<SensoryDetails>(obj.get("selected_sensory_details")),
        lesson_topic: string_or(obj.get("lesson_topic"), ""),
        chapter_summaries: lenient(obj.get("chapter_summaries")),
        summary_chapter_titles: lenient(obj.get("summary_chapter_titles")),
        lesson_questions: lenient(obj.get("lesson_questions")),
        character_visuals: lenient(obj.get("character_visuals")),
        agency: obj
            .get("agency")
            .and_then(|v| serde_json::from_value::<AgencyState>(v.clone()).ok()),
        plot_twist_progress: Some(
            obj.get("plot_twist_progress")
                .and_then(|v| serde_json::from_value::<PlotTwistProgress>(v.clone()).ok())
                .unwrap_or_default(),
        ),
        metadata: lenient(obj.get("metadata")),
        is_complete: obj
            .get("is_complete")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        created_at: timestamp_or(obj.get("created_at"), now),
        updated_at: now,
    };

    match state.validate() {
        Ok(()) => Some(state),
        Err(e) => {
            // Repair produced something still invalid; a fresh session
            // is safer than guessing further.
            tracing::warn!(error = %e, "Reconstructed state failed validation, starting fresh");
            None
        }
    }
}

/// Parse stored chapters leniently, renumbering sequentially and
/// repairing each chapter's shape.
fn rebuild_chapters(raw: Option<&Value>, story_length: usize) -> Vec<ChapterData> {
    let Some(entries) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut chapters = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let chapter_number = i as u32 + 1;
        let Some(obj) = entry.as_object() else {
            tracing::warn!(chapter = chapter_number, "Dropping non-object chapter entry");
            continue;
        };

        let chapter_type = parse_chapter_type(obj.get("chapter_type"), chapter_number);
        let content = string_or(obj.get("content"), "");
        let choices: Vec<Choice> = lenient(obj.get("choices"));
        let question = obj
            .get("question")
            .and_then(|v| serde_json::from_value::<QuestionRecord>(v.clone()).ok());
        let response = obj
            .get("response")
            .and_then(|v| serde_json::from_value::<ChapterResponse>(v.clone()).ok());

        let mut chapter = ChapterData {
            chapter_number,
            chapter_type,
            content,
            choices,
            question,
            response,
        };
        repair_chapter_shape(&mut chapter, story_length);
        chapters.push(chapter);
    }

    // The final chapter of the persisted story length is always a
    // conclusion, regardless of what was stored.
    if chapters.len() >= story_length {
        let last_planned = &mut chapters[story_length - 1];
        if last_planned.chapter_type != ChapterType::Conclusion {
            tracing::warn!(
                stored = %last_planned.chapter_type,
                "Forcing final chapter to conclusion"
            );
            last_planned.chapter_type = ChapterType::Conclusion;
            last_planned.choices.clear();
        }
    }

    chapters
}

/// Unrecognized chapter-type strings default to STORY.
fn parse_chapter_type(raw: Option<&Value>, chapter_number: u32) -> ChapterType {
    match raw.and_then(Value::as_str) {
        Some(s) => s.parse::<ChapterType>().unwrap_or_else(|_| {
            tracing::warn!(
                chapter = chapter_number,
                stored = s,
                "Unknown chapter type, defaulting to story"
            );
            ChapterType::Story
        }),
        None => ChapterType::Story,
    }
}

/// Make a chapter structurally valid: choice counts match its type.
fn repair_chapter_shape(chapter: &mut ChapterData, _story_length: usize) {
    let Some(required) = chapter.chapter_type.required_choice_count() else {
        return;
    };
    if chapter.choices.len() == required {
        return;
    }
    tracing::warn!(
        chapter = chapter.chapter_number,
        stored = chapter.choices.len(),
        required,
        "Repairing persisted choice count"
    );
    chapter.choices.truncate(required);
    while chapter.choices.len() < required {
        let id = chapter.choices.len() as u32 + 1;
        chapter
            .choices
            .push(Choice::new(id, format!("Continue along path {id}")));
    }
    for (i, choice) in chapter.choices.iter_mut().enumerate() {
        choice.id = i as u32 + 1;
    }
}

/// Restore the schedule: parse what was stored, infer from existing
/// chapters when it's missing, regenerate the missing tail, and pin
/// the anchors.
fn rebuild_schedule(
    raw: Option<&Value>,
    chapters: &mut [ChapterData],
    story_length: usize,
    available_questions: usize,
    pick: &mut dyn FnMut(usize) -> usize,
) -> Vec<ChapterType> {
    let stored: Vec<ChapterType> = raw
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .map(|(i, v)| parse_chapter_type(Some(v), i as u32 + 1))
                .collect()
        })
        .unwrap_or_default();

    let mut planned = if stored.len() == story_length {
        stored
    } else if !chapters.is_empty() || stored.is_empty() {
        // Schedule lost (or wrong length): infer what the existing
        // chapters were, then let the planner fill the remainder.
        let inferred: Vec<ChapterType> = chapters
            .iter()
            .map(|c| infer_chapter_type(c, story_length))
            .collect();
        // The inferred types become truth for the chapters as well.
        for (chapter, inferred_type) in chapters.iter_mut().zip(&inferred) {
            if chapter.chapter_type != *inferred_type {
                chapter.chapter_type = *inferred_type;
                repair_chapter_shape(chapter, story_length);
            }
        }

        let mut regenerated =
            plan_chapter_types(story_length, available_questions, pick).unwrap_or_else(|_| {
                let mut fallback = vec![ChapterType::Story; story_length];
                fallback[story_length - 1] = ChapterType::Conclusion;
                fallback
            });
        for (i, t) in inferred.iter().enumerate().take(story_length) {
            regenerated[i] = *t;
        }
        if !inferred.is_empty() {
            tracing::info!(
                inferred = inferred.len(),
                regenerated = story_length - inferred.len().min(story_length),
                "Rebuilt missing chapter schedule"
            );
        }
        regenerated
    } else {
        let mut padded = stored;
        padded.resize(story_length, ChapterType::Story);
        padded
    };

    // Pin the anchors the planner guarantees; keep any chapters at
    // those positions consistent with the pinned types.
    planned[0] = ChapterType::Story;
    planned[1] = ChapterType::Story;
    planned[story_length - 2] = ChapterType::Story;
    planned[story_length - 1] = ChapterType::Conclusion;
    for (i, chapter) in chapters.iter_mut().enumerate() {
        // Position story_length holds the appended summary chapter.
        if i >= story_length {
            continue;
        }
        if planned[i] != chapter.chapter_type {
            if matches!(i, 0 | 1) || i == story_length - 2 || i == story_length - 1 {
                chapter.chapter_type = planned[i];
                repair_chapter_shape(chapter, story_length);
            } else {
                planned[i] = chapter.chapter_type;
            }
        }
    }

    planned
}

/// Type inference for chapters persisted without reliable type info.
fn infer_chapter_type(chapter: &ChapterData, story_length: usize) -> ChapterType {
    if chapter.chapter_number as usize == story_length {
        return ChapterType::Conclusion;
    }
    if chapter.question.is_some() {
        return ChapterType::Lesson;
    }
    if looks_like_reflection(&chapter.content) {
        return ChapterType::Reflect;
    }
    chapter.chapter_type
}

/// Reflection chapters open by asking the reader to look back.
fn looks_like_reflection(content: &str) -> bool {
    let head: String = content.chars().take(240).collect::<String>().to_lowercase();
    head.contains("reflect") || head.contains("look back on")
}

fn string_or(raw: Option<&Value>, default: &str) -> String {
    raw.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

fn timestamp_or(raw: Option<&Value>, default: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(default)
}

/// Deserialize leniently: anything unreadable becomes the default.
fn lenient<T: serde::de::DeserializeOwned + Default>(raw: Option<&Value>) -> T {
    raw.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn first(_n: usize) -> usize {
        0
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn stored_chapter(n: u32, chapter_type: &str, choices: usize) -> Value {
        let choices: Vec<Value> = (1..=choices)
            .map(|i| json!({"id": i, "text": format!("Choice {i}")}))
            .collect();
        json!({
            "chapter_number": n,
            "chapter_type": chapter_type,
            "content": format!("Chapter {n} text"),
            "choices": choices,
        })
    }

    #[test]
    fn missing_story_length_is_unusable() {
        let mut pick = first;
        assert!(reconstruct(&json!({"chapters": []}), 3, now(), &mut pick).is_none());
        assert!(reconstruct(&json!("not an object"), 3, now(), &mut pick).is_none());
    }

    #[test]
    fn minimal_blob_reconstructs_with_placeholder_defaults() {
        let mut pick = first;
        let state =
            reconstruct(&json!({"story_length": 6}), 2, now(), &mut pick).expect("reconstructs");

        assert_eq!(state.story_length, 6);
        assert_eq!(state.planned_chapter_types.len(), 6);
        assert_eq!(state.selected_theme, DEFAULT_THEME);
        assert_eq!(state.selected_moral_teaching, DEFAULT_MORAL_TEACHING);
        assert_eq!(state.selected_plot_twist, DEFAULT_PLOT_TWIST);
        state.validate().expect("valid");
    }

    #[test]
    fn unknown_chapter_type_defaults_to_story() {
        let mut pick = first;
        let raw = json!({
            "story_length": 6,
            "chapters": [stored_chapter(1, "prologue", 3)],
        });
        let state = reconstruct(&raw, 0, now(), &mut pick).expect("reconstructs");
        assert_eq!(state.chapters[0].chapter_type, ChapterType::Story);
    }

    #[test]
    fn final_chapter_is_forced_to_conclusion() {
        let mut pick = first;
        let raw = json!({
            "story_length": 4,
            "planned_chapter_types": ["story", "story", "story", "story"],
            "chapters": [
                stored_chapter(1, "story", 3),
                stored_chapter(2, "story", 3),
                stored_chapter(3, "story", 3),
                stored_chapter(4, "story", 3),
            ],
        });
        let state = reconstruct(&raw, 0, now(), &mut pick).expect("reconstructs");
        assert_eq!(state.chapters[3].chapter_type, ChapterType::Conclusion);
        assert!(state.chapters[3].choices.is_empty());
        assert_eq!(state.planned_chapter_types[3], ChapterType::Conclusion);
        state.validate().expect("valid");
    }

    #[test]
    fn missing_schedule_is_inferred_then_regenerated() {
        let mut pick = first;
        let mut lesson = stored_chapter(3, "lesson", 0);
        lesson["question"] = json!({
            "id": uuid::Uuid::new_v4(),
            "topic": "arithmetic",
            "question": "2+2?",
            "answers": [{"text": "4", "is_correct": true}],
        });
        let raw = json!({
            "story_length": 10,
            "chapters": [
                stored_chapter(1, "story", 3),
                stored_chapter(2, "story", 3),
                lesson,
                stored_chapter(4, "story", 3),
                stored_chapter(5, "story", 3),
            ],
        });

        let state = reconstruct(&raw, 3, now(), &mut pick).expect("reconstructs");

        assert_eq!(state.planned_chapter_types.len(), 10);
        assert_eq!(state.planned_chapter_types[9], ChapterType::Conclusion);
        // The first five positions match the inferred chapter types.
        for (i, chapter) in state.chapters.iter().enumerate() {
            assert_eq!(state.planned_chapter_types[i], chapter.chapter_type);
        }
        assert_eq!(state.planned_chapter_types[2], ChapterType::Lesson);
        state.validate().expect("valid");
    }

    #[test]
    fn question_bearing_chapter_infers_lesson() {
        let mut pick = first;
        let mut with_question = stored_chapter(3, "story", 0);
        with_question["question"] = json!({
            "id": uuid::Uuid::new_v4(),
            "topic": "arithmetic",
            "question": "9-4?",
            "answers": [{"text": "5", "is_correct": true}],
        });
        // No chapter_type field at all.
        with_question
            .as_object_mut()
            .expect("object")
            .remove("chapter_type");
        let raw = json!({
            "story_length": 8,
            "chapters": [
                stored_chapter(1, "story", 3),
                stored_chapter(2, "story", 3),
                with_question,
            ],
        });

        let state = reconstruct(&raw, 4, now(), &mut pick).expect("reconstructs");
        assert_eq!(state.planned_chapter_types[2], ChapterType::Lesson);
        assert_eq!(state.chapters[2].chapter_type, ChapterType::Lesson);
    }

    #[test]
    fn broken_choice_counts_are_repaired() {
        let mut pick = first;
        let raw = json!({
            "story_length": 6,
            "chapters": [stored_chapter(1, "story", 1)],
        });
        let state = reconstruct(&raw, 0, now(), &mut pick).expect("reconstructs");
        assert_eq!(state.chapters[0].choices.len(), 3);
        state.validate().expect("valid");
    }

    #[test]
    fn narrative_sub_keys_fill_per_key_defaults() {
        let mut pick = first;
        let raw = json!({
            "story_length": 6,
            "selected_narrative_elements": {"setting": "a glass lighthouse"},
        });
        let state = reconstruct(&raw, 0, now(), &mut pick).expect("reconstructs");
        assert_eq!(
            state.selected_narrative_elements.setting,
            "a glass lighthouse"
        );
        assert!(!state.selected_narrative_elements.characters.is_empty());
    }
}
