//! Prompt builders for chapter generation and enrichment.
//!
//! The generated chapter must end with a labeled block the response
//! parser understands: `CHOICES:` with three numbered lines for story
//! chapters, nothing for conclusions. Lesson chapters weave the
//! supplied question into the prose; answer options are served from
//! the question bank, not parsed back out of the text.

use taleweaver_domain::{
    AdventureState, ChapterType, QuestionRecord, StoryPhase,
};

pub const SYSTEM_PROMPT: &str = "You are a storyteller writing one chapter at a time of an \
    interactive educational adventure for children. Write warm, concrete prose. Follow the \
    structural instructions at the end of each request exactly.";

/// Build the generation prompt for the next chapter.
pub fn chapter_prompt(
    state: &AdventureState,
    chapter_number: u32,
    chapter_type: ChapterType,
    phase: StoryPhase,
    question: Option<&QuestionRecord>,
) -> String {
    let mut prompt = format!(
        "Write chapter {chapter_number} of {total} of an adventure story.\n\
         Theme: {theme}\n\
         Moral teaching to build toward: {moral}\n\
         Planned plot twist (reveal only near the climax): {twist}\n\
         Setting: {setting}\n\
         Characters: {characters}\n\
         Important objects: {objects}\n\
         Events to weave in: {events}\n\
         Sensory texture: sights of {visuals}; sounds of {sounds}; smells of {smells}\n\
         Narrative phase: {phase}\n",
        total = state.story_length,
        theme = state.selected_theme,
        moral = state.selected_moral_teaching,
        twist = state.selected_plot_twist,
        setting = state.selected_narrative_elements.setting,
        characters = state.selected_narrative_elements.characters,
        objects = state.selected_narrative_elements.objects,
        events = state.selected_narrative_elements.events,
        visuals = state.selected_sensory_details.visuals,
        sounds = state.selected_sensory_details.sounds,
        smells = state.selected_sensory_details.smells,
    );

    if let Some(agency) = &state.agency {
        prompt.push_str(&format!(
            "The hero's chosen {category:?} is '{name}': {description}. Reference it.\n",
            category = agency.category,
            name = agency.name,
            description = agency.description,
        ));
    }

    let recap = previous_chapters_recap(state);
    if !recap.is_empty() {
        prompt.push_str("\nStory so far:\n");
        prompt.push_str(&recap);
        prompt.push('\n');
    }

    if let Some(last) = state.last_chapter() {
        if let Some(response) = &last.response {
            match response {
                taleweaver_domain::ChapterResponse::Story(story) => prompt.push_str(&format!(
                    "\nThe reader just chose: \"{}\". Continue from that choice.\n",
                    story.choice_text
                )),
                taleweaver_domain::ChapterResponse::Lesson(lesson) => prompt.push_str(&format!(
                    "\nThe reader answered the last question {}. Acknowledge it lightly in the \
                     story before moving on.\n",
                    if lesson.is_correct {
                        "correctly"
                    } else {
                        "incorrectly"
                    }
                )),
            }
        }
    }

    match chapter_type {
        ChapterType::Story => prompt.push_str(
            "\nEnd the chapter at a decision point, then output a labeled block:\n\
             CHOICES:\n1. <first option>\n2. <second option>\n3. <third option>\n",
        ),
        ChapterType::Lesson => {
            if let Some(q) = question {
                prompt.push_str(&format!(
                    "\nThis is a lesson chapter. Weave this question naturally into the story \
                     and end with a character asking it: \"{}\". Do not list answer options or \
                     reveal the answer.\n",
                    q.question
                ));
            }
        }
        ChapterType::Reflect => prompt.push_str(
            "\nThis is a reflection chapter: have the hero pause and reflect on the journey so \
             far. End with a gentle open question, no choice block.\n",
        ),
        ChapterType::Conclusion => prompt.push_str(
            "\nThis is the final chapter. Resolve the story, deliver the moral teaching, and do \
             not output any choices.\n",
        ),
        ChapterType::Summary => prompt.push_str(
            "\nWrite a short closing recap of the whole adventure. No choices.\n",
        ),
    }

    prompt
}

fn previous_chapters_recap(state: &AdventureState) -> String {
    let mut lines = Vec::new();
    for (i, chapter) in state.chapters.iter().enumerate() {
        // Prefer the enriched summary; fall back to a truncated head
        // of the chapter text when enrichment hasn't landed yet.
        let summary = state
            .chapter_summaries
            .get(i)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| truncate(&chapter.content, 200));
        lines.push(format!("Chapter {}: {}", chapter.chapter_number, summary));
    }
    lines.join("\n")
}

/// Build the summarization prompt for one finished chapter.
pub fn summary_prompt(chapter_number: u32, content: &str) -> String {
    format!(
        "Summarize chapter {chapter_number} below in two sentences, then give it a short title.\n\
         Respond in exactly this format:\n\
         TITLE: <title>\n\
         SUMMARY: <two sentences>\n\n\
         Chapter text:\n{content}"
    )
}

/// Build the character-visual extraction prompt for one chapter.
///
/// `known_characters` lets the extractor skip names that already have
/// descriptions, keeping the map merge-only.
pub fn visuals_prompt(content: &str, known_characters: &[String]) -> String {
    let known = if known_characters.is_empty() {
        "none".to_string()
    } else {
        known_characters.join(", ")
    };
    format!(
        "List the characters who appear in the chapter below with a one-sentence visual \
         description of each. Skip these already-described characters: {known}.\n\
         Respond with a JSON object mapping character name to description and nothing else.\n\n\
         Chapter text:\n{content}"
    )
}

/// Image prompt for a chapter's scene illustration.
pub fn chapter_image_prompt(state: &AdventureState, content: &str) -> String {
    format!(
        "Storybook illustration, {setting}, {visuals}. Scene: {scene}",
        setting = state.selected_narrative_elements.setting,
        visuals = state.selected_sensory_details.visuals,
        scene = truncate(content, 300),
    )
}

/// Image prompt for one choice thumbnail.
pub fn choice_image_prompt(state: &AdventureState, choice_text: &str) -> String {
    format!(
        "Storybook illustration, {setting}. Moment: {choice_text}",
        setting = state.selected_narrative_elements.setting,
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use taleweaver_domain::{
        AdventureId, AdventureSeed, NarrativeElements, SensoryDetails,
    };

    fn state() -> AdventureState {
        let mut plan = vec![ChapterType::Story; 6];
        plan[5] = ChapterType::Conclusion;
        AdventureState::new(AdventureSeed {
            id: AdventureId::new(),
            user_id: None,
            client_key: None,
            story_length: 6,
            planned_chapter_types: plan,
            selected_theme: "courage".into(),
            selected_moral_teaching: "help others".into(),
            selected_plot_twist: "the guide was the king".into(),
            selected_narrative_elements: NarrativeElements::default(),
            selected_sensory_details: SensoryDetails::default(),
            lesson_topic: "arithmetic".into(),
            agency: None,
            now: chrono::Utc::now(),
        })
        .expect("valid state")
    }

    #[test]
    fn story_prompt_demands_a_choice_block() {
        let s = state();
        let prompt = chapter_prompt(&s, 1, ChapterType::Story, StoryPhase::Exposition, None);
        assert!(prompt.contains("CHOICES:"));
        assert!(prompt.contains("courage"));
    }

    #[test]
    fn conclusion_prompt_forbids_choices() {
        let s = state();
        let prompt = chapter_prompt(&s, 6, ChapterType::Conclusion, StoryPhase::Return, None);
        assert!(!prompt.contains("CHOICES:"));
        assert!(prompt.contains("final chapter"));
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate("short", 200), "short");
        assert!(truncate(&"x".repeat(500), 200).ends_with("..."));
    }
}
