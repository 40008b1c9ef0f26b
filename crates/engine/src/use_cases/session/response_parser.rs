//! Parsers for generated chapter text and enrichment replies.
//!
//! The generator is asked for labeled blocks:
//! - story chapters end with `CHOICES:` followed by three numbered lines
//! - summaries come back as `TITLE:` / `SUMMARY:` lines
//! - character visuals come back as a bare JSON object
//!
//! Parsing is deliberately forgiving; anything it cannot read yields
//! an empty result and the caller falls back to placeholders.

use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use taleweaver_domain::Choice;

static CHOICE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^\s*CHOICES:\s*$(.*)\z").expect("valid regex")
});
static CHOICE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+)[.)]\s*(.+?)\s*$").expect("valid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*TITLE:\s*(.+?)\s*$").expect("valid regex"));
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^\s*SUMMARY:\s*(.+?)\s*\z").expect("valid regex"));
// Fenced or bare JSON object somewhere in the reply.
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// A chapter split into prose and its extracted choice list.
#[derive(Debug, Clone, Default)]
pub struct ParsedChapter {
    pub content: String,
    pub choices: Vec<Choice>,
}

/// Split generated chapter text into prose and choices.
///
/// The labeled block is removed from the prose. Chapters without a
/// block parse to an empty choice list.
pub fn parse_chapter_text(raw: &str) -> ParsedChapter {
    let Some(captures) = CHOICE_BLOCK_RE.captures(raw) else {
        return ParsedChapter {
            content: raw.trim().to_string(),
            choices: Vec::new(),
        };
    };

    let block = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let block_start = captures
        .get(0)
        .map(|m| m.start())
        .unwrap_or_else(|| raw.len());

    let choices = CHOICE_LINE_RE
        .captures_iter(block)
        .filter_map(|c| {
            let id = c.get(1)?.as_str().parse::<u32>().ok()?;
            let text = c.get(2)?.as_str().to_string();
            Some(Choice { id, text })
        })
        .collect();

    ParsedChapter {
        content: raw[..block_start].trim().to_string(),
        choices,
    }
}

/// A summary reply split into its title and body.
#[derive(Debug, Clone)]
pub struct ParsedSummary {
    pub title: String,
    pub summary: String,
}

/// Parse a `TITLE:` / `SUMMARY:` reply. Returns `None` when neither
/// label is present.
pub fn parse_summary_text(raw: &str) -> Option<ParsedSummary> {
    let title = TITLE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let summary = SUMMARY_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    match (title, summary) {
        (None, None) => None,
        (title, summary) => Some(ParsedSummary {
            title: title.unwrap_or_default(),
            summary: summary.unwrap_or_else(|| raw.trim().to_string()),
        }),
    }
}

/// Parse a character-visuals reply into a name -> description map.
///
/// Accepts a bare JSON object or one wrapped in prose/code fences;
/// anything else yields an empty map.
pub fn parse_visuals_text(raw: &str) -> HashMap<String, String> {
    let Some(object) = JSON_OBJECT_RE.find(raw) else {
        return HashMap::new();
    };
    serde_json::from_str::<HashMap<String, String>>(object.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prose_from_the_choice_block() {
        let raw = "The fox paused at the fork in the road.\n\n\
                   CHOICES:\n1. Take the sunlit path\n2. Take the shaded path\n3. Climb the oak\n";
        let parsed = parse_chapter_text(raw);
        assert_eq!(parsed.content, "The fox paused at the fork in the road.");
        assert_eq!(parsed.choices.len(), 3);
        assert_eq!(parsed.choices[0].id, 1);
        assert_eq!(parsed.choices[2].text, "Climb the oak");
    }

    #[test]
    fn accepts_paren_numbering() {
        let raw = "Text.\nCHOICES:\n1) One\n2) Two\n3) Three";
        let parsed = parse_chapter_text(raw);
        assert_eq!(parsed.choices.len(), 3);
    }

    #[test]
    fn chapter_without_block_has_no_choices() {
        let parsed = parse_chapter_text("And so the journey ended, quietly.\n");
        assert_eq!(parsed.content, "And so the journey ended, quietly.");
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn summary_reply_parses_both_labels() {
        let raw = "TITLE: The Fork in the Road\nSUMMARY: The fox found a fork. She hesitated.";
        let parsed = parse_summary_text(raw).expect("parses");
        assert_eq!(parsed.title, "The Fork in the Road");
        assert!(parsed.summary.starts_with("The fox found a fork."));
    }

    #[test]
    fn summary_reply_without_labels_is_none() {
        assert!(parse_summary_text("just some prose").is_none());
    }

    #[test]
    fn visuals_reply_parses_wrapped_json() {
        let raw = "Here you go:\n```json\n{\"Fox\": \"a red fox with a torn ear\"}\n```";
        let map = parse_visuals_text(raw);
        assert_eq!(
            map.get("Fox").map(String::as_str),
            Some("a red fox with a torn ear")
        );
    }

    #[test]
    fn malformed_visuals_reply_is_empty() {
        assert!(parse_visuals_text("no json here").is_empty());
        assert!(parse_visuals_text("{broken json").is_empty());
    }
}
