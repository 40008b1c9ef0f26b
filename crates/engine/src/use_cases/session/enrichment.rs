//! Deferred chapter enrichment: summaries, titles, character visuals.
//!
//! Enrichment is enqueued when a chapter's response is recorded, but
//! only spawned after the next chapter's stream has fully flushed, so
//! the enrichment LLM calls overlap generation instead of delaying
//! it. All writers go through the per-session artifacts lock and pad
//! with placeholders up to the needed index before writing, so
//! concurrent readers never observe a list shorter than a finished
//! chapter's slot.
//!
//! Task failures never propagate: a failed summary becomes a
//! placeholder, a failed extraction leaves the visuals map alone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use taleweaver_domain::{AdventureState, ChapterData, ChapterType};

use crate::infrastructure::ports::{ChapterRequest, LlmPort};
use crate::prompts;

use super::response_parser;

/// The enrichment targets shared between the session control flow and
/// its background tasks. Index `i` corresponds to chapter `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentArtifacts {
    pub chapter_summaries: Vec<String>,
    pub summary_chapter_titles: Vec<String>,
    pub character_visuals: HashMap<String, String>,
}

impl EnrichmentArtifacts {
    /// Seed from a reconstructed state so resumed sessions keep their
    /// already-generated enrichment.
    pub fn from_state(state: &AdventureState) -> Self {
        Self {
            chapter_summaries: state.chapter_summaries.clone(),
            summary_chapter_titles: state.summary_chapter_titles.clone(),
            character_visuals: state.character_visuals.clone(),
        }
    }

    /// Snapshot back into the state before a persist.
    pub fn apply_to_state(&self, state: &mut AdventureState) {
        state.chapter_summaries = self.chapter_summaries.clone();
        state.summary_chapter_titles = self.summary_chapter_titles.clone();
        state.character_visuals = self.character_visuals.clone();
    }

    fn pad_to(&mut self, len: usize) {
        while self.chapter_summaries.len() < len {
            let n = self.chapter_summaries.len() as u32 + 1;
            self.chapter_summaries.push(placeholder_summary(n));
        }
        while self.summary_chapter_titles.len() < len {
            let n = self.summary_chapter_titles.len() as u32 + 1;
            self.summary_chapter_titles.push(placeholder_title(n));
        }
    }

    /// Write a chapter's summary and title, padding earlier slots
    /// with placeholders if their writers haven't landed yet.
    pub fn set_summary(&mut self, chapter_number: u32, title: String, summary: String) {
        let idx = chapter_number as usize - 1;
        self.pad_to(idx + 1);
        self.summary_chapter_titles[idx] = title;
        self.chapter_summaries[idx] = summary;
    }

    /// Whether a non-placeholder summary exists for a chapter.
    pub fn has_summary(&self, chapter_number: u32) -> bool {
        let idx = chapter_number as usize - 1;
        self.chapter_summaries
            .get(idx)
            .is_some_and(|s| *s != placeholder_summary(chapter_number))
    }

    /// Merge-only: already-described characters are never overwritten.
    pub fn merge_visuals(&mut self, extracted: HashMap<String, String>) {
        for (name, description) in extracted {
            self.character_visuals.entry(name).or_insert(description);
        }
    }
}

pub fn placeholder_title(chapter_number: u32) -> String {
    format!("Chapter {chapter_number}")
}

pub fn placeholder_summary(chapter_number: u32) -> String {
    format!("Chapter {chapter_number} continued the adventure.")
}

enum DeferredTask {
    SummarizeChapter { chapter_number: u32, content: String },
    ExtractVisuals { content: String },
}

/// Owns the deferred-task queue and the supervised task group for one
/// session.
pub struct BackgroundTaskCoordinator {
    llm: Arc<dyn LlmPort>,
    artifacts: Arc<Mutex<EnrichmentArtifacts>>,
    tracker: TaskTracker,
    deferred: Vec<DeferredTask>,
}

impl BackgroundTaskCoordinator {
    pub fn new(llm: Arc<dyn LlmPort>, artifacts: Arc<Mutex<EnrichmentArtifacts>>) -> Self {
        Self {
            llm,
            artifacts,
            tracker: TaskTracker::new(),
            deferred: Vec::new(),
        }
    }

    pub fn artifacts(&self) -> Arc<Mutex<EnrichmentArtifacts>> {
        Arc::clone(&self.artifacts)
    }

    /// Queue both enrichment tasks for a finished chapter without
    /// starting them. Summary chapters are their own aggregation and
    /// are never enriched.
    pub fn enqueue(&mut self, chapter: &ChapterData) {
        if chapter.chapter_type == ChapterType::Summary {
            return;
        }
        self.deferred.push(DeferredTask::SummarizeChapter {
            chapter_number: chapter.chapter_number,
            content: chapter.content.clone(),
        });
        self.deferred.push(DeferredTask::ExtractVisuals {
            content: chapter.content.clone(),
        });
    }

    /// Spawn everything enqueued since the last call. Invoked only
    /// after the current chapter's stream has fully flushed.
    pub fn run_deferred(&mut self) {
        for task in self.deferred.drain(..) {
            let llm = Arc::clone(&self.llm);
            let artifacts = Arc::clone(&self.artifacts);
            match task {
                DeferredTask::SummarizeChapter {
                    chapter_number,
                    content,
                } => {
                    self.tracker.spawn(async move {
                        summarize_chapter(llm, artifacts, chapter_number, &content).await;
                    });
                }
                DeferredTask::ExtractVisuals { content } => {
                    self.tracker.spawn(async move {
                        extract_visuals(llm, artifacts, &content).await;
                    });
                }
            }
        }
    }

    /// Spawn an unrelated task into the same supervised group so
    /// `await_all` covers it (image pushes use this).
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    /// Block until every task spawned for this session has finished,
    /// success or failure.
    pub async fn await_all(&mut self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of tasks enqueued but not yet spawned.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

async fn summarize_chapter(
    llm: Arc<dyn LlmPort>,
    artifacts: Arc<Mutex<EnrichmentArtifacts>>,
    chapter_number: u32,
    content: &str,
) {
    let request = ChapterRequest::new(prompts::summary_prompt(chapter_number, content));
    let parsed = match llm.generate(request).await {
        Ok(text) => response_parser::parse_summary_text(&text),
        Err(e) => {
            tracing::warn!(chapter = chapter_number, error = %e, "Chapter summarization failed");
            None
        }
    };

    let (title, summary) = match parsed {
        Some(p) if !p.summary.is_empty() => {
            let title = if p.title.is_empty() {
                placeholder_title(chapter_number)
            } else {
                p.title
            };
            (title, p.summary)
        }
        _ => (
            placeholder_title(chapter_number),
            placeholder_summary(chapter_number),
        ),
    };

    let mut guard = artifacts.lock().await;
    guard.set_summary(chapter_number, title, summary);
}

async fn extract_visuals(
    llm: Arc<dyn LlmPort>,
    artifacts: Arc<Mutex<EnrichmentArtifacts>>,
    content: &str,
) {
    // Snapshot known names without holding the lock across the call.
    let known: Vec<String> = {
        let guard = artifacts.lock().await;
        guard.character_visuals.keys().cloned().collect()
    };

    let request = ChapterRequest::new(prompts::visuals_prompt(content, &known));
    match llm.generate(request).await {
        Ok(text) => {
            let extracted = response_parser::parse_visuals_text(&text);
            if !extracted.is_empty() {
                let mut guard = artifacts.lock().await;
                guard.merge_visuals(extracted);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Character visual extraction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockLlmPort;
    use std::time::Duration;

    fn story_chapter(n: u32) -> ChapterData {
        ChapterData::new(n, ChapterType::Story, format!("Chapter {n} text"))
    }

    #[test]
    fn set_summary_pads_earlier_slots() {
        let mut artifacts = EnrichmentArtifacts::default();
        artifacts.set_summary(4, "The Gate".into(), "They reached the gate.".into());

        assert_eq!(artifacts.chapter_summaries.len(), 4);
        assert_eq!(artifacts.summary_chapter_titles.len(), 4);
        assert_eq!(artifacts.chapter_summaries[3], "They reached the gate.");
        assert_eq!(artifacts.chapter_summaries[0], placeholder_summary(1));
    }

    #[test]
    fn merge_visuals_never_overwrites() {
        let mut artifacts = EnrichmentArtifacts::default();
        artifacts
            .character_visuals
            .insert("Fox".into(), "a red fox".into());

        artifacts.merge_visuals(HashMap::from([
            ("Fox".to_string(), "something else".to_string()),
            ("Owl".to_string(), "a grey owl".to_string()),
        ]));

        assert_eq!(artifacts.character_visuals["Fox"], "a red fox");
        assert_eq!(artifacts.character_visuals["Owl"], "a grey owl");
    }

    #[tokio::test]
    async fn deferred_tasks_do_not_run_until_released() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Ok("TITLE: T\nSUMMARY: S".to_string()));

        let artifacts = Arc::new(Mutex::new(EnrichmentArtifacts::default()));
        let mut coordinator = BackgroundTaskCoordinator::new(Arc::new(llm), artifacts.clone());

        coordinator.enqueue(&story_chapter(1));
        assert_eq!(coordinator.deferred_len(), 2);
        assert!(artifacts.lock().await.chapter_summaries.is_empty());

        coordinator.run_deferred();
        assert_eq!(coordinator.deferred_len(), 0);
        coordinator.await_all().await;

        let guard = artifacts.lock().await;
        assert_eq!(guard.chapter_summaries, vec!["S".to_string()]);
        assert_eq!(guard.summary_chapter_titles, vec!["T".to_string()]);
    }

    #[tokio::test]
    async fn failed_summary_becomes_a_placeholder() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate().returning(|_| {
            Err(crate::infrastructure::ports::LlmError::RequestFailed(
                "down".into(),
            ))
        });

        let artifacts = Arc::new(Mutex::new(EnrichmentArtifacts::default()));
        let mut coordinator = BackgroundTaskCoordinator::new(Arc::new(llm), artifacts.clone());

        coordinator.enqueue(&story_chapter(2));
        coordinator.run_deferred();
        coordinator.await_all().await;

        let guard = artifacts.lock().await;
        assert_eq!(guard.chapter_summaries.len(), 2);
        assert_eq!(guard.chapter_summaries[1], placeholder_summary(2));
        assert!(guard.character_visuals.is_empty());
    }

    /// Hand-rolled mock that yields before answering so concurrent
    /// readers get a chance to interleave.
    struct SlowLlm;

    #[async_trait::async_trait]
    impl crate::infrastructure::ports::LlmPort for SlowLlm {
        async fn stream_chapter(
            &self,
            _request: ChapterRequest,
        ) -> Result<crate::infrastructure::ports::ChunkStream, crate::infrastructure::ports::LlmError>
        {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        async fn generate(
            &self,
            _request: ChapterRequest,
        ) -> Result<String, crate::infrastructure::ports::LlmError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("TITLE: Four\nSUMMARY: Chapter four happened.".to_string())
        }
    }

    #[tokio::test]
    async fn concurrent_write_and_read_never_see_a_short_list() {
        let artifacts = Arc::new(Mutex::new(EnrichmentArtifacts::default()));
        let mut coordinator = BackgroundTaskCoordinator::new(Arc::new(SlowLlm), artifacts.clone());

        coordinator.enqueue(&story_chapter(4));
        coordinator.run_deferred();

        // A reveal-style reader racing the background writer.
        let reader_artifacts = artifacts.clone();
        let reader = tokio::spawn(async move {
            let guard = reader_artifacts.lock().await;
            guard.chapter_summaries.len()
        });

        let observed = reader.await.expect("reader task");
        coordinator.await_all().await;

        let final_len = artifacts.lock().await.chapter_summaries.len();
        // The reader saw either nothing (writer not started) or the
        // fully padded list; after both complete the slot exists.
        assert!(observed == 0 || observed >= 4);
        assert!(final_len >= 4);
    }

    #[tokio::test]
    async fn summary_chapters_are_not_enriched() {
        let llm = MockLlmPort::new();
        let artifacts = Arc::new(Mutex::new(EnrichmentArtifacts::default()));
        let mut coordinator = BackgroundTaskCoordinator::new(Arc::new(llm), artifacts);

        coordinator.enqueue(&ChapterData::new(11, ChapterType::Summary, "Recap"));
        assert_eq!(coordinator.deferred_len(), 0);
    }
}
