//! The adventure session state machine.
//!
//! One `AdventureSession` per websocket connection. The receive loop
//! in `api/websocket.rs` owns it and feeds it parsed envelopes; this
//! module decides what each message means in the current phase,
//! drives generation and streaming, hands finished chapters to the
//! background coordinator, and persists after every chapter.
//!
//! Ordering guarantees kept here:
//! - a chapter's stream always flushes before its enrichment spawns
//! - the persist for chapter N happens after N's response is recorded
//!   and before N+1 generation begins
//! - `await_all` runs before the summary chapter is assembled

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use taleweaver_domain::{
    determine_story_phase, plan_chapter_types, AdventureId, AdventureSeed, AdventureState,
    AgencyState, ChapterData, ChapterResponse, ChapterType, Choice, DomainError, LessonResponse,
    NarrativeElements, QuestionRecord, SensoryDetails, StoryResponse, UserId, MIN_STORY_LENGTH,
};
use taleweaver_shared::{
    parse_start_config, parse_state_patch, AdventureStatus, ChoiceCommand, ChoiceOption,
    ClientChoice, ClientEnvelope, ServerMessage, StartConfig, StoryCompleteState,
};

use crate::infrastructure::ports::{
    ChapterRequest, ClockPort, ContentRepo, ImageGenPort, LlmPort, StateStorePort, TelemetryPort,
};
use crate::prompts;

use super::enrichment::{BackgroundTaskCoordinator, EnrichmentArtifacts};
use super::reconstruct;
use super::response_parser;

/// What the session pushes at the socket: JSON events, or raw prose
/// chunks while a chapter is streaming.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Event(ServerMessage),
    Chunk(String),
}

/// Tunables fixed at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_story_length: usize,
    pub max_story_length: usize,
    /// Bound on every auxiliary image call; expiry means no image.
    pub image_timeout: Duration,
    pub images_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_story_length: 10,
            max_story_length: 20,
            image_timeout: Duration::from_secs(45),
            images_enabled: true,
        }
    }
}

/// Protocol phases, in the order a healthy session moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingConnect,
    AwaitingInitialState,
    StreamingChapter,
    AwaitingChoice,
    StoryComplete,
    AwaitingSummaryReveal,
    SummaryRevealed,
}

pub struct AdventureSession {
    llm: Arc<dyn LlmPort>,
    image_gen: Arc<dyn ImageGenPort>,
    store: Arc<dyn StateStorePort>,
    content: Arc<dyn ContentRepo>,
    telemetry: Arc<dyn TelemetryPort>,
    clock: Arc<dyn ClockPort>,
    config: SessionConfig,
    outbound: mpsc::Sender<OutboundFrame>,

    phase: SessionPhase,
    state: Option<AdventureState>,
    artifacts: Arc<Mutex<EnrichmentArtifacts>>,
    enrichment: BackgroundTaskCoordinator,
    rng: StdRng,
    user_id: Option<UserId>,
    client_key: Option<String>,
    question_pool: Vec<QuestionRecord>,
}

impl AdventureSession {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        image_gen: Arc<dyn ImageGenPort>,
        store: Arc<dyn StateStorePort>,
        content: Arc<dyn ContentRepo>,
        telemetry: Arc<dyn TelemetryPort>,
        clock: Arc<dyn ClockPort>,
        config: SessionConfig,
        outbound: mpsc::Sender<OutboundFrame>,
        user_id: Option<UserId>,
        client_key: Option<String>,
        seed: u64,
    ) -> Self {
        let artifacts = Arc::new(Mutex::new(EnrichmentArtifacts::default()));
        let enrichment = BackgroundTaskCoordinator::new(Arc::clone(&llm), Arc::clone(&artifacts));
        Self {
            llm,
            image_gen,
            store,
            content,
            telemetry,
            clock,
            config,
            outbound,
            phase: SessionPhase::AwaitingConnect,
            state: None,
            artifacts,
            enrichment,
            rng: StdRng::seed_from_u64(seed),
            user_id,
            client_key,
            question_pool: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> Option<&AdventureState> {
        self.state.as_ref()
    }

    /// Attempt resumption, then tell the client what it connected to.
    pub async fn on_connect(&mut self) {
        let stored = self.lookup_stored().await;

        let Some(raw) = stored else {
            self.phase = SessionPhase::AwaitingInitialState;
            self.emit_event(ServerMessage::AdventureStatus {
                status: AdventureStatus::New,
            })
            .await;
            return;
        };

        let topic = raw
            .get("lesson_topic")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.content.default_topic());
        let available = self.content.question_count(&topic);
        let now = self.clock.now();
        let rng = &mut self.rng;
        let mut pick = |n: usize| rng.gen_range(0..n);

        match reconstruct::reconstruct(&raw, available, now, &mut pick) {
            Some(state) => {
                self.telemetry.log_event(
                    "adventure_resumed",
                    serde_json::json!({
                        "adventure_id": state.id.to_string(),
                        "chapters": state.chapters.len(),
                    }),
                );
                *self.artifacts.lock().await = EnrichmentArtifacts::from_state(&state);
                self.question_pool = remaining_questions(
                    self.content.lesson_questions(&topic, usize::MAX),
                    &state,
                );
                let current = state.chapters.len() as u32;
                let total = state.story_length;
                self.state = Some(state);

                self.emit_event(ServerMessage::AdventureStatus {
                    status: AdventureStatus::Existing,
                })
                .await;
                self.emit_event(ServerMessage::AdventureLoaded {
                    current_chapter: current,
                    total_chapters: total,
                })
                .await;
                self.resume_at_current_chapter().await;
            }
            None => {
                // Unusable persisted data: the client starts fresh.
                self.phase = SessionPhase::AwaitingInitialState;
                self.emit_event(ServerMessage::AdventureStatus {
                    status: AdventureStatus::New,
                })
                .await;
            }
        }
    }

    async fn lookup_stored(&self) -> Option<Value> {
        if let Some(user_id) = self.user_id {
            match self.store.find_for_user(user_id).await {
                Ok(Some(found)) => return Some(found.state),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "User adventure lookup failed"),
            }
        }
        if let Some(key) = self.client_key.clone() {
            match self.store.find_by_client_key(key).await {
                Ok(Some(found)) => return Some(found.state),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Client-key adventure lookup failed"),
            }
        }
        None
    }

    /// Place a resumed session back into the right phase, re-sending
    /// the unanswered chapter when there is one.
    async fn resume_at_current_chapter(&mut self) {
        let Some(state) = &self.state else {
            return;
        };

        let story_done = state.all_chapters_generated()
            && state
                .last_chapter()
                .is_some_and(|c| c.chapter_type != ChapterType::Summary);
        let needs_answer = state
            .last_chapter()
            .is_some_and(|c| c.response.is_none() && requires_response(c.chapter_type));

        if state.has_summary_chapter() {
            self.phase = SessionPhase::SummaryRevealed;
        } else if story_done && !needs_answer {
            self.phase = SessionPhase::AwaitingSummaryReveal;
            let stats = state.statistics();
            self.emit_event(ServerMessage::StoryComplete {
                state: StoryCompleteState { stats },
            })
            .await;
        } else if needs_answer {
            self.replay_current_chapter().await;
            self.phase = SessionPhase::AwaitingChoice;
        } else {
            // Last chapter was answered but the next never streamed.
            self.phase = SessionPhase::AwaitingChoice;
            self.stream_next_chapter().await;
        }
    }

    /// Re-send the stored unanswered chapter verbatim; no regeneration.
    async fn replay_current_chapter(&mut self) {
        let Some(state) = &self.state else {
            return;
        };
        let Some(chapter) = state.last_chapter() else {
            return;
        };

        let content = chapter.content.clone();
        let chapter_number = chapter.chapter_number;
        let total = state.story_length;
        let options = choice_options(chapter);

        let snapshot = self.snapshot_with_artifacts().await;
        self.emit_chunk(content).await;
        self.emit_event(ServerMessage::ChapterUpdate {
            current_chapter: chapter_number,
            total_chapters: total,
            state: snapshot,
        })
        .await;
        if !options.is_empty() {
            self.emit_event(ServerMessage::Choices { choices: options }).await;
        }
        self.emit_event(ServerMessage::HideLoader).await;
    }

    /// Entry point for every parsed client message.
    pub async fn handle_envelope(&mut self, envelope: ClientEnvelope) {
        // Merge client-side state refinements before acting on the
        // choice; a structural violation rejects the whole message.
        if let Some(state_value) = &envelope.state {
            if self.state.is_some() && !matches!(self.phase, SessionPhase::AwaitingInitialState) {
                if let Some(patch) = parse_state_patch(state_value) {
                    if let Err(e) = self.apply_patch(patch) {
                        self.emit_event(ServerMessage::Error {
                            message: format!("Rejected state update: {e}"),
                        })
                        .await;
                        return;
                    }
                }
            }
        }

        match envelope.choice.command() {
            Some(ChoiceCommand::Start) => self.handle_start(envelope.state.as_ref()).await,
            Some(ChoiceCommand::RevealSummary) => self.handle_reveal_summary().await,
            Some(ChoiceCommand::Unknown) => {
                self.emit_event(ServerMessage::Error {
                    message: "Unknown command".to_string(),
                })
                .await;
            }
            None => {
                if let ClientChoice::Picked {
                    chosen_path,
                    choice_text,
                } = envelope.choice
                {
                    self.handle_choice(chosen_path, choice_text).await;
                }
            }
        }
    }

    fn apply_patch(&mut self, patch: taleweaver_domain::StatePatch) -> Result<(), DomainError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.apply_client_patch(patch)?;
        for warning in state.soft_consistency_warnings() {
            tracing::warn!(adventure_id = %state.id, warning = %warning, "Soft consistency check");
        }
        Ok(())
    }

    async fn handle_start(&mut self, state_value: Option<&Value>) {
        if self.state.is_some() {
            // A resumed client (or one retrying after a first-chapter
            // failure) re-sending "start": pick up where we are, don't
            // reset.
            let no_chapters_yet = self
                .state
                .as_ref()
                .is_some_and(|s| s.chapters.is_empty());
            if no_chapters_yet {
                self.stream_next_chapter().await;
            } else {
                self.replay_current_chapter().await;
                if matches!(self.phase, SessionPhase::AwaitingConnect) {
                    self.phase = SessionPhase::AwaitingChoice;
                }
            }
            return;
        }
        if !matches!(
            self.phase,
            SessionPhase::AwaitingInitialState | SessionPhase::AwaitingConnect
        ) {
            self.emit_event(ServerMessage::Error {
                message: "Adventure already started".to_string(),
            })
            .await;
            return;
        }

        let config = parse_start_config(state_value);
        match self.initialize_state(config) {
            Ok(()) => {
                self.persist().await;
                self.stream_next_chapter().await;
            }
            Err(e) => {
                self.emit_event(ServerMessage::Error {
                    message: format!("Could not start the adventure: {e}"),
                })
                .await;
            }
        }
    }

    /// Make every init-time selection and build the fresh state.
    fn initialize_state(&mut self, config: StartConfig) -> Result<(), DomainError> {
        let story_length = config
            .story_length
            .unwrap_or(self.config.default_story_length)
            .clamp(MIN_STORY_LENGTH, self.config.max_story_length);
        let topic = config
            .lesson_topic
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.content.default_topic());
        let available = self.content.question_count(&topic);

        let planned = {
            let rng = &mut self.rng;
            let mut pick = |n: usize| rng.gen_range(0..n);
            plan_chapter_types(story_length, available, &mut pick)?
        };
        let lesson_count = planned
            .iter()
            .filter(|t| **t == ChapterType::Lesson)
            .count();
        self.question_pool = self.content.lesson_questions(&topic, lesson_count);

        let pools = self.content.narrative_pools();
        let elements = NarrativeElements {
            setting: self.pick_from(&pools.settings, NarrativeElements::default().setting),
            characters: self.pick_from(&pools.characters, NarrativeElements::default().characters),
            objects: self.pick_from(&pools.objects, NarrativeElements::default().objects),
            events: self.pick_from(&pools.events, NarrativeElements::default().events),
        };
        let details = SensoryDetails {
            visuals: self.pick_from(&pools.visuals, SensoryDetails::default().visuals),
            sounds: self.pick_from(&pools.sounds, SensoryDetails::default().sounds),
            smells: self.pick_from(&pools.smells, SensoryDetails::default().smells),
        };

        let agency = config.agency.map(|pick| AgencyState {
            category: pick.category,
            name: pick.name,
            description: pick.description,
            referenced_chapters: Vec::new(),
        });

        let state = AdventureState::new(AdventureSeed {
            id: AdventureId::new(),
            user_id: self.user_id,
            client_key: self.client_key.clone(),
            story_length,
            planned_chapter_types: planned,
            selected_theme: self.pick_from(
                &pools.themes,
                taleweaver_domain::DEFAULT_THEME.to_string(),
            ),
            selected_moral_teaching: self.pick_from(
                &pools.moral_teachings,
                taleweaver_domain::DEFAULT_MORAL_TEACHING.to_string(),
            ),
            selected_plot_twist: self.pick_from(
                &pools.plot_twists,
                taleweaver_domain::DEFAULT_PLOT_TWIST.to_string(),
            ),
            selected_narrative_elements: elements,
            selected_sensory_details: details,
            lesson_topic: topic,
            agency,
            now: self.clock.now(),
        })?;

        self.telemetry.log_event(
            "adventure_started",
            serde_json::json!({
                "adventure_id": state.id.to_string(),
                "story_length": state.story_length,
                "lessons": lesson_count,
            }),
        );
        self.state = Some(state);
        Ok(())
    }

    fn pick_from(&mut self, pool: &[String], fallback: String) -> String {
        if pool.is_empty() {
            return fallback;
        }
        pool[self.rng.gen_range(0..pool.len())].clone()
    }

    async fn handle_choice(&mut self, chosen_path: String, choice_text: String) {
        if !matches!(self.phase, SessionPhase::AwaitingChoice) {
            self.emit_event(ServerMessage::Error {
                message: "No choice is expected right now".to_string(),
            })
            .await;
            return;
        }
        let Some(state) = self.state.as_mut() else {
            self.emit_event(ServerMessage::Error {
                message: "No adventure in progress".to_string(),
            })
            .await;
            return;
        };
        let Some(answered) = state.last_chapter() else {
            return;
        };

        let answered_number = answered.chapter_number;
        let response = match answered.chapter_type {
            ChapterType::Lesson => {
                let is_correct = answered
                    .question
                    .as_ref()
                    .and_then(|q| q.correct_answer())
                    .map(|correct| correct.trim().eq_ignore_ascii_case(choice_text.trim()))
                    .unwrap_or(false);
                ChapterResponse::Lesson(LessonResponse {
                    answer: choice_text.clone(),
                    is_correct,
                })
            }
            _ => ChapterResponse::Story(StoryResponse {
                chosen_path,
                choice_text: choice_text.clone(),
            }),
        };

        if let Err(e) = state.record_response(answered_number, response) {
            self.emit_event(ServerMessage::Error {
                message: format!("Could not record that choice: {e}"),
            })
            .await;
            return;
        }

        let answered_chapter = state
            .chapter(answered_number)
            .cloned()
            .unwrap_or_else(|| ChapterData::new(answered_number, ChapterType::Story, ""));
        // Deferred, not yet running: the tasks spawn only after the
        // next chapter's stream has flushed.
        self.enrichment.enqueue(&answered_chapter);

        self.telemetry.log_event(
            "choice_recorded",
            serde_json::json!({
                "chapter": answered_number,
                "choice": choice_text,
            }),
        );

        // Persist chapter N's response before N+1 generation begins.
        self.persist().await;
        self.stream_next_chapter().await;
    }

    /// Generate and stream the next planned chapter.
    async fn stream_next_chapter(&mut self) {
        let (chapter_number, chapter_type, phase) = {
            let Some(state) = self.state.as_ref() else {
                return;
            };
            let Some(chapter_type) = state.next_chapter_type() else {
                return;
            };
            let chapter_number = state.next_chapter_number();
            (
                chapter_number,
                chapter_type,
                determine_story_phase(chapter_number, state.story_length),
            )
        };

        let question = if chapter_type == ChapterType::Lesson {
            let q = self.next_question();
            if q.is_none() {
                tracing::warn!(
                    chapter = chapter_number,
                    "Question pool exhausted, lesson chapter runs without a question"
                );
            }
            q
        } else {
            None
        };

        let request = {
            let Some(state) = self.state.as_ref() else {
                return;
            };
            let prompt = prompts::chapter_prompt(
                state,
                chapter_number,
                chapter_type,
                phase,
                question.as_ref(),
            );
            ChapterRequest::new(prompt)
                .with_system_prompt(prompts::SYSTEM_PROMPT)
                .with_temperature(0.9)
        };

        self.phase = SessionPhase::StreamingChapter;

        let mut stream = match self.llm.stream_chapter(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.report_generation_failure(chapter_number, e).await;
                return;
            }
        };

        let mut full_text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    full_text.push_str(&text);
                    self.emit_chunk(text).await;
                }
                Err(e) => {
                    // The partial chapter is abandoned; the client can
                    // retry and a fresh stream starts over.
                    self.report_generation_failure(chapter_number, e).await;
                    return;
                }
            }
        }

        let parsed = response_parser::parse_chapter_text(&full_text);
        let mut chapter = ChapterData::new(chapter_number, chapter_type, parsed.content);
        match chapter_type {
            ChapterType::Story => {
                chapter.choices = repair_choices(parsed.choices, chapter_number);
            }
            ChapterType::Lesson => {
                if let Some(q) = question.clone() {
                    chapter.question = Some(q);
                }
            }
            _ => {}
        }

        let append_result = {
            let Some(state) = self.state.as_mut() else {
                return;
            };
            state.append_chapter(chapter.clone()).map(|()| {
                if let Some(q) = question {
                    state.set_lesson_question(chapter_number, q);
                }
            })
        };
        if let Err(e) = append_result {
            tracing::error!(chapter = chapter_number, error = %e, "Generated chapter rejected");
            self.report_generation_failure_message(chapter_number).await;
            return;
        }

        let (total, is_conclusion) = {
            let Some(state) = self.state.as_ref() else {
                return;
            };
            (
                state.story_length,
                chapter_type == ChapterType::Conclusion,
            )
        };

        let snapshot = self.snapshot_with_artifacts().await;
        self.emit_event(ServerMessage::ChapterUpdate {
            current_chapter: chapter_number,
            total_chapters: total,
            state: snapshot,
        })
        .await;
        let options = choice_options(&chapter);
        if !options.is_empty() {
            self.emit_event(ServerMessage::Choices {
                choices: options.clone(),
            })
            .await;
        }
        self.emit_event(ServerMessage::HideLoader).await;

        // The stream has fully flushed: release the deferred
        // enrichment for the previously answered chapter, and queue
        // the conclusion's own enrichment right away (nothing answers
        // a conclusion).
        if is_conclusion {
            self.enrichment.enqueue(&chapter);
        }
        self.enrichment.run_deferred();
        self.spawn_image_tasks(&chapter).await;

        self.persist().await;

        if is_conclusion {
            self.phase = SessionPhase::StoryComplete;
            let stats = self
                .state
                .as_ref()
                .map(|s| s.statistics())
                .unwrap_or(taleweaver_domain::AdventureStatistics {
                    questions_answered: 0,
                    questions_correct: 0,
                    chapters_completed: 0,
                });
            self.emit_event(ServerMessage::StoryComplete {
                state: StoryCompleteState { stats },
            })
            .await;
            self.phase = SessionPhase::AwaitingSummaryReveal;
        } else {
            self.phase = SessionPhase::AwaitingChoice;
        }
    }

    fn next_question(&mut self) -> Option<QuestionRecord> {
        if self.question_pool.is_empty() {
            return None;
        }
        Some(self.question_pool.remove(0))
    }

    async fn report_generation_failure(
        &mut self,
        chapter_number: u32,
        error: crate::infrastructure::ports::LlmError,
    ) {
        tracing::warn!(chapter = chapter_number, error = %error, "Chapter generation failed");
        self.report_generation_failure_message(chapter_number).await;
    }

    async fn report_generation_failure_message(&mut self, chapter_number: u32) {
        self.telemetry.log_event(
            "generation_failed",
            serde_json::json!({ "chapter": chapter_number }),
        );
        self.emit_event(ServerMessage::Error {
            message: format!(
                "The storyteller lost the thread on chapter {chapter_number}. Please try again."
            ),
        })
        .await;
        self.emit_event(ServerMessage::HideLoader).await;
        // The session stays open; the client retries its last action.
        self.phase = if self.state.as_ref().is_some_and(|s| !s.chapters.is_empty()) {
            SessionPhase::AwaitingChoice
        } else {
            SessionPhase::AwaitingInitialState
        };
    }

    async fn handle_reveal_summary(&mut self) {
        if !matches!(
            self.phase,
            SessionPhase::StoryComplete | SessionPhase::AwaitingSummaryReveal
        ) {
            self.emit_event(ServerMessage::Error {
                message: "The story is not finished yet".to_string(),
            })
            .await;
            return;
        }
        if self.state.is_none() {
            return;
        }

        // Every outstanding background task finishes before the
        // summary is assembled.
        self.enrichment.await_all().await;
        self.fill_missing_summaries().await;

        let Some(state) = self.state.as_mut() else {
            return;
        };
        let artifacts = self.artifacts.lock().await.clone();
        artifacts.apply_to_state(state);

        let summary_number = state.next_chapter_number();
        let content = build_summary_content(state);
        let summary_chapter = ChapterData::new(summary_number, ChapterType::Summary, content);
        if let Err(e) = state.append_chapter(summary_chapter) {
            tracing::error!(error = %e, "Could not append summary chapter");
            self.emit_event(ServerMessage::Error {
                message: "Could not assemble the summary".to_string(),
            })
            .await;
            return;
        }
        state.is_complete = true;
        let id = state.id;

        self.persist().await;
        if let Err(e) = self.store.mark_complete(id).await {
            tracing::warn!(error = %e, "Could not mark adventure complete");
        }
        self.telemetry.log_event(
            "summary_revealed",
            serde_json::json!({ "adventure_id": id.to_string() }),
        );

        self.emit_event(ServerMessage::SummaryReady {
            state_id: id.to_string(),
        })
        .await;
        let snapshot = self.snapshot_with_artifacts().await;
        self.emit_event(ServerMessage::SummaryComplete { state: snapshot })
            .await;
        self.phase = SessionPhase::SummaryRevealed;
    }

    /// Synchronously generate any summary/title still missing for
    /// chapters 1..=conclusion. Failures become placeholders.
    async fn fill_missing_summaries(&mut self) {
        let chapters: Vec<(u32, String)> = match self.state.as_ref() {
            Some(state) => state
                .chapters
                .iter()
                .filter(|c| c.chapter_type != ChapterType::Summary)
                .map(|c| (c.chapter_number, c.content.clone()))
                .collect(),
            None => return,
        };

        let missing: Vec<(u32, String)> = {
            let artifacts = self.artifacts.lock().await;
            chapters
                .into_iter()
                .filter(|(n, _)| !artifacts.has_summary(*n))
                .collect()
        };

        for (chapter_number, content) in missing {
            let request =
                ChapterRequest::new(prompts::summary_prompt(chapter_number, &content));
            let parsed = match self.llm.generate(request).await {
                Ok(text) => response_parser::parse_summary_text(&text),
                Err(e) => {
                    tracing::warn!(chapter = chapter_number, error = %e, "Reveal-time summarization failed");
                    None
                }
            };
            let (title, summary) = match parsed {
                Some(p) if !p.summary.is_empty() => (
                    if p.title.is_empty() {
                        super::enrichment::placeholder_title(chapter_number)
                    } else {
                        p.title
                    },
                    p.summary,
                ),
                _ => (
                    super::enrichment::placeholder_title(chapter_number),
                    super::enrichment::placeholder_summary(chapter_number),
                ),
            };
            let mut artifacts = self.artifacts.lock().await;
            artifacts.set_summary(chapter_number, title, summary);
        }
    }

    /// Push chapter and choice imagery in the background, each call
    /// bounded by the configured timeout.
    async fn spawn_image_tasks(&mut self, chapter: &ChapterData) {
        if !self.config.images_enabled {
            return;
        }
        let Some(state) = self.state.as_ref() else {
            return;
        };

        let mut jobs: Vec<(OutboundImageTarget, String)> = vec![(
            OutboundImageTarget::Chapter(chapter.chapter_number),
            prompts::chapter_image_prompt(state, &chapter.content),
        )];
        for choice in &chapter.choices {
            jobs.push((
                OutboundImageTarget::Choice(choice.id),
                prompts::choice_image_prompt(state, &choice.text),
            ));
        }

        for (target, prompt) in jobs {
            let image_gen = Arc::clone(&self.image_gen);
            let outbound = self.outbound.clone();
            let timeout = self.config.image_timeout;
            self.enrichment.spawn(async move {
                match tokio::time::timeout(timeout, image_gen.generate(prompt)).await {
                    Ok(Ok(image)) => {
                        let event = match target {
                            OutboundImageTarget::Chapter(chapter_number) => {
                                ServerMessage::ChapterImageUpdate {
                                    chapter_number,
                                    image: image.base64,
                                }
                            }
                            OutboundImageTarget::Choice(choice_id) => {
                                ServerMessage::ChoiceImageUpdate {
                                    choice_id,
                                    image: image.base64,
                                }
                            }
                        };
                        let _ = outbound.send(OutboundFrame::Event(event)).await;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "Image generation failed, no image sent");
                    }
                    Err(_) => {
                        tracing::debug!("Image generation timed out, no image sent");
                    }
                }
            });
        }
    }

    /// Serialize the state with the latest enrichment merged in.
    async fn snapshot_with_artifacts(&mut self) -> Value {
        let artifacts = self.artifacts.lock().await.clone();
        match self.state.as_mut() {
            Some(state) => {
                artifacts.apply_to_state(state);
                serde_json::to_value(&*state).unwrap_or(Value::Null)
            }
            None => Value::Null,
        }
    }

    /// Persist the current state. A failure is logged and in-memory
    /// progress is kept; the session just resumes from the last
    /// successful persist.
    async fn persist(&mut self) {
        let now = self.clock.now();
        if let Some(state) = self.state.as_mut() {
            state.updated_at = now;
        }
        let snapshot = self.snapshot_with_artifacts().await;
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if let Err(e) = self
            .store
            .store_state(
                state.id,
                snapshot,
                state.user_id,
                state.client_key.clone(),
            )
            .await
        {
            tracing::error!(adventure_id = %state.id, error = %e, "Persist failed; continuing in memory");
        }
    }

    async fn emit_event(&self, message: ServerMessage) {
        if self
            .outbound
            .send(OutboundFrame::Event(message))
            .await
            .is_err()
        {
            tracing::debug!("Outbound channel closed");
        }
    }

    async fn emit_chunk(&self, text: String) {
        if self
            .outbound
            .send(OutboundFrame::Chunk(text))
            .await
            .is_err()
        {
            tracing::debug!("Outbound channel closed mid-stream");
        }
    }
}

enum OutboundImageTarget {
    Chapter(u32),
    Choice(u32),
}

/// Chapter types the client must answer before the story moves on.
fn requires_response(chapter_type: ChapterType) -> bool {
    matches!(
        chapter_type,
        ChapterType::Story | ChapterType::Lesson | ChapterType::Reflect
    )
}

/// What the `choices` event should carry for a chapter: story
/// branches, or a lesson's answer options.
fn choice_options(chapter: &ChapterData) -> Vec<ChoiceOption> {
    match chapter.chapter_type {
        ChapterType::Lesson => chapter
            .question
            .as_ref()
            .map(|q| {
                q.answers
                    .iter()
                    .enumerate()
                    .map(|(i, a)| ChoiceOption {
                        id: i as u32 + 1,
                        text: a.text.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        ChapterType::Reflect => vec![ChoiceOption {
            id: 1,
            text: "Continue the journey".to_string(),
        }],
        _ => chapter
            .choices
            .iter()
            .map(|c| ChoiceOption {
                id: c.id,
                text: c.text.clone(),
            })
            .collect(),
    }
}

/// A generated story chapter must carry exactly three choices; trim
/// or pad rather than fail the whole chapter.
fn repair_choices(mut choices: Vec<Choice>, chapter_number: u32) -> Vec<Choice> {
    if choices.len() != 3 {
        tracing::warn!(
            chapter = chapter_number,
            parsed = choices.len(),
            "Generated choice count off, repairing"
        );
    }
    choices.truncate(3);
    while choices.len() < 3 {
        let id = choices.len() as u32 + 1;
        choices.push(Choice::new(id, format!("Continue along path {id}")));
    }
    for (i, choice) in choices.iter_mut().enumerate() {
        choice.id = i as u32 + 1;
    }
    choices
}

/// The questions not yet used by a resumed adventure.
fn remaining_questions(bank: Vec<QuestionRecord>, state: &AdventureState) -> Vec<QuestionRecord> {
    let used: Vec<_> = state
        .lesson_questions
        .iter()
        .flatten()
        .map(|q| q.id)
        .collect();
    bank.into_iter().filter(|q| !used.contains(&q.id)).collect()
}

/// Aggregate titles, summaries, and quiz results into the summary
/// chapter's text.
fn build_summary_content(state: &AdventureState) -> String {
    let mut content = String::from("What an adventure it has been! Here is the whole story:\n\n");

    for (i, summary) in state.chapter_summaries.iter().enumerate() {
        let title = state
            .summary_chapter_titles
            .get(i)
            .cloned()
            .unwrap_or_else(|| super::enrichment::placeholder_title(i as u32 + 1));
        content.push_str(&format!("Chapter {}: {title}\n{summary}\n\n", i + 1));
    }

    let stats = state.statistics();
    if stats.questions_answered > 0 {
        content.push_str(&format!(
            "You answered {} of {} questions correctly.\n",
            stats.questions_correct, stats.questions_answered
        ));
        for question in state.lesson_questions.iter().flatten() {
            if let (Some(answer), Some(correct)) =
                (&question.selected_answer, question.was_correct)
            {
                content.push_str(&format!(
                    "- {} You answered \"{answer}\" ({}).\n",
                    question.question,
                    if correct { "correct" } else { "incorrect" }
                ));
            }
        }
    }

    content.push_str(&format!(
        "\nAnd remember: {}\n",
        state.selected_moral_teaching
    ));
    content
}
