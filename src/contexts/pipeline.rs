use crate::contexts::code_extractor::{CodeExtractor, ExtractionError};
use crate::contexts::code_synthesizer::{CodeSynthesizer, SynthesisError, TextCompletion};
use crate::contexts::content_provider::{ContentProvider, keywords_or_default};
use crate::contexts::renderer::Renderer;
use crate::contexts::story_formatter::build_story;
use crate::data::{RenderResult, SCENE_NAME, Story};
use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Synthesize,
    Extract,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch content",
            Stage::Synthesize => "synthesize code",
            Stage::Extract => "extract code",
            Stage::Render => "render animation",
        };
        f.write_str(name)
    }
}

/// Timing and result of a single stage
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub succeeded: bool,
    pub duration: Duration,
}

/// The story for a run together with the timing of the fetch that produced it
#[derive(Debug, Clone)]
pub struct FetchedStory {
    pub story: Story,
    /// Whether the story came from fetched content rather than the fallback
    pub used_content: bool,
    pub record: StageRecord,
}

/// How a pipeline run ended
#[derive(Debug)]
pub enum PipelineOutcome {
    Rendered {
        source_path: PathBuf,
        result: RenderResult,
    },
    SynthesisFailed(SynthesisError),
    ExtractionFailed(ExtractionError),
    RenderFailed {
        source_path: PathBuf,
        result: RenderResult,
    },
}

/// Everything a caller needs to report on a run
#[derive(Debug)]
pub struct PipelineReport {
    pub story: Story,
    /// Whether the story came from fetched content rather than the fallback
    pub used_content: bool,
    pub outcome: PipelineOutcome,
    pub stages: Vec<StageRecord>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Rendered { .. })
    }

    /// The stage that stopped the run, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.stages.iter().find(|r| !r.succeeded).map(|r| r.stage)
    }
}

/// Runs content → story → code → video once.
///
/// Stages run strictly in sequence. Content problems fall back to the built-in
/// story; a synthesis, persistence or render failure ends the run and is
/// reported in the returned `PipelineReport` rather than raised.
pub struct Pipeline<P, C>
where
    P: ContentProvider,
    C: TextCompletion,
{
    provider: P,
    synthesizer: CodeSynthesizer<C>,
    extractor: CodeExtractor,
    renderer: Renderer,
    keywords: String,
    language: String,
}

impl<P, C> Pipeline<P, C>
where
    P: ContentProvider,
    C: TextCompletion,
{
    pub fn new(
        provider: P,
        synthesizer: CodeSynthesizer<C>,
        extractor: CodeExtractor,
        renderer: Renderer,
    ) -> Self {
        Self {
            provider,
            synthesizer,
            extractor,
            renderer,
            keywords: String::new(),
            language: crate::contexts::DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn synthesizer(&self) -> &CodeSynthesizer<C> {
        &self.synthesizer
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Fetches content and formats the story for this run
    pub async fn story(&self) -> FetchedStory {
        let started = Instant::now();
        let keywords = keywords_or_default(&self.keywords);
        let item = self.provider.fetch(keywords, &self.language).await;
        if item.is_none() {
            info!("No content available; using the built-in story");
        }

        FetchedStory {
            story: build_story(item.as_ref()),
            used_content: item.is_some(),
            // Content problems fall back to the built-in story, so fetching never fails
            record: record(Stage::Fetch, true, started),
        }
    }

    /// Runs every stage, rendering without a cancellation signal
    pub async fn run(&self) -> PipelineReport {
        let fetched = self.story().await;
        self.run_story(fetched, std::future::pending()).await
    }

    /// Runs synthesis, extraction and rendering for an already fetched story.
    ///
    /// Completing `cancel` while the engine runs kills it and ends the run
    /// with a render failure.
    pub async fn run_story<F>(&self, fetched: FetchedStory, cancel: F) -> PipelineReport
    where
        F: Future<Output = ()>,
    {
        let FetchedStory {
            story,
            used_content,
            record: fetch_record,
        } = fetched;
        let mut stages = Vec::with_capacity(4);
        stages.push(fetch_record);

        let started = Instant::now();
        let reply = match self.synthesizer.synthesize(&story).await {
            Ok(reply) => {
                stages.push(record(Stage::Synthesize, true, started));
                reply
            }
            Err(e) => {
                error!(error = %e, "generate code error");
                stages.push(record(Stage::Synthesize, false, started));
                return PipelineReport {
                    story,
                    used_content,
                    outcome: PipelineOutcome::SynthesisFailed(e),
                    stages,
                };
            }
        };

        let started = Instant::now();
        let source_path = match self.extractor.persist(&reply) {
            Ok(path) => {
                stages.push(record(Stage::Extract, true, started));
                path
            }
            Err(e) => {
                error!(error = %e, "Failed to persist generated code");
                stages.push(record(Stage::Extract, false, started));
                return PipelineReport {
                    story,
                    used_content,
                    outcome: PipelineOutcome::ExtractionFailed(e),
                    stages,
                };
            }
        };
        // Keep going on a mismatch; the engine reports it as a render failure
        warn_if_scene_missing(&source_path);

        let started = Instant::now();
        let result = self
            .renderer
            .render_until(&source_path, SCENE_NAME, cancel)
            .await;
        let succeeded = result.is_success();
        stages.push(record(Stage::Render, succeeded, started));

        let outcome = if succeeded {
            PipelineOutcome::Rendered {
                source_path,
                result,
            }
        } else {
            PipelineOutcome::RenderFailed {
                source_path,
                result,
            }
        };

        PipelineReport {
            story,
            used_content,
            outcome,
            stages,
        }
    }
}

fn record(stage: Stage, succeeded: bool, started: Instant) -> StageRecord {
    StageRecord {
        stage,
        succeeded,
        duration: started.elapsed(),
    }
}

/// The engine only reports a missing scene after it has started, so flag it early
fn warn_if_scene_missing(source_path: &Path) {
    match fs::read_to_string(source_path) {
        Ok(code) if !code.contains(SCENE_NAME) => {
            warn!(
                scene = SCENE_NAME,
                path = %source_path.display(),
                "Generated code does not mention the expected scene; rendering will likely fail"
            );
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not re-read generated source"),
    }
}
