mod code_extractor;
mod code_synthesizer;
mod content_provider;
mod pipeline;
mod renderer;
mod story_formatter;

pub use code_extractor::{
    CodeExtractor, DEFAULT_SOURCE_PATH, Extraction, ExtractionError, ExtractionMethod, extract,
    extract_code,
};
pub use code_synthesizer::{
    CodeSynthesizer, CompletionRequest, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    PromptTemplate, SynthesisError, TextCompletion,
};
pub use content_provider::{
    ContentProvider, DEFAULT_KEYWORDS, DEFAULT_LANGUAGE, NoContent, keywords_or_default,
};
pub use pipeline::{FetchedStory, Pipeline, PipelineOutcome, PipelineReport, Stage, StageRecord};
pub use renderer::{
    DEFAULT_ENGINE, DEFAULT_MAX_CAPTURE_BYTES, DEFAULT_QUALITY_FLAG, EngineCommandError, Renderer,
};
pub use story_formatter::{FALLBACK_STORY, FALLBACK_TITLE, build_story};
