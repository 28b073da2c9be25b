use crate::data::{SCENE_NAME, Story, SynthesisRequest};
use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const SYSTEM_TEMPLATE: &str = r#"You are a professional Manim animation expert.
Please generate engaging Manim animation code based on the provided news content.
The code should include:
1. Required Manim imports
2. Clear scene class definition (use {{input.scene_name}} as class name)
3. High-quality settings (1080p/60fps)
4. Rich visual elements (text effects, shapes, transitions)
5. Professional animations and timing
6. Minimum 30-second duration
7. Do not output any text except the code

Example structure (do not copy directly):
```python
from manim import *
class {{input.scene_name}}(Scene):
    # Your animation code here
```
"#;

const USER_TEMPLATE: &str =
    "News content: {{input.story_text}}\nPlease generate corresponding Manim animation code.";

/// Errors that can occur while producing code from a story
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Required placeholder '{0}' could not be resolved")]
    MissingMandatoryPlaceholder(String),
    #[error("Invalid path '{0}' in placeholder")]
    InvalidPlaceholderPath(String),
    #[error("Synthesis request could not be serialized: {0}")]
    InvalidRequest(String),
    #[error("No API key configured for the code synthesis model")]
    MissingApiKey,
    #[error("Request to the code synthesis model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Code synthesis model returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Code synthesis response could not be parsed: {0}")]
    MalformedResponse(String),
    #[error("Code synthesis model returned an empty reply")]
    EmptyReply,
}

/// A fully populated, single-shot completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A generative text-completion capability.
///
/// Implementations send one system instruction and one user message and return
/// the reply text without interpreting it.
pub trait TextCompletion {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send;
}

/// System and user prompt templates.
///
/// Placeholders take the form `{{input.field}}` (mandatory) or
/// `{{input.field?}}` (removed when absent) and may use dotted paths.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: SYSTEM_TEMPLATE.to_string(),
            user: USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Populates both templates with values from `input`
    pub fn populate<T: Serialize>(&self, input: &T) -> Result<(String, String), SynthesisError> {
        let input_json = serde_json::to_value(input)
            .map_err(|e| SynthesisError::InvalidRequest(e.to_string()))?;

        let system = replace_placeholders(&self.system, &input_json)?;
        let user = replace_placeholders(&self.user, &input_json)?;
        Ok((system, user))
    }
}

/// Turns a story into raw model output that should contain scene source code
pub struct CodeSynthesizer<C: TextCompletion> {
    capability: C,
    template: PromptTemplate,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl<C: TextCompletion> CodeSynthesizer<C> {
    pub fn new(capability: C, model: impl Into<String>) -> Self {
        Self {
            capability,
            template: PromptTemplate::default(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Builds the request that `synthesize` would send for `story`
    pub fn prepare(&self, story: &Story) -> Result<CompletionRequest, SynthesisError> {
        let input = SynthesisRequest {
            story_text: story.text.clone(),
            scene_name: SCENE_NAME.to_string(),
        };
        let (system, user) = self.template.populate(&input)?;

        Ok(CompletionRequest {
            model: self.model.clone(),
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    /// Sends the story to the completion capability once and returns the reply as-is.
    ///
    /// A reply that is empty or only whitespace is reported as
    /// `SynthesisError::EmptyReply` instead of being handed to extraction.
    #[instrument(skip(self, story), fields(model = %self.model, title = %story.display_title))]
    pub async fn synthesize(&self, story: &Story) -> Result<String, SynthesisError> {
        let request = self.prepare(story)?;
        debug!(
            system_len = request.system.len(),
            user_len = request.user.len(),
            "Sending synthesis request"
        );

        let reply = self.capability.complete(&request).await?;
        if reply.trim().is_empty() {
            return Err(SynthesisError::EmptyReply);
        }

        info!(reply_len = reply.len(), "Received synthesis reply");
        Ok(reply)
    }
}

fn replace_placeholders(
    template: &str,
    input_json: &serde_json::Value,
) -> Result<String, SynthesisError> {
    let mut result = template.to_string();
    let mut offset = 0;

    // Scan from `offset` so substituted values are never re-expanded
    while let Some(start) = result[offset..].find("{{") {
        let start = offset + start;
        let Some(end_pos) = result[start..].find("}}") else {
            // Unclosed braces are left as literal text
            break;
        };
        let end = start + end_pos;

        let placeholder = result[start + 2..end].trim();
        // A trailing '?' marks the placeholder as optional
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        match resolve_path(input_json, path)? {
            Some(value) => {
                let replacement = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Null => String::new(),
                    other => serde_json::to_string(other)
                        .map_err(|e| SynthesisError::InvalidRequest(e.to_string()))?,
                };
                result.replace_range(start..end + 2, &replacement);
                offset = start + replacement.len();
            }
            // Optional and absent: drop the placeholder entirely
            None if is_optional => {
                result.replace_range(start..end + 2, "");
                offset = start;
            }
            None => return Err(SynthesisError::MissingMandatoryPlaceholder(path.to_string())),
        }
    }

    Ok(result)
}

/// Resolves a dotted `input.a.b` path against the serialized request
fn resolve_path<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<Option<&'a serde_json::Value>, SynthesisError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(SynthesisError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedCompletion {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextCompletion for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, SynthesisError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    impl TextCompletion for FailingCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, SynthesisError> {
            Err(SynthesisError::Api {
                status: 429,
                message: "rate limited".to_string(),
            })
        }
    }

    fn story(text: &str) -> Story {
        Story {
            text: text.to_string(),
            display_title: "title".to_string(),
        }
    }

    #[test]
    fn prepare_embeds_story_and_scene_name() {
        let synthesizer = CodeSynthesizer::new(ScriptedCompletion::replying("x"), "test-model");

        let request = synthesizer.prepare(&story("Oil prices fell {sharply}")).unwrap();

        assert_eq!(request.model, "test-model");
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(request.system.contains("use NewsVisualizationScene as class name"));
        assert!(request.system.contains("class NewsVisualizationScene(Scene):"));
        assert!(!request.system.contains("{{"));
        assert_eq!(
            request.user,
            "News content: Oil prices fell {sharply}\nPlease generate corresponding Manim animation code."
        );
    }

    #[test]
    fn placeholder_value_containing_braces_is_not_expanded() {
        let synthesizer = CodeSynthesizer::new(ScriptedCompletion::replying("x"), "m");

        let request = synthesizer
            .prepare(&story("literal {{input.scene_name}} in the news"))
            .unwrap();

        assert!(request.user.contains("literal {{input.scene_name}} in the news"));
    }

    #[tokio::test]
    async fn synthesize_returns_reply_verbatim() {
        let reply = "```python\nfrom manim import *\n```\n";
        let synthesizer = CodeSynthesizer::new(ScriptedCompletion::replying(reply), "m")
            .with_temperature(0.2)
            .with_max_tokens(100);

        let result = synthesizer.synthesize(&story("news")).await.unwrap();

        assert_eq!(result, reply);
        let seen = synthesizer.capability.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temperature, 0.2);
        assert_eq!(seen[0].max_tokens, 100);
    }

    #[tokio::test]
    async fn whitespace_reply_is_empty_reply_error() {
        let synthesizer = CodeSynthesizer::new(ScriptedCompletion::replying(" \n\t "), "m");

        let result = synthesizer.synthesize(&story("news")).await;

        assert!(matches!(result, Err(SynthesisError::EmptyReply)));
    }

    #[tokio::test]
    async fn capability_error_is_propagated() {
        let synthesizer = CodeSynthesizer::new(FailingCompletion, "m");

        let result = synthesizer.synthesize(&story("news")).await;

        match result {
            Err(SynthesisError::Api { status, .. }) => assert_eq!(status, 429),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn optional_placeholder_missing_is_removed() {
        let input = serde_json::json!({ "story_text": "s" });

        let result = replace_placeholders("Note: {{input.note?}}!", &input).unwrap();

        assert_eq!(result, "Note: !");
    }

    #[test]
    fn mandatory_placeholder_missing_is_error() {
        let input = serde_json::json!({ "story_text": "s" });

        let result = replace_placeholders("{{input.missing_field}}", &input);

        match result {
            Err(SynthesisError::MissingMandatoryPlaceholder(field)) => {
                assert_eq!(field, "input.missing_field");
            }
            other => panic!("Expected MissingMandatoryPlaceholder, got {:?}", other),
        }
    }

    #[test]
    fn placeholder_outside_input_is_invalid() {
        let input = serde_json::json!({});

        let result = replace_placeholders("{{output.field}}", &input);

        assert!(matches!(
            result,
            Err(SynthesisError::InvalidPlaceholderPath(path)) if path == "output.field"
        ));
    }

    #[test]
    fn nested_placeholder_and_scalars() {
        let input = serde_json::json!({
            "scene": { "name": "Intro", "fps": 60, "hd": true }
        });

        let result = replace_placeholders(
            "{{input.scene.name}} @ {{input.scene.fps}}fps hd={{input.scene.hd}}",
            &input,
        )
        .unwrap();

        assert_eq!(result, "Intro @ 60fps hd=true");
    }

    #[test]
    fn custom_template_is_used() {
        let template = PromptTemplate {
            system: "Emit {{input.scene_name}} only".to_string(),
            user: "{{input.story_text}}".to_string(),
        };
        let synthesizer =
            CodeSynthesizer::new(ScriptedCompletion::replying("x"), "m").with_template(template);

        let request = synthesizer.prepare(&story("body")).unwrap();

        assert_eq!(request.system, "Emit NewsVisualizationScene only");
        assert_eq!(request.user, "body");
    }
}
