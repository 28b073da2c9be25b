use serde::Serialize;

/// The plain-text story handed to code synthesis, plus a title for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub text: String,
    pub display_title: String,
}

/// Input values available to the synthesis prompt templates.
///
/// Templates address these fields as `{{input.story_text}}` and
/// `{{input.scene_name}}`.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub story_text: String,
    pub scene_name: String,
}
