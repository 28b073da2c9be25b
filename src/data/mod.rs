mod content_item;
mod render_result;
mod story;

pub use content_item::ContentItem;
pub use render_result::{RenderFailure, RenderResult, RenderStatus};
pub use story::{Story, SynthesisRequest};

/// Name of the scene class the generated program must define.
///
/// The synthesis instructions ask the model to emit a class with this name and
/// the renderer passes the same name to the engine, so both sides read it from here.
pub const SCENE_NAME: &str = "NewsVisualizationScene";
