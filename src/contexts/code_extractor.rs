use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default location of the generated scene source
pub const DEFAULT_SOURCE_PATH: &str = "generated_animation.py";

const FENCE: &str = "```";

/// Errors that can occur while persisting extracted code
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write generated source {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Reasons the fence heuristic could not produce a span
#[derive(Debug, Error, PartialEq, Eq)]
enum ParseError {
    #[error("opening fence at byte {0} has no closing fence after it")]
    Unterminated(usize),
}

/// Which rule produced the extracted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// First complete block whose opening fence carries a language tag
    TaggedBlock,
    /// First complete block with a bare opening fence
    PlainBlock,
    /// First tagged marker up to the last fence in the reply
    TaggedSpan,
    /// First fence up to the last fence in the reply
    PlainSpan,
    /// No fences: the whole reply is taken as code
    Bare,
    /// Parsing failed and the whole reply is taken as code
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub code: String,
    pub method: ExtractionMethod,
}

/// A complete fenced block: an opening fence line with optional tag and a
/// closing line holding nothing but the fence.
fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ms)^[ \t]*```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*\r?$")
            .expect("valid regex")
    })
}

/// An opening fence with a language tag: at the start of a line and followed
/// by a line break, so a closing fence glued to a word is not mistaken for one.
fn tagged_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+#.\-]+[^\n`]*\n").expect("valid regex")
    })
}

/// Extracts runnable code from a free-form model reply.
///
/// Tagged code wins over untagged code: a complete tagged block first, then
/// the span from the first tagged opening fence to the last fence in the
/// reply, then a complete untagged block, then the span between the first and
/// last fence. The span rules tolerate fences that do not sit on their own
/// line but will over-capture if prose follows a second block. Without any
/// fence the trimmed reply is returned unchanged.
pub fn extract(raw: &str) -> Extraction {
    let (tagged, plain) = complete_blocks(raw);
    if let Some(code) = tagged {
        return Extraction {
            code,
            method: ExtractionMethod::TaggedBlock,
        };
    }

    // A tagged opener without a proper closing line still beats any plain block
    if let Some(marker) = tagged_marker_re().find(raw) {
        return span_or_recover(raw, marker.end(), ExtractionMethod::TaggedSpan);
    }

    if let Some(code) = plain {
        return Extraction {
            code,
            method: ExtractionMethod::PlainBlock,
        };
    }

    match raw.find(FENCE) {
        Some(pos) => span_or_recover(raw, pos + FENCE.len(), ExtractionMethod::PlainSpan),
        None => Extraction {
            code: raw.trim().to_string(),
            method: ExtractionMethod::Bare,
        },
    }
}

/// Convenience wrapper around [`extract`] returning only the code
pub fn extract_code(raw: &str) -> String {
    extract(raw).code
}

/// First complete tagged block and first complete untagged block, trimmed
fn complete_blocks(raw: &str) -> (Option<String>, Option<String>) {
    let mut first_plain = None;

    for captures in fenced_block_re().captures_iter(raw) {
        let tag = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

        if !tag.is_empty() {
            return (Some(body.trim().to_string()), first_plain);
        }
        if first_plain.is_none() {
            first_plain = Some(body.trim().to_string());
        }
    }

    (None, first_plain)
}

fn span_or_recover(raw: &str, start: usize, method: ExtractionMethod) -> Extraction {
    match span(raw, start) {
        Ok(code) => Extraction { code, method },
        Err(e) => {
            warn!(error = %e, "Could not parse fenced code; using the whole reply");
            Extraction {
                code: raw.trim().to_string(),
                method: ExtractionMethod::Recovered,
            }
        }
    }
}

/// Text between `start` and the last fence in the reply
fn span(raw: &str, start: usize) -> Result<String, ParseError> {
    let end = raw
        .rfind(FENCE)
        .filter(|&end| end >= start)
        .ok_or(ParseError::Unterminated(start))?;

    Ok(raw[start..end].trim().to_string())
}

/// Writes extracted code to a fixed path, replacing whatever was there
#[derive(Debug, Clone)]
pub struct CodeExtractor {
    output_path: PathBuf,
}

impl CodeExtractor {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Extracts code from `raw` and overwrites the output file with it.
    ///
    /// Returns the path that was written.
    pub fn persist(&self, raw: &str) -> Result<PathBuf, ExtractionError> {
        let extraction = extract(raw);
        debug!(method = ?extraction.method, bytes = extraction.code.len(), "Extracted code");

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ExtractionError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        fs::write(&self.output_path, extraction.code.as_bytes()).map_err(|source| {
            ExtractionError::Write {
                path: self.output_path.clone(),
                source,
            }
        })?;

        info!(path = %self.output_path.display(), "Wrote generated source");
        Ok(self.output_path.clone())
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_block_drops_tag_and_fences() {
        let raw = "Here is the animation:\n```python\nfrom manim import *\n\nclass NewsVisualizationScene(Scene):\n    pass\n```\nEnjoy!";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::TaggedBlock);
        assert_eq!(
            extraction.code,
            "from manim import *\n\nclass NewsVisualizationScene(Scene):\n    pass"
        );
    }

    #[test]
    fn embedded_fence_in_string_does_not_end_block() {
        let raw = "```python\nMARKER = \"```\"\nprint(MARKER)  # ``` inside a comment\n```";

        assert_eq!(
            extract_code(raw),
            "MARKER = \"```\"\nprint(MARKER)  # ``` inside a comment"
        );
    }

    #[test]
    fn tagged_block_preferred_over_earlier_plain_block() {
        let raw = "```\nmanim -qh scene.py\n```\n\n```python\nprint('scene')\n```";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::TaggedBlock);
        assert_eq!(extraction.code, "print('scene')");
    }

    #[test]
    fn tagged_span_preferred_over_earlier_plain_block() {
        let raw = "Run:\n```\nmanim -qh scene.py\n```\n```python\nfrom manim import *\nclass NewsVisualizationScene(Scene): pass```";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::TaggedSpan);
        assert_eq!(
            extraction.code,
            "from manim import *\nclass NewsVisualizationScene(Scene): pass"
        );
    }

    #[test]
    fn closing_fence_followed_by_word_is_not_a_tag() {
        let raw = "```\nprint(1)```Done";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::PlainSpan);
        assert_eq!(extraction.code, "print(1)");
    }

    #[test]
    fn first_tagged_block_wins() {
        let raw = "```python\nfirst = 1\n```\ntext\n```python\nsecond = 2\n```";

        assert_eq!(extract_code(raw), "first = 1");
    }

    #[test]
    fn plain_block_is_extracted() {
        let raw = "```\nfrom manim import *\n```";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::PlainBlock);
        assert_eq!(extraction.code, "from manim import *");
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let raw = "```python\r\nx = 1\r\n```\r\n";

        assert_eq!(extract_code(raw), "x = 1");
    }

    #[test]
    fn inline_closing_fence_falls_back_to_last_marker() {
        let raw = "```python\nprint('hi')```";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::TaggedSpan);
        assert_eq!(extraction.code, "print('hi')");
    }

    #[test]
    fn span_fallback_anchors_to_last_fence() {
        let raw = "```python\ns = \"```\"\nprint(s)```";

        assert_eq!(extract_code(raw), "s = \"```\"\nprint(s)");
    }

    #[test]
    fn plain_span_fallback() {
        let raw = "``` print(1) ```";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::PlainSpan);
        assert_eq!(extraction.code, "print(1)");
    }

    #[test]
    fn unfenced_reply_is_trimmed_identity() {
        let raw = "\n\n  from manim import *\nclass NewsVisualizationScene(Scene):\n    pass  \n\n";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::Bare);
        assert_eq!(extraction.code, raw.trim());
    }

    #[test]
    fn unterminated_fence_recovers_with_raw_text() {
        let raw = "  Sure:\n```python\nprint(1)\n";

        let extraction = extract(raw);

        assert_eq!(extraction.method, ExtractionMethod::Recovered);
        assert_eq!(extraction.code, raw.trim());
    }

    #[test]
    fn persist_overwrites_and_preserves_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("generated_animation.py");
        let extractor = CodeExtractor::new(&path);

        extractor.persist("```python\nold = True\n```").unwrap();
        let written = extractor
            .persist("```python\ntitle = Text(\"經濟 — café ✓\")\n```")
            .unwrap();

        assert_eq!(written, path);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "title = Text(\"經濟 — café ✓\")"
        );
    }

    #[test]
    fn persist_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be overwritten as a file
        let extractor = CodeExtractor::new(dir.path());

        let result = extractor.persist("print(1)");

        assert!(matches!(result, Err(ExtractionError::Write { .. })));
    }

    #[test]
    fn default_output_path() {
        assert_eq!(
            CodeExtractor::default().output_path(),
            Path::new(DEFAULT_SOURCE_PATH)
        );
    }
}
