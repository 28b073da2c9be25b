use crate::data::ContentItem;
use std::future::Future;

/// Topic searched when the caller does not supply one
pub const DEFAULT_KEYWORDS: &str = "economy";
pub const DEFAULT_LANGUAGE: &str = "en";

/// Source of the news item a story is built from.
///
/// Implementations never fail: transport errors, provider errors and empty
/// results are logged and reported as `None` so the caller can fall back to
/// the built-in narrative.
pub trait ContentProvider {
    fn fetch(
        &self,
        keywords: &str,
        language: &str,
    ) -> impl Future<Output = Option<ContentItem>> + Send;
}

/// Provider that never has content, for offline runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl ContentProvider for NoContent {
    async fn fetch(&self, _keywords: &str, _language: &str) -> Option<ContentItem> {
        None
    }
}

/// Returns `keywords`, or `DEFAULT_KEYWORDS` when it is blank
pub fn keywords_or_default(keywords: &str) -> &str {
    let trimmed = keywords.trim();
    if trimmed.is_empty() {
        DEFAULT_KEYWORDS
    } else {
        trimmed
    }
}
