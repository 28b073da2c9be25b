/// A single news item as returned by a content provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub title: String,
    pub summary: Option<String>,
    pub source_url: String,
}

impl ContentItem {
    pub fn new(
        title: impl Into<String>,
        summary: Option<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary,
            source_url: source_url.into(),
        }
    }
}
