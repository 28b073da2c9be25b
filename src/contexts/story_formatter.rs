use crate::data::{ContentItem, Story};

/// Narrative used when no news item could be fetched.
pub const FALLBACK_STORY: &str = "
this is a story about the relationship between supply and demand in economics.
when the price of a good rises, the supply increases and the demand decreases;
when the price of a good falls, the supply decreases and the demand increases.
in the end, the market reaches equilibrium.
";

/// Display title paired with `FALLBACK_STORY`.
pub const FALLBACK_TITLE: &str = "supply and demand animation";

const MISSING_SUMMARY: &str = "(no summary available)";

/// Builds the story text for one pipeline run.
///
/// A fetched item is laid out under fixed labels with its title and URL copied
/// verbatim; without an item the fixed supply-and-demand narrative is returned.
pub fn build_story(item: Option<&ContentItem>) -> Story {
    match item {
        Some(item) => {
            let summary = item.summary.as_deref().unwrap_or(MISSING_SUMMARY);
            let text = format!(
                "Today's news: {}\n\nContent summary: {}\n\nNews source: {}\n",
                item.title, summary, item.source_url
            );
            Story {
                text,
                display_title: item.title.clone(),
            }
        }
        None => Story {
            text: FALLBACK_STORY.to_string(),
            display_title: FALLBACK_TITLE.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_title_summary_and_url_verbatim() {
        let item = ContentItem::new(
            "Rates held at 5.25%",
            Some("The central bank paused again.".to_string()),
            "https://example.com/news/rates?id=42&src=feed",
        );

        let story = build_story(Some(&item));

        assert!(story.text.contains("Today's news: Rates held at 5.25%"));
        assert!(story.text.contains("Content summary: The central bank paused again."));
        assert!(story.text.contains("News source: https://example.com/news/rates?id=42&src=feed"));
        assert_eq!(story.display_title, "Rates held at 5.25%");
    }

    #[test]
    fn missing_summary_uses_placeholder() {
        let item = ContentItem::new("Markets open flat", None, "https://example.com/a");

        let story = build_story(Some(&item));

        assert!(story.text.contains("Content summary: (no summary available)"));
        assert!(story.text.contains("https://example.com/a"));
    }

    #[test]
    fn unicode_title_is_preserved() {
        let item = ContentItem::new("經濟新聞：股市上漲 📈", None, "https://example.com/zh");

        let story = build_story(Some(&item));

        assert!(story.text.contains("經濟新聞：股市上漲 📈"));
        assert_eq!(story.display_title, "經濟新聞：股市上漲 📈");
    }

    #[test]
    fn absent_item_returns_fixed_fallback() {
        let first = build_story(None);
        let second = build_story(None);

        assert_eq!(first.text, FALLBACK_STORY);
        assert_eq!(first.display_title, FALLBACK_TITLE);
        assert_eq!(first, second);
        assert!(first.text.contains("the market reaches equilibrium"));
    }
}
