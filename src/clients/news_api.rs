use crate::contexts::ContentProvider;
use crate::data::ContentItem;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org";
const PAGE_SIZE: u32 = 5;
/// Wide enough that html2text never wraps a description
const SUMMARY_WIDTH: usize = 10_000;

/// Reasons a fetch produced no content item
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no NewsAPI key configured")]
    MissingApiKey,
    #[error("invalid request URL: {0}")]
    Url(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("provider reported status '{status}': {message}")]
    NotOk { status: String, message: String },
    #[error("no articles matched the query")]
    NoArticles,
    #[error("article is missing field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
}

/// NewsAPI `/v2/everything` client
#[derive(Debug, Clone)]
pub struct NewsApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `api_key` - NewsAPI key; without one `fetch` returns nothing and makes no request
    /// * `base_url` - API root, normally `NEWSAPI_BASE_URL`
    /// * `timeout` - Upper bound for the whole request
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
        })
    }

    fn everything_url(&self, keywords: &str, language: &str) -> Result<Url, FetchError> {
        let endpoint = format!("{}/v2/everything", self.base_url.trim_end_matches('/'));
        let page_size = PAGE_SIZE.to_string();
        Url::parse_with_params(
            &endpoint,
            [
                ("q", keywords),
                ("language", language),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ],
        )
        .map_err(|e| FetchError::Url(e.to_string()))
    }

    /// Fetches the most recently published article matching `keywords`
    #[instrument(skip(self))]
    pub async fn fetch_latest(
        &self,
        keywords: &str,
        language: &str,
    ) -> Result<ContentItem, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;
        let url = self.everything_url(keywords, language)?;

        debug!("Requesting articles from NewsAPI");
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: EverythingResponse = response.json().await?;
        interpret(body)
    }
}

impl ContentProvider for NewsApiClient {
    async fn fetch(&self, keywords: &str, language: &str) -> Option<ContentItem> {
        match self.fetch_latest(keywords, language).await {
            Ok(item) => {
                info!(title = %item.title, url = %item.source_url, "Fetched news item");
                Some(item)
            }
            Err(FetchError::NoArticles) => {
                info!(keywords, "No news matched; continuing without content");
                None
            }
            Err(e) => {
                warn!(error = %e, "get news error; continuing without content");
                None
            }
        }
    }
}

/// Picks the first article out of a decoded response
fn interpret(body: EverythingResponse) -> Result<ContentItem, FetchError> {
    if body.status != "ok" {
        return Err(FetchError::NotOk {
            status: body.status,
            message: body.message.unwrap_or_default(),
        });
    }

    let article = body.articles.into_iter().next().ok_or(FetchError::NoArticles)?;
    let title = non_blank(article.title).ok_or(FetchError::MissingField("title"))?;
    let url = non_blank(article.url).ok_or(FetchError::MissingField("url"))?;

    Ok(ContentItem::new(title, plain_summary(article.description), url))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strips HTML markup and entities that some outlets leave in descriptions.
///
/// Link text is kept inline without footnotes and the result is folded onto
/// a single line.
fn plain_summary(description: Option<String>) -> Option<String> {
    let description = non_blank(description)?;
    if !description.contains('<') && !description.contains('&') {
        return Some(description);
    }

    let rendered = html2text::config::plain_no_decorate()
        .no_link_wrapping()
        .allow_width_overflow()
        .string_from_read(description.as_bytes(), SUMMARY_WIDTH);
    match rendered {
        Ok(text) => {
            let folded = text.split_whitespace().collect::<Vec<_>>().join(" ");
            non_blank(Some(folded))
        }
        Err(e) => {
            debug!(error = %e, "Could not convert description to text; keeping it as-is");
            Some(description)
        }
    }
}
