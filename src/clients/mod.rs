mod anthropic;
mod news_api;

pub use anthropic::{ANTHROPIC_BASE_URL, AnthropicClient};
pub use news_api::{FetchError, NEWSAPI_BASE_URL, NewsApiClient};
