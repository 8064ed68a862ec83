pub mod fetcher;
pub mod parser;

use async_trait::async_trait;

use crate::article::ArticleSummary;
use crate::error::Result;

pub use fetcher::HttpFetcher;
pub use parser::ListingParser;

/// Paginated, newest-first listing of the remote section.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Summaries on page `page_index` (0 is the newest page). An empty
    /// vector means there is nothing more to list; failures are errors.
    async fn fetch_listing_page(&self, page_index: usize) -> Result<Vec<ArticleSummary>>;
}

/// Raw article pages.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article(&self, url: &str) -> Result<String>;
}
