use crate::article::ArticleSummary;
use crate::config::CrawlerConfig;
use crate::error::{Error, Result};
use crate::listing::parser::ListingParser;
use crate::listing::{ArticleSource, ListingSource};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const MIN_BACKOFF: Duration = Duration::from_millis(250);

/// Sequential HTTP client for the listing and article pages.
///
/// Every successful request is followed by the configured politeness delay,
/// and temporary failures are retried with a linear backoff.
pub struct HttpFetcher {
    client: Client,
    parser: ListingParser,
    base_url: String,
    node_id: u32,
    timeout_duration: Duration,
    request_delay: Duration,
    retry_attempts: usize,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        // The deadline is applied per attempt in `fetch_once`, so the client
        // carries none of its own.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            parser: ListingParser::new(&config.base_url, config.node_id)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            node_id: config.node_id,
            timeout_duration: config.timeout_duration(),
            request_delay: config.request_delay(),
            retry_attempts: config.retry_attempts,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Deadline for one request attempt, body included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn listing_url(&self, page_index: usize) -> String {
        format!(
            "{}/Pages/TopicList.aspx?nodeid={}&idx={}",
            self.base_url, self.node_id, page_index
        )
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        validate_url(url)?;

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    if !self.request_delay.is_zero() {
                        sleep(self.request_delay).await;
                    }
                    return Ok(body);
                }
                Err(e) if e.is_temporary() && attempt < self.retry_attempts => {
                    attempt += 1;
                    let backoff = self.request_delay.max(MIN_BACKOFF) * attempt as u32;
                    warn!(
                        "Fetch of {} failed ({}), retry {}/{} in {:?}",
                        url, e, attempt, self.retry_attempts, backoff
                    );
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        timeout(self.timeout_duration, self.request(url))
            .await
            .map_err(|_| Error::Timeout(format!("Request to {} timed out", url)))?
    }

    async fn request(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Request to {} timed out", url))
                } else {
                    Error::Transport(format!("Request to {} failed: {}", url, e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus(response.status().as_u16(), url.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response body of {}: {}", url, e)))?;

        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::InvalidUrl(format!("Invalid URL {}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::InvalidUrl(format!("Unsupported scheme: {}", scheme))),
    }
}

#[async_trait]
impl ListingSource for HttpFetcher {
    async fn fetch_listing_page(&self, page_index: usize) -> Result<Vec<ArticleSummary>> {
        let url = self.listing_url(page_index);
        let html = self.fetch_html(&url).await?;
        let summaries = self.parser.parse_listing(&html);
        info!("Listing page {} lists {} articles", page_index, summaries.len());
        Ok(summaries)
    }
}

#[async_trait]
impl ArticleSource for HttpFetcher {
    async fn fetch_article(&self, url: &str) -> Result<String> {
        self.fetch_html(url).await
    }
}
