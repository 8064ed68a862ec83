use serde::{Deserialize, Serialize};

/// Column order of the persisted table. Every write uses exactly this header.
pub const COLUMNS: [&str; 6] = ["pid", "title", "url", "publish_date", "update_date", "content"];

/// One entry of a listing page, before its body has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSummary {
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    /// `YYYY/MM/DD`, or empty when the listing did not show it.
    pub publish_date: String,
    pub update_date: String,
}

/// A captured article, one row of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(rename = "pid")]
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    pub publish_date: String,
    pub update_date: String,
    pub content: String,
}

/// Identity used to decide whether an article was already captured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Id(String),
    Url(String),
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupKey::Id(id) => write!(f, "pid={}", id),
            DedupKey::Url(url) => write!(f, "url={}", url),
        }
    }
}

fn key_for(id: Option<&str>, url: &str) -> DedupKey {
    match id {
        Some(id) if !id.is_empty() => DedupKey::Id(id.to_string()),
        _ => DedupKey::Url(url.to_string()),
    }
}

fn keys_for(id: Option<&str>, url: &str) -> Vec<DedupKey> {
    let mut keys = vec![DedupKey::Url(url.to_string())];
    if let DedupKey::Id(id) = key_for(id, url) {
        keys.push(DedupKey::Id(id));
    }
    keys
}

impl ArticleSummary {
    pub fn dedup_key(&self) -> DedupKey {
        key_for(self.id.as_deref(), &self.url)
    }

    /// Every key this summary can be matched by. A summary is already known
    /// when any of them is.
    pub fn known_keys(&self) -> Vec<DedupKey> {
        keys_for(self.id.as_deref(), &self.url)
    }

    /// A summary without a title cannot be persisted.
    pub fn is_malformed(&self) -> bool {
        self.title.trim().is_empty()
    }
}

impl ArticleRecord {
    pub fn from_summary(summary: ArticleSummary, content: String) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            url: summary.url,
            publish_date: summary.publish_date,
            update_date: summary.update_date,
            content,
        }
    }

    /// Keys under which this record counts as known. The URL is always
    /// included so a later summary whose id failed to parse still matches.
    pub fn known_keys(&self) -> Vec<DedupKey> {
        keys_for(self.id.as_deref(), &self.url)
    }
}
