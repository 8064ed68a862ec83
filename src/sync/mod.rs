//! Incremental synchronization of the remote listing into the record store.
//!
//! A run against an empty store seeds it from the first listing page. Every
//! later run walks the listing newest-first and stops at the first page that
//! holds nothing new, at an empty page, or at the page ceiling. The all-known
//! stop assumes the listing never reorders; the ceiling bounds the damage if
//! it does.

pub mod observer;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::article::{ArticleRecord, ArticleSummary, DedupKey};
use crate::content::ContentExtractor;
use crate::error::Result;
use crate::listing::{ArticleSource, ListingSource};
use crate::storage::{RecordStore, WriteOutcome};

pub use observer::{RecordingObserver, SyncEvent, SyncObserver, TracingObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Seed run against an empty store.
    Initialize,
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Initialize => write!(f, "initialize"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Why an incremental scan stopped walking the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    AllKnown,
    PageLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage => write!(f, "empty page"),
            StopReason::AllKnown => write!(f, "all known"),
            StopReason::PageLimit => write!(f, "page limit"),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub pages_scanned: usize,
    /// New summaries found before malformed ones were dropped.
    pub discovered: usize,
    pub added: usize,
    pub skipped: usize,
    /// `None` for a seed run, which reads a single page.
    pub stop: Option<StopReason>,
    pub write: WriteOutcome,
}

pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    listing: Arc<dyn ListingSource>,
    articles: Arc<dyn ArticleSource>,
    extractor: ContentExtractor,
    observer: Arc<dyn SyncObserver>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        listing: Arc<dyn ListingSource>,
        articles: Arc<dyn ArticleSource>,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            store,
            listing,
            articles,
            extractor: ContentExtractor::new(),
            observer,
        }
    }

    /// One run: seed an empty store, otherwise append what is new.
    ///
    /// Any fetch or store error aborts the run before the store is written,
    /// so the articles involved are retried by the next run.
    pub async fn run(&self, initial_n: usize, max_pages: usize) -> Result<SyncReport> {
        let existing = self.store.load().await?;

        if existing.is_empty() {
            self.initialize(initial_n).await
        } else {
            self.incremental(&existing, max_pages).await
        }
    }

    /// Seed from the first `initial_n` entries of listing page 0, replacing
    /// whatever the store holds. Nothing is written when no record results.
    pub async fn initialize(&self, initial_n: usize) -> Result<SyncReport> {
        self.emit(SyncEvent::ModeSelected {
            mode: SyncMode::Initialize,
            known: 0,
        });

        let candidates: Vec<ArticleSummary> = self
            .listing
            .fetch_listing_page(0)
            .await?
            .into_iter()
            .take(initial_n)
            .collect();
        let discovered = candidates.len();

        let (records, skipped) = self.materialize(candidates).await?;
        let write = if records.is_empty() {
            WriteOutcome::EmptyWritePrevented
        } else {
            self.store.overwrite(&records).await?
        };
        self.emit(SyncEvent::StoreWritten {
            mode: SyncMode::Initialize,
            outcome: write,
        });

        Ok(SyncReport {
            mode: SyncMode::Initialize,
            pages_scanned: 1,
            discovered,
            added: write.written(),
            skipped,
            stop: None,
            write,
        })
    }

    async fn incremental(&self, existing: &[ArticleRecord], max_pages: usize) -> Result<SyncReport> {
        self.emit(SyncEvent::ModeSelected {
            mode: SyncMode::Incremental,
            known: existing.len(),
        });

        let mut known: HashSet<DedupKey> = existing
            .iter()
            .flat_map(ArticleRecord::known_keys)
            .collect();

        let mut fresh = Vec::new();
        let mut pages_scanned = 0;
        let mut stop = StopReason::PageLimit;

        for page_index in 0..max_pages {
            let page = self.listing.fetch_listing_page(page_index).await?;
            pages_scanned += 1;

            if page.is_empty() {
                self.emit(SyncEvent::PageScanned { page_index, new: 0, known: 0 });
                stop = StopReason::EmptyPage;
                break;
            }

            let total = page.len();
            // Keys are claimed as they are seen so an entry that shifts onto
            // the next page between requests is not taken twice.
            let new: Vec<ArticleSummary> = page
                .into_iter()
                .filter(|summary| claim(&mut known, summary))
                .collect();

            self.emit(SyncEvent::PageScanned {
                page_index,
                new: new.len(),
                known: total - new.len(),
            });

            if new.is_empty() {
                stop = StopReason::AllKnown;
                break;
            }
            fresh.extend(new);
        }

        self.emit(SyncEvent::ScanStopped {
            reason: stop,
            pages_scanned,
        });

        let discovered = fresh.len();
        let (records, skipped) = self.materialize(fresh).await?;
        let write = if records.is_empty() {
            WriteOutcome::EmptyWritePrevented
        } else {
            self.store.append(&records).await?
        };
        self.emit(SyncEvent::StoreWritten {
            mode: SyncMode::Incremental,
            outcome: write,
        });

        Ok(SyncReport {
            mode: SyncMode::Incremental,
            pages_scanned,
            discovered,
            added: write.written(),
            skipped,
            stop: Some(stop),
            write,
        })
    }

    /// Fetch and extract every well-formed summary, in order. Returns the
    /// records and the number of malformed summaries dropped.
    async fn materialize(&self, summaries: Vec<ArticleSummary>) -> Result<(Vec<ArticleRecord>, usize)> {
        let mut records = Vec::with_capacity(summaries.len());
        let mut skipped = 0;

        for summary in summaries {
            if summary.is_malformed() {
                self.emit(SyncEvent::SummarySkipped {
                    url: summary.url.clone(),
                    reason: "empty title".to_string(),
                });
                skipped += 1;
                continue;
            }

            let html = match self.articles.fetch_article(&summary.url).await {
                Ok(html) => html,
                Err(e) => {
                    self.emit(SyncEvent::ArticleFailed {
                        url: summary.url.clone(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let content = self.extractor.extract_content(&html, Some(&summary.title));
            self.emit(SyncEvent::ArticleCaptured {
                key: summary.dedup_key(),
                title: summary.title.clone(),
                content_len: content.chars().count(),
            });
            records.push(ArticleRecord::from_summary(summary, content));
        }

        debug!("Materialized {} records, skipped {}", records.len(), skipped);
        Ok((records, skipped))
    }

    fn emit(&self, event: SyncEvent) {
        self.observer.observe(event);
    }
}

/// Record the summary's keys as known. False when any of them already was.
fn claim(known: &mut HashSet<DedupKey>, summary: &ArticleSummary) -> bool {
    let keys = summary.known_keys();
    if keys.iter().any(|key| known.contains(key)) {
        return false;
    }
    known.extend(keys);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{CsvStore, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    struct ScriptedListing {
        pages: Vec<Vec<ArticleSummary>>,
        fail_at: Option<usize>,
        requests: Mutex<Vec<usize>>,
    }

    impl ScriptedListing {
        fn new(pages: Vec<Vec<ArticleSummary>>) -> Arc<Self> {
            Arc::new(Self {
                pages,
                fail_at: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing_at(pages: Vec<Vec<ArticleSummary>>, page_index: usize) -> Arc<Self> {
            Arc::new(Self {
                pages,
                fail_at: Some(page_index),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<usize> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ListingSource for ScriptedListing {
        async fn fetch_listing_page(&self, page_index: usize) -> Result<Vec<ArticleSummary>> {
            self.requests.lock().push(page_index);
            if self.fail_at == Some(page_index) {
                return Err(Error::Transport(format!("listing page {} unavailable", page_index)));
            }
            Ok(self.pages.get(page_index).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct ScriptedArticles {
        failing: Mutex<HashSet<String>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedArticles {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fail(&self, url: &str) {
            self.failing.lock().insert(url.to_string());
        }

        fn recover(&self) {
            self.failing.lock().clear();
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ArticleSource for ScriptedArticles {
        async fn fetch_article(&self, url: &str) -> Result<String> {
            self.requests.lock().push(url.to_string());
            if self.failing.lock().contains(url) {
                return Err(Error::Timeout(format!("Request to {} timed out", url)));
            }
            Ok(format!(
                "<h2>title</h2><p>發布日期：2025/01/01</p><p>body of {}</p><a>上一則</a>",
                url.replace('&', "&amp;")
            ))
        }
    }

    fn summary(id: &str) -> ArticleSummary {
        ArticleSummary {
            id: Some(id.to_string()),
            title: format!("Article {}", id),
            url: format!("https://www.hpa.gov.tw/Pages/Detail.aspx?nodeid=127&pid={}", id),
            publish_date: "2025/01/01".to_string(),
            update_date: String::new(),
        }
    }

    fn record(id: &str) -> ArticleRecord {
        ArticleRecord::from_summary(summary(id), "stored".to_string())
    }

    fn ids(records: &[ArticleRecord]) -> Vec<String> {
        records.iter().filter_map(|r| r.id.clone()).collect()
    }

    fn engine(
        store: Arc<dyn RecordStore>,
        listing: Arc<ScriptedListing>,
        articles: Arc<ScriptedArticles>,
    ) -> (SyncEngine, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let engine = SyncEngine::new(store, listing, articles, observer.clone());
        (engine, observer)
    }

    #[tokio::test]
    async fn test_seed_run_takes_first_n_in_listing_order() {
        let store = Arc::new(MemoryStore::new());
        let listing = ScriptedListing::new(vec![
            vec![summary("5"), summary("4"), summary("3"), summary("2"), summary("1")],
            vec![summary("0")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, _) = engine(store.clone(), listing.clone(), articles);

        let report = engine.run(3, 5).await.unwrap();

        assert_eq!(report.mode, SyncMode::Initialize);
        assert_eq!(report.added, 3);
        assert_eq!(ids(&store.records()), vec!["5", "4", "3"]);
        assert_eq!(listing.requests(), vec![0]);

        let first = &store.records()[0];
        assert_eq!(first.content, format!("body of {}", first.url));
    }

    #[tokio::test]
    async fn test_new_articles_are_appended_until_an_all_known_page() {
        let store = Arc::new(MemoryStore::with_records(vec![record("101")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("103"), summary("102")],
            vec![summary("101")],
            vec![summary("100")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, observer) = engine(store.clone(), listing.clone(), articles);

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.mode, SyncMode::Incremental);
        assert_eq!(report.stop, Some(StopReason::AllKnown));
        assert_eq!(report.pages_scanned, 2);
        assert_eq!(report.added, 2);
        assert_eq!(listing.requests(), vec![0, 1]);
        assert_eq!(observer.pages_scanned(), vec![0, 1]);
        assert_eq!(ids(&store.records()), vec!["101", "103", "102"]);
    }

    #[tokio::test]
    async fn test_all_known_first_page_short_circuits() {
        let store = Arc::new(MemoryStore::with_records(vec![record("201"), record("202")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("201"), summary("202")],
            vec![summary("200")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, observer) = engine(store.clone(), listing.clone(), articles.clone());

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.write, WriteOutcome::EmptyWritePrevented);
        assert_eq!(listing.requests(), vec![0]);
        assert!(articles.requests().is_empty());
        assert_eq!(store.mutation_count(), 0);
        assert!(observer.events().contains(&SyncEvent::StoreWritten {
            mode: SyncMode::Incremental,
            outcome: WriteOutcome::EmptyWritePrevented,
        }));
    }

    #[tokio::test]
    async fn test_second_run_without_remote_changes_adds_nothing() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("3"), summary("2")],
            vec![summary("1")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, _) = engine(store.clone(), listing, articles);

        assert_eq!(engine.run(10, 5).await.unwrap().added, 2);
        let second = engine.run(10, 5).await.unwrap();

        assert_eq!(second.added, 0);
        assert_eq!(store.len(), 3);
        assert_eq!(store.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_entry_repeated_across_pages_is_taken_once() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        // "3" slid from page 0 onto page 1 between requests.
        let listing = ScriptedListing::new(vec![
            vec![summary("4"), summary("3")],
            vec![summary("3"), summary("2")],
            vec![summary("1")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, _) = engine(store.clone(), listing, articles);

        engine.run(10, 5).await.unwrap();

        assert_eq!(ids(&store.records()), vec!["1", "4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_entries_without_id_match_by_url() {
        let mut stored = record("x");
        stored.id = None;
        stored.url = "https://x/a".to_string();
        let store = Arc::new(MemoryStore::with_records(vec![stored]));

        let mut again = summary("x");
        again.id = None;
        again.url = "https://x/a".to_string();
        let listing = ScriptedListing::new(vec![vec![again]]);
        let articles = ScriptedArticles::new();
        let (engine, _) = engine(store.clone(), listing.clone(), articles);

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.stop, Some(StopReason::AllKnown));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_id_recovered_later_still_matches_stored_url() {
        let mut stored = record("7");
        stored.id = None;
        let store = Arc::new(MemoryStore::with_records(vec![stored]));
        let listing = ScriptedListing::new(vec![vec![summary("7")]]);
        let (engine, _) = engine(store.clone(), listing, ScriptedArticles::new());

        assert_eq!(engine.run(10, 5).await.unwrap().added, 0);
    }

    #[tokio::test]
    async fn test_untitled_summaries_are_never_written() {
        let store = Arc::new(MemoryStore::new());
        let mut untitled = summary("5");
        untitled.title = "  ".to_string();
        let listing = ScriptedListing::new(vec![vec![untitled.clone(), summary("6")]]);
        let articles = ScriptedArticles::new();
        let (engine, observer) = engine(store.clone(), listing, articles.clone());

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(ids(&store.records()), vec!["6"]);
        assert!(!articles.requests().contains(&untitled.url));
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::SummarySkipped { url, .. } if *url == untitled.url)));
    }

    #[tokio::test]
    async fn test_seed_run_with_empty_listing_leaves_store_empty() {
        let store = Arc::new(MemoryStore::new());
        let listing = ScriptedListing::new(vec![]);
        let (engine, _) = engine(store.clone(), listing.clone(), ScriptedArticles::new());

        let report = engine.run(10, 5).await.unwrap();
        assert_eq!(report.write, WriteOutcome::EmptyWritePrevented);
        assert_eq!(store.mutation_count(), 0);

        // Still empty, so the next run seeds again.
        let report = engine.run(10, 5).await.unwrap();
        assert_eq!(report.mode, SyncMode::Initialize);
        assert_eq!(listing.requests(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_empty_seed_keeps_existing_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CsvStore::new(dir.path().join("myths.csv")));
        store.overwrite(&[record("1"), record("2")]).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let listing = ScriptedListing::new(vec![vec![]]);
        let (engine, _) = engine(store.clone(), listing, ScriptedArticles::new());
        let report = engine.initialize(10).await.unwrap();

        assert_eq!(report.write, WriteOutcome::EmptyWritePrevented);
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_scan_stops_at_empty_page() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        let listing = ScriptedListing::new(vec![vec![summary("2")]]);
        let (engine, _) = engine(store.clone(), listing.clone(), ScriptedArticles::new());

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.stop, Some(StopReason::EmptyPage));
        assert_eq!(listing.requests(), vec![0, 1]);
        assert_eq!(report.added, 1);
    }

    #[tokio::test]
    async fn test_scan_stops_at_page_limit() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("9")],
            vec![summary("8")],
            vec![summary("7")],
        ]);
        let (engine, _) = engine(store.clone(), listing.clone(), ScriptedArticles::new());

        let report = engine.run(10, 2).await.unwrap();

        assert_eq!(report.stop, Some(StopReason::PageLimit));
        assert_eq!(listing.requests(), vec![0, 1]);
        assert_eq!(ids(&store.records()), vec!["1", "9", "8"]);
    }

    #[tokio::test]
    async fn test_article_failure_aborts_without_writing_and_is_retried() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("3"), summary("2")],
            vec![summary("1")],
        ]);
        let articles = ScriptedArticles::new();
        articles.fail(&summary("2").url);
        let (engine, observer) = engine(store.clone(), listing, articles.clone());

        let result = engine.run(10, 5).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(ids(&store.records()), vec!["1"]);
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::ArticleFailed { .. })));

        articles.recover();
        let report = engine.run(10, 5).await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(ids(&store.records()), vec!["1", "3", "2"]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_not_treated_as_end_of_data() {
        let store = Arc::new(MemoryStore::with_records(vec![record("1")]));
        let listing = ScriptedListing::failing_at(vec![vec![summary("3")], vec![summary("2")]], 1);
        let (engine, _) = engine(store.clone(), listing, ScriptedArticles::new());

        let result = engine.run(10, 5).await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_with_remaining_articles() {
        // A previous run stored "0", then got through two of four new
        // articles before being cut off.
        let store = Arc::new(MemoryStore::with_records(vec![record("0"), record("4"), record("3")]));
        let listing = ScriptedListing::new(vec![
            vec![summary("4"), summary("3"), summary("2"), summary("1")],
            vec![summary("0")],
        ]);
        let articles = ScriptedArticles::new();
        let (engine, _) = engine(store.clone(), listing, articles.clone());

        let report = engine.run(10, 5).await.unwrap();

        assert_eq!(report.discovered, 2);
        assert_eq!(ids(&store.records()), vec!["0", "4", "3", "2", "1"]);
        assert_eq!(articles.requests(), vec![summary("2").url, summary("1").url]);
    }

    #[tokio::test]
    async fn test_corrupt_store_aborts_before_any_fetch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("myths.csv");
        std::fs::write(&path, "not,the,right,header\n").unwrap();
        let store = Arc::new(CsvStore::new(&path));
        let listing = ScriptedListing::new(vec![vec![summary("1")]]);
        let (engine, _) = engine(store, listing.clone(), ScriptedArticles::new());

        let result = engine.run(10, 5).await;

        assert!(matches!(result, Err(Error::StoreCorruption(_))));
        assert!(listing.requests().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not,the,right,header\n");
    }
}
