use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::article::ArticleRecord;
use crate::error::Result;

/// Durable table of captured articles.
///
/// Implementations must leave the previous contents intact when a write
/// fails part-way, and must treat an empty write as a no-op.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records in stored order. A store that does not exist yet is empty.
    async fn load(&self) -> Result<Vec<ArticleRecord>>;

    /// Replace the whole contents with `records`, header included.
    async fn overwrite(&self, records: &[ArticleRecord]) -> Result<WriteOutcome>;

    /// Add `records` after the existing contents.
    async fn append(&self, records: &[ArticleRecord]) -> Result<WriteOutcome>;
}

/// What a write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(usize),
    /// Zero rows were offered; the store was not touched.
    EmptyWritePrevented,
}

impl WriteOutcome {
    pub fn written(&self) -> usize {
        match self {
            WriteOutcome::Written(count) => *count,
            WriteOutcome::EmptyWritePrevented => 0,
        }
    }
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOutcome::Written(count) => write!(f, "wrote {} records", count),
            WriteOutcome::EmptyWritePrevented => write!(f, "empty write prevented"),
        }
    }
}

/// In-process store for tests and dry runs
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<ArticleRecord>>>,
    mutations: Arc<RwLock<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ArticleRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            mutations: Arc::new(RwLock::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn records(&self) -> Vec<ArticleRecord> {
        self.records.read().clone()
    }

    /// Number of writes that changed the contents.
    pub fn mutation_count(&self) -> usize {
        *self.mutations.read()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Result<Vec<ArticleRecord>> {
        Ok(self.records.read().clone())
    }

    async fn overwrite(&self, records: &[ArticleRecord]) -> Result<WriteOutcome> {
        if records.is_empty() {
            warn!("Refusing to overwrite memory store with zero records");
            return Ok(WriteOutcome::EmptyWritePrevented);
        }

        *self.records.write() = records.to_vec();
        *self.mutations.write() += 1;
        Ok(WriteOutcome::Written(records.len()))
    }

    async fn append(&self, records: &[ArticleRecord]) -> Result<WriteOutcome> {
        if records.is_empty() {
            warn!("Nothing to append to memory store");
            return Ok(WriteOutcome::EmptyWritePrevented);
        }

        self.records.write().extend_from_slice(records);
        *self.mutations.write() += 1;
        Ok(WriteOutcome::Written(records.len()))
    }
}
