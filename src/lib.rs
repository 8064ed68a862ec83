pub mod article;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod listing;
pub mod storage;
pub mod sync;

pub use article::{ArticleRecord, ArticleSummary, DedupKey};
pub use config::Config;
pub use error::{Error, Result};
pub use sync::{SyncEngine, SyncReport};
