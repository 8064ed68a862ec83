pub mod csv_store;
pub mod traits;

pub use csv_store::CsvStore;
pub use traits::{MemoryStore, RecordStore, WriteOutcome};
