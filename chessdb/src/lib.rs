//! Position indexing and pattern search over chess game collections.
//!
//! Games are replayed into positions, every position is stored with its
//! content fingerprint and material signature, and every occupied square is
//! written to an inverted `(square, piece)` index. Searches compile a query
//! into a [`index::QueryPlan`], render it to SQL and page through matching
//! games.

pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod search;
pub mod store;

pub use error::{Error, Result};
pub use index::GameFilter;
pub use index::maintenance::{
    coverage_report, fix_missing_index, rebuild_index, CoverageReport, IndexInconsistency,
    MaintenanceReport,
};
pub use ingest::{CancelSignal, ImportPipeline, ImportProgress, ImportStatus, ImportSummary, RawGame};
pub use search::{search, SearchMode, SearchRequest, SearchResults, MAX_PAGE_SIZE};
pub use store::{load_or_create_keys, Database, GameRecord, GameRepository, StoreStats};
