//! Listing engine module.
//!
//! This module provides:
//! - Sort resolution against per-listing allow-lists
//! - Pushdown classification of sort keys (database vs. in-memory)
//! - Relational flattening of nested entity trees into rows
//! - Hybrid pagination over database windows or flattened rows
//! - Export tables shaped from flattened rows

mod coordinator;
mod definition;
mod error;
mod export;
mod filter;
mod flatten;
mod memory;
mod order;
mod pushdown;
mod sort;
mod tree;
pub mod types;

pub use coordinator::{
    FetchWindow, FetchedWindow, ListingQuery, PaginationPath, TreeFetcher, choose_path,
    flatten_all, paginate,
};
pub use definition::{ListingDefinition, ListingDefinitionBuilder};
pub use error::{ListingConfigError, ListingError};
pub use export::{ColumnDef, ExportTable};
pub use filter::{
    FilterOperator, FilterValue, ListingFilters, PostFetchFilter, PostFetchFilters, RootFilter,
};
pub use flatten::{flatten, flatten_indexed, rows_per_root};
pub use memory::MemoryTreeFetcher;
pub use order::{apply_deferred_sort, compare_values};
pub use pushdown::SortPlan;
pub use sort::{SortAllowList, SortField, default_spec, resolve};
pub use tree::{EntityNode, FieldProjection, LevelSpec, value_to_text};
pub use types::{
    ColumnPath, DeferredKey, FlatRow, MAX_PER_PAGE, MemorySortKey, OrderKey, PageWindow,
    PaginatedResult, PagingLimits, SortDirection, SortEntry, SortSpec, SortTarget,
};
