//! Hybrid pagination.
//!
//! Decides per request whether a page can be cut by the database (LIMIT /
//! OFFSET over roots) or must be cut from the fully flattened and sorted
//! row set, and exposes the shared flatten-all pipeline used by exports.

use async_trait::async_trait;
use serde::Serialize;

use super::definition::ListingDefinition;
use super::error::ListingError;
use super::filter::{ListingFilters, RootFilter};
use super::flatten::{flatten, flatten_indexed};
use super::order::apply_deferred_sort;
use super::pushdown::SortPlan;
use super::tree::EntityNode;
use super::types::{FlatRow, OrderKey, PageWindow, PaginatedResult, SortSpec};

/// Offset/limit over roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub offset: u64,
    pub limit: u64,
}

impl From<PageWindow> for FetchWindow {
    fn from(window: PageWindow) -> Self {
        Self {
            offset: window.offset(),
            limit: window.limit(),
        }
    }
}

/// A bounded fetch: the roots in the window plus the number of roots
/// matching the filters overall.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedWindow {
    pub roots: Vec<EntityNode>,
    pub total_roots: u64,
}

/// Tree fetch collaborator.
///
/// Implementations return roots with their descendant collections fully
/// materialized down to the listing's leaf level, filtered by the root
/// filters and ordered exactly by `order`. Callers always end `order` with
/// the primary key so bounded fetches are repeatable.
#[async_trait]
pub trait TreeFetcher: Send + Sync {
    /// Fetch every matching root.
    async fn fetch_all(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
    ) -> anyhow::Result<Vec<EntityNode>>;

    /// Fetch one window of matching roots and the total root count.
    async fn fetch_window(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
        window: FetchWindow,
    ) -> anyhow::Result<FetchedWindow>;
}

/// A listing request: resolved sort plus filters.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub sort: SortSpec,
    pub filters: ListingFilters,
}

impl ListingQuery {
    pub fn new(sort: SortSpec, filters: ListingFilters) -> Self {
        Self { sort, filters }
    }
}

/// Which pagination strategy a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPath {
    /// LIMIT/OFFSET over roots in the database.
    Pushdown,
    /// Fetch everything, flatten, sort, then slice.
    InMemory,
}

impl PaginationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pushdown => "pushdown",
            Self::InMemory => "in_memory",
        }
    }
}

/// Choose the pagination strategy.
///
/// Root-level paging is only page-accurate when every root yields exactly
/// one row in database order: no deferred sort keys, no post-fetch filters
/// and a single-level listing. Anything else can make a root contribute a
/// data-dependent number of rows, including zero.
pub fn choose_path(
    definition: &ListingDefinition,
    plan: &SortPlan,
    filters: &ListingFilters,
) -> PaginationPath {
    if !plan.has_deferred() && filters.post_fetch.is_empty() && definition.is_flat() {
        PaginationPath::Pushdown
    } else {
        PaginationPath::InMemory
    }
}

/// Validate the request against the listing and partition its sort.
fn prepare(definition: &ListingDefinition, query: &ListingQuery) -> Result<SortPlan, ListingError> {
    definition.check_filters(&query.filters.post_fetch)?;
    let plan = SortPlan::classify(definition.name(), &query.sort, definition.allow_list())?;
    Ok(plan)
}

/// One page of the listing.
pub async fn paginate(
    definition: &ListingDefinition,
    fetcher: &dyn TreeFetcher,
    query: &ListingQuery,
    window: PageWindow,
) -> Result<PaginatedResult, ListingError> {
    let plan = prepare(definition, query)?;
    let path = choose_path(definition, &plan, &query.filters);

    tracing::debug!(
        listing = definition.name(),
        path = path.as_str(),
        page = window.page,
        per_page = window.per_page,
        "paginating listing"
    );

    match path {
        PaginationPath::Pushdown => {
            let order = plan.fetch_order(definition.primary_key());
            let fetched = fetcher
                .fetch_window(&query.filters.root, &order, window.into())
                .await
                .map_err(ListingError::Fetch)?;
            let rows = flatten(
                &fetched.roots,
                definition.levels(),
                &query.filters.post_fetch,
            );
            Ok(PaginatedResult::new(rows, fetched.total_roots, window))
        }
        PaginationPath::InMemory => {
            let rows = materialize(definition, fetcher, query, &plan).await?;
            Ok(PaginatedResult::from_all_rows(rows, window))
        }
    }
}

/// Every row of the listing, flattened and fully sorted.
///
/// Listing pages and exports share this pipeline, so concatenating all
/// pages yields exactly these rows in this order.
pub async fn flatten_all(
    definition: &ListingDefinition,
    fetcher: &dyn TreeFetcher,
    query: &ListingQuery,
) -> Result<Vec<FlatRow>, ListingError> {
    let plan = prepare(definition, query)?;
    materialize(definition, fetcher, query, &plan).await
}

async fn materialize(
    definition: &ListingDefinition,
    fetcher: &dyn TreeFetcher,
    query: &ListingQuery,
    plan: &SortPlan,
) -> Result<Vec<FlatRow>, ListingError> {
    let order = plan.fetch_order(definition.primary_key());

    // Unbounded on purpose: roots contribute a data-dependent number of
    // rows (possibly zero), so no root limit can be derived from a page
    // size. Fetching "just enough" roots would give wrong totals and pages.
    let roots = fetcher
        .fetch_all(&query.filters.root, &order)
        .await
        .map_err(ListingError::Fetch)?;

    // Roots arrive in database order; the deferred sort walks the whole
    // spec so database keys written before a deferred key stay primary.
    let mut indexed = flatten_indexed(&roots, definition.levels(), &query.filters.post_fetch);
    apply_deferred_sort(&mut indexed, &roots, plan.memory_order());
    let rows: Vec<FlatRow> = indexed.into_iter().map(|(_, row)| row).collect();

    tracing::debug!(
        listing = definition.name(),
        roots = roots.len(),
        rows = rows.len(),
        deferred_keys = plan.deferred_spec().len(),
        "materialized listing"
    );

    Ok(rows)
}
