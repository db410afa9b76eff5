//! Listing API routes.
//!
//! REST endpoints for paginated listings and their exports.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::listing::{
    ColumnDef, ExportTable, ListingQuery, PaginatedResult, SortDirection, SortSpec, flatten_all,
    paginate,
};
use crate::listings::{RESERVED_PARAMS, RegisteredListing};
use crate::state::AppState;

/// Create the listing router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/listings", get(list_listings))
        .route("/api/listings/{name}", get(get_page))
        .route("/api/listings/{name}/export", get(export_listing))
}

// -------------------------------------------------------------------------
// Response types
// -------------------------------------------------------------------------

#[derive(Serialize)]
struct ListingSummary {
    name: String,
    levels: Vec<String>,
    sort_fields: Vec<String>,
    default_sort: String,
    flat: bool,
    columns: Vec<ColumnDef>,
}

#[derive(Serialize)]
struct AppliedSort {
    field: String,
    direction: SortDirection,
}

#[derive(Serialize)]
struct PageResponse {
    listing: String,
    sort: Vec<AppliedSort>,
    #[serde(flatten)]
    result: PaginatedResult,
}

#[derive(Serialize)]
struct ExportResponse {
    listing: String,
    sort: Vec<AppliedSort>,
    #[serde(flatten)]
    table: ExportTable,
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

async fn list_listings(State(state): State<AppState>) -> Json<Vec<ListingSummary>> {
    Json(
        state
            .listings()
            .iter()
            .map(|listing| {
                let definition = listing.definition();
                ListingSummary {
                    name: definition.name().to_string(),
                    levels: definition.levels().iter().map(|l| l.name.clone()).collect(),
                    sort_fields: definition
                        .allow_list()
                        .iter()
                        .map(|(name, _)| name.to_string())
                        .collect(),
                    default_sort: definition.default_sort().to_string(),
                    flat: definition.is_flat(),
                    columns: definition.columns().to_vec(),
                }
            })
            .collect(),
    )
}

async fn get_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<PageResponse>> {
    let listing = find(&state, &name)?;
    let query = listing_query(&listing, &params);
    let window = state.paging().window(
        paging_param(&params, "page"),
        paging_param(&params, "per_page"),
    );

    let fetcher = state.fetcher_for(&listing);
    let result = paginate(listing.definition(), fetcher.as_ref(), &query, window).await?;

    Ok(Json(PageResponse {
        listing: name,
        sort: applied_sort(&query.sort),
        result,
    }))
}

async fn export_listing(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ExportResponse>> {
    let listing = find(&state, &name)?;
    let query = listing_query(&listing, &params);

    let fetcher = state.fetcher_for(&listing);
    let rows = flatten_all(listing.definition(), fetcher.as_ref(), &query).await?;
    let table = ExportTable::build(listing.definition().columns(), &rows);

    tracing::info!(listing = %name, rows = table.rows.len(), "exported listing");

    Ok(Json(ExportResponse {
        listing: name,
        sort: applied_sort(&query.sort),
        table,
    }))
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn find(state: &AppState, name: &str) -> AppResult<std::sync::Arc<RegisteredListing>> {
    state
        .listings()
        .get(name)
        .ok_or_else(|| AppError::NotFound(name.to_string()))
}

fn listing_query(listing: &RegisteredListing, params: &HashMap<String, String>) -> ListingQuery {
    let sort = params.get("sort").map(String::as_str).unwrap_or_default();
    let filter_params: HashMap<String, String> = params
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ListingQuery::new(
        listing.definition().resolve_sort(sort),
        listing.filters(&filter_params),
    )
}

/// Paging input as sent. Unparseable values read as 0 and are clamped later.
fn paging_param(params: &HashMap<String, String>, name: &str) -> Option<i64> {
    params
        .get(name)
        .map(|raw| raw.trim().parse::<i64>().unwrap_or(0))
}

/// Client fields of a resolved sort, one per field (expansions collapse).
fn applied_sort(spec: &SortSpec) -> Vec<AppliedSort> {
    let mut applied: Vec<AppliedSort> = Vec::new();
    for entry in spec.entries() {
        if applied.last().is_some_and(|last| last.field == entry.field) {
            continue;
        }
        applied.push(AppliedSort {
            field: entry.field.clone(),
            direction: entry.direction,
        });
    }
    applied
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn paging_params_tolerate_garbage() {
        let p = params(&[("page", "abc"), ("per_page", " 40 ")]);
        assert_eq!(paging_param(&p, "page"), Some(0));
        assert_eq!(paging_param(&p, "per_page"), Some(40));
        assert_eq!(paging_param(&p, "missing"), None);
    }
}
