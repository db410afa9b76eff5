//! Listing engine errors.

use thiserror::Error;

/// Listing configuration errors.
///
/// These are programmer errors: a listing definition that references fields
/// it cannot produce, or a sort spec built outside the resolver. They are
/// reported at listing construction or before any query reaches the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingConfigError {
    #[error("listing '{listing}' declares no levels")]
    NoLevels { listing: String },

    #[error("default sort field '{field}' is not in the allow-list of listing '{listing}'")]
    MissingDefaultSort { listing: String, field: String },

    #[error("default sort field '{field}' of listing '{listing}' is not database-orderable")]
    DeferredDefaultSort { listing: String, field: String },

    #[error("sort field '{field}' of listing '{listing}' expands to no columns")]
    EmptyExpansion { listing: String, field: String },

    #[error("deferred sort field '{field}' of listing '{listing}' sorts by unknown row field '{row_field}'")]
    UnknownDeferredRowField {
        listing: String,
        field: String,
        row_field: String,
    },

    #[error("column '{label}' of listing '{listing}' references unknown row field '{field}'")]
    UnknownColumnField {
        listing: String,
        label: String,
        field: String,
    },

    #[error("sort entry '{field}' does not match the allow-list of listing '{listing}'")]
    UnlistedSortField { listing: String, field: String },

    #[error("post-fetch filter '{label}' targets level {level}, but listing '{listing}' has {levels} levels")]
    FilterLevelOutOfRange {
        listing: String,
        label: String,
        level: usize,
        levels: usize,
    },
}

/// Errors returned by the listing pipeline.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Config(#[from] ListingConfigError),

    /// The tree fetch collaborator failed. Passed through unchanged.
    #[error("tree fetch failed")]
    Fetch(#[source] anyhow::Error),
}
