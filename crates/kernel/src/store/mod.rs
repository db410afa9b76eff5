//! PostgreSQL storage for listing trees.
//!
//! A [`TreeSchema`] describes the tables behind a listing; [`PgTreeFetcher`]
//! loads trees for it with batched per-level queries built by
//! [`TreeQueryBuilder`].

mod fetcher;
mod query_builder;
mod schema;

pub use fetcher::PgTreeFetcher;
pub use query_builder::TreeQueryBuilder;
pub use schema::{RelationJoin, TableLevel, TreeSchema};
