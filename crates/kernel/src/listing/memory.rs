//! In-memory tree fetcher.
//!
//! Serves trees that are already materialized (imports, fixtures). Root
//! filters and ordering are evaluated against root attributes, with to-one
//! relations embedded as nested objects (`{"account": {"name": ..}}`).

use std::cmp::Ordering;

use async_trait::async_trait;

use super::coordinator::{FetchWindow, FetchedWindow, TreeFetcher};
use super::filter::RootFilter;
use super::order::compare_values;
use super::tree::EntityNode;
use super::types::OrderKey;

/// Tree fetcher over a fixed set of roots.
#[derive(Debug, Clone, Default)]
pub struct MemoryTreeFetcher {
    roots: Vec<EntityNode>,
}

impl MemoryTreeFetcher {
    pub fn new(roots: Vec<EntityNode>) -> Self {
        Self { roots }
    }

    fn select(&self, filters: &[RootFilter], order: &[OrderKey]) -> Vec<EntityNode> {
        let mut selected: Vec<&EntityNode> = self
            .roots
            .iter()
            .filter(|root| filters.iter().all(|f| f.matches(&root.attributes)))
            .collect();

        selected.sort_by(|a, b| compare_roots(a, b, order));
        selected.into_iter().cloned().collect()
    }
}

fn compare_roots(a: &EntityNode, b: &EntityNode, order: &[OrderKey]) -> Ordering {
    for key in order {
        let ordering = key.direction.apply(compare_values(
            key.path.lookup(&a.attributes),
            key.path.lookup(&b.attributes),
        ));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl TreeFetcher for MemoryTreeFetcher {
    async fn fetch_all(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
    ) -> anyhow::Result<Vec<EntityNode>> {
        Ok(self.select(filters, order))
    }

    async fn fetch_window(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
        window: FetchWindow,
    ) -> anyhow::Result<FetchedWindow> {
        let selected = self.select(filters, order);
        let total_roots = selected.len() as u64;
        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);

        Ok(FetchedWindow {
            roots: selected.into_iter().skip(offset).take(limit).collect(),
            total_roots,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::filter::{FilterOperator, FilterValue};
    use crate::listing::types::{ColumnPath, SortDirection};
    use serde_json::{Value, json};

    fn fetcher() -> MemoryTreeFetcher {
        MemoryTreeFetcher::new(vec![
            EntityNode::from_json(json!({"id": 1, "status": "active", "account": {"name": "Beta"}})),
            EntityNode::from_json(json!({"id": 2, "status": "closed", "account": {"name": "Alpha"}})),
            EntityNode::from_json(json!({"id": 3, "status": "active", "account": {"name": "Alpha"}})),
        ])
    }

    fn ids(roots: &[EntityNode]) -> Vec<i64> {
        roots
            .iter()
            .map(|r| r.get("id").and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn orders_through_relations_with_tiebreak() {
        let order = vec![
            OrderKey::new(ColumnPath::parse("account.name"), SortDirection::Asc),
            OrderKey::new(ColumnPath::column("id"), SortDirection::Desc),
        ];
        let roots = fetcher().fetch_all(&[], &order).await.unwrap();
        assert_eq!(ids(&roots), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn filters_and_windows() {
        let filters = vec![RootFilter::new(
            "status",
            FilterOperator::Equals,
            FilterValue::String("active".into()),
        )];
        let order = vec![OrderKey::new(ColumnPath::column("id"), SortDirection::Asc)];

        let window = fetcher()
            .fetch_window(&filters, &order, FetchWindow { offset: 1, limit: 5 })
            .await
            .unwrap();
        assert_eq!(window.total_roots, 2);
        assert_eq!(ids(&window.roots), vec![3]);
    }
}
