//! PostgreSQL tree fetcher.
//!
//! Loads a listing tree level by level: one root query (with its count when
//! windowed), then one batched query per child level keyed by the parent
//! level's primary keys. Trees are assembled bottom-up once every level is
//! loaded. All queries of one fetch share a transaction so the statement
//! timeout applies to each of them.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

use super::query_builder::TreeQueryBuilder;
use super::schema::{TableLevel, TreeSchema};
use crate::listing::{
    EntityNode, FetchWindow, FetchedWindow, OrderKey, RootFilter, TreeFetcher, value_to_text,
};

/// Maximum parent keys per batched child query.
const MAX_BATCH_KEYS: usize = 1000;

/// Tree fetcher backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgTreeFetcher {
    pool: PgPool,
    schema: Arc<TreeSchema>,
    statement_timeout: Duration,
}

impl PgTreeFetcher {
    pub fn new(pool: PgPool, schema: Arc<TreeSchema>, statement_timeout: Duration) -> Self {
        Self {
            pool,
            schema,
            statement_timeout,
        }
    }

    async fn load(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
        window: Option<FetchWindow>,
    ) -> Result<(Vec<EntityNode>, Option<u64>)> {
        let builder = TreeQueryBuilder::new(&self.schema);

        // SET LOCAL only lasts for the transaction and resets on commit/rollback.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .context("failed to set statement timeout")?;

        let total = match window {
            Some(_) => {
                let count: i64 = sqlx::query_scalar(&builder.build_count(filters))
                    .fetch_one(&mut *tx)
                    .await
                    .context("failed to execute count query")?;
                Some(count.max(0) as u64)
            }
            None => None,
        };

        let root_rows: Vec<Value> = sqlx::query_scalar(&builder.build_roots(filters, order, window))
            .fetch_all(&mut *tx)
            .await
            .context("failed to execute root query")?;

        let mut roots = Vec::with_capacity(root_rows.len());
        for row in root_rows {
            let mut attributes = into_object(row, &self.schema.root.table)?;
            nest_relations(&self.schema, &mut attributes);
            roots.push(attributes);
        }

        let mut levels = vec![roots];
        let mut parent = &self.schema.root;
        for child in &self.schema.children {
            let keys = parent_keys(levels.last().map(Vec::as_slice).unwrap_or_default(), parent);
            let mut rows = Vec::new();

            for batch in keys.chunks(MAX_BATCH_KEYS) {
                let fetched: Vec<Value> = sqlx::query_scalar(&builder.build_children(child, batch))
                    .fetch_all(&mut *tx)
                    .await
                    .with_context(|| format!("failed to load '{}' rows", child.table))?;
                for row in fetched {
                    rows.push(into_object(row, &child.table)?);
                }
            }

            tracing::trace!(
                table = %child.table,
                parents = keys.len(),
                rows = rows.len(),
                "loaded tree level"
            );
            levels.push(rows);
            parent = child;
        }

        tx.commit()
            .await
            .context("failed to commit tree fetch transaction")?;

        Ok((assemble(&self.schema, levels), total))
    }
}

#[async_trait]
impl TreeFetcher for PgTreeFetcher {
    async fn fetch_all(&self, filters: &[RootFilter], order: &[OrderKey]) -> Result<Vec<EntityNode>> {
        let (roots, _) = self.load(filters, order, None).await?;
        Ok(roots)
    }

    async fn fetch_window(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
        window: FetchWindow,
    ) -> Result<FetchedWindow> {
        let (roots, total) = self.load(filters, order, Some(window)).await?;
        Ok(FetchedWindow {
            total_roots: total.unwrap_or(roots.len() as u64),
            roots,
        })
    }
}

fn into_object(row: Value, table: &str) -> Result<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object row from '{table}', got {other}"),
    }
}

/// Distinct primary keys of `rows` in first-seen order, as text.
fn parent_keys(rows: &[Map<String, Value>], level: &TableLevel) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(&level.primary_key).and_then(value_to_text))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Move multi-hop relation objects (`account__region`) under their owner
/// (`account.region`) so attribute lookups can follow relation paths.
fn nest_relations(schema: &TreeSchema, attributes: &mut Map<String, Value>) {
    let mut relations: Vec<_> = schema.relations.iter().filter(|r| r.depth() > 1).collect();
    relations.sort_by_key(|r| Reverse(r.depth()));

    for relation in relations {
        let Some(owner) = relation.owner_alias() else {
            continue;
        };
        let value = attributes.remove(&relation.alias()).unwrap_or(Value::Null);
        if let Some(Value::Object(owner_attributes)) = attributes.get_mut(&owner) {
            owner_attributes.insert(relation.name().to_string(), value);
        }
    }
}

/// Build trees from per-level rows, deepest level first. Children keep the
/// order their rows were loaded in.
fn assemble(schema: &TreeSchema, levels: Vec<Vec<Map<String, Value>>>) -> Vec<EntityNode> {
    let table_levels: Vec<&TableLevel> = std::iter::once(&schema.root)
        .chain(schema.children.iter())
        .collect();

    let mut below: HashMap<String, Vec<EntityNode>> = HashMap::new();
    let mut nodes = Vec::new();

    for (rows, level) in levels.into_iter().zip(table_levels).rev() {
        let mut grouped: HashMap<String, Vec<EntityNode>> = HashMap::new();
        nodes = Vec::with_capacity(rows.len());

        for attributes in rows {
            let children = attributes
                .get(&level.primary_key)
                .and_then(value_to_text)
                .and_then(|key| below.remove(&key))
                .unwrap_or_default();
            let parent = level
                .parent_key
                .as_deref()
                .and_then(|column| attributes.get(column))
                .and_then(value_to_text);
            let node = EntityNode {
                attributes,
                children,
            };

            match parent {
                Some(parent) => grouped.entry(parent).or_default().push(node),
                None => nodes.push(node),
            }
        }

        below = grouped;
    }

    nodes
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::schema::RelationJoin;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn schema() -> TreeSchema {
        TreeSchema::new(TableLevel::root("agreement", "id"))
            .relation(RelationJoin::new("account", "account", "account_id", "id"))
            .relation(RelationJoin::new("account.region", "region", "region_id", "id"))
            .child(TableLevel::child("line_item", "id", "agreement_id"))
            .child(TableLevel::child("allocation", "id", "line_item_id"))
    }

    #[test]
    fn relations_are_nested_under_their_owner() {
        let mut attributes = object(json!({
            "id": 1,
            "account": {"id": 7, "name": "Acme"},
            "account__region": {"id": 3, "name": "North"}
        }));
        nest_relations(&schema(), &mut attributes);

        assert!(!attributes.contains_key("account__region"));
        assert_eq!(attributes["account"]["region"]["name"], json!("North"));
        assert_eq!(attributes["account"]["name"], json!("Acme"));
    }

    #[test]
    fn missing_owner_drops_nested_relation() {
        let mut attributes = object(json!({"id": 1, "account": null, "account__region": null}));
        nest_relations(&schema(), &mut attributes);
        assert!(!attributes.contains_key("account__region"));
        assert_eq!(attributes["account"], Value::Null);
    }

    #[test]
    fn assembles_bottom_up_in_load_order() {
        let levels = vec![
            vec![object(json!({"id": 1})), object(json!({"id": 2}))],
            vec![
                object(json!({"id": 10, "agreement_id": 1})),
                object(json!({"id": 11, "agreement_id": 1})),
                object(json!({"id": 20, "agreement_id": 2})),
            ],
            vec![
                object(json!({"id": 100, "line_item_id": 11})),
                object(json!({"id": 101, "line_item_id": 10})),
                object(json!({"id": 102, "line_item_id": 11})),
            ],
        ];

        let roots = assemble(&schema(), levels);

        assert_eq!(roots.len(), 2);
        let first = &roots[0];
        assert_eq!(first.children.len(), 2);
        assert_eq!(first.children[0].get("id"), Some(&json!(10)));
        assert_eq!(first.children[0].children.len(), 1);
        let ids: Vec<_> = first.children[1]
            .children
            .iter()
            .map(|n| n.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![Some(json!(100)), Some(json!(102))]);
        assert!(roots[1].children[0].children.is_empty());
    }

    #[test]
    fn keys_are_distinct_text() {
        let rows = vec![
            object(json!({"id": 1})),
            object(json!({"id": "a"})),
            object(json!({"id": 1})),
            object(json!({"id": null})),
        ];
        let keys = parent_keys(&rows, &TableLevel::root("agreement", "id"));
        assert_eq!(keys, vec!["1".to_string(), "a".to_string()]);
    }
}
