//! Tree fetch queries using SeaQuery.
//!
//! Generates the SQL for one listing tree:
//! - Root select with to-one relation joins, root filters, ordering and an
//!   optional LIMIT/OFFSET window
//! - Root count under the same filters
//! - Batched child selects keyed by parent primary keys

use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};

use super::schema::{TableLevel, TreeSchema};
use crate::listing::{
    ColumnPath, FetchWindow, FilterOperator, FilterValue, OrderKey, RootFilter, SortDirection,
};

/// Query builder for one tree schema.
pub struct TreeQueryBuilder<'a> {
    schema: &'a TreeSchema,
}

impl<'a> TreeQueryBuilder<'a> {
    pub fn new(schema: &'a TreeSchema) -> Self {
        Self { schema }
    }

    /// Build the root SELECT. Each result row is one JSON object: root
    /// columns plus one nested object per joined relation.
    pub fn build_roots(
        &self,
        filters: &[RootFilter],
        order: &[OrderKey],
        window: Option<FetchWindow>,
    ) -> String {
        let root = &self.schema.root.table;
        let mut query = Query::select();

        query.column((Alias::new(root), Asterisk));
        for relation in &self.schema.relations {
            let alias = relation.alias();
            query.expr_as(
                Expr::cust(format!("row_to_json(\"{alias}\")")),
                Alias::new(&alias),
            );
        }

        query.from(Alias::new(root));
        self.add_joins(&mut query);
        self.add_filters(&mut query, filters);
        self.add_order(&mut query, order);

        if let Some(window) = window {
            query.limit(window.limit);
            query.offset(window.offset);
        }

        json_rows(&query.to_string(PostgresQueryBuilder))
    }

    /// Build a COUNT query over roots matching the filters.
    pub fn build_count(&self, filters: &[RootFilter]) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.schema.root.table));
        self.add_joins(&mut query);
        self.add_filters(&mut query, filters);
        query.to_string(PostgresQueryBuilder)
    }

    /// Build the SELECT for children of `parent_keys` at `level`.
    ///
    /// Keys are compared as text so the same query serves integer and UUID
    /// keys. Rows come back grouped by parent, siblings in position then
    /// primary key order.
    pub fn build_children(&self, level: &TableLevel, parent_keys: &[String]) -> String {
        let table = Alias::new(&level.table);
        let parent_key = level.parent_key.as_deref().unwrap_or(&level.primary_key);
        let mut query = Query::select();

        query.column((table.clone(), Asterisk));
        query.from(table.clone());

        if parent_keys.is_empty() {
            query.and_where(Expr::cust("FALSE"));
        } else {
            query.and_where(
                Expr::col((table.clone(), Alias::new(parent_key)))
                    .cast_as(Alias::new("text"))
                    .is_in(parent_keys.iter().cloned()),
            );
        }

        query.order_by((table.clone(), Alias::new(parent_key)), Order::Asc);
        if let Some(position) = &level.position_column {
            query.order_by((table.clone(), Alias::new(position)), Order::Asc);
        }
        query.order_by((table, Alias::new(&level.primary_key)), Order::Asc);

        json_rows(&query.to_string(PostgresQueryBuilder))
    }

    /// LEFT JOIN each relation under its alias, owners before dependents.
    fn add_joins(&self, query: &mut SelectStatement) {
        let mut relations: Vec<_> = self.schema.relations.iter().collect();
        relations.sort_by_key(|r| r.depth());

        for relation in relations {
            let owner = relation
                .owner_alias()
                .unwrap_or_else(|| self.schema.root.table.clone());
            let alias = relation.alias();

            let on_condition = Expr::col((Alias::new(&owner), Alias::new(&relation.local_field)))
                .equals((Alias::new(&alias), Alias::new(&relation.foreign_field)));

            query.join_as(
                sea_query::JoinType::LeftJoin,
                Alias::new(&relation.target_table),
                Alias::new(&alias),
                on_condition,
            );
        }
    }

    fn add_filters(&self, query: &mut SelectStatement, filters: &[RootFilter]) {
        for filter in filters {
            if let Some(condition) = self.build_filter_condition(filter) {
                query.and_where(condition);
            }
        }
    }

    fn build_filter_condition(&self, filter: &RootFilter) -> Option<SimpleExpr> {
        let Some(field_expr) = self.column_expr(&filter.path()) else {
            tracing::error!(
                field = %filter.field,
                root = %self.schema.root.table,
                "root filter names an unknown relation; restricting results"
            );
            return Some(Expr::cust("FALSE"));
        };

        match filter.operator {
            FilterOperator::Equals => Some(field_expr.eq(sql_value(&filter.value)?)),
            FilterOperator::NotEquals => Some(field_expr.ne(sql_value(&filter.value)?)),
            FilterOperator::Contains => {
                let value = filter.value.as_string()?;
                Some(field_expr.like(format!("%{}%", escape_like_wildcards(&value))))
            }
            FilterOperator::StartsWith => {
                let value = filter.value.as_string()?;
                Some(field_expr.like(format!("{}%", escape_like_wildcards(&value))))
            }
            FilterOperator::GreaterThan => Some(field_expr.gt(sql_value(&filter.value)?)),
            FilterOperator::LessThan => Some(field_expr.lt(sql_value(&filter.value)?)),
            FilterOperator::GreaterOrEqual => Some(field_expr.gte(sql_value(&filter.value)?)),
            FilterOperator::LessOrEqual => Some(field_expr.lte(sql_value(&filter.value)?)),
            FilterOperator::In => {
                let values = filter.value.as_string_list();
                if values.is_empty() {
                    // An empty list matches nothing.
                    return Some(Expr::cust("FALSE"));
                }
                Some(field_expr.cast_as(Alias::new("text")).is_in(values))
            }
            FilterOperator::IsNull => Some(field_expr.is_null()),
            FilterOperator::IsNotNull => Some(field_expr.is_not_null()),
        }
    }

    /// Column expression for a root or relation path, `None` when the
    /// relation is not joined.
    fn column_expr(&self, path: &ColumnPath) -> Option<Expr> {
        let table = match path.relation_alias() {
            None => self.schema.root.table.clone(),
            Some(alias) => self.schema.find_relation(&alias)?.alias(),
        };
        Some(Expr::col((Alias::new(table), Alias::new(&path.column))))
    }

    fn add_order(&self, query: &mut SelectStatement, order: &[OrderKey]) {
        for key in order {
            let direction = match key.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            let table = match key.path.relation_alias() {
                None => self.schema.root.table.clone(),
                Some(alias) if self.schema.find_relation(&alias).is_some() => alias,
                Some(alias) => {
                    tracing::warn!(
                        path = %key.path,
                        relation = %alias,
                        "order key names an unknown relation; skipping"
                    );
                    continue;
                }
            };
            query.order_by((Alias::new(table), Alias::new(&key.path.column)), direction);
        }
    }
}

/// Wrap a SELECT so each row comes back as a single JSON object.
fn json_rows(sql: &str) -> String {
    format!("SELECT row_to_json(t) FROM ({sql}) t")
}

fn sql_value(value: &FilterValue) -> Option<sea_query::Value> {
    match value {
        FilterValue::String(s) => Some(s.clone().into()),
        FilterValue::Integer(i) => Some((*i).into()),
        FilterValue::Float(f) => Some((*f).into()),
        FilterValue::Boolean(b) => Some((*b).into()),
        FilterValue::Uuid(u) => Some((*u).into()),
        FilterValue::List(_) => None,
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
