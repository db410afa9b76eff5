//! Listing filters.
//!
//! A listing request carries two kinds of filter:
//! - RootFilter: a predicate on the root entity (or a to-one relation of
//!   it) that the tree fetcher pushes into the database query
//! - PostFetchFilter: a predicate on nodes of one tree level that cannot be
//!   pushed down without dropping valid sibling data; applied while
//!   flattening, at the level it targets

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::order::compare_values;
use super::tree::{EntityNode, value_to_text};
use super::types::ColumnPath;

/// Comparison operators for root filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Equals,
    /// Not equal.
    NotEquals,
    /// Substring match (LIKE %value%).
    Contains,
    /// Prefix match (LIKE value%).
    StartsWith,
    /// Greater than.
    GreaterThan,
    /// Less than.
    LessThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than or equal.
    LessOrEqual,
    /// Value in list.
    In,
    /// Field is NULL.
    IsNull,
    /// Field is not NULL.
    IsNotNull,
}

/// Filter value types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    /// String value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// UUID value.
    Uuid(Uuid),
    /// List of values (for the In operator).
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Convert to string representation for SQL.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(s.clone()),
            FilterValue::Integer(i) => Some(i.to_string()),
            FilterValue::Float(f) => Some(f.to_string()),
            FilterValue::Boolean(b) => Some(b.to_string()),
            FilterValue::Uuid(u) => Some(u.to_string()),
            FilterValue::List(_) => None,
        }
    }

    /// Extract a list of strings (single values become one-element lists).
    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            FilterValue::List(items) => items.iter().filter_map(|v| v.as_string()).collect(),
            other => other.as_string().into_iter().collect(),
        }
    }

    /// JSON form, used when comparing against fetched attributes.
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Integer(i) => Value::from(*i),
            FilterValue::Float(f) => Value::from(*f),
            FilterValue::Boolean(b) => Value::Bool(*b),
            FilterValue::Uuid(u) => Value::String(u.to_string()),
            FilterValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

/// A predicate pushed down to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootFilter {
    /// Column path on the root (dotted for to-one relations).
    pub field: String,

    /// Comparison operator.
    pub operator: FilterOperator,

    /// Value to compare against. Ignored by the null checks.
    pub value: FilterValue,
}

impl RootFilter {
    pub fn new(field: &str, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    /// Column path this filter applies to.
    pub fn path(&self) -> ColumnPath {
        ColumnPath::parse(&self.field)
    }

    /// Evaluate against materialized root attributes.
    ///
    /// Used by fetchers that hold trees in memory. Text operators compare
    /// string forms; ordering operators use the shared value ordering.
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        let path = self.path();
        let actual = path.lookup(attributes).filter(|v| !v.is_null());

        match self.operator {
            FilterOperator::IsNull => actual.is_none(),
            FilterOperator::IsNotNull => actual.is_some(),
            FilterOperator::Equals => text_eq(actual, &self.value),
            FilterOperator::NotEquals => actual.is_some() && !text_eq(actual, &self.value),
            FilterOperator::Contains => text_test(actual, &self.value, |a, v| a.contains(v)),
            FilterOperator::StartsWith => text_test(actual, &self.value, |a, v| a.starts_with(v)),
            FilterOperator::GreaterThan => self.ordering_test(actual, |o| o == Ordering::Greater),
            FilterOperator::LessThan => self.ordering_test(actual, |o| o == Ordering::Less),
            FilterOperator::GreaterOrEqual => {
                self.ordering_test(actual, |o| o != Ordering::Less)
            }
            FilterOperator::LessOrEqual => self.ordering_test(actual, |o| o != Ordering::Greater),
            FilterOperator::In => {
                let Some(actual) = actual.and_then(value_to_text) else {
                    return false;
                };
                self.value.as_string_list().contains(&actual)
            }
        }
    }

    fn ordering_test(&self, actual: Option<&Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        match actual {
            Some(actual) => accept(compare_values(Some(actual), Some(&self.value.to_json()))),
            None => false,
        }
    }
}

fn text_eq(actual: Option<&Value>, expected: &FilterValue) -> bool {
    match (actual.and_then(value_to_text), expected.as_string()) {
        (Some(a), Some(e)) => a == e,
        _ => false,
    }
}

fn text_test(actual: Option<&Value>, expected: &FilterValue, test: fn(&str, &str) -> bool) -> bool {
    match (actual.and_then(value_to_text), expected.as_string()) {
        (Some(a), Some(e)) => test(&a, &e),
        _ => false,
    }
}

type NodePredicate = Arc<dyn Fn(&EntityNode) -> bool + Send + Sync>;

/// A predicate on the nodes of one tree level, applied during flattening.
#[derive(Clone)]
pub struct PostFetchFilter {
    level: usize,
    label: String,
    predicate: NodePredicate,
}

impl PostFetchFilter {
    /// Filter nodes at `level` (0 is the root) with an arbitrary predicate.
    pub fn new(
        level: usize,
        label: &str,
        predicate: impl Fn(&EntityNode) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            level,
            label: label.to_string(),
            predicate: Arc::new(predicate),
        }
    }

    /// Case-insensitive substring match on one attribute. Nodes where the
    /// attribute is null or absent are rejected.
    pub fn contains(level: usize, attribute: &str, needle: &str) -> Self {
        let attribute = attribute.to_string();
        let needle = needle.to_lowercase();
        let label = format!("{attribute} contains");
        Self::new(level, &label, move |node| {
            node.text(&attribute)
                .is_some_and(|value| value.to_lowercase().contains(&needle))
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn accepts(&self, node: &EntityNode) -> bool {
        (self.predicate)(node)
    }
}

impl fmt::Debug for PostFetchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostFetchFilter")
            .field("level", &self.level)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// The post-fetch filters registered for one request.
#[derive(Debug, Clone, Default)]
pub struct PostFetchFilters {
    filters: Vec<PostFetchFilter>,
}

impl PostFetchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: PostFetchFilter) {
        self.filters.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostFetchFilter> {
        self.filters.iter()
    }

    /// Whether `node` at `level` passes every filter targeting that level.
    pub fn accepts(&self, level: usize, node: &EntityNode) -> bool {
        self.filters
            .iter()
            .filter(|f| f.level == level)
            .all(|f| f.accepts(node))
    }
}

impl FromIterator<PostFetchFilter> for PostFetchFilters {
    fn from_iter<I: IntoIterator<Item = PostFetchFilter>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

/// All filters for one listing request, split by where they run.
#[derive(Debug, Clone, Default)]
pub struct ListingFilters {
    /// Pushed into the database query.
    pub root: Vec<RootFilter>,

    /// Applied while flattening.
    pub post_fetch: PostFetchFilters,
}

impl ListingFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, filter: RootFilter) -> Self {
        self.root.push(filter);
        self
    }

    pub fn post_fetch(mut self, filter: PostFetchFilter) -> Self {
        self.post_fetch.push(filter);
        self
    }
}
