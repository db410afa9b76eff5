//! Sort allow-lists and the sort string resolver.
//!
//! A listing declares which client field names may be sorted on and what
//! each one means: a database column (possibly through to-one relations),
//! an expansion into several columns sorted together, or a deferred key
//! evaluated in memory after flattening.

use std::collections::BTreeMap;

use super::types::{ColumnPath, SortDirection, SortEntry, SortSpec, SortTarget};

/// What a client-facing sort field maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    /// A single column path ordered by the database.
    Column(ColumnPath),
    /// Several column paths ordered by the database with the same direction.
    Expansion(Vec<ColumnPath>),
    /// Not orderable by the database; sorted in memory by this row field.
    Deferred(String),
}

impl SortField {
    /// Column (or dotted relation path) sort.
    pub fn column(path: &str) -> Self {
        Self::Column(ColumnPath::parse(path))
    }

    /// Expansion into several column paths.
    pub fn expansion(paths: &[&str]) -> Self {
        Self::Expansion(paths.iter().map(|p| ColumnPath::parse(p)).collect())
    }

    /// Deferred sort by a flattened row field.
    pub fn deferred(row_field: &str) -> Self {
        Self::Deferred(row_field.to_string())
    }

    /// Whether the database can order by this field.
    pub fn is_database_orderable(&self) -> bool {
        !matches!(self, Self::Deferred(_))
    }

    /// Resolved targets for this field, in order.
    pub fn targets(&self) -> Vec<SortTarget> {
        match self {
            Self::Column(path) => vec![SortTarget::Column(path.clone())],
            Self::Expansion(paths) => paths.iter().cloned().map(SortTarget::Column).collect(),
            Self::Deferred(row_field) => vec![SortTarget::Deferred(row_field.clone())],
        }
    }
}

/// Immutable per-listing table of sortable client field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortAllowList {
    fields: BTreeMap<String, SortField>,
}

impl SortAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field mapping.
    pub fn with(mut self, name: &str, field: SortField) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SortField> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SortField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolve a client sort string (`"field:dir,field:dir"`) against an
/// allow-list.
///
/// Tokens with an empty field, a field outside the allow-list, or a
/// direction other than `asc`/`desc` are dropped. A field repeated later in
/// the string is ignored after its first occurrence. When nothing resolves,
/// the result is the single entry `(default_field, desc)`. Never fails and
/// never returns an empty spec.
pub fn resolve(sort: &str, allow_list: &SortAllowList, default_field: &str) -> SortSpec {
    let mut entries: Vec<SortEntry> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for token in sort.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (name, direction) = match token.split_once(':') {
            Some((name, direction)) => (name.trim(), direction),
            None => (token, ""),
        };

        if name.is_empty() {
            tracing::debug!(token, "dropping sort token without a field");
            continue;
        }
        let Some(direction) = SortDirection::parse(direction) else {
            tracing::debug!(token, "dropping sort token with unknown direction");
            continue;
        };
        let Some(field) = allow_list.get(name) else {
            tracing::debug!(field = name, "dropping sort field outside the allow-list");
            continue;
        };
        if seen.contains(&name) {
            continue;
        }
        seen.push(name);

        entries.extend(field.targets().into_iter().map(|target| SortEntry {
            field: name.to_string(),
            target,
            direction,
        }));
    }

    if entries.is_empty() {
        return default_spec(allow_list, default_field);
    }

    SortSpec::new(entries)
}

/// The fallback spec: the default field, descending.
///
/// Listing definitions guarantee the default field is allow-listed and
/// database-orderable; when called with a bare allow-list that lacks it the
/// default is treated as a root column of the same name.
pub fn default_spec(allow_list: &SortAllowList, default_field: &str) -> SortSpec {
    let targets = match allow_list.get(default_field) {
        Some(field) if field.is_database_orderable() => field.targets(),
        _ => vec![SortTarget::Column(ColumnPath::column(default_field))],
    };

    SortSpec::new(
        targets
            .into_iter()
            .map(|target| SortEntry {
                field: default_field.to_string(),
                target,
                direction: SortDirection::Desc,
            })
            .collect(),
    )
}
