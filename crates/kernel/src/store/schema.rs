//! Table layout behind a listing's entity tree.

use serde::{Deserialize, Serialize};

use crate::listing::ColumnPath;

/// One level of the tree backed by a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLevel {
    /// Table name.
    pub table: String,

    /// Primary key column; child levels reference it.
    pub primary_key: String,

    /// Column referencing the previous level's primary key. `None` for the root.
    pub parent_key: Option<String>,

    /// Optional column giving sibling order (ties broken by primary key).
    pub position_column: Option<String>,
}

impl TableLevel {
    /// Root level of a tree.
    pub fn root(table: &str, primary_key: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            parent_key: None,
            position_column: None,
        }
    }

    /// A child level referencing its parent through `parent_key`.
    pub fn child(table: &str, primary_key: &str, parent_key: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            parent_key: Some(parent_key.to_string()),
            position_column: None,
        }
    }

    /// Order siblings by `column` before the primary key.
    pub fn ordered_by(mut self, column: &str) -> Self {
        self.position_column = Some(column.to_string());
        self
    }
}

/// A to-one relation joined onto the root query.
///
/// `path` is dotted from the root (`account`, `account.region`); the join
/// alias is the path with `__` between hops, matching
/// [`ColumnPath::relation_alias`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationJoin {
    pub path: Vec<String>,
    pub target_table: String,
    /// Column on the owning side (root table or previous hop).
    pub local_field: String,
    /// Column on the target table.
    pub foreign_field: String,
}

impl RelationJoin {
    pub fn new(path: &str, target_table: &str, local_field: &str, foreign_field: &str) -> Self {
        Self {
            path: path.split('.').map(str::to_string).collect(),
            target_table: target_table.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
        }
    }

    /// Join alias (`account__region`).
    pub fn alias(&self) -> String {
        self.path.join("__")
    }

    /// Alias of the table this relation hangs off, or `None` for the root.
    pub fn owner_alias(&self) -> Option<String> {
        match self.path.len() {
            0 | 1 => None,
            n => Some(self.path[..n - 1].join("__")),
        }
    }

    /// Name of the relation on its owner (last hop).
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Tables of a listing tree: the root, its to-one relations and the child
/// levels in nesting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSchema {
    pub root: TableLevel,
    #[serde(default)]
    pub relations: Vec<RelationJoin>,
    #[serde(default)]
    pub children: Vec<TableLevel>,
}

impl TreeSchema {
    pub fn new(root: TableLevel) -> Self {
        Self {
            root,
            relations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn relation(mut self, relation: RelationJoin) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn child(mut self, level: TableLevel) -> Self {
        self.children.push(level);
        self
    }

    /// Number of tree levels, root included.
    pub fn depth(&self) -> usize {
        1 + self.children.len()
    }

    pub fn find_relation(&self, alias: &str) -> Option<&RelationJoin> {
        self.relations.iter().find(|r| r.alias() == alias)
    }

    /// Whether `path` can be resolved against the root query's joins.
    pub fn resolves(&self, path: &ColumnPath) -> bool {
        match path.relation_alias() {
            None => true,
            Some(alias) => self.find_relation(&alias).is_some(),
        }
    }

    /// Check identifiers and structure. Returns a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let levels = std::iter::once(&self.root).chain(self.children.iter());
        for level in levels {
            for ident in [Some(&level.table), Some(&level.primary_key)]
                .into_iter()
                .chain([level.parent_key.as_ref(), level.position_column.as_ref()])
                .flatten()
            {
                if !is_valid_identifier(ident) {
                    errors.push(format!("invalid identifier '{ident}' in level '{}'", level.table));
                }
            }
        }

        if self.root.parent_key.is_some() {
            errors.push(format!("root level '{}' must not have a parent key", self.root.table));
        }
        for child in &self.children {
            if child.parent_key.is_none() {
                errors.push(format!("child level '{}' has no parent key", child.table));
            }
        }

        for relation in &self.relations {
            for ident in relation
                .path
                .iter()
                .chain([&relation.target_table, &relation.local_field, &relation.foreign_field])
            {
                if !is_valid_identifier(ident) {
                    errors.push(format!(
                        "invalid identifier '{ident}' in relation '{}'",
                        relation.alias()
                    ));
                }
            }
            if let Some(owner) = relation.owner_alias()
                && self.find_relation(&owner).is_none()
            {
                errors.push(format!(
                    "relation '{}' hangs off unknown relation '{owner}'",
                    relation.alias()
                ));
            }
        }

        errors
    }
}

/// Identifiers are plain lowercase-style names: a letter or underscore
/// followed by ASCII alphanumerics or underscores.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
