//! Listing engine types.
//!
//! Provides the value types shared by every stage of the listing pipeline:
//! - ColumnPath: a root column, optionally reached through to-one relations
//! - SortSpec / SortEntry: a resolved, ordered sort specification
//! - FlatRow: one denormalized output row
//! - PageWindow / PagingLimits: clamped paging input
//! - PaginatedResult: one page of rows plus totals

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a direction token case-insensitively.
    ///
    /// An empty token means the default (`asc`). Anything other than
    /// `asc`/`desc` is rejected.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if token.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    /// Apply this direction to an ascending comparison result.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }

    /// Return the string form used in sort strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A database column on the root entity, optionally reached through one or
/// more to-one relations (`account.region.name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPath {
    /// Relation hops from the root, outermost first.
    #[serde(default)]
    pub relations: Vec<String>,

    /// Column name on the last relation (or on the root when there are none).
    pub column: String,
}

impl ColumnPath {
    /// A column directly on the root table.
    pub fn column(name: &str) -> Self {
        Self {
            relations: Vec::new(),
            column: name.to_string(),
        }
    }

    /// Parse a dotted path: every segment but the last is a relation hop.
    pub fn parse(path: &str) -> Self {
        let mut segments: Vec<String> = path
            .split('.')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let column = segments.pop().unwrap_or_default();
        Self {
            relations: segments,
            column,
        }
    }

    /// Whether the path stays on the root table.
    pub fn is_root_column(&self) -> bool {
        self.relations.is_empty()
    }

    /// Table alias for the innermost relation of this path (`account__region`).
    pub fn relation_alias(&self) -> Option<String> {
        if self.relations.is_empty() {
            None
        } else {
            Some(self.relations.join("__"))
        }
    }

    /// Look the path up in an attribute map where to-one relations are
    /// embedded as nested objects. Falls back to the dotted key for flat maps.
    pub fn lookup<'a>(&self, attributes: &'a Map<String, Value>) -> Option<&'a Value> {
        let mut current = attributes;
        for relation in &self.relations {
            match current.get(relation).and_then(Value::as_object) {
                Some(nested) => current = nested,
                None => return attributes.get(&self.to_string()),
            }
        }
        current.get(&self.column)
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for relation in &self.relations {
            write!(f, "{relation}.")?;
        }
        f.write_str(&self.column)
    }
}

/// Where a resolved sort entry is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortTarget {
    /// Ordered by the database.
    Column(ColumnPath),
    /// Ordered in memory after flattening, by the named row field.
    Deferred(String),
}

/// One resolved sort entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    /// Client-facing field name this entry was resolved from.
    pub field: String,

    /// Resolved target.
    pub target: SortTarget,

    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// Ordered, resolved sort specification. Never empty when produced by the
/// resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortEntry>);

impl SortSpec {
    /// Wrap resolved entries.
    pub fn new(entries: Vec<SortEntry>) -> Self {
        Self(entries)
    }

    /// Entries in caller order.
    pub fn entries(&self) -> &[SortEntry] {
        &self.0
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Database order key passed to the tree fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub path: ColumnPath,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderKey {
    pub fn new(path: ColumnPath, direction: SortDirection) -> Self {
        Self { path, direction }
    }
}

/// In-memory sort key applied to flattened rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredKey {
    pub row_field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// One key of the in-memory sort, in caller order.
///
/// Database keys are evaluated against the root a row came from, deferred
/// keys against the flattened row itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemorySortKey {
    Root(OrderKey),
    Row(DeferredKey),
}

/// One denormalized output row.
///
/// Field names are the stable row field names declared by the listing's
/// level projections; export column definitions refer to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow(Map<String, Value>);

impl FlatRow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Field value, `None` when the row has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }
}

/// A validated, 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub page: u32,
    pub per_page: u32,
}

impl PageWindow {
    /// Build a window, clamping `page` and `per_page` to at least 1.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Zero-based index of the first row on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// Configured bounds for `per_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingLimits {
    pub min_per_page: u32,
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PagingLimits {
    fn default() -> Self {
        Self {
            min_per_page: 1,
            default_per_page: 25,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

/// Upper bound for `per_page` unless configured otherwise.
pub const MAX_PER_PAGE: u32 = 100;

impl PagingLimits {
    /// Clamp raw client input into a valid window.
    ///
    /// Missing `page` means 1 and missing `per_page` the configured default.
    /// Out-of-range values are clamped: `page` to 1, a too-small `per_page`
    /// to the minimum and a too-large one to the maximum.
    pub fn window(&self, page: Option<i64>, per_page: Option<i64>) -> PageWindow {
        let clamped_page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            Some(p) => {
                tracing::debug!(requested = p, "page out of range, using 1");
                1
            }
            None => 1,
        };

        let clamped_per_page = match per_page {
            None => self.default_per_page,
            Some(n) if n < i64::from(self.min_per_page) => {
                tracing::debug!(
                    requested = n,
                    min = self.min_per_page,
                    "per_page below minimum, clamping"
                );
                self.min_per_page
            }
            Some(n) if n > i64::from(self.max_per_page) => {
                tracing::warn!(
                    requested = n,
                    capped = self.max_per_page,
                    "per_page exceeds maximum, capping"
                );
                self.max_per_page
            }
            Some(n) => u32::try_from(n).unwrap_or(self.max_per_page),
        };

        PageWindow::new(clamped_page, clamped_per_page)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult {
    /// Rows on this page.
    pub rows: Vec<FlatRow>,

    /// Total rows across all pages.
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Rows per page.
    pub per_page: u32,

    /// Total number of pages.
    pub total_pages: u64,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,
}

impl PaginatedResult {
    /// Create a result for rows that are already the requested page.
    pub fn new(rows: Vec<FlatRow>, total: u64, window: PageWindow) -> Self {
        let total_pages = total.div_ceil(u64::from(window.per_page));
        Self {
            rows,
            total,
            page: window.page,
            per_page: window.per_page,
            total_pages,
            has_next: u64::from(window.page) < total_pages,
            has_prev: window.page > 1,
        }
    }

    /// Slice one page out of the complete, ordered row set.
    pub fn from_all_rows(mut all_rows: Vec<FlatRow>, window: PageWindow) -> Self {
        let total = all_rows.len() as u64;
        let start = usize::try_from(window.offset()).unwrap_or(usize::MAX);
        let rows = if start >= all_rows.len() {
            Vec::new()
        } else {
            let end = start
                .saturating_add(window.per_page as usize)
                .min(all_rows.len());
            all_rows.truncate(end);
            all_rows.split_off(start)
        };
        Self::new(rows, total, window)
    }
}
