//! Listing definitions.
//!
//! A definition is the immutable configuration of one listing type: its
//! nesting levels and their row projections, the sort allow-list and default,
//! the root primary key and the export columns. It is validated once when
//! built; a definition that exists is internally consistent.

use std::collections::BTreeSet;

use super::error::ListingConfigError;
use super::export::ColumnDef;
use super::filter::PostFetchFilters;
use super::sort::{self, SortAllowList, SortField};
use super::tree::LevelSpec;
use super::types::{ColumnPath, SortSpec};

/// Validated configuration of one listing type.
#[derive(Debug, Clone)]
pub struct ListingDefinition {
    name: String,
    levels: Vec<LevelSpec>,
    allow_list: SortAllowList,
    default_sort: String,
    primary_key: ColumnPath,
    columns: Vec<ColumnDef>,
}

impl ListingDefinition {
    /// Start building a listing definition.
    pub fn builder(name: &str) -> ListingDefinitionBuilder {
        ListingDefinitionBuilder {
            name: name.to_string(),
            levels: Vec::new(),
            allow_list: SortAllowList::new(),
            default_sort: "id".to_string(),
            primary_key: ColumnPath::column("id"),
            columns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[LevelSpec] {
        &self.levels
    }

    pub fn allow_list(&self) -> &SortAllowList {
        &self.allow_list
    }

    pub fn default_sort(&self) -> &str {
        &self.default_sort
    }

    pub fn primary_key(&self) -> &ColumnPath {
        &self.primary_key
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Whether each root produces exactly one row (a single-level listing).
    pub fn is_flat(&self) -> bool {
        self.levels.len() == 1
    }

    /// Resolve a client sort string against this listing's allow-list.
    pub fn resolve_sort(&self, sort: &str) -> SortSpec {
        sort::resolve(sort, &self.allow_list, &self.default_sort)
    }

    /// Every row field produced by some level.
    pub fn row_fields(&self) -> BTreeSet<&str> {
        self.levels
            .iter()
            .flat_map(|level| level.fields.iter().map(|f| f.row_field.as_str()))
            .collect()
    }

    /// Check that every post-fetch filter targets an existing level.
    pub fn check_filters(&self, filters: &PostFetchFilters) -> Result<(), ListingConfigError> {
        for filter in filters.iter() {
            if filter.level() >= self.levels.len() {
                return Err(ListingConfigError::FilterLevelOutOfRange {
                    listing: self.name.clone(),
                    label: filter.label().to_string(),
                    level: filter.level(),
                    levels: self.levels.len(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`ListingDefinition`].
#[derive(Debug, Clone)]
pub struct ListingDefinitionBuilder {
    name: String,
    levels: Vec<LevelSpec>,
    allow_list: SortAllowList,
    default_sort: String,
    primary_key: ColumnPath,
    columns: Vec<ColumnDef>,
}

impl ListingDefinitionBuilder {
    /// Append the next (deeper) level.
    pub fn level(mut self, level: LevelSpec) -> Self {
        self.levels.push(level);
        self
    }

    /// Allow sorting by `name`.
    pub fn sort_field(mut self, name: &str, field: SortField) -> Self {
        self.allow_list = self.allow_list.with(name, field);
        self
    }

    /// Client field used when a sort string resolves to nothing (default `id`).
    pub fn default_sort(mut self, name: &str) -> Self {
        self.default_sort = name.to_string();
        self
    }

    /// Root primary key column (default `id`).
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = ColumnPath::column(column);
        self
    }

    /// Add an export column.
    pub fn column(mut self, label: &str, field: &str) -> Self {
        self.columns.push(ColumnDef::new(label, field));
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ListingDefinition, ListingConfigError> {
        let definition = ListingDefinition {
            name: self.name,
            levels: self.levels,
            allow_list: self.allow_list,
            default_sort: self.default_sort,
            primary_key: self.primary_key,
            columns: self.columns,
        };
        validate(&definition)?;
        Ok(definition)
    }
}

fn validate(definition: &ListingDefinition) -> Result<(), ListingConfigError> {
    let listing = definition.name.clone();

    if definition.levels.is_empty() {
        return Err(ListingConfigError::NoLevels { listing });
    }

    match definition.allow_list.get(&definition.default_sort) {
        None => {
            return Err(ListingConfigError::MissingDefaultSort {
                listing,
                field: definition.default_sort.clone(),
            });
        }
        Some(field) if !field.is_database_orderable() => {
            return Err(ListingConfigError::DeferredDefaultSort {
                listing,
                field: definition.default_sort.clone(),
            });
        }
        Some(_) => {}
    }

    let row_fields = definition.row_fields();

    for (name, field) in definition.allow_list.iter() {
        match field {
            SortField::Expansion(paths) if paths.is_empty() => {
                return Err(ListingConfigError::EmptyExpansion {
                    listing,
                    field: name.to_string(),
                });
            }
            SortField::Deferred(row_field) if !row_fields.contains(row_field.as_str()) => {
                return Err(ListingConfigError::UnknownDeferredRowField {
                    listing,
                    field: name.to_string(),
                    row_field: row_field.clone(),
                });
            }
            _ => {}
        }
    }

    for column in &definition.columns {
        if !row_fields.contains(column.field.as_str()) {
            return Err(ListingConfigError::UnknownColumnField {
                listing,
                label: column.label.clone(),
                field: column.field.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::filter::PostFetchFilter;

    fn builder() -> ListingDefinitionBuilder {
        ListingDefinition::builder("agreements")
            .level(LevelSpec::new("agreement").field_as("id", "agreement_id"))
            .level(LevelSpec::new("assignment").field("unit_number"))
            .sort_field("id", SortField::column("id"))
            .sort_field("unit", SortField::deferred("unit_number"))
            .column("Unit", "unit_number")
    }

    #[test]
    fn valid_definition_builds() {
        let def = builder().build().unwrap();
        assert_eq!(def.name(), "agreements");
        assert!(!def.is_flat());
        assert_eq!(def.resolve_sort("").entries()[0].field, "id");
        assert!(def.row_fields().contains("agreement_id"));
    }

    #[test]
    fn missing_default_sort_is_rejected() {
        let err = builder().default_sort("number").build().unwrap_err();
        assert!(matches!(err, ListingConfigError::MissingDefaultSort { .. }));
    }

    #[test]
    fn deferred_default_sort_is_rejected() {
        let err = builder().default_sort("unit").build().unwrap_err();
        assert!(matches!(err, ListingConfigError::DeferredDefaultSort { .. }));
    }

    #[test]
    fn deferred_sort_must_name_a_row_field() {
        let err = builder()
            .sort_field("vin", SortField::deferred("vin"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ListingConfigError::UnknownDeferredRowField { ref row_field, .. } if row_field == "vin"
        ));
    }

    #[test]
    fn empty_expansion_is_rejected() {
        let err = builder()
            .sort_field("name", SortField::Expansion(Vec::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ListingConfigError::EmptyExpansion { .. }));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = builder().column("VIN", "vin").build().unwrap_err();
        assert!(matches!(err, ListingConfigError::UnknownColumnField { .. }));
    }

    #[test]
    fn no_levels_is_rejected() {
        let err = ListingDefinition::builder("empty")
            .sort_field("id", SortField::column("id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ListingConfigError::NoLevels { .. }));
    }

    #[test]
    fn filter_level_out_of_range() {
        let def = builder().build().unwrap();
        let filters: PostFetchFilters = vec![PostFetchFilter::contains(5, "unit_number", "x")]
            .into_iter()
            .collect();
        assert!(matches!(
            def.check_filters(&filters),
            Err(ListingConfigError::FilterLevelOutOfRange { level: 5, levels: 2, .. })
        ));
    }
}
