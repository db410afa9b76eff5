//! Registered entity listings.
//!
//! Each listing module pairs a [`ListingDefinition`] with the [`TreeSchema`]
//! its trees are loaded from and a filter builder that classifies request
//! parameters into pushed-down root filters and post-fetch filters.

pub mod agreements;
pub mod preventive_maintenance;
pub mod service_records;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::listing::{
    FilterOperator, FilterValue, ListingDefinition, ListingFilters, RootFilter, SortTarget,
};
use crate::store::TreeSchema;

/// Query parameters consumed by the listing endpoints themselves.
pub const RESERVED_PARAMS: &[&str] = &["sort", "page", "per_page"];

/// Builds a request's filters from its query parameters.
pub type FilterBuilder = fn(&HashMap<String, String>) -> ListingFilters;

/// A listing definition bound to its storage and filter builder.
#[derive(Debug)]
pub struct RegisteredListing {
    definition: ListingDefinition,
    schema: Arc<TreeSchema>,
    filter_builder: FilterBuilder,
}

impl RegisteredListing {
    /// Bind a definition to its schema, checking that the two agree.
    pub fn new(
        definition: ListingDefinition,
        schema: TreeSchema,
        filter_builder: FilterBuilder,
    ) -> Result<Self> {
        let name = definition.name();

        let problems = schema.validate();
        if !problems.is_empty() {
            bail!("listing '{name}' has an invalid schema: {}", problems.join("; "));
        }

        if schema.depth() != definition.levels().len() {
            bail!(
                "listing '{name}' declares {} levels but its schema has {}",
                definition.levels().len(),
                schema.depth()
            );
        }

        if !definition.primary_key().is_root_column()
            || definition.primary_key().column != schema.root.primary_key
        {
            bail!(
                "listing '{name}' primary key '{}' does not match root table key '{}'",
                definition.primary_key(),
                schema.root.primary_key
            );
        }

        for (field, sort) in definition.allow_list().iter() {
            for target in sort.targets() {
                if let SortTarget::Column(path) = target
                    && !schema.resolves(&path)
                {
                    bail!("listing '{name}' sort field '{field}' uses unjoined path '{path}'");
                }
            }
        }

        Ok(Self {
            definition,
            schema: Arc::new(schema),
            filter_builder,
        })
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &ListingDefinition {
        &self.definition
    }

    pub fn schema(&self) -> Arc<TreeSchema> {
        Arc::clone(&self.schema)
    }

    /// Filters for one request.
    pub fn filters(&self, params: &HashMap<String, String>) -> ListingFilters {
        let filters = (self.filter_builder)(params);
        debug!(
            listing = self.name(),
            root = filters.root.len(),
            post_fetch = filters.post_fetch.len(),
            "built listing filters"
        );
        filters
    }
}

/// All listings served by the application, by name.
#[derive(Debug, Default)]
pub struct ListingRegistry {
    listings: BTreeMap<String, Arc<RegisteredListing>>,
}

impl ListingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in listings.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(agreements::listing()?)?;
        registry.register(service_records::listing()?)?;
        registry.register(preventive_maintenance::listing()?)?;
        info!(count = registry.len(), "registered listings");
        Ok(registry)
    }

    /// Add a listing. Names must be unique.
    pub fn register(&mut self, listing: RegisteredListing) -> Result<()> {
        let name = listing.name().to_string();
        if self.listings.contains_key(&name) {
            bail!("listing '{name}' is already registered");
        }
        self.listings.insert(name, Arc::new(listing));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredListing>> {
        self.listings.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredListing> {
        self.listings.values().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Trimmed, non-empty parameter value.
pub(crate) fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Root filter comparing `field` with a text parameter, when present.
pub(crate) fn text_filter(
    params: &HashMap<String, String>,
    name: &str,
    field: &str,
    operator: FilterOperator,
) -> Option<RootFilter> {
    param(params, name)
        .map(|value| RootFilter::new(field, operator, FilterValue::String(value.to_string())))
}

/// Root `IN` filter from a comma-separated parameter.
pub(crate) fn list_filter(
    params: &HashMap<String, String>,
    name: &str,
    field: &str,
) -> Option<RootFilter> {
    let values: Vec<FilterValue> = param(params, name)?
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| FilterValue::String(v.to_string()))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(RootFilter::new(field, FilterOperator::In, FilterValue::List(values)))
}
