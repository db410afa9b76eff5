//! Equipment service records listing.
//!
//! One row per part used: service record → task → part.

use std::collections::HashMap;

use anyhow::Result;

use super::{RegisteredListing, list_filter, param, text_filter};
use crate::listing::{
    FilterOperator, LevelSpec, ListingDefinition, ListingFilters, PostFetchFilter, SortField,
};
use crate::store::{RelationJoin, TableLevel, TreeSchema};

pub const NAME: &str = "service_records";

const PART_LEVEL: usize = 2;

pub fn definition() -> Result<ListingDefinition> {
    let definition = ListingDefinition::builder(NAME)
        .level(
            LevelSpec::new("service_record")
                .field_as("id", "service_record_id")
                .field("record_number")
                .field("performed_on")
                .field("status")
                .field("odometer")
                .field_as("equipment.unit_number", "unit_number")
                .field_as("vendor.name", "vendor_name"),
        )
        .level(
            LevelSpec::new("task")
                .field_as("id", "task_id")
                .field_as("description", "task_description")
                .field("labor_hours"),
        )
        .level(
            LevelSpec::new("part")
                .field_as("id", "part_id")
                .field("part_number")
                .field_as("quantity", "part_quantity")
                .field("unit_cost"),
        )
        .sort_field("id", SortField::column("id"))
        .sort_field("record_number", SortField::column("record_number"))
        .sort_field("performed_on", SortField::column("performed_on"))
        .sort_field("status", SortField::column("status"))
        .sort_field("unit", SortField::column("equipment.unit_number"))
        .sort_field("vendor", SortField::column("vendor.name"))
        .sort_field("task", SortField::deferred("task_description"))
        .sort_field("part_number", SortField::deferred("part_number"))
        .default_sort("performed_on")
        .column("Record", "record_number")
        .column("Performed", "performed_on")
        .column("Unit", "unit_number")
        .column("Vendor", "vendor_name")
        .column("Task", "task_description")
        .column("Labor hours", "labor_hours")
        .column("Part", "part_number")
        .column("Quantity", "part_quantity")
        .column("Unit cost", "unit_cost")
        .build()?;
    Ok(definition)
}

pub fn schema() -> TreeSchema {
    TreeSchema::new(TableLevel::root("equipment_service_record", "id"))
        .relation(RelationJoin::new("equipment", "equipment", "equipment_id", "id"))
        .relation(RelationJoin::new("vendor", "vendor", "vendor_id", "id"))
        .child(TableLevel::child("service_task", "id", "service_record_id").ordered_by("sequence"))
        .child(TableLevel::child("service_part", "id", "service_task_id"))
}

/// Service record filters:
/// - `status`: comma-separated statuses (database)
/// - `unit`: equipment unit number substring (database)
/// - `performed_after`, `performed_before`: date bounds (database)
/// - `part`: part number substring on parts (post-fetch)
pub fn filters(params: &HashMap<String, String>) -> ListingFilters {
    let mut filters = ListingFilters::new();

    filters.root.extend(
        [
            list_filter(params, "status", "status"),
            text_filter(
                params,
                "unit",
                "equipment.unit_number",
                FilterOperator::Contains,
            ),
            text_filter(
                params,
                "performed_after",
                "performed_on",
                FilterOperator::GreaterOrEqual,
            ),
            text_filter(
                params,
                "performed_before",
                "performed_on",
                FilterOperator::LessOrEqual,
            ),
        ]
        .into_iter()
        .flatten(),
    );

    if let Some(part) = param(params, "part") {
        filters = filters.post_fetch(PostFetchFilter::contains(PART_LEVEL, "part_number", part));
    }

    filters
}

pub fn listing() -> Result<RegisteredListing> {
    RegisteredListing::new(definition()?, schema(), filters)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::SortDirection;

    #[test]
    fn default_sort_is_latest_first() {
        let spec = definition().unwrap().resolve_sort("bogus");
        assert_eq!(spec.len(), 1);
        assert_eq!(spec.entries()[0].field, "performed_on");
        assert_eq!(spec.entries()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn part_filter_is_post_fetch() {
        let params: HashMap<String, String> = [("part".to_string(), "BRK".to_string())].into();
        let filters = filters(&params);
        assert!(filters.root.is_empty());
        assert_eq!(filters.post_fetch.len(), 1);
    }

    #[test]
    fn listing_registers() {
        assert_eq!(listing().unwrap().definition().levels().len(), 3);
    }
}
