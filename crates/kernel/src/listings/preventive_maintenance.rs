//! Preventive maintenance schedules listing.
//!
//! Single level: one row per schedule. With no deferred sorts and no
//! post-fetch filters every page is cut by the database.

use std::collections::HashMap;

use anyhow::Result;

use super::{RegisteredListing, list_filter, text_filter};
use crate::listing::{FilterOperator, LevelSpec, ListingDefinition, ListingFilters, SortField};
use crate::store::{RelationJoin, TableLevel, TreeSchema};

pub const NAME: &str = "preventive_maintenance";

pub fn definition() -> Result<ListingDefinition> {
    let definition = ListingDefinition::builder(NAME)
        .level(
            LevelSpec::new("schedule")
                .field_as("id", "schedule_id")
                .field("title")
                .field("interval_days")
                .field("next_due_on")
                .field("last_completed_on")
                .field("status")
                .field_as("equipment.unit_number", "unit_number")
                .field_as("technician.first_name", "technician_first_name")
                .field_as("technician.last_name", "technician_last_name"),
        )
        .sort_field("id", SortField::column("id"))
        .sort_field("title", SortField::column("title"))
        .sort_field("next_due", SortField::column("next_due_on"))
        .sort_field("last_completed", SortField::column("last_completed_on"))
        .sort_field("status", SortField::column("status"))
        .sort_field("unit", SortField::column("equipment.unit_number"))
        .sort_field(
            "technician",
            SortField::expansion(&["technician.last_name", "technician.first_name"]),
        )
        .default_sort("id")
        .column("Schedule", "title")
        .column("Unit", "unit_number")
        .column("Interval (days)", "interval_days")
        .column("Next due", "next_due_on")
        .column("Last completed", "last_completed_on")
        .column("Technician", "technician_last_name")
        .column("Status", "status")
        .build()?;
    Ok(definition)
}

pub fn schema() -> TreeSchema {
    TreeSchema::new(TableLevel::root("pm_schedule", "id"))
        .relation(RelationJoin::new("equipment", "equipment", "equipment_id", "id"))
        .relation(RelationJoin::new("technician", "app_user", "technician_id", "id"))
}

/// Schedule filters, all pushed to the database:
/// - `status`: comma-separated statuses
/// - `unit`: equipment unit number substring
/// - `title`: title substring
/// - `due_before`: next due date upper bound
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
            text_filter(params, "title", "title", FilterOperator::Contains),
            text_filter(params, "due_before", "next_due_on", FilterOperator::LessOrEqual),
        ]
        .into_iter()
        .flatten(),
    );
    filters
}

pub fn listing() -> Result<RegisteredListing> {
    RegisteredListing::new(definition()?, schema(), filters)
}
