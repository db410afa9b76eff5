//! Agreements listing.
//!
//! One row per equipment assignment: agreement → line item → allocation →
//! assignment. Agreement columns and the account/signer relations sort in
//! the database; line-item and assignment fields are deferred.

use std::collections::HashMap;

use anyhow::Result;

use super::{RegisteredListing, list_filter, param, text_filter};
use crate::listing::{
    FilterOperator, LevelSpec, ListingDefinition, ListingFilters, PostFetchFilter, SortField,
};
use crate::store::{RelationJoin, TableLevel, TreeSchema};

pub const NAME: &str = "agreements";

/// Level index of equipment assignments.
const ASSIGNMENT_LEVEL: usize = 3;

pub fn definition() -> Result<ListingDefinition> {
    let definition = ListingDefinition::builder(NAME)
        .level(
            LevelSpec::new("agreement")
                .field_as("id", "agreement_id")
                .field_as("number", "agreement_number")
                .field("status")
                .field("start_date")
                .field("end_date")
                .field_as("account.name", "account_name")
                .field_as("signer.first_name", "signer_first_name")
                .field_as("signer.last_name", "signer_last_name"),
        )
        .level(
            LevelSpec::new("line_item")
                .field_as("id", "line_item_id")
                .field_as("description", "line_item_description")
                .field_as("monthly_rate", "line_item_rate"),
        )
        .level(
            LevelSpec::new("allocation")
                .field_as("id", "allocation_id")
                .field_as("quantity", "allocation_quantity"),
        )
        .level(
            LevelSpec::new("assignment")
                .field_as("id", "assignment_id")
                .field("unit_number")
                .field("vin")
                .field("assigned_at"),
        )
        .sort_field("id", SortField::column("id"))
        .sort_field("number", SortField::column("number"))
        .sort_field("status", SortField::column("status"))
        .sort_field("start_date", SortField::column("start_date"))
        .sort_field("end_date", SortField::column("end_date"))
        .sort_field("account", SortField::column("account.name"))
        .sort_field(
            "signer",
            SortField::expansion(&["signer.last_name", "signer.first_name"]),
        )
        .sort_field("line_item", SortField::deferred("line_item_description"))
        .sort_field("unit", SortField::deferred("unit_number"))
        .sort_field("vin", SortField::deferred("vin"))
        .sort_field("assigned", SortField::deferred("assigned_at"))
        .default_sort("id")
        .column("Agreement", "agreement_number")
        .column("Status", "status")
        .column("Account", "account_name")
        .column("Start", "start_date")
        .column("End", "end_date")
        .column("Line item", "line_item_description")
        .column("Monthly rate", "line_item_rate")
        .column("Quantity", "allocation_quantity")
        .column("Unit", "unit_number")
        .column("VIN", "vin")
        .column("Assigned", "assigned_at")
        .build()?;
    Ok(definition)
}

pub fn schema() -> TreeSchema {
    TreeSchema::new(TableLevel::root("agreement", "id"))
        .relation(RelationJoin::new("account", "account", "account_id", "id"))
        .relation(RelationJoin::new("signer", "app_user", "signer_id", "id"))
        .child(TableLevel::child("agreement_line_item", "id", "agreement_id").ordered_by("position"))
        .child(TableLevel::child("line_item_allocation", "id", "line_item_id"))
        .child(TableLevel::child("equipment_assignment", "id", "allocation_id"))
}

/// Agreement filters:
/// - `status`: comma-separated statuses (database)
/// - `account`: account name substring (database)
/// - `number`: agreement number prefix (database)
/// - `starts_after`: start date lower bound (database)
/// - `unit`, `vin`: substring on assignments (post-fetch)
///
/// Unit and VIN match individual assignments; pushing them into the root
/// query would keep the agreement but lose which assignments matched.
pub fn filters(params: &HashMap<String, String>) -> ListingFilters {
    let mut filters = ListingFilters::new();

    filters.root.extend(
        [
            list_filter(params, "status", "status"),
            text_filter(params, "account", "account.name", FilterOperator::Contains),
            text_filter(params, "number", "number", FilterOperator::StartsWith),
            text_filter(
                params,
                "starts_after",
                "start_date",
                FilterOperator::GreaterOrEqual,
            ),
        ]
        .into_iter()
        .flatten(),
    );

    if let Some(unit) = param(params, "unit") {
        filters = filters.post_fetch(PostFetchFilter::contains(
            ASSIGNMENT_LEVEL,
            "unit_number",
            unit,
        ));
    }
    if let Some(vin) = param(params, "vin") {
        filters = filters.post_fetch(PostFetchFilter::contains(ASSIGNMENT_LEVEL, "vin", vin));
    }

    filters
}

pub fn listing() -> Result<RegisteredListing> {
    RegisteredListing::new(definition()?, schema(), filters)
}
