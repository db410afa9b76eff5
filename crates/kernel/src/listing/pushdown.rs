//! Sort pushdown classification.
//!
//! Splits a resolved sort spec into the part the database can order by and
//! the part that must be applied to flattened rows. Entries are partitioned
//! in place, never reordered. The fetch orders roots by the database keys;
//! when deferred keys are present the flattened rows are then re-sorted by
//! the whole spec in caller order, so a deferred key only reorders rows
//! that every database key before it leaves tied.

use super::error::ListingConfigError;
use super::sort::{SortAllowList, SortField};
use super::types::{
    ColumnPath, DeferredKey, MemorySortKey, OrderKey, SortDirection, SortSpec, SortTarget,
};

/// A sort spec partitioned by where each entry is evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortPlan {
    db: Vec<OrderKey>,
    deferred: Vec<DeferredKey>,
    memory: Vec<MemorySortKey>,
}

impl SortPlan {
    /// Partition `spec`, checking every entry against the allow-list.
    ///
    /// An entry whose client field is not allow-listed, or whose target is
    /// not one the allow-list maps that field to, is a programmer error and
    /// is rejected before anything reaches the database.
    pub fn classify(
        listing: &str,
        spec: &SortSpec,
        allow_list: &SortAllowList,
    ) -> Result<Self, ListingConfigError> {
        let mut plan = Self::default();

        for entry in spec.entries() {
            let allowed = allow_list
                .get(&entry.field)
                .is_some_and(|field| field_allows(field, &entry.target));
            if !allowed {
                return Err(ListingConfigError::UnlistedSortField {
                    listing: listing.to_string(),
                    field: entry.field.clone(),
                });
            }

            match &entry.target {
                SortTarget::Column(path) => {
                    let key = OrderKey::new(path.clone(), entry.direction);
                    plan.memory.push(MemorySortKey::Root(key.clone()));
                    plan.db.push(key);
                }
                SortTarget::Deferred(row_field) => {
                    let key = DeferredKey {
                        row_field: row_field.clone(),
                        direction: entry.direction,
                    };
                    plan.memory.push(MemorySortKey::Row(key.clone()));
                    plan.deferred.push(key);
                }
            }
        }

        Ok(plan)
    }

    /// Database-orderable keys, in caller order.
    pub fn db_spec(&self) -> &[OrderKey] {
        &self.db
    }

    /// Deferred keys, in caller order.
    pub fn deferred_spec(&self) -> &[DeferredKey] {
        &self.deferred
    }

    /// Every key in caller order, for sorting flattened rows.
    pub fn memory_order(&self) -> &[MemorySortKey] {
        &self.memory
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// The ORDER BY handed to the tree fetcher.
    ///
    /// With no database keys the primary key (descending, the listing
    /// default) is used so that the pre-flatten order is deterministic. The
    /// primary key is always appended as the final tie-break so repeated
    /// bounded fetches return the same window.
    pub fn fetch_order(&self, primary_key: &ColumnPath) -> Vec<OrderKey> {
        if self.db.is_empty() {
            return vec![OrderKey::new(primary_key.clone(), SortDirection::Desc)];
        }

        let mut order = self.db.clone();
        if !order.iter().any(|key| &key.path == primary_key) {
            order.push(OrderKey::new(primary_key.clone(), SortDirection::Asc));
        }
        order
    }
}

fn field_allows(field: &SortField, target: &SortTarget) -> bool {
    match (field, target) {
        (SortField::Column(path), SortTarget::Column(target)) => path == target,
        (SortField::Expansion(paths), SortTarget::Column(target)) => paths.contains(target),
        (SortField::Deferred(row_field), SortTarget::Deferred(target)) => row_field == target,
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::sort::resolve;
    use crate::listing::types::SortEntry;

    fn allow_list() -> SortAllowList {
        SortAllowList::new()
            .with("id", SortField::column("id"))
            .with("number", SortField::column("agreement_number"))
            .with("signer", SortField::expansion(&["last_name", "first_name"]))
            .with("unit", SortField::deferred("unit_number"))
            .with("assigned", SortField::deferred("assigned_at"))
    }

    #[test]
    fn partitions_without_reordering() {
        let spec = resolve("unit:desc,number,assigned:asc,signer:desc", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();

        let db: Vec<String> = plan.db_spec().iter().map(|k| k.path.to_string()).collect();
        assert_eq!(db, vec!["agreement_number", "last_name", "first_name"]);

        let deferred: Vec<&str> = plan
            .deferred_spec()
            .iter()
            .map(|k| k.row_field.as_str())
            .collect();
        assert_eq!(deferred, vec!["unit_number", "assigned_at"]);
        assert_eq!(plan.deferred_spec()[0].direction, SortDirection::Desc);
        assert!(plan.has_deferred());
    }

    #[test]
    fn memory_order_interleaves_in_caller_order() {
        let spec = resolve("number:desc,unit,signer", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();

        let kinds: Vec<String> = plan
            .memory_order()
            .iter()
            .map(|key| match key {
                MemorySortKey::Root(key) => format!("root:{}", key.path),
                MemorySortKey::Row(key) => format!("row:{}", key.row_field),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "root:agreement_number",
                "row:unit_number",
                "root:last_name",
                "root:first_name",
            ]
        );
        assert!(matches!(
            &plan.memory_order()[0],
            MemorySortKey::Root(key) if key.direction == SortDirection::Desc
        ));
    }

    #[test]
    fn default_spec_has_no_deferred() {
        let spec = resolve("", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();
        assert!(!plan.has_deferred());
        assert_eq!(plan.db_spec().len(), 1);
    }

    #[test]
    fn deferred_only_fetches_by_primary_key() {
        let spec = resolve("unit", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();
        assert!(plan.db_spec().is_empty());

        let order = plan.fetch_order(&ColumnPath::column("id"));
        assert_eq!(
            order,
            vec![OrderKey::new(ColumnPath::column("id"), SortDirection::Desc)]
        );
    }

    #[test]
    fn primary_key_tiebreak_is_appended_once() {
        let pk = ColumnPath::column("id");

        let spec = resolve("number:desc", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();
        let order = plan.fetch_order(&pk);
        assert_eq!(order.len(), 2);
        assert_eq!(order[1], OrderKey::new(pk.clone(), SortDirection::Asc));

        let spec = resolve("number,id:asc", &allow_list(), "id");
        let plan = SortPlan::classify("agreements", &spec, &allow_list()).unwrap();
        assert_eq!(plan.fetch_order(&pk).len(), 2);
    }

    #[test]
    fn hand_built_spec_outside_allow_list_is_rejected() {
        let spec = SortSpec::new(vec![SortEntry {
            field: "number".to_string(),
            target: SortTarget::Column(ColumnPath::column("secret_column")),
            direction: SortDirection::Asc,
        }]);
        let err = SortPlan::classify("agreements", &spec, &allow_list()).unwrap_err();
        assert_eq!(
            err,
            ListingConfigError::UnlistedSortField {
                listing: "agreements".to_string(),
                field: "number".to_string(),
            }
        );
    }
}
