//! Relational flattening.
//!
//! Expands nested entity trees into one row per surviving leaf node. The
//! walk is an explicit depth-first stack over the uniform node shape, so
//! emission order is exactly: roots in fetch order, then each node's
//! children in declared order.

use super::filter::PostFetchFilters;
use super::tree::{EntityNode, LevelSpec};
use super::types::FlatRow;

/// Pending node on the traversal stack, with the row fields contributed by
/// its ancestors.
struct Frame<'a> {
    root: usize,
    node: &'a EntityNode,
    depth: usize,
    inherited: FlatRow,
}

/// Flatten `roots` into rows.
///
/// `levels[0]` describes the roots and the last level the leaves that
/// become rows. Post-fetch filters drop nodes (and their whole subtree) at
/// the level they target, before any row is emitted. A node above the leaf
/// level with no surviving children contributes no rows; neither do
/// children nested deeper than the declared leaf level.
pub fn flatten(roots: &[EntityNode], levels: &[LevelSpec], filters: &PostFetchFilters) -> Vec<FlatRow> {
    flatten_indexed(roots, levels, filters)
        .into_iter()
        .map(|(_, row)| row)
        .collect()
}

/// [`flatten`], pairing each row with the index of the root it came from.
pub fn flatten_indexed(
    roots: &[EntityNode],
    levels: &[LevelSpec],
    filters: &PostFetchFilters,
) -> Vec<(usize, FlatRow)> {
    let mut rows = Vec::new();
    let Some(leaf_depth) = levels.len().checked_sub(1) else {
        return rows;
    };

    let mut stack: Vec<Frame<'_>> = Vec::new();
    for (index, root) in roots.iter().enumerate().rev() {
        if filters.accepts(0, root) {
            stack.push(Frame {
                root: index,
                node: root,
                depth: 0,
                inherited: FlatRow::new(),
            });
        }
    }

    while let Some(frame) = stack.pop() {
        let mut row = frame.inherited;
        levels[frame.depth].project(frame.node, &mut row);

        if frame.depth == leaf_depth {
            rows.push((frame.root, row));
            continue;
        }

        let child_depth = frame.depth + 1;
        let survivors: Vec<&EntityNode> = frame
            .node
            .children
            .iter()
            .filter(|child| filters.accepts(child_depth, child))
            .collect();

        if survivors.is_empty() {
            tracing::trace!(
                level = %levels[frame.depth].name,
                children = frame.node.children.len(),
                "node has no surviving children, contributes no rows"
            );
            continue;
        }

        // Pushed in reverse so the first child is popped first.
        for child in survivors.into_iter().rev() {
            stack.push(Frame {
                root: frame.root,
                node: child,
                depth: child_depth,
                inherited: row.clone(),
            });
        }
    }

    rows
}

/// Number of rows each root would contribute, in root order.
pub fn rows_per_root(
    roots: &[EntityNode],
    levels: &[LevelSpec],
    filters: &PostFetchFilters,
) -> Vec<usize> {
    let Some(leaf_depth) = levels.len().checked_sub(1) else {
        return vec![0; roots.len()];
    };

    roots
        .iter()
        .map(|root| {
            if !filters.accepts(0, root) {
                return 0;
            }
            let mut count = 0;
            let mut stack = vec![(root, 0usize)];
            while let Some((node, depth)) = stack.pop() {
                if depth == leaf_depth {
                    count += 1;
                    continue;
                }
                stack.extend(
                    node.children
                        .iter()
                        .filter(|child| filters.accepts(depth + 1, child))
                        .map(|child| (child, depth + 1)),
                );
            }
            count
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::listing::filter::PostFetchFilter;
    use serde_json::{Value, json};

    fn levels() -> Vec<LevelSpec> {
        vec![
            LevelSpec::new("agreement").field_as("id", "agreement_id"),
            LevelSpec::new("line_item").field_as("id", "line_item_id"),
            LevelSpec::new("allocation").field_as("id", "allocation_id"),
            LevelSpec::new("assignment")
                .field_as("id", "assignment_id")
                .field("unit_number"),
        ]
    }

    fn node(id: &str, children: Vec<EntityNode>) -> EntityNode {
        EntityNode::from_json(json!({"id": id})).with_children(children)
    }

    fn assignment(id: &str, unit: &str) -> EntityNode {
        EntityNode::from_json(json!({"id": id, "unit_number": unit}))
    }

    fn ids(rows: &[FlatRow], field: &str) -> Vec<String> {
        rows.iter()
            .map(|r| r.get(field).and_then(Value::as_str).unwrap().to_string())
            .collect()
    }

    #[test]
    fn one_row_per_leaf_in_nesting_order() {
        let tree = vec![
            node(
                "A",
                vec![
                    node("A1", vec![node("A1x", vec![assignment("s1", "T1"), assignment("s2", "T2")])]),
                    node("A2", vec![node("A2x", vec![assignment("s3", "T3")])]),
                ],
            ),
            node("B", vec![node("B1", vec![node("B1x", vec![assignment("s4", "T4")])])]),
        ];

        let rows = flatten(&tree, &levels(), &PostFetchFilters::new());
        assert_eq!(ids(&rows, "assignment_id"), vec!["s1", "s2", "s3", "s4"]);
        assert_eq!(ids(&rows, "agreement_id"), vec!["A", "A", "A", "B"]);
        assert_eq!(ids(&rows, "line_item_id"), vec!["A1", "A1", "A2", "B1"]);
    }

    #[test]
    fn empty_branches_emit_nothing() {
        let tree = vec![
            node("A", vec![]),
            node("B", vec![node("B1", vec![])]),
            node("C", vec![node("C1", vec![node("C1x", vec![])])]),
        ];
        let rows = flatten(&tree, &levels(), &PostFetchFilters::new());
        assert!(rows.is_empty());
        assert_eq!(
            rows_per_root(&tree, &levels(), &PostFetchFilters::new()),
            vec![0, 0, 0]
        );
    }

    #[test]
    fn filtered_out_branch_contributes_zero_rows() {
        let tree = vec![node(
            "A",
            vec![
                node("A1", vec![node("A1x", vec![assignment("s1", "TRK-1"), assignment("s2", "TRK-2")])]),
                node("A2", vec![node("A2x", vec![assignment("s3", "VAN-9")])]),
            ],
        )];
        let filters: PostFetchFilters = vec![PostFetchFilter::contains(3, "unit_number", "trk")]
            .into_iter()
            .collect();

        let rows = flatten(&tree, &levels(), &filters);
        assert_eq!(ids(&rows, "assignment_id"), vec!["s1", "s2"]);
        assert!(rows.iter().all(|r| r.get("line_item_id") == Some(&json!("A1"))));
        assert_eq!(rows_per_root(&tree, &levels(), &filters), vec![2]);
    }

    #[test]
    fn root_level_filter_drops_whole_root() {
        let tree = vec![
            node("A", vec![node("A1", vec![node("A1x", vec![assignment("s1", "T")])])]),
            node("B", vec![node("B1", vec![node("B1x", vec![assignment("s2", "T")])])]),
        ];
        let filters: PostFetchFilters = vec![PostFetchFilter::new(0, "not A", |n| {
            n.text("id").as_deref() != Some("A")
        })]
        .into_iter()
        .collect();
        let rows = flatten(&tree, &levels(), &filters);
        assert_eq!(ids(&rows, "agreement_id"), vec!["B"]);
    }

    #[test]
    fn flat_listing_emits_one_row_per_root() {
        let levels = vec![LevelSpec::new("schedule").field("id")];
        let tree = vec![node("p1", vec![]), node("p2", vec![])];
        let rows = flatten(&tree, &levels, &PostFetchFilters::new());
        assert_eq!(ids(&rows, "id"), vec!["p1", "p2"]);
    }

    #[test]
    fn flatten_is_deterministic() {
        let tree = vec![node(
            "A",
            vec![node("A1", vec![node("A1x", vec![assignment("s1", "a"), assignment("s2", "b")])])],
        )];
        let first = flatten(&tree, &levels(), &PostFetchFilters::new());
        let second = flatten(&tree, &levels(), &PostFetchFilters::new());
        assert_eq!(first, second);
    }

    #[test]
    fn indexed_rows_name_their_root() {
        let tree = vec![
            node("A", vec![node("A1", vec![node("A1x", vec![assignment("s1", "T"), assignment("s2", "T")])])]),
            node("B", vec![]),
            node("C", vec![node("C1", vec![node("C1x", vec![assignment("s3", "T")])])]),
        ];
        let roots: Vec<usize> = flatten_indexed(&tree, &levels(), &PostFetchFilters::new())
            .into_iter()
            .map(|(root, _)| root)
            .collect();
        assert_eq!(roots, vec![0, 0, 2]);
    }

    #[test]
    fn no_levels_no_rows() {
        let tree = vec![node("A", vec![])];
        assert!(flatten(&tree, &[], &PostFetchFilters::new()).is_empty());
    }
}
