//! Foreign key discovery and join path search.
//!
//! Join paths are found with a breadth-first search over the FK graph.
//! Every FK edge is traversable in both directions; a reversed traversal
//! is marked so the caller can pick an appropriate join type.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::db::params::{NamedParams, fetch_named};
use crate::error::DbResult;
use crate::models::ForeignKeyRelation;
use sqlx::{PgConnection, Row};

mod queries {
    pub const OUTGOING_FKS: &str = r#"
SELECT
    tc.constraint_name,
    tc.table_schema AS from_schema,
    tc.table_name AS from_table,
    array_agg(kcu.column_name ORDER BY kcu.ordinal_position)::text[] AS from_columns,
    ccu.table_schema AS to_schema,
    ccu.table_name AS to_table,
    array_agg(ccu.column_name ORDER BY kcu.ordinal_position)::text[] AS to_columns,
    rc.update_rule AS on_update,
    rc.delete_rule AS on_delete
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name
    AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
    ON tc.constraint_name = ccu.constraint_name
JOIN information_schema.referential_constraints rc
    ON tc.constraint_name = rc.constraint_name
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema = :schema_name
  AND tc.table_name = :table_name
GROUP BY tc.constraint_name, tc.table_schema, tc.table_name,
         ccu.table_schema, ccu.table_name, rc.update_rule, rc.delete_rule
"#;

    pub const INCOMING_FKS: &str = r#"
SELECT
    tc.constraint_name,
    tc.table_schema AS from_schema,
    tc.table_name AS from_table,
    array_agg(kcu.column_name ORDER BY kcu.ordinal_position)::text[] AS from_columns,
    ccu.table_schema AS to_schema,
    ccu.table_name AS to_table,
    array_agg(ccu.column_name ORDER BY kcu.ordinal_position)::text[] AS to_columns,
    rc.update_rule AS on_update,
    rc.delete_rule AS on_delete
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name
    AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
    ON tc.constraint_name = ccu.constraint_name
JOIN information_schema.referential_constraints rc
    ON tc.constraint_name = rc.constraint_name
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND ccu.table_schema = :schema_name
  AND ccu.table_name = :table_name
GROUP BY tc.constraint_name, tc.table_schema, tc.table_name,
         ccu.table_schema, ccu.table_name, rc.update_rule, rc.delete_rule
"#;

    // One row per referencing/referenced column pair, across both
    // endpoint schemas, for graph construction
    pub const ALL_FKS: &str = r#"
SELECT
    tc.constraint_name,
    tc.table_schema AS from_schema,
    tc.table_name AS from_table,
    kcu.column_name AS from_column,
    ccu.table_schema AS to_schema,
    ccu.table_name AS to_table,
    ccu.column_name AS to_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name
    AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
    ON tc.constraint_name = ccu.constraint_name
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND (tc.table_schema = :from_schema OR ccu.table_schema = :from_schema
       OR tc.table_schema = :to_schema OR ccu.table_schema = :to_schema)
"#;
}

/// A single FK column pair in the join graph. Nodes are
/// `schema.table` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkEdge {
    pub from: String,
    pub to: String,
    pub from_column: String,
    pub to_column: String,
    pub constraint: String,
    /// True when this edge traverses an FK against its declared direction.
    pub reversed: bool,
}

impl FkEdge {
    fn reverse(&self) -> FkEdge {
        FkEdge {
            from: self.to.clone(),
            to: self.from.clone(),
            from_column: self.to_column.clone(),
            to_column: self.from_column.clone(),
            constraint: self.constraint.clone(),
            reversed: true,
        }
    }
}

/// Relationship discovery operations.
pub struct RelationshipService;

impl RelationshipService {
    /// Foreign keys declared on this table, pointing outward.
    pub async fn outgoing_fks(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<ForeignKeyRelation>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::OUTGOING_FKS, &params).await?;
        rows.iter().map(relation_from_row).collect()
    }

    /// Foreign keys on other tables that reference this table.
    pub async fn incoming_fks(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<ForeignKeyRelation>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::INCOMING_FKS, &params).await?;
        rows.iter().map(relation_from_row).collect()
    }

    /// All FK edges touching either endpoint schema, as column pairs.
    pub async fn fk_edges(
        conn: &mut PgConnection,
        from_schema: &str,
        to_schema: &str,
    ) -> DbResult<Vec<FkEdge>> {
        let params = NamedParams::new()
            .with("from_schema", from_schema)
            .with("to_schema", to_schema);
        let rows = fetch_named(conn, queries::ALL_FKS, &params).await?;
        rows.iter()
            .map(|row| {
                let from_schema: String = row.try_get("from_schema")?;
                let from_table: String = row.try_get("from_table")?;
                let to_schema: String = row.try_get("to_schema")?;
                let to_table: String = row.try_get("to_table")?;
                Ok(FkEdge {
                    from: format!("{from_schema}.{from_table}"),
                    to: format!("{to_schema}.{to_table}"),
                    from_column: row.try_get("from_column")?,
                    to_column: row.try_get("to_column")?,
                    constraint: row.try_get("constraint_name")?,
                    reversed: false,
                })
            })
            .collect()
    }
}

fn relation_from_row(row: &sqlx::postgres::PgRow) -> DbResult<ForeignKeyRelation> {
    Ok(ForeignKeyRelation {
        constraint_name: row.try_get("constraint_name")?,
        from_schema: row.try_get("from_schema")?,
        from_table: row.try_get("from_table")?,
        from_columns: row.try_get("from_columns")?,
        to_schema: row.try_get("to_schema")?,
        to_table: row.try_get("to_table")?,
        to_columns: row.try_get("to_columns")?,
        on_update: row.try_get("on_update")?,
        on_delete: row.try_get("on_delete")?,
    })
}

/// Find all join paths from `start` to `end` of at most `max_depth` hops,
/// shortest first. Each edge may be walked in either direction, but a path
/// never revisits a node. `start == end` yields no paths.
pub fn find_paths(edges: &[FkEdge], start: &str, end: &str, max_depth: usize) -> Vec<Vec<FkEdge>> {
    if start == end {
        return Vec::new();
    }

    let mut adj: HashMap<String, Vec<FkEdge>> = HashMap::new();
    for edge in edges {
        adj.entry(edge.from.clone()).or_default().push(edge.clone());
        adj.entry(edge.to.clone()).or_default().push(edge.reverse());
    }

    let mut queue: VecDeque<(String, Vec<FkEdge>, HashSet<String>)> = VecDeque::new();
    queue.push_back((
        start.to_string(),
        Vec::new(),
        HashSet::from([start.to_string()]),
    ));
    let mut found: Vec<Vec<FkEdge>> = Vec::new();

    while let Some((current, path, visited)) = queue.pop_front() {
        if path.len() > max_depth {
            continue;
        }

        let Some(neighbors) = adj.get(&current) else {
            continue;
        };
        for edge in neighbors {
            if visited.contains(&edge.to) {
                continue;
            }
            let mut new_path = path.clone();
            new_path.push(edge.clone());
            if edge.to == end {
                found.push(new_path);
            } else if new_path.len() < max_depth {
                let mut new_visited = visited.clone();
                new_visited.insert(edge.to.clone());
                queue.push_back((edge.to.clone(), new_path, new_visited));
            }
        }
    }

    found.sort_by_key(|p| p.len());
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, from_col: &str, to_col: &str, constraint: &str) -> FkEdge {
        FkEdge {
            from: from.to_string(),
            to: to.to_string(),
            from_column: from_col.to_string(),
            to_column: to_col.to_string(),
            constraint: constraint.to_string(),
            reversed: false,
        }
    }

    #[test]
    fn test_direct_edge_found() {
        let edges = vec![edge(
            "public.orders",
            "public.users",
            "user_id",
            "id",
            "orders_user_id_fkey",
        )];
        let paths = find_paths(&edges, "public.orders", "public.users", 4);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 1);
        assert!(!paths[0][0].reversed);
        assert_eq!(paths[0][0].from_column, "user_id");
    }

    #[test]
    fn test_reverse_traversal_is_marked() {
        let edges = vec![edge(
            "public.orders",
            "public.users",
            "user_id",
            "id",
            "orders_user_id_fkey",
        )];
        let paths = find_paths(&edges, "public.users", "public.orders", 4);
        assert_eq!(paths.len(), 1);
        let step = &paths[0][0];
        assert!(step.reversed);
        assert_eq!(step.from, "public.users");
        assert_eq!(step.from_column, "id");
        assert_eq!(step.to_column, "user_id");
    }

    #[test]
    fn test_two_hop_chain() {
        let edges = vec![
            edge("public.order_items", "public.orders", "order_id", "id", "oi_fk"),
            edge("public.orders", "public.users", "user_id", "id", "o_fk"),
        ];
        let paths = find_paths(&edges, "public.order_items", "public.users", 4);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 2);
        assert_eq!(paths[0][0].to, "public.orders");
        assert_eq!(paths[0][1].to, "public.users");
    }

    #[test]
    fn test_max_depth_cuts_long_paths() {
        let edges = vec![
            edge("a.t1", "a.t2", "c1", "id", "fk1"),
            edge("a.t2", "a.t3", "c2", "id", "fk2"),
            edge("a.t3", "a.t4", "c3", "id", "fk3"),
        ];
        assert_eq!(find_paths(&edges, "a.t1", "a.t4", 3).len(), 1);
        assert!(find_paths(&edges, "a.t1", "a.t4", 2).is_empty());
    }

    #[test]
    fn test_diamond_yields_both_paths_shortest_first() {
        let edges = vec![
            edge("a.start", "a.mid", "m_id", "id", "fk_mid"),
            edge("a.mid", "a.target", "t_id", "id", "fk_mid_target"),
            edge("a.start", "a.target", "t_id", "id", "fk_direct"),
        ];
        let paths = find_paths(&edges, "a.start", "a.target", 4);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].len(), 1);
        assert_eq!(paths[0][0].constraint, "fk_direct");
        assert_eq!(paths[1].len(), 2);
    }

    #[test]
    fn test_same_start_and_end_is_empty() {
        let edges = vec![edge("a.t1", "a.t2", "c", "id", "fk")];
        assert!(find_paths(&edges, "a.t1", "a.t1", 4).is_empty());
    }

    #[test]
    fn test_disconnected_tables_have_no_path() {
        let edges = vec![edge("a.t1", "a.t2", "c", "id", "fk")];
        assert!(find_paths(&edges, "a.t1", "a.t3", 4).is_empty());
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let edges = vec![
            edge("a.t1", "a.t2", "c1", "id", "fk1"),
            edge("a.t2", "a.t1", "c2", "id", "fk2"),
        ];
        let paths = find_paths(&edges, "a.t1", "a.t2", 6);
        // Two parallel one-hop paths (one per FK, either direction), nothing longer
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn test_parallel_column_pairs_give_parallel_paths() {
        let edges = vec![
            edge("a.child", "a.parent", "p_a", "a", "fk_composite"),
            edge("a.child", "a.parent", "p_b", "b", "fk_composite"),
        ];
        let paths = find_paths(&edges, "a.child", "a.parent", 4);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_path_of_exactly_max_depth_is_found() {
        let edges = vec![
            edge("a.t1", "a.t2", "c1", "id", "fk1"),
            edge("a.t2", "a.t3", "c2", "id", "fk2"),
        ];
        let paths = find_paths(&edges, "a.t1", "a.t3", 2);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 2);
    }
}
