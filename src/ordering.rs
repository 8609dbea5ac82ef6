//! Dependency ordering of raw statements
//!
//! The base emitter does not promise any order. Synthesis needs:
//! - drops first, dependents before the tables they reference
//! - sequences before the tables that draw from them
//! - tables topologically sorted by their foreign keys
//! - indexes and unique constraints after their tables
//! - foreign keys last

use crate::error::{SynthError, SynthResult};
use crate::statement::{ParsedStatement, RawStatement};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A table and the tables it references
#[derive(Debug, Clone)]
pub struct TableNode {
    pub name: String,
    pub dependencies: BTreeSet<String>,
}

/// Topologically sort tables by their dependencies
///
/// Returns tables in order: dependencies first, dependents last. Ties are
/// broken by name so the order is stable across runs.
pub fn topological_sort(tables: &[TableNode]) -> SynthResult<Vec<String>> {
    let mut reverse_graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for table in tables {
        in_degree.insert(&table.name, table.dependencies.len());
        reverse_graph.entry(&table.name).or_default();
    }

    // if A depends on B, then B has A as a dependent
    for table in tables {
        for dep in &table.dependencies {
            if let Some(dependents) = reverse_graph.get_mut(dep.as_str()) {
                dependents.push(&table.name);
            }
        }
    }

    let mut ready: BTreeSet<&str> = tables
        .iter()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| t.name.as_str())
        .collect();

    let mut result = Vec::with_capacity(tables.len());
    while let Some(current) = ready.pop_first() {
        result.push(current.to_string());
        if let Some(dependents) = reverse_graph.get(current) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if result.len() != tables.len() {
        let cyclic: Vec<&str> = tables
            .iter()
            .map(|t| t.name.as_str())
            .filter(|name| !result.iter().any(|r| r == name))
            .collect();
        return Err(SynthError::Unsupported {
            table: cyclic.join(", "),
            message: "circular foreign key dependency".to_string(),
        });
    }

    Ok(result)
}

/// Validate that all dependencies point to tables that exist
pub fn validate_references(tables: &[TableNode]) -> SynthResult<()> {
    let names: BTreeSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    for table in tables {
        for dep in &table.dependencies {
            if !names.contains(dep.as_str()) {
                return Err(SynthError::Resolution {
                    owner: table.name.clone(),
                    target: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Order raw statements for synthesis
pub fn plan(statements: Vec<RawStatement>) -> SynthResult<Vec<RawStatement>> {
    let mut drops = Vec::new();
    let mut sequences = Vec::new();
    let mut tables: HashMap<String, RawStatement> = HashMap::new();
    let mut table_order: Vec<String> = Vec::new();
    let mut indexes = Vec::new();
    let mut foreign_keys = Vec::new();
    let mut dependencies: HashMap<String, BTreeSet<String>> = HashMap::new();

    for raw in statements {
        match raw.parse()? {
            ParsedStatement::DropTable { table } => drops.push((table, raw)),
            ParsedStatement::CreateSequence(_) => sequences.push(raw),
            ParsedStatement::CreateTable(def) => {
                table_order.push(def.name.clone());
                dependencies.entry(def.name.clone()).or_default();
                tables.insert(def.name, raw);
            }
            ParsedStatement::CreateIndex(_) | ParsedStatement::AddUnique(_) => indexes.push(raw),
            ParsedStatement::ForeignKey(fk) => {
                if fk.table != fk.target {
                    dependencies
                        .entry(fk.table.clone())
                        .or_default()
                        .insert(fk.target.clone());
                }
                foreign_keys.push(raw);
            }
        }
    }

    let nodes: Vec<TableNode> = table_order
        .iter()
        .map(|name| TableNode {
            name: name.clone(),
            dependencies: dependencies.remove(name).unwrap_or_default(),
        })
        .collect();
    validate_references(&nodes)?;
    let sorted = topological_sort(&nodes)?;

    // dependents are dropped before what they reference
    let drop_rank: HashMap<&str, usize> = sorted
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    drops.sort_by_key(|(table, _)| std::cmp::Reverse(drop_rank.get(table.as_str()).copied()));

    let mut planned = Vec::new();
    planned.extend(drops.into_iter().map(|(_, raw)| raw));
    planned.extend(sequences);
    for name in &sorted {
        if let Some(raw) = tables.remove(name) {
            planned.push(raw);
        }
    }
    planned.extend(indexes);
    planned.extend(foreign_keys);
    log::debug!("planned {} statements over {} tables", planned.len(), sorted.len());
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, deps: &[&str]) -> TableNode {
        TableNode {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn raw(sql: &str) -> RawStatement {
        RawStatement::new(sql).unwrap()
    }

    #[test]
    fn test_topological_sort_simple() {
        let tables = vec![
            node("bank_transactions", &["bank_accounts"]),
            node("bank_accounts", &["banks"]),
            node("banks", &[]),
        ];
        let sorted = topological_sort(&tables).unwrap();
        assert_eq!(sorted, vec!["banks", "bank_accounts", "bank_transactions"]);
    }

    #[test]
    fn test_topological_sort_cycle() {
        let tables = vec![node("a", &["b"]), node("b", &["a"]), node("c", &[])];
        let err = topological_sort(&tables).unwrap_err();
        match err {
            SynthError::Unsupported { table, .. } => assert_eq!(table, "a, b"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validate_references() {
        let tables = vec![node("bank_accounts", &["banks"])];
        assert!(matches!(
            validate_references(&tables),
            Err(SynthError::Resolution { .. })
        ));
    }

    #[test]
    fn test_plan_orders_statements() {
        let planned = plan(vec![
            raw("alter table invoice add constraint fk1 foreign key (customer_id) references customer"),
            raw("create index ix1 on invoice (customer_id)"),
            raw("create table invoice (id bigint not null, customer_id bigint, primary key (id))"),
            raw("create sequence invoice_seq"),
            raw("drop table customer"),
            raw("create table customer (id bigint not null, primary key (id))"),
            raw("drop table invoice"),
        ])
        .unwrap();
        let order: Vec<&str> = planned.iter().map(|r| r.sql.as_str()).collect();
        assert_eq!(order[0], "drop table invoice");
        assert_eq!(order[1], "drop table customer");
        assert_eq!(order[2], "create sequence invoice_seq");
        assert!(order[3].starts_with("create table customer"));
        assert!(order[4].starts_with("create table invoice"));
        assert!(order[5].starts_with("create index"));
        assert!(order[6].starts_with("alter table"));
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let planned = plan(vec![
            raw("create table node (id bigint not null, parent_id bigint, primary key (id))"),
            raw("alter table node add constraint fk2 foreign key (parent_id) references node"),
        ])
        .unwrap();
        assert_eq!(planned.len(), 2);
    }
}
