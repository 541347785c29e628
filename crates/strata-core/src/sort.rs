//! Dependency-aware operation ordering.
//!
//! [`sort_operations`] turns the differ's unordered set into a total order
//! that is safe to execute sequentially. Foreign key operations are pulled
//! out into fixed phases: every `DropForeignKey` runs before anything else
//! and every `AddForeignKey` runs after everything else. That single rule
//! dissolves constraint cycles (two new tables with mutual foreign keys)
//! without any general cycle-breaking machinery.
//!
//! The structural middle is a topological sort over produced-table edges:
//! an operation that references a table created, renamed or moved by
//! another operation in the set waits for its producer. Ties are broken by
//! operation kind and then by name, so the same diff always renders the
//! same SQL.

use std::collections::{BTreeSet, HashMap};

use crate::error::PlanError;
use crate::operation::Operation;
use crate::snapshot::{qualified, split_qualified};

/// Orders operations for sequential execution.
///
/// # Errors
///
/// Returns [`PlanError::DependencyCycle`] if the structural operations
/// depend on each other in a loop (for example two renames that swap
/// names). Foreign key cycles never reach this point.
pub fn sort_operations(operations: Vec<Operation>) -> Result<Vec<Operation>, PlanError> {
    let mut fk_drops = Vec::new();
    let mut structural = Vec::new();
    let mut fk_adds = Vec::new();
    for op in operations {
        match op {
            Operation::DropForeignKey { .. } => fk_drops.push(op),
            Operation::AddForeignKey { .. } => fk_adds.push(op),
            other => structural.push(other),
        }
    }
    fk_drops.sort_by(|a, b| constraint_name(a).cmp(constraint_name(b)));
    fk_adds.sort_by(|a, b| constraint_name(a).cmp(constraint_name(b)));

    let mut ordered = fk_drops;
    ordered.append(&mut sort_structural(structural)?);
    ordered.append(&mut fk_adds);
    Ok(ordered)
}

fn constraint_name(op: &Operation) -> &str {
    match op {
        Operation::AddForeignKey { foreign_key } => &foreign_key.name,
        Operation::DropForeignKey { name, .. } => name,
        _ => "",
    }
}

fn sort_structural(ops: Vec<Operation>) -> Result<Vec<Operation>, PlanError> {
    // Which operation brings each table name into existence.
    let mut producers: HashMap<String, usize> = HashMap::new();
    for (i, op) in ops.iter().enumerate() {
        if let Some(name) = produced_table(op) {
            producers.insert(name, i);
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
    let mut in_degree: Vec<usize> = vec![0; ops.len()];
    for (i, op) in ops.iter().enumerate() {
        if let Some(table) = required_table(op) {
            if let Some(&producer) = producers.get(table) {
                if producer != i {
                    dependents[producer].push(i);
                    in_degree[i] += 1;
                }
            }
        }
        // A dropped table being recreated (or renamed onto) in the same
        // plan must be gone before its replacement appears.
        if let Operation::DropTable { table, .. } = op {
            if let Some(&producer) = producers.get(table) {
                if producer != i {
                    dependents[i].push(producer);
                    in_degree[producer] += 1;
                }
            }
        }
    }

    // Kahn's algorithm with an ordered ready set: among unblocked
    // operations the (kind, name) order decides, keeping output stable.
    let mut ready: BTreeSet<(u8, String, usize)> = BTreeSet::new();
    for (i, op) in ops.iter().enumerate() {
        if in_degree[i] == 0 {
            ready.insert((kind_rank(op), op.describe(), i));
        }
    }
    let mut order: Vec<usize> = Vec::with_capacity(ops.len());
    let mut emitted = vec![false; ops.len()];
    while let Some((_, _, i)) = ready.pop_first() {
        order.push(i);
        emitted[i] = true;
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                ready.insert((kind_rank(&ops[dep]), ops[dep].describe(), dep));
            }
        }
    }

    if order.len() != ops.len() {
        let nodes: Vec<String> = ops
            .iter()
            .enumerate()
            .filter(|(i, _)| !emitted[*i])
            .map(|(_, op)| op.describe())
            .collect();
        return Err(PlanError::DependencyCycle { nodes });
    }

    let mut slots: Vec<Option<Operation>> = ops.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

/// The table name an operation brings into existence, if any.
fn produced_table(op: &Operation) -> Option<String> {
    match op {
        Operation::CreateTable { table, .. } => Some(table.clone()),
        Operation::RenameTable { table, new_name } => {
            let (schema, _) = split_qualified(table);
            Some(qualified(schema, new_name))
        }
        Operation::MoveTable { table, new_schema } => {
            let (_, name) = split_qualified(table);
            Some(qualified(new_schema.as_deref(), name))
        }
        _ => None,
    }
}

/// The table name an operation needs to already exist, if any.
fn required_table(op: &Operation) -> Option<&str> {
    match op {
        Operation::MoveTable { table, .. }
        | Operation::RenameTable { table, .. }
        | Operation::AddColumn { table, .. }
        | Operation::DropColumn { table, .. }
        | Operation::AlterColumn { table, .. }
        | Operation::RenameColumn { table, .. }
        | Operation::CreateIndex { table, .. }
        | Operation::DropIndex { table, .. } => Some(table),
        // DropTable's ordering against a recreation is handled by the
        // reverse edge above; everything else stands alone.
        Operation::CreateTable { .. }
        | Operation::DropTable { .. }
        | Operation::AddForeignKey { .. }
        | Operation::DropForeignKey { .. }
        | Operation::Sql { .. }
        | Operation::Irreversible { .. } => None,
    }
}

/// Secondary order among unblocked operations: destructive structural
/// changes first, additive ones after.
fn kind_rank(op: &Operation) -> u8 {
    match op {
        Operation::DropForeignKey { .. } => 0,
        Operation::DropIndex { .. } => 1,
        Operation::DropColumn { .. } => 2,
        Operation::DropTable { .. } => 3,
        Operation::MoveTable { .. } => 4,
        Operation::RenameTable { .. } => 5,
        Operation::RenameColumn { .. } => 6,
        Operation::AlterColumn { .. } => 7,
        Operation::CreateTable { .. } => 8,
        Operation::AddColumn { .. } => 9,
        Operation::CreateIndex { .. } => 10,
        Operation::Sql { .. } => 11,
        Operation::AddForeignKey { .. } => 12,
        Operation::Irreversible { .. } => 13,
    }
}
