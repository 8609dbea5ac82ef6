//! Interval range partitioning

use super::Context;
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::metadata::PartitionInterval;
use crate::naming::ObjectKind;
use crate::script::Script;
use crate::statement::{ColumnDefinition, KeyConstraint, TableDefinition};
use crate::table_config::{PartitionSpec, TableConfig};
use chrono::{Days, Months, NaiveDateTime};

/// What partitioning added besides the rewritten table
#[derive(Debug)]
pub struct PartitionOutcome {
    /// Statements to run right after the table
    pub script: Script,
    /// Columns of the local unique index replacing the primary key
    pub local_key: Option<Vec<String>>,
}

/// Partition clause for the dialect, `None` where partitioning is unavailable
pub fn clause(dialect: Dialect, spec: &PartitionSpec) -> Option<String> {
    match dialect {
        Dialect::Oracle => {
            let interval = match spec.interval {
                PartitionInterval::Day => "numtodsinterval(1, 'DAY')",
                PartitionInterval::Month => "numtoyminterval(1, 'MONTH')",
                PartitionInterval::Year => "numtoyminterval(1, 'YEAR')",
            };
            Some(format!(
                "partition by range ({}) interval ({}) (partition p0 values less than ({}))",
                spec.column,
                interval,
                dialect.timestamp_literal(&spec.first_boundary)
            ))
        }
        Dialect::Postgres => Some(format!("partition by range ({})", spec.column)),
        Dialect::Hsql => None,
    }
}

/// Rewrite `table` for partitioning
pub fn apply(ctx: &mut Context, config: &TableConfig, table: &mut TableDefinition) -> SynthResult<PartitionOutcome> {
    let mut outcome = PartitionOutcome {
        script: ctx.script(),
        local_key: None,
    };
    let Some(spec) = config.partition.as_ref() else {
        return Ok(outcome);
    };
    let dialect = ctx.dialect();
    let Some(partition_clause) = clause(dialect, spec) else {
        log::warn!(
            "{} has no range partitioning, '{}' is created unpartitioned",
            dialect,
            table.name
        );
        return Ok(outcome);
    };

    // always NOT NULL with a default
    match table.column_mut(&spec.column) {
        Some(column) => {
            column.not_null = true;
            if column.default.is_none() {
                column.default = Some(spec.default_expression.clone());
            }
        }
        None => {
            table.add_column(
                ColumnDefinition::new(spec.column.clone(), dialect.timestamp_type())
                    .with_default(spec.default_expression.clone())
                    .not_null(),
            );
        }
    }

    if spec.local_primary_key {
        if let Some(pk) = table.primary_key.take() {
            let mut columns = pk.columns;
            if !columns.contains(&spec.column) {
                columns.push(spec.column.clone());
            }
            let name = ctx.naming.index_name(config.owner_name(), &columns, None)?;
            ctx.register(ObjectKind::Index, &name, &table.name)?;
            let local = if dialect == Dialect::Oracle { " local" } else { "" };
            outcome.script.push_simple(format!(
                "create unique index {} on {} ({}){}",
                name,
                table.name,
                columns.join(", "),
                local
            ));
            outcome.local_key = Some(columns);
        }
    } else if dialect == Dialect::Postgres {
        // unique keys of a partitioned table must contain the partition column
        if let Some(pk) = table.primary_key.as_mut() {
            extend(pk, &spec.column);
        }
    }

    if dialect == Dialect::Postgres {
        for column in table.columns.iter_mut() {
            if column.unique && column.name != spec.column {
                column.unique = false;
                column.unique_name = None;
                let mut key = KeyConstraint::new(vec![column.name.clone()]);
                extend(&mut key, &spec.column);
                table.uniques.push(key);
            }
        }
        for unique in table.uniques.iter_mut() {
            extend(unique, &spec.column);
        }

        let first = ctx.naming.suffixed(&table.name, "_p0")?;
        ctx.register(ObjectKind::Table, &first, &table.name)?;
        outcome.script.push_simple(format!(
            "create table {} partition of {} for values from (minvalue) to ({})",
            first,
            table.name,
            literal(&spec.first_boundary)
        ));

        let mut lower = spec.first_boundary;
        for period in 1..=ctx.config.partition_periods {
            let upper = next_boundary(spec.interval, lower).ok_or_else(|| {
                SynthError::config(
                    &config.table_name,
                    format!("partition boundary after {} is out of range", lower),
                )
            })?;
            let name = ctx.naming.suffixed(&table.name, &format!("_p{}", period))?;
            ctx.register(ObjectKind::Table, &name, &table.name)?;
            outcome.script.push_simple(format!(
                "create table {} partition of {} for values from ({}) to ({})",
                name,
                table.name,
                literal(&lower),
                literal(&upper)
            ));
            lower = upper;
        }

        let rest = ctx.naming.suffixed(&table.name, "_pdef")?;
        ctx.register(ObjectKind::Table, &rest, &table.name)?;
        outcome
            .script
            .push_simple(format!("create table {} partition of {} default", rest, table.name));
    }

    table.partition = Some(partition_clause);
    log::debug!("partitioned '{}' on {}", table.name, spec.column);
    Ok(outcome)
}

/// Start of the period following `from`
fn next_boundary(interval: PartitionInterval, from: NaiveDateTime) -> Option<NaiveDateTime> {
    match interval {
        PartitionInterval::Day => from.checked_add_days(Days::new(1)),
        PartitionInterval::Month => from.checked_add_months(Months::new(1)),
        PartitionInterval::Year => from.checked_add_months(Months::new(12)),
    }
}

fn literal(boundary: &NaiveDateTime) -> String {
    format!("'{}'", boundary.format("%Y-%m-%d %H:%M:%S"))
}

fn extend(key: &mut KeyConstraint, column: &str) {
    if !key.columns.iter().any(|c| c == column) {
        key.columns.push(column.to_string());
    }
}
