//! Deferred constraints
//!
//! Native `deferrable` clauses where the dialect has them. PostgreSQL has no
//! deferrable CHECK, so those become a plpgsql function re-checking the row
//! plus a deferrable constraint trigger. The embedded dialect has neither and
//! gets immediate constraints.

use super::{indent, quote, Context};
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::naming::ObjectKind;
use crate::script::Script;
use crate::statement::{CheckConstraint, KeyConstraint, TableDefinition};
use crate::table_config::{DeferredConstraint, DeferredKind, TableConfig};

/// `deferrable initially ..` clause for the dialect, if it has one
pub fn clause(dialect: Dialect, initially_deferred: bool) -> Option<&'static str> {
    if !dialect.supports_deferrable_constraints() {
        return None;
    }
    Some(if initially_deferred {
        "deferrable initially deferred"
    } else {
        "deferrable initially immediate"
    })
}

/// Names of the emulation objects of one deferred check
pub fn emulation_names(ctx: &Context, config: &TableConfig, constraint: &str) -> SynthResult<(String, String)> {
    let owner = config.owner_name();
    Ok((
        ctx.naming.function_name(owner, constraint)?,
        ctx.naming.trigger_name(owner, constraint)?,
    ))
}

/// Attach every deferred constraint of `config` to `table`
///
/// Returns the emulation statements to run after the table.
pub fn apply(ctx: &mut Context, config: &TableConfig, table: &mut TableDefinition) -> SynthResult<Script> {
    let mut script = ctx.script();
    let dialect = ctx.dialect();
    for constraint in config.deferred.values() {
        match &constraint.kind {
            DeferredKind::Unique { columns } => {
                let name = ctx.constraint(
                    ObjectKind::Unique,
                    config.owner_name(),
                    &table.name,
                    columns,
                    Some(&constraint.name),
                )?;
                let deferrable = native(dialect, constraint, &table.name);
                attach_unique(table, columns, name, deferrable);
            }
            DeferredKind::Check { predicate } => {
                let name = ctx.constraint(
                    ObjectKind::Check,
                    config.owner_name(),
                    &table.name,
                    &[],
                    Some(&constraint.name),
                )?;
                if dialect.supports_deferrable_check() {
                    table.checks.push(CheckConstraint {
                        name: Some(name),
                        predicate: predicate.clone(),
                        deferrable: Some(constraint.initially_deferred),
                    });
                } else if dialect.supports_constraint_triggers() {
                    script.append(emulate_check(ctx, config, constraint, &name, predicate)?);
                } else {
                    log::warn!(
                        "{} cannot defer check '{}' on '{}', created immediate",
                        dialect,
                        name,
                        table.name
                    );
                    table.checks.push(CheckConstraint {
                        name: Some(name),
                        predicate: predicate.clone(),
                        deferrable: None,
                    });
                }
            }
        }
    }
    Ok(script)
}

fn native(dialect: Dialect, constraint: &DeferredConstraint, table: &str) -> Option<bool> {
    if dialect.supports_deferrable_constraints() {
        Some(constraint.initially_deferred)
    } else {
        log::warn!(
            "{} cannot defer '{}' on '{}', created immediate",
            dialect,
            constraint.name,
            table
        );
        None
    }
}

/// Reuse an inline unique over the same columns, or add one
fn attach_unique(table: &mut TableDefinition, columns: &[String], name: String, deferrable: Option<bool>) {
    if let [single] = columns {
        if let Some(column) = table.column_mut(single) {
            if column.unique {
                column.unique = false;
                column.unique_name = None;
            }
        }
    }
    match table.uniques.iter_mut().find(|u| u.columns == columns) {
        Some(existing) => {
            existing.name = Some(name);
            existing.deferrable = deferrable;
        }
        None => table.uniques.push(KeyConstraint {
            name: Some(name),
            columns: columns.to_vec(),
            deferrable,
        }),
    }
}

/// Function re-checking the row at commit plus the constraint trigger calling it
fn emulate_check(
    ctx: &mut Context,
    config: &TableConfig,
    constraint: &DeferredConstraint,
    name: &str,
    predicate: &str,
) -> SynthResult<Script> {
    if config.pk_columns.is_empty() {
        return Err(SynthError::config(
            &config.table_name,
            format!("deferred check '{}' needs a primary key to re-read the row", name),
        ));
    }
    let (function, trigger) = emulation_names(ctx, config, &constraint.name)?;
    ctx.register(ObjectKind::Function, &function, &config.table_name)?;
    ctx.register(ObjectKind::Trigger, &trigger, &config.table_name)?;

    let key: Vec<String> = config
        .pk_columns
        .iter()
        .map(|c| format!("{c} = new.{c}", c = c))
        .collect();
    let body = vec![
        format!(
            "if exists (select 1 from {} where {} and not ({})) then",
            config.table_name,
            key.join(" and "),
            predicate
        ),
        indent(
            &[format!(
                "raise exception 'check constraint % violated', {} using errcode = '23514';",
                quote(name)
            )],
            1,
        ),
        "end if;".to_string(),
        "return null;".to_string(),
    ];
    let mut script = ctx.script();
    script.push_block(format!(
        "create or replace function {}() returns trigger as $$\nbegin\n{}\nend;\n$$ language plpgsql",
        function,
        indent(&body, 1)
    ));
    script.push_simple(format!(
        "create constraint trigger {} after insert or update on {} {} for each row execute procedure {}()",
        trigger,
        config.table_name,
        clause(Dialect::Postgres, constraint.initially_deferred).unwrap_or("deferrable initially deferred"),
        function
    ));
    Ok(script)
}
