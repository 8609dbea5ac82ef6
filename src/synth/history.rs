//! History tables and their change-capture triggers
//!
//! The shadow table holds a surrogate key, a copy of every live column and
//! three bookkeeping columns. Triggers are rendered from the transitions in
//! [`contract`](super::contract), one template per dialect:
//! - Oracle: one combined row trigger written as a PL/SQL block
//! - PostgreSQL: one trigger delegating to a plpgsql function
//! - HSQL: three single-operation triggers

use super::contract::{transition, ContractStep, Guard, Operation, RowImage, Transition};
use super::{assign_constraint_names, indent, Context};
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::naming::ObjectKind;
use crate::script::Script;
use crate::statement::{ColumnDefinition, KeyConstraint, TableDefinition};
use crate::table_config::TableConfig;
use std::collections::BTreeMap;

pub const HISTORY_ID: &str = "hst_id";
pub const OPERATION: &str = "hst_operation";
pub const TIMESTAMP: &str = "hst_timestamp";
pub const INVALIDATED_AT: &str = "hst_invalidated_at";
/// Trigger-local variable holding the clock reading shared by every step
pub const STAMP: &str = "hst_now";

/// Physical names of everything belonging to one history table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryNames {
    pub table: String,
    pub sequence: String,
    /// Trigger per operation; the same name for all three on combined-trigger dialects
    pub triggers: BTreeMap<Operation, String>,
    pub function: Option<String>,
}

impl HistoryNames {
    pub fn derive(ctx: &Context, config: &TableConfig) -> SynthResult<Self> {
        let naming = &ctx.naming;
        let owner = config.owner_name();
        let table = naming.suffixed(&config.table_name, &ctx.config.history_suffix)?;
        let sequence = naming.sequence_name(&table, None)?;
        let mut triggers = BTreeMap::new();
        match ctx.dialect() {
            Dialect::Hsql => {
                for op in Operation::ALL {
                    let purpose = format!("hst_{}", op.code().to_ascii_lowercase());
                    triggers.insert(op, naming.trigger_name(owner, &purpose)?);
                }
            }
            Dialect::Oracle | Dialect::Postgres => {
                let name = naming.trigger_name(owner, "hst")?;
                for op in Operation::ALL {
                    triggers.insert(op, name.clone());
                }
            }
        }
        let function = if ctx.dialect().uses_trigger_functions() {
            Some(naming.function_name(owner, "hst")?)
        } else {
            None
        };
        Ok(Self {
            table,
            sequence,
            triggers,
            function,
        })
    }

    /// Distinct trigger names, in operation order
    pub fn trigger_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.triggers.values() {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names
    }
}

/// Columns whose change produces a new history row
pub fn relevant_columns(ctx: &Context, config: &TableConfig, live: &TableDefinition) -> Vec<String> {
    live.columns
        .iter()
        .map(|c| c.name.clone())
        .filter(|c| {
            !ctx.config.audit.contains(c)
                && !config.version_columns.contains(c)
                && !config.not_historized.contains(c)
                && ![HISTORY_ID, OPERATION, TIMESTAMP, INVALIDATED_AT].contains(&c.as_str())
        })
        .collect()
}

/// Shadow-table definition for a live table
pub fn history_table(
    ctx: &Context,
    config: &TableConfig,
    live: &TableDefinition,
    names: &HistoryNames,
) -> SynthResult<TableDefinition> {
    let dialect = ctx.dialect();
    let partition_column = config.partition.as_ref().map(|p| p.column.as_str());

    let mut table = TableDefinition::new(names.table.clone());
    table.add_column(ColumnDefinition::new(HISTORY_ID, dialect.bigint_type()).not_null());
    for column in &live.columns {
        if [HISTORY_ID, OPERATION, TIMESTAMP, INVALIDATED_AT, STAMP].contains(&column.name.as_str()) {
            return Err(SynthError::config(
                &config.table_name,
                format!("column '{}' clashes with a history bookkeeping column", column.name),
            ));
        }
        let mut copy = ColumnDefinition::new(column.name.clone(), column.data_type.clone());
        copy.not_null = column.not_null && Some(column.name.as_str()) != partition_column;
        table.add_column(copy);
    }
    table.add_column(
        ColumnDefinition::new(OPERATION, dialect.flag_type())
            .not_null()
            .with_check(format!("{} in ('I', 'U', 'D')", OPERATION)),
    );
    table.add_column(ColumnDefinition::new(TIMESTAMP, dialect.timestamp_type()).not_null());
    table.add_column(ColumnDefinition::new(INVALIDATED_AT, dialect.timestamp_type()));

    table.primary_key = Some(KeyConstraint::new(vec![HISTORY_ID.to_string()]));
    let mut identity = config.pk_columns.clone();
    identity.push(TIMESTAMP.to_string());
    table.uniques.push(KeyConstraint::new(identity));
    Ok(table)
}

/// Trigger text for one history table, rendered from the contract
#[derive(Debug, Clone)]
pub struct HistoryTemplate<'a> {
    pub dialect: Dialect,
    pub names: &'a HistoryNames,
    pub live_table: &'a str,
    pub key_columns: &'a [String],
    pub columns: &'a [String],
    pub relevant: &'a [String],
}

impl<'a> HistoryTemplate<'a> {
    /// Declaration of [`STAMP`], read once per trigger invocation
    pub fn stamp_declaration(&self) -> String {
        let clock = self.dialect.current_timestamp();
        let ty = self.dialect.timestamp_type();
        match self.dialect {
            Dialect::Oracle | Dialect::Postgres => format!("{} {} := {};", STAMP, ty, clock),
            Dialect::Hsql => format!("declare {} {} default {};", STAMP, ty, clock),
        }
    }

    /// SQL of one contract step
    pub fn step_sql(&self, step: &ContractStep) -> String {
        let ts = STAMP;
        match *step {
            ContractStep::CloseOpen { image } => {
                let conditions: Vec<String> = self
                    .key_columns
                    .iter()
                    .map(|k| format!("{} = {}", k, image.reference(self.dialect, k)))
                    .collect();
                format!(
                    "update {} set {} = {} where {} and {} is null",
                    self.names.table,
                    INVALIDATED_AT,
                    ts,
                    conditions.join(" and "),
                    INVALIDATED_AT
                )
            }
            ContractStep::Append {
                operation,
                image,
                born_closed,
            } => {
                let values: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| image.reference(self.dialect, c))
                    .collect();
                format!(
                    "insert into {} ({}, {}, {}, {}, {}) values ({}, {}, '{}', {}, {})",
                    self.names.table,
                    HISTORY_ID,
                    self.columns.join(", "),
                    OPERATION,
                    TIMESTAMP,
                    INVALIDATED_AT,
                    self.dialect.next_value(&self.names.sequence),
                    values.join(", "),
                    operation.code(),
                    ts,
                    if born_closed { ts } else { "null" }
                )
            }
        }
    }

    /// Null-safe "some relevant column changed" predicate
    pub fn guard_sql(&self) -> String {
        let parts: Vec<String> = self
            .relevant
            .iter()
            .map(|c| {
                self.dialect.distinct(
                    &RowImage::Old.reference(self.dialect, c),
                    &RowImage::New.reference(self.dialect, c),
                )
            })
            .collect();
        parts.join(" or ")
    }

    /// Operations the triggers react to; updates are ignored when no column is relevant
    pub fn operations(&self) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|op| *op != Operation::Update || !self.relevant.is_empty())
            .collect()
    }

    fn step_lines(&self, t: &Transition) -> Vec<String> {
        t.steps.iter().map(|s| format!("{};", self.step_sql(s))).collect()
    }

    /// Body of one transition, guard included unless the template puts it elsewhere
    fn transition_lines(&self, t: &Transition, inline_guard: bool) -> Vec<String> {
        let steps = self.step_lines(t);
        if inline_guard && t.guard == Guard::RelevantColumnsChanged {
            let mut lines = vec![format!("if {} then", self.guard_sql())];
            lines.push(indent(&steps, 1));
            lines.push("end if;".to_string());
            lines
        } else {
            steps
        }
    }

    /// `if <cond> then .. elsif .. end if;` over every handled operation
    fn branches(&self, condition: impl Fn(Operation) -> String) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, op) in self.operations().into_iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "elsif" };
            lines.push(format!("{} {} then", keyword, condition(op)));
            lines.push(indent(&self.transition_lines(transition(op), true), 1));
        }
        lines.push("end if;".to_string());
        lines
    }

    fn events(&self) -> String {
        self.operations()
            .iter()
            .map(|op| op.keyword())
            .collect::<Vec<_>>()
            .join(" or ")
    }

    fn trigger(&self, op: Operation) -> &str {
        self.names
            .triggers
            .get(&op)
            .map(String::as_str)
            .unwrap_or(self.names.table.as_str())
    }

    pub fn render(&self) -> Script {
        let mut script = Script::new(self.dialect);
        match self.dialect {
            Dialect::Oracle => {
                let body = self.branches(|op| match op {
                    Operation::Insert => "inserting".to_string(),
                    Operation::Update => "updating".to_string(),
                    Operation::Delete => "deleting".to_string(),
                });
                script.push_block(format!(
                    "create or replace trigger {}\nafter {} on {}\nfor each row\ndeclare\n    {}\nbegin\n{}\nend;",
                    self.trigger(Operation::Insert),
                    self.events(),
                    self.live_table,
                    self.stamp_declaration(),
                    indent(&body, 1)
                ));
            }
            Dialect::Postgres => {
                let function = self
                    .names
                    .function
                    .clone()
                    .unwrap_or_else(|| format!("{}_fn", self.names.table));
                let mut body = self.branches(|op| format!("tg_op = '{}'", op.keyword().to_uppercase()));
                body.push("return null;".to_string());
                script.push_block(format!(
                    "create or replace function {}() returns trigger as $$\ndeclare\n    {}\nbegin\n{}\nend;\n$$ language plpgsql",
                    function,
                    self.stamp_declaration(),
                    indent(&body, 1)
                ));
                script.push_simple(format!(
                    "create trigger {} after {} on {} for each row execute procedure {}()",
                    self.trigger(Operation::Insert),
                    self.events(),
                    self.live_table,
                    function
                ));
            }
            Dialect::Hsql => {
                for op in self.operations() {
                    let t = transition(op);
                    let referencing = match op {
                        Operation::Insert => "referencing new row as newrow",
                        Operation::Update => "referencing old row as oldrow new row as newrow",
                        Operation::Delete => "referencing old row as oldrow",
                    };
                    let when = if t.guard == Guard::RelevantColumnsChanged {
                        format!("\nwhen ({})", self.guard_sql())
                    } else {
                        String::new()
                    };
                    let mut body = vec![self.stamp_declaration()];
                    body.extend(self.transition_lines(t, false));
                    script.push_block(format!(
                        "create trigger {} after {} on {}\n{}\nfor each row{}\nbegin atomic\n{}\nend",
                        self.trigger(op),
                        op.keyword(),
                        self.live_table,
                        referencing,
                        when,
                        indent(&body, 1)
                    ));
                }
            }
        }
        script
    }
}

/// Sequence, shadow table and triggers for a temporal table
pub fn generate(ctx: &mut Context, config: &TableConfig, live: &TableDefinition) -> SynthResult<Script> {
    if config.pk_columns.is_empty() {
        return Err(SynthError::config(
            &config.table_name,
            "temporal entity without a resolvable primary key",
        ));
    }
    let names = HistoryNames::derive(ctx, config)?;
    let mut table = history_table(ctx, config, live, &names)?;

    ctx.register(ObjectKind::Table, &names.table, &config.table_name)?;
    ctx.register(ObjectKind::Sequence, &names.sequence, &names.table)?;
    for trigger in names.trigger_names() {
        ctx.register(ObjectKind::Trigger, trigger, &config.table_name)?;
    }
    if let Some(function) = &names.function {
        ctx.register(ObjectKind::Function, function, &config.table_name)?;
    }
    assign_constraint_names(ctx, &mut table, &names.table, &BTreeMap::new(), &[])?;

    let columns = live.column_names();
    let relevant = relevant_columns(ctx, config, live);
    if relevant.is_empty() {
        log::debug!(
            "history of '{}' ignores updates: no history-relevant columns",
            config.table_name
        );
    }

    let mut script = ctx.script();
    script.push_simple(ctx.dialect().create_sequence(&names.sequence, 1, 1));
    script.push_simple(table.render());
    let template = HistoryTemplate {
        dialect: ctx.dialect(),
        names: &names,
        live_table: &live.name,
        key_columns: &config.pk_columns,
        columns: &columns,
        relevant: &relevant,
    };
    script.append(template.render());
    log::debug!("history table '{}' for '{}'", names.table, config.table_name);
    Ok(script)
}
