//! DDL synthesis
//!
//! [`SynthesisSession`] rewrites raw statements one at a time. Everything that
//! lives for a whole run (name registry, deferred tail, settings) sits in a
//! [`Context`] that the session threads through every sub-generator.

pub mod audit;
pub mod contract;
pub mod deferred;
pub mod history;
pub mod i18n;
pub mod partition;
pub mod session;

pub use session::SynthesisSession;

use crate::config::SynthesisConfig;
use crate::dialect::Dialect;
use crate::error::SynthResult;
use crate::metadata::SchemaModel;
use crate::naming::{NameRegistry, NamingStrategy, ObjectKind};
use crate::ordering;
use crate::script::Script;
use crate::statement::{RawStatement, TableDefinition};
use crate::table_config::{EnumCheck, IndexSpec, TableConfigRegistry};
use std::collections::BTreeMap;

/// Run-scoped state shared by the orchestrator and its sub-generators
#[derive(Debug)]
pub struct Context {
    pub config: SynthesisConfig,
    pub naming: NamingStrategy,
    pub names: NameRegistry,
    /// Statements flushed once after every table has been processed
    pub tail: Script,
}

impl Context {
    pub fn new(config: SynthesisConfig) -> Self {
        let naming = NamingStrategy::from_config(&config);
        let tail = Script::new(config.dialect);
        Self {
            config,
            naming,
            names: NameRegistry::new(),
            tail,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// Register a physical name, checking it against the identifier limit first
    pub fn register(&mut self, kind: ObjectKind, name: &str, owner: &str) -> SynthResult<()> {
        if name.len() > self.naming.limit() {
            return Err(crate::error::SynthError::Naming {
                name: name.to_string(),
                limit: self.naming.limit(),
            });
        }
        self.names.register(kind, name, owner)
    }

    /// Derive, register and return a constraint name
    pub fn constraint(
        &mut self,
        kind: ObjectKind,
        owner: &str,
        table: &str,
        columns: &[String],
        explicit: Option<&str>,
    ) -> SynthResult<String> {
        let name = self.naming.constraint_name(kind, owner, columns, explicit)?;
        self.register(kind, &name, table)?;
        Ok(name)
    }

    pub fn script(&self) -> Script {
        Script::new(self.dialect())
    }
}

/// Fill in every missing constraint name of a table definition and register
/// all of them. Enum columns without a check get their value-set check here.
pub(crate) fn assign_constraint_names(
    ctx: &mut Context,
    table: &mut TableDefinition,
    owner: &str,
    enums: &BTreeMap<String, EnumCheck>,
    declared_uniques: &[IndexSpec],
) -> SynthResult<()> {
    let table_name = table.name.clone();

    for column in table.columns.iter_mut() {
        if column.check.is_none() {
            if let Some(check) = enums.get(&column.name) {
                column.check = Some(check.predicate(&column.name));
            }
        }
        let columns = vec![column.name.clone()];
        if column.not_null && column.not_null_name.is_none() {
            column.not_null_name =
                Some(ctx.constraint(ObjectKind::NotNull, owner, &table_name, &columns, None)?);
        }
        if column.unique && column.unique_name.is_none() {
            let explicit = declared_name(declared_uniques, &columns);
            column.unique_name = Some(ctx.constraint(
                ObjectKind::Unique,
                owner,
                &table_name,
                &columns,
                explicit,
            )?);
        }
        if column.check.is_some() && column.check_name.is_none() {
            column.check_name =
                Some(ctx.constraint(ObjectKind::Check, owner, &table_name, &columns, None)?);
        }
    }

    if let Some(pk) = table.primary_key.as_mut() {
        if pk.name.is_none() {
            pk.name = Some(ctx.constraint(ObjectKind::PrimaryKey, owner, &table_name, &[], None)?);
        }
    }

    for unique in table.uniques.iter_mut() {
        if unique.name.is_none() {
            let explicit = declared_name(declared_uniques, &unique.columns);
            unique.name = Some(ctx.constraint(
                ObjectKind::Unique,
                owner,
                &table_name,
                &unique.columns,
                explicit,
            )?);
        }
    }

    for (i, check) in table.checks.iter_mut().enumerate() {
        if check.name.is_none() {
            let ordinal = vec![(i + 1).to_string()];
            check.name = Some(ctx.constraint(ObjectKind::Check, owner, &table_name, &ordinal, None)?);
        }
    }
    Ok(())
}

/// Drop every constraint name written by the base emitter
pub(crate) fn clear_constraint_names(table: &mut TableDefinition) {
    for column in table.columns.iter_mut() {
        column.not_null_name = None;
        column.unique_name = None;
        column.check_name = None;
    }
    if let Some(pk) = table.primary_key.as_mut() {
        pk.name = None;
    }
    for unique in table.uniques.iter_mut() {
        unique.name = None;
    }
    for check in table.checks.iter_mut() {
        check.name = None;
    }
}

fn declared_name<'a>(declared: &'a [IndexSpec], columns: &[String]) -> Option<&'a str> {
    declared
        .iter()
        .find(|spec| spec.sql.is_none() && spec.columns == columns)
        .and_then(|spec| spec.name.as_deref())
}

/// SQL string literal
pub(crate) fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Indent every line of a body by `depth` levels of four spaces
pub(crate) fn indent(lines: &[String], depth: usize) -> String {
    let pad = "    ".repeat(depth);
    lines
        .iter()
        .flat_map(|l| l.lines().map(|line| format!("{}{}", pad, line)).collect::<Vec<_>>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of a whole synthesis run
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    /// One script per input statement, in planned order
    pub scripts: Vec<Script>,
    /// Cross-table objects emitted after every table
    pub tail: Script,
}

impl SynthesisOutput {
    /// All statements of the run in execution order
    pub fn combined(&self) -> Script {
        let mut all = Script::new(self.tail.dialect());
        for script in &self.scripts {
            all.append(script.clone());
        }
        all.append(self.tail.clone());
        all
    }

    pub fn render(&self) -> String {
        self.combined().render()
    }
}

/// Scan the model, order the raw statements and synthesize all of them
pub fn synthesize_all(
    config: SynthesisConfig,
    model: &SchemaModel,
    statements: Vec<RawStatement>,
) -> SynthResult<SynthesisOutput> {
    let registry = TableConfigRegistry::scan(model)?;
    let mut session = SynthesisSession::new(config, registry)?;
    let planned = ordering::plan(statements)?;
    let mut scripts = Vec::with_capacity(planned.len());
    for raw in &planned {
        scripts.push(session.synthesize(raw)?);
    }
    let tail = session.finish()?;
    Ok(SynthesisOutput { scripts, tail })
}
