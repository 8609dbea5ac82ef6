//! Statement-by-statement orchestration of one synthesis run

use super::audit::{self, AuditNames};
use super::deferred;
use super::history::{self, HistoryNames};
use super::i18n::{self, I18nNames};
use super::partition;
use super::{assign_constraint_names, clear_constraint_names, quote, Context};
use crate::config::{RenderFilter, SynthesisConfig};
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::naming::{NameRegistry, ObjectKind};
use crate::script::{Script, Statement};
use crate::statement::{
    ForeignKeyDefinition, IndexDefinition, KeyConstraint, ParsedStatement, RawStatement,
    SequenceDefinition, TableDefinition, UniqueDefinition,
};
use crate::table_config::{ColumnRef, DeferredKind, IndexSpec, TableConfig, TableConfigRegistry};
use std::collections::{BTreeMap, BTreeSet};

/// Lookup index queued by a foreign key, created at the end of the run
#[derive(Debug, Clone)]
struct CompanionIndex {
    table: String,
    owner: String,
    columns: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    statements: usize,
    tables: usize,
    history: usize,
    i18n: usize,
    skipped: usize,
}

/// One synthesis run over the raw statements of a schema
///
/// Feed statements through [`synthesize`](Self::synthesize) in planned order
/// (see [`ordering::plan`](crate::ordering::plan)), then call
/// [`finish`](Self::finish) once for the deferred tail.
#[derive(Debug)]
pub struct SynthesisSession {
    ctx: Context,
    registry: TableConfigRegistry,
    filter: RenderFilter,
    /// Finished live (and detail) definitions by table name
    tables: BTreeMap<String, TableDefinition>,
    excluded: BTreeSet<String>,
    /// Column lists of every key and index per table, for companion index coverage
    coverage: BTreeMap<String, Vec<Vec<String>>>,
    companions: Vec<CompanionIndex>,
    /// Sequences created together with their table
    owned_sequences: BTreeSet<String>,
    counters: Counters,
}

impl SynthesisSession {
    pub fn new(config: SynthesisConfig, registry: TableConfigRegistry) -> SynthResult<Self> {
        let filter = config.render_filter()?;
        let ctx = Context::new(config);
        let mut owned_sequences = BTreeSet::new();
        for table in registry.iter() {
            for spec in &table.sequences {
                owned_sequences.insert(
                    ctx.naming
                        .sequence_name(table.owner_name(), spec.name.as_deref())?,
                );
            }
        }
        Ok(Self {
            ctx,
            registry,
            filter,
            tables: BTreeMap::new(),
            excluded: BTreeSet::new(),
            coverage: BTreeMap::new(),
            companions: Vec::new(),
            owned_sequences,
            counters: Counters::default(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.ctx.dialect()
    }

    /// Every physical name registered so far
    pub fn names(&self) -> &NameRegistry {
        &self.ctx.names
    }

    /// Finished definition of a table (live, or i18n detail)
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn registry(&self) -> &TableConfigRegistry {
        &self.registry
    }

    /// Rewrite one raw statement
    pub fn synthesize(&mut self, raw: &RawStatement) -> SynthResult<Script> {
        self.counters.statements += 1;
        let script = match raw.parse()? {
            ParsedStatement::CreateTable(table) => self.create_table(table)?,
            ParsedStatement::ForeignKey(fk) => self.foreign_key(fk)?,
            ParsedStatement::AddUnique(unique) => self.add_unique(unique)?,
            ParsedStatement::CreateIndex(index) => self.create_index(index)?,
            ParsedStatement::CreateSequence(sequence) => self.create_sequence(sequence)?,
            ParsedStatement::DropTable { table } => self.drop_table(&table)?,
        };
        log::debug!("{} -> {} statement(s)", raw.kind, script.len());
        Ok(script)
    }

    /// Companion indexes and the deferred tail; call once after the last statement
    pub fn finish(&mut self) -> SynthResult<Script> {
        let mut script = self.ctx.script();
        for companion in std::mem::take(&mut self.companions) {
            if self.covered(&companion.table, &companion.columns) {
                continue;
            }
            let name = self
                .ctx
                .naming
                .index_name(&companion.owner, &companion.columns, None)?;
            self.ctx.register(ObjectKind::Index, &name, &companion.table)?;
            script.push_simple(format!(
                "create index {} on {} ({})",
                name,
                companion.table,
                companion.columns.join(", ")
            ));
            self.cover(&companion.table, companion.columns);
        }
        let dialect = self.ctx.dialect();
        let tail = std::mem::replace(&mut self.ctx.tail, Script::new(dialect));
        script.append(tail);

        let c = self.counters;
        log::info!(
            "synthesized {} statements for {}: {} tables ({} temporal, {} translated), {} skipped, {} names",
            c.statements,
            self.ctx.dialect(),
            c.tables,
            c.history,
            c.i18n,
            c.skipped,
            self.ctx.names.len()
        );
        Ok(script)
    }

    fn config_of(&self, table: &str) -> TableConfig {
        self.registry
            .get(table)
            .cloned()
            .unwrap_or_else(|| TableConfig::new(table))
    }

    fn renders(&self, table: &str) -> bool {
        let flagged = self.registry.get(table).map(|c| c.render).unwrap_or(true);
        flagged && self.filter.accepts(table)
    }

    fn placeholder(&mut self, text: String) -> Script {
        self.counters.skipped += 1;
        log::debug!("{}", text);
        let mut script = self.ctx.script();
        script.push(Statement::comment(text));
        script
    }

    fn covered(&self, table: &str, columns: &[String]) -> bool {
        self.coverage
            .get(table)
            .map(|lists| lists.iter().any(|list| list.starts_with(columns)))
            .unwrap_or(false)
    }

    fn cover(&mut self, table: &str, columns: Vec<String>) {
        self.coverage.entry(table.to_string()).or_default().push(columns);
    }

    fn record(&mut self, table: &TableDefinition, local_key: Option<Vec<String>>) {
        let mut lists: Vec<Vec<String>> = Vec::new();
        if let Some(pk) = &table.primary_key {
            lists.push(pk.columns.clone());
        }
        lists.extend(local_key);
        lists.extend(table.uniques.iter().map(|u| u.columns.clone()));
        lists.extend(
            table
                .columns
                .iter()
                .filter(|c| c.unique)
                .map(|c| vec![c.name.clone()]),
        );
        for list in lists {
            self.cover(&table.name, list);
        }
        self.tables.insert(table.name.clone(), table.clone());
    }

    fn create_table(&mut self, mut table: TableDefinition) -> SynthResult<Script> {
        if !self.renders(&table.name) {
            self.excluded.insert(table.name.clone());
            return Ok(self.placeholder(format!("table {} is not rendered", table.name)));
        }
        let config = self.config_of(&table.name);
        let owner = config.owner_name().to_string();
        let checked = self.ctx.naming.table_name(&table.name, config.gains_suffix())?;
        self.ctx.register(ObjectKind::Table, &checked, &table.name)?;
        clear_constraint_names(&mut table);
        self.counters.tables += 1;

        if config.auditable {
            let added = audit::add_columns(&self.ctx, &mut table);
            log::debug!("added {} audit column(s) to '{}'", added, table.name);
        }

        for column in self.registry.cascade_nullable_columns_of(&table.name) {
            if let Some(definition) = table.column_mut(&column) {
                definition.not_null = false;
                definition.not_null_name = None;
            }
            if let Some(parent) = self.registry.cascade_nullable_parent(&table.name, &column) {
                audit::cascade_nullable(&mut self.ctx, parent, &config, &column)?;
            }
        }

        let mut detail = match config.i18n {
            Some(_) => Some(i18n::fork(&self.ctx, &config, &mut table)?),
            None => None,
        };

        for spec in config.unique_constraints.iter().filter(|s| s.sql.is_none()) {
            let present = table.uniques.iter().any(|u| u.columns == spec.columns)
                || matches!(spec.columns.as_slice(), [c] if table.column(c).map(|d| d.unique).unwrap_or(false));
            if !present && spec.columns.iter().all(|c| table.has_column(c)) {
                table.uniques.push(KeyConstraint::new(spec.columns.clone()));
            }
        }

        // deferred keys first so partitioning sees every key it must extend
        let emulation = deferred::apply(&mut self.ctx, &config, &mut table)?;
        let partitioned = partition::apply(&mut self.ctx, &config, &mut table)?;
        assign_constraint_names(
            &mut self.ctx,
            &mut table,
            &owner,
            &config.enums,
            &config.unique_constraints,
        )?;

        for (column, expression) in &config.defaults {
            let target = match table.column_mut(column) {
                Some(definition) => Some(definition),
                None => detail.as_mut().and_then(|d| d.column_mut(column)),
            };
            match target {
                Some(definition) => definition.default = Some(expression.clone()),
                None => {
                    return Err(SynthError::config(
                        &config.table_name,
                        format!("default declared for unknown column '{}'", column),
                    ))
                }
            }
        }

        let mut script = self.ctx.script();
        for spec in &config.sequences {
            let name = self.ctx.naming.sequence_name(&owner, spec.name.as_deref())?;
            self.ctx.register(ObjectKind::Sequence, &name, &table.name)?;
            script.push_simple(self.dialect().create_sequence(&name, spec.start, spec.increment));
        }
        script.push_simple(table.render());
        script.append(partitioned.script);

        if let Some(detail) = detail.as_mut() {
            self.ctx.register(ObjectKind::Table, &detail.name, &table.name)?;
            let detail_owner = detail.name.clone();
            assign_constraint_names(&mut self.ctx, detail, &detail_owner, &config.enums, &[])?;
            script.push_simple(detail.render());
            script.push_simple(i18n::detail_foreign_key(&mut self.ctx, &config, detail)?);
            i18n::view_and_triggers(&mut self.ctx, &config, &table, detail)?;
            self.counters.i18n += 1;
        }

        if config.temporal {
            script.append(history::generate(&mut self.ctx, &config, &table)?);
            self.counters.history += 1;
        }
        if config.auditable {
            script.append(audit::trigger(&mut self.ctx, &config, &table)?);
        }
        script.append(emulation);

        for (i, spec) in config.indexes.iter().enumerate() {
            script.push_simple(self.declared_index(&config, &table.name, i, spec)?);
        }
        for (i, spec) in config.unique_constraints.iter().enumerate() {
            if spec.sql.is_some() {
                script.push_simple(self.declared_index(&config, &table.name, i, spec)?);
            }
        }

        self.comments(&config, &table, detail.as_ref());
        if let Some(detail) = &detail {
            self.record(detail, None);
        }
        self.record(&table, partitioned.local_key);
        Ok(script)
    }

    /// `create [unique] index` for a declarative index spec
    fn declared_index(
        &mut self,
        config: &TableConfig,
        table: &str,
        ordinal: usize,
        spec: &IndexSpec,
    ) -> SynthResult<String> {
        let columns = if spec.columns.is_empty() {
            vec![(ordinal + 1).to_string()]
        } else {
            spec.columns.clone()
        };
        let kind = if spec.unique && spec.sql.is_some() {
            ObjectKind::Unique
        } else {
            ObjectKind::Index
        };
        let name = self
            .ctx
            .naming
            .constraint_name(kind, config.owner_name(), &columns, spec.name.as_deref())?;
        self.ctx.register(ObjectKind::Index, &name, table)?;
        let body = spec
            .sql
            .clone()
            .unwrap_or_else(|| spec.columns.join(", "));
        if spec.sql.is_none() {
            self.cover(table, spec.columns.clone());
        }
        Ok(format!(
            "create {}index {} on {} ({})",
            if spec.unique { "unique " } else { "" },
            name,
            table,
            body
        ))
    }

    /// `comment on` statements, queued on the tail
    fn comments(&mut self, config: &TableConfig, table: &TableDefinition, detail: Option<&TableDefinition>) {
        if let Some(text) = &config.comment {
            self.ctx
                .tail
                .push_simple(format!("comment on table {} is {}", table.name, quote(text)));
        }
        for (column, text) in &config.column_comments {
            let owner = if table.has_column(column) {
                &table.name
            } else {
                match detail.filter(|d| d.has_column(column)) {
                    Some(d) => &d.name,
                    None => {
                        log::warn!("comment for unknown column '{}.{}' dropped", table.name, column);
                        continue;
                    }
                }
            };
            self.ctx.tail.push_simple(format!(
                "comment on column {}.{} is {}",
                owner,
                column,
                quote(text)
            ));
        }
    }

    fn foreign_key(&mut self, fk: ForeignKeyDefinition) -> SynthResult<Script> {
        if self.excluded.contains(&fk.table) || !self.renders(&fk.table) {
            return Ok(self.placeholder(format!("foreign key {} of unrendered table {}", fk.name, fk.table)));
        }
        if self.excluded.contains(&fk.target) || !self.renders(&fk.target) {
            return Ok(self.placeholder(format!(
                "foreign key {} targets unrendered table {}",
                fk.name, fk.target
            )));
        }
        let child = self.config_of(&fk.table);
        let target = self.config_of(&fk.target);
        let dialect = self.dialect();

        if !target.referenceable() || (dialect == Dialect::Postgres && target.partition.is_some()) {
            log::warn!(
                "foreign key {}.{} skipped: '{}' has no global key",
                fk.table,
                fk.columns.join(","),
                fk.target
            );
            return Ok(self.placeholder(format!(
                "foreign key {} skipped, {} is partitioned without a global key",
                fk.name, fk.target
            )));
        }
        if fk.columns.iter().any(|c| child.no_foreign_key.contains(c)) {
            return Ok(self.placeholder(format!("foreign key {} suppressed by metadata", fk.name)));
        }
        let mut table = fk.table.clone();
        if let Some(link) = &child.i18n {
            if fk.columns.iter().any(|c| link.pseudo_columns().contains(&c.as_str())) {
                return Ok(self.placeholder(format!("foreign key {} is on an i18n pseudo column", fk.name)));
            }
            if fk.columns.iter().any(|c| link.translatable.contains(c)) {
                table = self.ctx.naming.suffixed(&child.table_name, &self.ctx.config.i18n_suffix)?;
            }
        }

        let owner = if table == fk.table {
            child.owner_name().to_string()
        } else {
            table.clone()
        };
        let name = self
            .ctx
            .constraint(ObjectKind::ForeignKey, &owner, &table, &fk.columns, None)?;
        let target_columns = if fk.target_columns.is_empty() {
            target.pk_columns.clone()
        } else {
            fk.target_columns.clone()
        };

        let mut sql = format!(
            "alter table {} add constraint {} foreign key ({}) references {}",
            table,
            name,
            fk.columns.join(", "),
            fk.target
        );
        if !target_columns.is_empty() {
            sql.push_str(&format!(" ({})", target_columns.join(", ")));
        }
        if let [column] = fk.columns.as_slice() {
            let reference = ColumnRef::new(fk.table.clone(), column.clone());
            if target.cascade_delete.contains(&reference) {
                sql.push_str(" on delete cascade");
            } else if dialect == Dialect::Hsql && target.cascade_nullable.contains(&reference) {
                sql.push_str(" on delete set null");
            }
            if let Some(initially) = child.deferred_foreign_keys.get(column) {
                match deferred::clause(dialect, *initially) {
                    Some(clause) => {
                        sql.push(' ');
                        sql.push_str(clause);
                    }
                    None => log::warn!(
                        "{} cannot defer foreign key {}, created immediate",
                        dialect,
                        name
                    ),
                }
            }
        }

        self.companions.push(CompanionIndex {
            table: table.clone(),
            owner,
            columns: fk.columns.clone(),
        });
        let mut script = self.ctx.script();
        script.push_simple(sql);
        Ok(script)
    }

    fn add_unique(&mut self, unique: UniqueDefinition) -> SynthResult<Script> {
        if self.excluded.contains(&unique.table) || !self.renders(&unique.table) {
            return Ok(self.placeholder(format!("unique {} of unrendered table {}", unique.name, unique.table)));
        }
        let config = self.config_of(&unique.table);
        let inline = self
            .tables
            .get(&unique.table)
            .map(|t| {
                t.uniques.iter().any(|u| u.columns == unique.columns)
                    || matches!(unique.columns.as_slice(), [c] if t.column(c).map(|d| d.unique).unwrap_or(false))
            })
            .unwrap_or(false);
        let deferred = config.deferred.values().any(|d| {
            matches!(&d.kind, DeferredKind::Unique { columns } if *columns == unique.columns)
        });
        if inline || deferred {
            return Ok(self.placeholder(format!(
                "unique ({}) is declared with table {}",
                unique.columns.join(", "),
                unique.table
            )));
        }

        let mut columns = unique.columns.clone();
        if let Some(spec) = config.partition.as_ref().filter(|_| self.dialect() == Dialect::Postgres) {
            if !columns.contains(&spec.column) {
                columns.push(spec.column.clone());
            }
        }
        let explicit = config
            .unique_constraints
            .iter()
            .find(|s| s.sql.is_none() && s.columns == unique.columns)
            .and_then(|s| s.name.clone());
        let name = self.ctx.constraint(
            ObjectKind::Unique,
            config.owner_name(),
            &unique.table,
            &unique.columns,
            explicit.as_deref(),
        )?;
        self.cover(&unique.table, columns.clone());
        let mut script = self.ctx.script();
        script.push_simple(format!(
            "alter table {} add constraint {} unique ({})",
            unique.table,
            name,
            columns.join(", ")
        ));
        Ok(script)
    }

    fn create_index(&mut self, index: IndexDefinition) -> SynthResult<Script> {
        if self.excluded.contains(&index.table) || !self.renders(&index.table) {
            return Ok(self.placeholder(format!("index {} of unrendered table {}", index.name, index.table)));
        }
        let config = self.config_of(&index.table);
        let declared = config
            .indexes
            .iter()
            .any(|s| s.sql.is_none() && s.columns == index.columns);
        if declared {
            return Ok(self.placeholder(format!(
                "index ({}) is declared with table {}",
                index.columns.join(", "),
                index.table
            )));
        }
        let mut table = index.table.clone();
        if let Some(link) = &config.i18n {
            if index.columns.iter().any(|c| link.translatable.contains(c)) {
                table = self.ctx.naming.suffixed(&config.table_name, &self.ctx.config.i18n_suffix)?;
            }
        }
        let owner = if table == index.table {
            config.owner_name().to_string()
        } else {
            table.clone()
        };
        let name = self.ctx.naming.index_name(&owner, &index.columns, None)?;
        self.ctx.register(ObjectKind::Index, &name, &table)?;
        self.cover(&table, index.columns.clone());
        let mut script = self.ctx.script();
        script.push_simple(format!(
            "create {}index {} on {} ({})",
            if index.unique { "unique " } else { "" },
            name,
            table,
            index.columns.join(", ")
        ));
        Ok(script)
    }

    fn create_sequence(&mut self, sequence: SequenceDefinition) -> SynthResult<Script> {
        if self.owned_sequences.contains(&sequence.name) {
            return Ok(self.placeholder(format!(
                "sequence {} is created with its table",
                sequence.name
            )));
        }
        let name = self.ctx.naming.sequence_name(&sequence.name, Some(&sequence.name))?;
        self.ctx.register(ObjectKind::Sequence, &name, &name)?;
        let mut script = self.ctx.script();
        if sequence.options.is_empty() {
            script.push_simple(format!("create sequence {}", name));
        } else {
            script.push_simple(format!("create sequence {} {}", name, sequence.options));
        }
        Ok(script)
    }

    fn drop_table(&mut self, table: &str) -> SynthResult<Script> {
        if !self.renders(table) {
            return Ok(self.placeholder(format!("drop of unrendered table {}", table)));
        }
        let config = self.config_of(table);
        let dialect = self.dialect();
        let mut drops = DropList::new(dialect);

        if config.i18n.is_some() {
            let names = I18nNames::derive(&self.ctx, &config)?;
            drops.view(&names.view);
            drops.table(&names.detail);
            drops.functions.extend(names.function);
        }
        if config.temporal {
            let names = HistoryNames::derive(&self.ctx, &config)?;
            drops.table(&names.table);
            drops.sequence(&names.sequence);
            drops.functions.extend(names.function);
        }
        for spec in &config.sequences {
            let name = self.ctx.naming.sequence_name(config.owner_name(), spec.name.as_deref())?;
            drops.sequence(&name);
        }
        drops.table(table);

        if dialect.uses_trigger_functions() {
            if config.auditable {
                drops.functions.extend(AuditNames::derive(&self.ctx, &config)?.function);
            }
            for constraint in config.deferred.values() {
                if matches!(constraint.kind, DeferredKind::Check { .. }) {
                    let (function, _) = deferred::emulation_names(&self.ctx, &config, &constraint.name)?;
                    drops.functions.push(function);
                }
            }
            for column in self.registry.cascade_nullable_columns_of(table) {
                let (_, function) = audit::cascade_nullable_names(&self.ctx, config.owner_name(), &column)?;
                drops.functions.extend(function);
            }
        }
        Ok(drops.into_script())
    }
}

/// Drop statements for one table and everything generated around it
struct DropList {
    script: Script,
    functions: Vec<String>,
}

impl DropList {
    fn new(dialect: Dialect) -> Self {
        Self {
            script: Script::new(dialect),
            functions: Vec::new(),
        }
    }

    fn view(&mut self, name: &str) {
        self.object("view", name, "", -942);
    }

    fn table(&mut self, name: &str) {
        let options = match self.script.dialect() {
            Dialect::Oracle => " cascade constraints purge",
            Dialect::Postgres | Dialect::Hsql => " cascade",
        };
        self.object("table", name, options, -942);
    }

    fn sequence(&mut self, name: &str) {
        self.object("sequence", name, "", -2289);
    }

    fn object(&mut self, kind: &str, name: &str, options: &str, missing_code: i32) {
        let dialect = self.script.dialect();
        if dialect.supports_drop_if_exists() {
            self.script
                .push_simple(format!("drop {} if exists {}{}", kind, name, options));
        } else {
            self.script.push_block(format!(
                "begin\n    execute immediate 'drop {} {}{}';\nexception\n    when others then\n        if sqlcode != {} then\n            raise;\n        end if;\nend;",
                kind, name, options, missing_code
            ));
        }
    }

    fn into_script(mut self) -> Script {
        for function in std::mem::take(&mut self.functions) {
            self.script
                .push_simple(format!("drop function if exists {}() cascade", function));
        }
        self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EntityModel, EntityTag, FieldModel, FieldTag, SchemaModel};

    fn raw(sql: &str) -> RawStatement {
        RawStatement::new(sql).unwrap()
    }

    fn session(dialect: Dialect, model: &SchemaModel) -> SynthesisSession {
        let registry = TableConfigRegistry::scan(model).unwrap();
        SynthesisSession::new(SynthesisConfig::for_dialect(dialect), registry).unwrap()
    }

    fn customer_model() -> SchemaModel {
        SchemaModel {
            entities: vec![
                EntityModel::new("Customer")
                    .field(FieldModel::new("id").tag(FieldTag::Id))
                    .field(FieldModel::new("name"))
                    .tag(EntityTag::Temporal)
                    .tag(EntityTag::Auditable),
                EntityModel::new("Invoice")
                    .field(FieldModel::new("id").tag(FieldTag::Id))
                    .field(FieldModel::new("customer").column("customer_id").tag(FieldTag::ManyToOne {
                        target: "Customer".to_string(),
                        join_column: Some("customer_id".to_string()),
                        cascade_delete: true,
                        cascade_nullable: false,
                        no_foreign_key: false,
                        deferred: None,
                    })),
            ],
            embeddables: Vec::new(),
        }
    }

    #[test]
    fn test_create_table_with_history_and_audit() {
        let model = customer_model();
        let mut session = session(Dialect::Postgres, &model);
        let script = session
            .synthesize(&raw(
                "create table customer (id bigint not null, name varchar(100), primary key (id))",
            ))
            .unwrap();
        let sql = script.executable();
        assert!(sql[0].starts_with("create table customer ("));
        assert!(sql[0].contains("modified_by varchar(64)"));
        assert!(sql[0].contains("constraint pk_customer primary key (id)"));
        assert!(sql.iter().any(|s| s.starts_with("create table customer_hst (")));
        assert!(sql.iter().any(|s| s.starts_with("create trigger tr_customer_hst ")));
        assert!(sql.iter().any(|s| s.starts_with("create trigger tr_customer_aud ")));
        assert!(session.names().contains("sq_customer_hst"));
    }

    #[test]
    fn test_foreign_key_is_renamed_with_cascade_and_companion_index() {
        let model = customer_model();
        let mut session = session(Dialect::Postgres, &model);
        session
            .synthesize(&raw("create table customer (id bigint not null, name varchar(100), primary key (id))"))
            .unwrap();
        session
            .synthesize(&raw("create table invoice (id bigint not null, customer_id bigint, primary key (id))"))
            .unwrap();
        let script = session
            .synthesize(&raw(
                "alter table invoice add constraint FK_3XQ foreign key (customer_id) references customer",
            ))
            .unwrap();
        assert_eq!(
            script.executable(),
            vec!["alter table invoice add constraint fk_invoice_customer_id foreign key (customer_id) references customer (id) on delete cascade"]
        );
        let tail = session.finish().unwrap();
        assert_eq!(
            tail.executable()[0],
            "create index ix_invoice_customer_id on invoice (customer_id)"
        );
    }

    #[test]
    fn test_excluded_table_is_a_placeholder() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Legacy")
                .field(FieldModel::new("id").tag(FieldTag::Id))
                .tag(EntityTag::SupersededByView)],
            embeddables: Vec::new(),
        };
        let mut session = session(Dialect::Oracle, &model);
        let script = session
            .synthesize(&raw("create table legacy (id number(19,0) not null, primary key (id))"))
            .unwrap();
        assert!(script.executable().is_empty());
        assert_eq!(script.len(), 1);
        assert!(session.names().is_empty());
    }

    #[test]
    fn test_drop_table_removes_generated_objects() {
        let model = customer_model();
        let mut session = session(Dialect::Postgres, &model);
        let script = session.synthesize(&raw("drop table if exists customer cascade")).unwrap();
        assert_eq!(
            script.executable(),
            vec![
                "drop table if exists customer_hst cascade",
                "drop sequence if exists sq_customer_hst",
                "drop table if exists customer cascade",
                "drop function if exists fn_customer_hst() cascade",
                "drop function if exists fn_customer_aud() cascade",
            ]
        );

        let mut session = self::session(Dialect::Oracle, &model);
        let script = session.synthesize(&raw("drop table customer cascade constraints")).unwrap();
        assert_eq!(script.len(), 3);
        assert!(script.statements()[0].sql.contains("if sqlcode != -942 then"));
        assert!(script.statements()[1].sql.contains("if sqlcode != -2289 then"));
    }

    #[test]
    fn test_index_covered_by_key_is_not_duplicated() {
        let model = customer_model();
        let mut session = session(Dialect::Hsql, &model);
        session
            .synthesize(&raw("create table customer (id bigint not null, name varchar(100), primary key (id))"))
            .unwrap();
        session
            .synthesize(&raw("create table invoice (id bigint not null, customer_id bigint, primary key (id))"))
            .unwrap();
        session
            .synthesize(&raw("create index IDX_1 on invoice (customer_id, id)"))
            .unwrap();
        session
            .synthesize(&raw(
                "alter table invoice add constraint FK_1 foreign key (customer_id) references customer (id)",
            ))
            .unwrap();
        let tail = session.finish().unwrap();
        assert!(tail.executable().iter().all(|s| !s.starts_with("create index")));
    }

    #[test]
    fn test_deferred_unique_on_partitioned_table_carries_partition_column() {
        use crate::metadata::{PartitionDeclaration, PartitionInterval};
        let model = SchemaModel {
            entities: vec![EntityModel::new("Slot")
                .field(FieldModel::new("id").tag(FieldTag::Id))
                .field(FieldModel::new("pos"))
                .field(FieldModel::new("at"))
                .tag(EntityTag::Deferred {
                    name: "uk_slot_pos".to_string(),
                    declaration: None,
                    unique_columns: vec!["pos".to_string()],
                    initially_deferred: true,
                })
                .tag(EntityTag::Partitioned(PartitionDeclaration {
                    column: "at".to_string(),
                    interval: PartitionInterval::Month,
                    first_boundary: "2024-01-01".to_string(),
                    local_primary_key: false,
                    default_expression: None,
                }))],
            embeddables: Vec::new(),
        };

        let mut session = session(Dialect::Postgres, &model);
        let script = session
            .synthesize(&raw("create table slot (id bigint not null, pos integer, at timestamp, primary key (id))"))
            .unwrap();
        let create = script.executable()[0];
        assert!(
            create.contains("constraint uk_slot_pos unique (pos, at) deferrable initially deferred"),
            "{}",
            create
        );
        assert!(create.contains("constraint pk_slot primary key (id, at)"));
        assert!(create.ends_with("partition by range (at)"));

        let mut session = self::session(Dialect::Oracle, &model);
        let script = session
            .synthesize(&raw("create table slot (id number(19,0) not null, pos number(10,0), at timestamp, primary key (id))"))
            .unwrap();
        assert!(script.executable()[0].contains("constraint uk_slot_pos unique (pos) deferrable initially deferred"));
    }

    #[test]
    fn test_duplicate_table_is_a_collision() {
        let model = SchemaModel::default();
        let mut session = session(Dialect::Postgres, &model);
        session.synthesize(&raw("create table t (id bigint)")).unwrap();
        assert!(matches!(
            session.synthesize(&raw("create table T (id bigint)")),
            Err(crate::error::SynthError::NameCollision { .. })
        ));
    }
}
