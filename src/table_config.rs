//! Per-table metadata aggregation
//!
//! [`TableConfigRegistry::scan`] walks every class of a [`SchemaModel`]
//! together with its superclass chain and embedded types, producing one
//! [`TableConfig`] per distinct table. Join and collection tables that only
//! exist through a relation attribute get a config synthesized the first
//! time they are encountered.
//!
//! Traversal is deterministic: a class's declared fields come before the
//! fields it inherits, and embedded types are walked recursively with an
//! accumulated attribute path so outer overrides win over inner ones.

use crate::error::{SynthError, SynthResult};
use crate::metadata::{
    EntityModel, EntityTag, FieldModel, FieldTag, IndexDeclaration, PartitionDeclaration,
    PartitionInterval, SchemaModel, SequenceDeclaration,
};
use crate::naming::NamingStrategy;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A column of a specific table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Allowed values of an enum-typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCheck {
    pub values: Vec<String>,
    /// Stored as the value's position instead of its name
    pub ordinal: bool,
}

impl EnumCheck {
    /// CHECK predicate restricting `column` to the declared values
    pub fn predicate(&self, column: &str) -> String {
        let values: Vec<String> = if self.ordinal {
            (0..self.values.len()).map(|i| i.to_string()).collect()
        } else {
            self.values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect()
        };
        format!("{} in ({})", column, values.join(", "))
    }
}

/// What a deferred constraint checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredKind {
    Check { predicate: String },
    Unique { columns: Vec<String> },
}

/// A constraint validated at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredConstraint {
    pub name: String,
    pub kind: DeferredKind,
    pub initially_deferred: bool,
}

impl DeferredConstraint {
    /// Declaration text without the constraint name, e.g. `check (qty >= 0)`
    pub fn declaration(&self) -> String {
        match &self.kind {
            DeferredKind::Check { predicate } => format!("check ({})", predicate),
            DeferredKind::Unique { columns } => format!("unique ({})", columns.join(", ")),
        }
    }
}

/// Resolved range-partition declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub column: String,
    pub interval: PartitionInterval,
    pub first_boundary: NaiveDateTime,
    pub local_primary_key: bool,
    pub default_expression: String,
}

/// Link between a live table and its translation detail table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I18nLink {
    /// Parent key column of the detail table (a bookkeeping column on the live table)
    pub fk_column: String,
    /// Language code column (a bookkeeping column on the live table)
    pub language_column: String,
    /// Table that keeps the non-translatable columns
    pub base_table: String,
    pub translatable: Vec<String>,
}

impl I18nLink {
    /// The two columns that only exist in the pre-fork metadata
    pub fn pseudo_columns(&self) -> [&str; 2] {
        [&self.fk_column, &self.language_column]
    }
}

/// Declared index or unique constraint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
    pub sql: Option<String>,
}

/// Declared sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSpec {
    pub name: Option<String>,
    pub start: i64,
    pub increment: i64,
}

/// Everything known about one table after the metadata scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableConfig {
    pub table_name: String,
    /// Root class mapped to the table; `None` for synthesized join tables
    pub entity: Option<String>,
    /// Superclass chain of the root class, nearest first
    pub superclasses: Vec<String>,
    pub short_name: Option<String>,
    pub pk_columns: Vec<String>,
    pub enums: BTreeMap<String, EnumCheck>,
    pub defaults: BTreeMap<String, String>,
    pub deferred: BTreeMap<String, DeferredConstraint>,
    /// FK column -> initially deferred
    pub deferred_foreign_keys: BTreeMap<String, bool>,
    /// Columns elsewhere whose rows are deleted with the referenced row of this table
    pub cascade_delete: BTreeSet<ColumnRef>,
    /// Columns elsewhere that are nulled when the referenced row of this table is deleted
    pub cascade_nullable: BTreeSet<ColumnRef>,
    pub no_foreign_key: BTreeSet<String>,
    /// FK column -> referenced table
    pub references: BTreeMap<String, String>,
    pub sequences: Vec<SequenceSpec>,
    pub indexes: Vec<IndexSpec>,
    pub unique_constraints: Vec<IndexSpec>,
    pub i18n: Option<I18nLink>,
    pub partition: Option<PartitionSpec>,
    pub temporal: bool,
    pub auditable: bool,
    pub render: bool,
    pub version_columns: BTreeSet<String>,
    pub not_historized: BTreeSet<String>,
    pub comment: Option<String>,
    pub column_comments: BTreeMap<String, String>,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            render: true,
            ..Default::default()
        }
    }

    /// Owner name used when deriving constraint/index/trigger names
    pub fn owner_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.table_name)
    }

    /// Whether the table will gain a suffixed sibling (history or i18n detail)
    pub fn gains_suffix(&self) -> bool {
        self.temporal || self.i18n.is_some()
    }

    /// Whether foreign keys may point at this table
    pub fn referenceable(&self) -> bool {
        !self
            .partition
            .as_ref()
            .map(|p| p.local_primary_key)
            .unwrap_or(false)
    }
}

/// Run-scoped map of table configs, keyed by lowercase table name
#[derive(Debug, Clone, Default)]
pub struct TableConfigRegistry {
    tables: BTreeMap<String, TableConfig>,
}

impl TableConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configs for every table of the model
    pub fn scan(model: &SchemaModel) -> SynthResult<Self> {
        let mut scanner = Scanner::new(model)?;
        scanner.run()?;
        let registry = scanner.finish()?;
        log::debug!("scanned {} table configs", registry.len());
        Ok(registry)
    }

    pub fn get(&self, table: &str) -> Option<&TableConfig> {
        self.tables.get(&table.to_lowercase())
    }

    pub fn get_mut(&mut self, table: &str) -> Option<&mut TableConfig> {
        self.tables.get_mut(&table.to_lowercase())
    }

    pub fn insert(&mut self, config: TableConfig) {
        self.tables.insert(config.table_name.to_lowercase(), config);
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableConfig> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Cascade-nullable columns declared on `table` itself (stored on the referenced side)
    pub fn cascade_nullable_columns_of(&self, table: &str) -> BTreeSet<String> {
        self.tables
            .values()
            .flat_map(|c| c.cascade_nullable.iter())
            .filter(|r| r.table.eq_ignore_ascii_case(table))
            .map(|r| r.column.clone())
            .collect()
    }

    /// Table that owns `column` through a cascade-nullable declaration, if any
    pub fn cascade_nullable_parent(&self, table: &str, column: &str) -> Option<&TableConfig> {
        let wanted = ColumnRef::new(table.to_lowercase(), column.to_lowercase());
        self.tables
            .values()
            .find(|c| c.cascade_nullable.contains(&wanted))
    }
}

enum CascadeKind {
    Delete,
    Nullable,
}

struct PendingCascade {
    target_entity: String,
    column: ColumnRef,
    kind: CascadeKind,
}

/// Accumulated context of one embedded-type descent
#[derive(Clone, Default)]
struct PathContext {
    prefix: String,
    overrides: HashMap<String, String>,
}

impl PathContext {
    fn descend(&self, field: &FieldModel) -> PathContext {
        let path = format!("{}{}", self.prefix, field.name);
        let mut overrides = self.overrides.clone();
        for tag in &field.tags {
            if let FieldTag::AttributeOverride { path: sub, column } = tag {
                // outer declarations win
                overrides
                    .entry(format!("{}.{}", path, sub))
                    .or_insert_with(|| column.clone());
            }
        }
        PathContext {
            prefix: format!("{}.", path),
            overrides,
        }
    }
}

struct Scanner<'m> {
    model: &'m SchemaModel,
    entity_tables: HashMap<&'m str, Option<String>>,
    registry: TableConfigRegistry,
    pending: Vec<PendingCascade>,
}

impl<'m> Scanner<'m> {
    fn new(model: &'m SchemaModel) -> SynthResult<Self> {
        let mut entity_tables = HashMap::new();
        for entity in &model.entities {
            let table = Self::resolve_table(model, entity, 0)?;
            entity_tables.insert(entity.name.as_str(), table);
        }
        Ok(Self {
            model,
            entity_tables,
            registry: TableConfigRegistry::new(),
            pending: Vec::new(),
        })
    }

    fn resolve_table(
        model: &SchemaModel,
        entity: &EntityModel,
        depth: usize,
    ) -> SynthResult<Option<String>> {
        if depth > model.entities.len() {
            return Err(SynthError::config(&entity.name, "cyclic superclass chain"));
        }
        if entity.mapped_superclass {
            return Ok(None);
        }
        if let Some(table) = &entity.table {
            return Ok(Some(NamingStrategy::canonical(table)));
        }
        if let Some(parent) = &entity.superclass {
            let parent_model = model.entity(parent).ok_or_else(|| SynthError::Resolution {
                owner: entity.name.clone(),
                target: parent.clone(),
            })?;
            if !parent_model.mapped_superclass {
                // single-table inheritance
                return Self::resolve_table(model, parent_model, depth + 1);
            }
        }
        Ok(Some(NamingStrategy::canonical(&entity.name)))
    }

    fn table_of(&self, owner: &str, entity: &str) -> SynthResult<String> {
        match self.entity_tables.get(entity) {
            Some(Some(table)) => Ok(table.clone()),
            _ => Err(SynthError::Resolution {
                owner: owner.to_string(),
                target: entity.to_string(),
            }),
        }
    }

    /// Superclass chain of an entity, nearest first
    fn chain(&self, entity: &'m EntityModel) -> SynthResult<Vec<&'m EntityModel>> {
        let mut chain = Vec::new();
        let mut current = entity;
        while let Some(parent) = &current.superclass {
            let parent_model = self.model.entity(parent).ok_or_else(|| SynthError::Resolution {
                owner: current.name.clone(),
                target: parent.clone(),
            })?;
            if chain.len() > self.model.entities.len() {
                return Err(SynthError::config(&entity.name, "cyclic superclass chain"));
            }
            chain.push(parent_model);
            current = parent_model;
        }
        Ok(chain)
    }

    fn run(&mut self) -> SynthResult<()> {
        let model = self.model;
        for entity in &model.entities {
            let Some(table) = self.entity_tables.get(entity.name.as_str()).cloned().flatten() else {
                continue;
            };
            self.scan_entity(entity, &table)?;
        }
        Ok(())
    }

    fn scan_entity(&mut self, entity: &'m EntityModel, table: &str) -> SynthResult<()> {
        let chain = self.chain(entity)?;

        let mut config = self
            .registry
            .get(table)
            .cloned()
            .unwrap_or_else(|| TableConfig::new(table));
        if config.entity.is_none() {
            config.entity = Some(entity.name.clone());
            config.superclasses = chain.iter().map(|e| e.name.clone()).collect();
        }

        // Tags: own first, then inherited
        for tagged in std::iter::once(entity).chain(chain.iter().copied()) {
            for tag in &tagged.tags {
                self.apply_entity_tag(&mut config, tag)?;
            }
        }

        // Fields: declared first, then those of mapped superclasses up to the
        // first superclass that owns a table (scanned on its own).
        let mut field_owners = vec![entity];
        for parent in chain.iter().copied() {
            if !parent.mapped_superclass {
                break;
            }
            field_owners.push(parent);
        }
        let mut translatable = Vec::new();
        let mut i18n_key: Option<(String, String)> = None;
        for owner in &field_owners {
            for field in &owner.fields {
                self.visit_field(
                    &mut config,
                    &entity.name,
                    field,
                    &PathContext::default(),
                    &mut translatable,
                    &mut i18n_key,
                )?;
            }
        }

        // Identity declared anywhere up the chain (joined subclasses share it)
        if config.pk_columns.is_empty() {
            for ancestor in &chain {
                for field in &ancestor.fields {
                    if let Some(columns) = self.identity_columns(&entity.name, field, &PathContext::default())? {
                        config.pk_columns = columns;
                        break;
                    }
                }
                if !config.pk_columns.is_empty() {
                    break;
                }
            }
        }

        match (i18n_key, translatable.is_empty()) {
            (Some((fk_column, language_column)), false) => {
                config.i18n = Some(I18nLink {
                    fk_column,
                    language_column,
                    base_table: config.table_name.clone(),
                    translatable,
                });
            }
            (Some(_), true) => {
                return Err(SynthError::config(
                    table,
                    "i18n key declared but no translatable columns",
                ));
            }
            (None, false) => {
                return Err(SynthError::config(
                    table,
                    "translatable columns declared without an i18n key",
                ));
            }
            (None, true) => {}
        }

        self.registry.insert(config);
        Ok(())
    }

    fn apply_entity_tag(&self, config: &mut TableConfig, tag: &EntityTag) -> SynthResult<()> {
        match tag {
            EntityTag::Temporal => config.temporal = true,
            EntityTag::Auditable => config.auditable = true,
            EntityTag::Partitioned(decl) => {
                if config.partition.is_none() {
                    config.partition = Some(partition_spec(&config.table_name, decl)?);
                }
            }
            EntityTag::Render { enabled } => {
                if !enabled {
                    config.render = false;
                }
            }
            EntityTag::SupersededByView => config.render = false,
            EntityTag::ShortName { name } => {
                if config.short_name.is_none() {
                    config.short_name = Some(NamingStrategy::canonical(name));
                }
            }
            EntityTag::Index(decl) => push_unique(&mut config.indexes, index_spec(decl)),
            EntityTag::UniqueConstraint(decl) => {
                let mut spec = index_spec(decl);
                spec.unique = true;
                push_unique(&mut config.unique_constraints, spec);
            }
            EntityTag::Deferred {
                name,
                declaration,
                unique_columns,
                initially_deferred,
            } => {
                let constraint = deferred_constraint(
                    &config.table_name,
                    name,
                    declaration.as_deref(),
                    unique_columns,
                    *initially_deferred,
                )?;
                config
                    .deferred
                    .entry(constraint.name.clone())
                    .or_insert(constraint);
            }
            EntityTag::Sequence(decl) => {
                let spec = sequence_spec(decl);
                if !config.sequences.contains(&spec) {
                    config.sequences.push(spec);
                }
            }
            EntityTag::Comment { text } => {
                if config.comment.is_none() {
                    config.comment = Some(text.clone());
                }
            }
        }
        Ok(())
    }

    fn column_of(field: &FieldModel, ctx: &PathContext) -> String {
        let path = format!("{}{}", ctx.prefix, field.name);
        let name = ctx
            .overrides
            .get(&path)
            .or(field.column.as_ref())
            .cloned()
            .unwrap_or_else(|| field.name.clone());
        NamingStrategy::canonical(&name)
    }

    /// Columns of an identity field, flattening composite ids
    fn identity_columns(
        &self,
        owner: &str,
        field: &FieldModel,
        ctx: &PathContext,
    ) -> SynthResult<Option<Vec<String>>> {
        for tag in &field.tags {
            match tag {
                FieldTag::Id => return Ok(Some(vec![Self::column_of(field, ctx)])),
                FieldTag::EmbeddedId { embeddable } => {
                    let columns = self.flatten(owner, embeddable, &ctx.descend(field))?;
                    return Ok(Some(columns));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn flatten(&self, owner: &str, embeddable: &str, ctx: &PathContext) -> SynthResult<Vec<String>> {
        let model = self.model.embeddable(embeddable).ok_or_else(|| SynthError::Resolution {
            owner: owner.to_string(),
            target: embeddable.to_string(),
        })?;
        let mut columns = Vec::new();
        for field in &model.fields {
            let nested = field.tags.iter().find_map(|t| match t {
                FieldTag::Embedded { embeddable } => Some(embeddable),
                _ => None,
            });
            match nested {
                Some(inner) => columns.extend(self.flatten(owner, inner, &ctx.descend(field))?),
                None => columns.push(Self::column_of(field, ctx)),
            }
        }
        Ok(columns)
    }

    fn visit_field(
        &mut self,
        config: &mut TableConfig,
        owner: &str,
        field: &FieldModel,
        ctx: &PathContext,
        translatable: &mut Vec<String>,
        i18n_key: &mut Option<(String, String)>,
    ) -> SynthResult<()> {
        if config.pk_columns.is_empty() {
            if let Some(columns) = self.identity_columns(owner, field, ctx)? {
                config.pk_columns = columns;
            }
        }

        let column = Self::column_of(field, ctx);
        let table = config.table_name.clone();

        for tag in &field.tags {
            match tag {
                FieldTag::Id | FieldTag::EmbeddedId { .. } | FieldTag::AttributeOverride { .. } => {}
                FieldTag::Embedded { embeddable } => {
                    let inner = ctx.descend(field);
                    let model = self.model.embeddable(embeddable).ok_or_else(|| {
                        SynthError::Resolution {
                            owner: owner.to_string(),
                            target: embeddable.clone(),
                        }
                    })?;
                    for nested in &model.fields {
                        self.visit_field(config, owner, nested, &inner, translatable, i18n_key)?;
                    }
                }
                FieldTag::Enumerated { values, ordinal } => {
                    if values.is_empty() {
                        return Err(SynthError::config(
                            &table,
                            format!("enum column '{}' declares no values", column),
                        ));
                    }
                    config.enums.insert(
                        column.clone(),
                        EnumCheck {
                            values: values.clone(),
                            ordinal: *ordinal,
                        },
                    );
                }
                FieldTag::Default { expression } => {
                    config.defaults.insert(column.clone(), expression.clone());
                }
                FieldTag::Version => {
                    config.version_columns.insert(column.clone());
                }
                FieldTag::NotHistorized => {
                    config.not_historized.insert(column.clone());
                }
                FieldTag::Translatable => {
                    if !translatable.contains(&column) {
                        translatable.push(column.clone());
                    }
                }
                FieldTag::I18nKey { language_column } => {
                    if i18n_key.is_none() {
                        *i18n_key = Some((column.clone(), NamingStrategy::canonical(language_column)));
                    }
                }
                FieldTag::ManyToOne {
                    target,
                    join_column,
                    cascade_delete,
                    cascade_nullable,
                    no_foreign_key,
                    deferred,
                } => {
                    let fk_column = join_column
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| format!("{}_id", NamingStrategy::canonical(&field.name)));
                    let target_table = self.table_of(owner, target)?;
                    config.references.insert(fk_column.clone(), target_table);
                    if *no_foreign_key {
                        config.no_foreign_key.insert(fk_column.clone());
                    }
                    if let Some(initially) = deferred {
                        config.deferred_foreign_keys.insert(fk_column.clone(), *initially);
                    }
                    if *cascade_delete && *cascade_nullable {
                        return Err(SynthError::Unsupported {
                            table: table.clone(),
                            message: format!(
                                "column '{}' is declared both cascade-delete and cascade-nullable",
                                fk_column
                            ),
                        });
                    }
                    let kind = if *cascade_delete {
                        Some(CascadeKind::Delete)
                    } else if *cascade_nullable {
                        Some(CascadeKind::Nullable)
                    } else {
                        None
                    };
                    if let Some(kind) = kind {
                        self.pending.push(PendingCascade {
                            target_entity: target.clone(),
                            column: ColumnRef::new(table.clone(), fk_column),
                            kind,
                        });
                    }
                }
                FieldTag::ManyToMany {
                    target,
                    join_table,
                    join_column,
                    inverse_join_column,
                } => {
                    let target_table = self.table_of(owner, target)?;
                    let join_table = join_table
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| {
                            format!("{}_{}", table, NamingStrategy::canonical(&field.name))
                        });
                    let owner_column = join_column
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| format!("{}_id", table));
                    let inverse_column = inverse_join_column
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| format!("{}_id", target_table));
                    self.synthesize_join_table(
                        &join_table,
                        vec![
                            (owner_column, table.clone()),
                            (inverse_column, target_table),
                        ],
                        true,
                    );
                }
                FieldTag::ElementCollection {
                    table: collection_table,
                    join_column,
                } => {
                    let collection_table = collection_table
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| {
                            format!("{}_{}", table, NamingStrategy::canonical(&field.name))
                        });
                    let owner_column = join_column
                        .as_deref()
                        .map(NamingStrategy::canonical)
                        .unwrap_or_else(|| format!("{}_id", table));
                    self.synthesize_join_table(
                        &collection_table,
                        vec![(owner_column, table.clone())],
                        false,
                    );
                }
                FieldTag::Comment { text } => {
                    config
                        .column_comments
                        .entry(column.clone())
                        .or_insert_with(|| text.clone());
                }
            }
        }
        Ok(())
    }

    fn synthesize_join_table(
        &mut self,
        table: &str,
        references: Vec<(String, String)>,
        keyed: bool,
    ) {
        if self.registry.contains(table) {
            return;
        }
        let mut config = TableConfig::new(table);
        if keyed {
            config.pk_columns = references.iter().map(|(c, _)| c.clone()).collect();
        }
        for (column, target) in references {
            config.references.insert(column, target);
        }
        log::debug!("synthesized table config for relation table '{}'", table);
        self.registry.insert(config);
    }

    fn finish(mut self) -> SynthResult<TableConfigRegistry> {
        for pending in std::mem::take(&mut self.pending) {
            let target_table = self.table_of(&pending.column.table, &pending.target_entity)?;
            let target = self.registry.get_mut(&target_table).ok_or_else(|| {
                SynthError::Resolution {
                    owner: pending.column.table.clone(),
                    target: target_table.clone(),
                }
            })?;
            match pending.kind {
                CascadeKind::Delete => target.cascade_delete.insert(pending.column),
                CascadeKind::Nullable => target.cascade_nullable.insert(pending.column),
            };
        }

        for config in self.registry.iter() {
            if config.temporal && config.pk_columns.is_empty() {
                return Err(SynthError::config(
                    &config.table_name,
                    "temporal entity without a resolvable primary key",
                ));
            }
            if config.i18n.is_some() && config.pk_columns.len() != 1 {
                return Err(SynthError::config(
                    &config.table_name,
                    "i18n requires a single-column primary key",
                ));
            }
        }
        Ok(self.registry)
    }
}

fn push_unique(specs: &mut Vec<IndexSpec>, spec: IndexSpec) {
    if !specs.contains(&spec) {
        specs.push(spec);
    }
}

fn index_spec(decl: &IndexDeclaration) -> IndexSpec {
    IndexSpec {
        name: decl.name.clone(),
        columns: decl.columns.iter().map(|c| NamingStrategy::canonical(c)).collect(),
        unique: decl.unique,
        sql: decl.sql.clone(),
    }
}

fn sequence_spec(decl: &SequenceDeclaration) -> SequenceSpec {
    SequenceSpec {
        name: decl.name.as_deref().map(NamingStrategy::canonical),
        start: decl.start,
        increment: decl.increment,
    }
}

fn deferred_constraint(
    table: &str,
    name: &str,
    declaration: Option<&str>,
    unique_columns: &[String],
    initially_deferred: bool,
) -> SynthResult<DeferredConstraint> {
    let kind = match (declaration, unique_columns.is_empty()) {
        (Some(_), false) => {
            return Err(SynthError::Unsupported {
                table: table.to_string(),
                message: format!(
                    "deferred constraint '{}' is expressed both as declaration and column list",
                    name
                ),
            });
        }
        (None, true) => {
            return Err(SynthError::config(
                table,
                format!("deferred constraint '{}' declares nothing to check", name),
            ));
        }
        (None, false) => DeferredKind::Unique {
            columns: unique_columns.iter().map(|c| NamingStrategy::canonical(c)).collect(),
        },
        (Some(text), true) => parse_declaration(table, name, text)?,
    };
    Ok(DeferredConstraint {
        name: NamingStrategy::canonical(name),
        kind,
        initially_deferred,
    })
}

/// `check (<predicate>)`, `unique (<cols>)` or a bare predicate
fn parse_declaration(table: &str, name: &str, text: &str) -> SynthResult<DeferredKind> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    let inner = |keyword: &str| -> Option<String> {
        let rest = trimmed[keyword.len()..].trim();
        rest.strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .map(|s| s.trim().to_string())
    };
    if lower.starts_with("unique") {
        let columns = inner("unique").ok_or_else(|| {
            SynthError::config(table, format!("malformed declaration of '{}': {}", name, text))
        })?;
        return Ok(DeferredKind::Unique {
            columns: columns.split(',').map(|c| NamingStrategy::canonical(c)).collect(),
        });
    }
    if lower.starts_with("check") {
        let predicate = inner("check").ok_or_else(|| {
            SynthError::config(table, format!("malformed declaration of '{}': {}", name, text))
        })?;
        return Ok(DeferredKind::Check { predicate });
    }
    Ok(DeferredKind::Check {
        predicate: trimmed.to_string(),
    })
}

fn partition_spec(table: &str, decl: &PartitionDeclaration) -> SynthResult<PartitionSpec> {
    let boundary = decl.first_boundary.trim();
    let first_boundary = NaiveDateTime::parse_from_str(boundary, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(boundary, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            SynthError::config(
                table,
                format!("invalid partition boundary '{}'", decl.first_boundary),
            )
        })?;
    Ok(PartitionSpec {
        column: NamingStrategy::canonical(&decl.column),
        interval: decl.interval,
        first_boundary,
        local_primary_key: decl.local_primary_key,
        default_expression: decl
            .default_expression
            .clone()
            .unwrap_or_else(|| "current_timestamp".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EmbeddableModel;

    fn id() -> FieldModel {
        FieldModel::new("id").tag(FieldTag::Id)
    }

    fn many_to_one(target: &str) -> FieldTag {
        FieldTag::ManyToOne {
            target: target.to_string(),
            join_column: None,
            cascade_delete: false,
            cascade_nullable: false,
            no_foreign_key: false,
            deferred: None,
        }
    }

    #[test]
    fn test_pk_from_first_identity_field() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Customer")
                .field(FieldModel::new("name"))
                .field(id())
                .field(FieldModel::new("otherId").tag(FieldTag::Id))],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let customer = registry.get("customer").unwrap();
        assert_eq!(customer.pk_columns, vec!["id"]);
        assert_eq!(customer.entity.as_deref(), Some("Customer"));
    }

    #[test]
    fn test_composite_id_is_flattened() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("OrderLine").field(
                FieldModel::new("key").tag(FieldTag::EmbeddedId {
                    embeddable: "OrderLineKey".to_string(),
                }),
            )],
            embeddables: vec![EmbeddableModel::new("OrderLineKey")
                .field(FieldModel::new("orderId"))
                .field(FieldModel::new("lineNo"))],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        assert_eq!(
            registry.get("order_line").unwrap().pk_columns,
            vec!["order_id", "line_no"]
        );
    }

    #[test]
    fn test_outer_override_wins_over_inner() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Customer").field(id()).field(
                FieldModel::new("home")
                    .tag(FieldTag::Embedded {
                        embeddable: "Address".to_string(),
                    })
                    .tag(FieldTag::AttributeOverride {
                        path: "geo.lat".to_string(),
                        column: "home_lat".to_string(),
                    }),
            )],
            embeddables: vec![
                EmbeddableModel::new("Address").field(
                    FieldModel::new("geo")
                        .tag(FieldTag::Embedded {
                            embeddable: "Geo".to_string(),
                        })
                        .tag(FieldTag::AttributeOverride {
                            path: "lat".to_string(),
                            column: "latitude".to_string(),
                        }),
                ),
                EmbeddableModel::new("Geo").field(
                    FieldModel::new("lat").tag(FieldTag::Enumerated {
                        values: vec!["N".to_string(), "S".to_string()],
                        ordinal: false,
                    }),
                ),
            ],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let customer = registry.get("customer").unwrap();
        assert!(customer.enums.contains_key("home_lat"));
        assert!(!customer.enums.contains_key("latitude"));
    }

    #[test]
    fn test_mapped_superclass_fields_follow_declared_fields() {
        let model = SchemaModel {
            entities: vec![
                EntityModel::new("Base")
                    .mapped_superclass()
                    .tag(EntityTag::Auditable)
                    .field(id())
                    .field(FieldModel::new("version").tag(FieldTag::Version)),
                EntityModel::new("Invoice")
                    .extends("Base")
                    .field(FieldModel::new("status").tag(FieldTag::Default {
                        expression: "'OPEN'".to_string(),
                    })),
            ],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        assert_eq!(registry.len(), 1);
        let invoice = registry.get("invoice").unwrap();
        assert!(invoice.auditable);
        assert_eq!(invoice.pk_columns, vec!["id"]);
        assert!(invoice.version_columns.contains("version"));
        assert_eq!(invoice.superclasses, vec!["Base"]);
    }

    #[test]
    fn test_single_table_subclass_shares_config() {
        let model = SchemaModel {
            entities: vec![
                EntityModel::new("Party").field(id()),
                EntityModel::new("Person")
                    .extends("Party")
                    .field(FieldModel::new("gender").tag(FieldTag::Enumerated {
                        values: vec!["F".to_string(), "M".to_string()],
                        ordinal: true,
                    })),
            ],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        assert_eq!(registry.len(), 1);
        let party = registry.get("party").unwrap();
        assert_eq!(party.entity.as_deref(), Some("Party"));
        assert_eq!(party.enums["gender"].predicate("gender"), "gender in (0, 1)");
    }

    #[test]
    fn test_cascade_sets_land_on_referenced_table() {
        let model = SchemaModel {
            entities: vec![
                EntityModel::new("Customer").field(id()),
                EntityModel::new("Invoice")
                    .field(id())
                    .field(FieldModel::new("customer").tag(FieldTag::ManyToOne {
                        target: "Customer".to_string(),
                        join_column: None,
                        cascade_delete: true,
                        cascade_nullable: false,
                        no_foreign_key: false,
                        deferred: None,
                    }))
                    .field(FieldModel::new("agent").tag(FieldTag::ManyToOne {
                        target: "Customer".to_string(),
                        join_column: Some("agent_ref".to_string()),
                        cascade_delete: false,
                        cascade_nullable: true,
                        no_foreign_key: false,
                        deferred: None,
                    })),
            ],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let customer = registry.get("customer").unwrap();
        assert!(customer
            .cascade_delete
            .contains(&ColumnRef::new("invoice", "customer_id")));
        assert!(customer
            .cascade_nullable
            .contains(&ColumnRef::new("invoice", "agent_ref")));
        assert!(registry.get("invoice").unwrap().cascade_delete.is_empty());
        assert_eq!(
            registry.cascade_nullable_columns_of("invoice").into_iter().collect::<Vec<_>>(),
            vec!["agent_ref"]
        );
    }

    #[test]
    fn test_join_table_synthesized_once() {
        let model = SchemaModel {
            entities: vec![
                EntityModel::new("Tag").field(id()),
                EntityModel::new("Article")
                    .field(id())
                    .field(FieldModel::new("tags").tag(FieldTag::ManyToMany {
                        target: "Tag".to_string(),
                        join_table: None,
                        join_column: None,
                        inverse_join_column: None,
                    }))
                    .field(FieldModel::new("keywords").tag(FieldTag::ElementCollection {
                        table: None,
                        join_column: None,
                    })),
            ],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let join = registry.get("article_tags").unwrap();
        assert_eq!(join.pk_columns, vec!["article_id", "tag_id"]);
        assert!(join.entity.is_none());
        assert_eq!(join.references["tag_id"], "tag");
        let collection = registry.get("article_keywords").unwrap();
        assert!(collection.pk_columns.is_empty());
    }

    #[test]
    fn test_unknown_target_is_resolution_error() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Invoice")
                .field(id())
                .field(FieldModel::new("customer").tag(many_to_one("Customer")))],
            embeddables: vec![],
        };
        let err = TableConfigRegistry::scan(&model).unwrap_err();
        assert!(matches!(err, SynthError::Resolution { .. }));
    }

    #[test]
    fn test_temporal_without_pk_fails() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Log")
                .tag(EntityTag::Temporal)
                .field(FieldModel::new("message"))],
            embeddables: vec![],
        };
        let err = TableConfigRegistry::scan(&model).unwrap_err();
        assert!(matches!(err, SynthError::Config { .. }));
    }

    #[test]
    fn test_deferred_unique_both_forms_is_unsupported() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Slot").field(id()).tag(EntityTag::Deferred {
                name: "uk_slot_position".to_string(),
                declaration: Some("unique (position)".to_string()),
                unique_columns: vec!["position".to_string()],
                initially_deferred: true,
            })],
            embeddables: vec![],
        };
        let err = TableConfigRegistry::scan(&model).unwrap_err();
        assert!(matches!(err, SynthError::Unsupported { .. }));
    }

    #[test]
    fn test_deferred_declarations() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Stock")
                .field(id())
                .tag(EntityTag::Deferred {
                    name: "ck_stock_qty".to_string(),
                    declaration: Some("check (qty >= 0)".to_string()),
                    unique_columns: vec![],
                    initially_deferred: true,
                })
                .tag(EntityTag::Deferred {
                    name: "uk_stock_pos".to_string(),
                    declaration: None,
                    unique_columns: vec!["binNo".to_string(), "slot".to_string()],
                    initially_deferred: false,
                })],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let stock = registry.get("stock").unwrap();
        assert_eq!(stock.deferred["ck_stock_qty"].declaration(), "check (qty >= 0)");
        assert_eq!(
            stock.deferred["uk_stock_pos"].kind,
            DeferredKind::Unique {
                columns: vec!["bin_no".to_string(), "slot".to_string()]
            }
        );
    }

    #[test]
    fn test_i18n_link() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Product")
                .field(id())
                .field(FieldModel::new("code"))
                .field(FieldModel::new("name").tag(FieldTag::Translatable))
                .field(FieldModel::new("translation").column("i18n_parent").tag(
                    FieldTag::I18nKey {
                        language_column: "i18nLang".to_string(),
                    },
                ))],
            embeddables: vec![],
        };
        let registry = TableConfigRegistry::scan(&model).unwrap();
        let link = registry.get("product").unwrap().i18n.clone().unwrap();
        assert_eq!(link.fk_column, "i18n_parent");
        assert_eq!(link.language_column, "i18n_lang");
        assert_eq!(link.base_table, "product");
        assert_eq!(link.translatable, vec!["name"]);
    }

    #[test]
    fn test_translatable_without_key_fails() {
        let model = SchemaModel {
            entities: vec![EntityModel::new("Product")
                .field(id())
                .field(FieldModel::new("name").tag(FieldTag::Translatable))],
            embeddables: vec![],
        };
        assert!(TableConfigRegistry::scan(&model).is_err());
    }

    #[test]
    fn test_partition_boundary_parsing() {
        let spec = partition_spec(
            "booking",
            &PartitionDeclaration {
                column: "bookedAt".to_string(),
                interval: PartitionInterval::Month,
                first_boundary: "2024-01-01".to_string(),
                local_primary_key: true,
                default_expression: None,
            },
        )
        .unwrap();
        assert_eq!(spec.column, "booked_at");
        assert_eq!(spec.default_expression, "current_timestamp");
        assert_eq!(spec.first_boundary.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 00:00:00");

        let bad = PartitionDeclaration {
            column: "booked_at".to_string(),
            interval: PartitionInterval::Day,
            first_boundary: "January".to_string(),
            local_primary_key: false,
            default_expression: None,
        };
        assert!(partition_spec("booking", &bad).is_err());
    }
}
