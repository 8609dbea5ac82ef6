//! Translation detail tables
//!
//! A table with translatable columns is forked into a base table and a
//! detail table keyed by (parent key, language). A view joins them back into
//! the original column set, and instead-of triggers route writes against the
//! view to the right table, creating the detail row on the first write for a
//! language.

use super::contract::{Operation, RowImage};
use super::{indent, Context};
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::naming::ObjectKind;
use crate::statement::{ColumnDefinition, KeyConstraint, TableDefinition};
use crate::table_config::{I18nLink, TableConfig};

/// Physical names of the detail table, its view and triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I18nNames {
    pub detail: String,
    pub view: String,
    /// One combined trigger, or one per operation on the embedded dialect
    pub triggers: Vec<(Operation, String)>,
    pub function: Option<String>,
}

impl I18nNames {
    pub fn derive(ctx: &Context, config: &TableConfig) -> SynthResult<Self> {
        let naming = &ctx.naming;
        let owner = config.owner_name();
        let suffix = &ctx.config.i18n_suffix;
        let detail = naming.suffixed(&config.table_name, suffix)?;
        let view = naming.suffixed(&config.table_name, &format!("{}_v", suffix))?;
        let triggers = match ctx.dialect() {
            Dialect::Hsql => Operation::ALL
                .into_iter()
                .map(|op| {
                    let purpose = format!("i18n_{}", op.code().to_ascii_lowercase());
                    naming.trigger_name(owner, &purpose).map(|name| (op, name))
                })
                .collect::<SynthResult<Vec<_>>>()?,
            Dialect::Oracle | Dialect::Postgres => {
                vec![(Operation::Insert, naming.trigger_name(owner, "i18n")?)]
            }
        };
        let function = if ctx.dialect().uses_trigger_functions() {
            Some(naming.function_name(owner, "i18n")?)
        } else {
            None
        };
        Ok(Self {
            detail,
            view,
            triggers,
            function,
        })
    }
}

fn link_of(config: &TableConfig) -> SynthResult<&I18nLink> {
    config
        .i18n
        .as_ref()
        .ok_or_else(|| SynthError::config(&config.table_name, "table has no i18n linkage"))
}

fn base_key(config: &TableConfig) -> SynthResult<&str> {
    match config.pk_columns.as_slice() {
        [key] => Ok(key),
        _ => Err(SynthError::config(
            &config.table_name,
            "i18n requires a single-column primary key",
        )),
    }
}

/// Split `base` in place; returns the detail table (constraint names unassigned)
pub fn fork(ctx: &Context, config: &TableConfig, base: &mut TableDefinition) -> SynthResult<TableDefinition> {
    let link = link_of(config)?;
    let key = base_key(config)?;
    let names = I18nNames::derive(ctx, config)?;

    let key_type = base
        .column(key)
        .map(|c| c.data_type.clone())
        .ok_or_else(|| {
            SynthError::config(&config.table_name, format!("key column '{}' missing", key))
        })?;

    for pseudo in link.pseudo_columns() {
        base.remove_column(pseudo);
    }

    let mut detail = TableDefinition::new(names.detail);
    detail.add_column(ColumnDefinition::new(link.fk_column.clone(), key_type).not_null());
    detail.add_column(
        ColumnDefinition::new(
            link.language_column.clone(),
            ctx.dialect().varchar_type(ctx.config.language_column_length),
        )
        .not_null(),
    );
    for column in &link.translatable {
        let moved = base.remove_column(column).ok_or_else(|| {
            SynthError::config(
                &config.table_name,
                format!("translatable column '{}' is not part of the table", column),
            )
        })?;
        detail.add_column(ColumnDefinition {
            unique: false,
            unique_name: None,
            ..moved
        });
    }
    detail.primary_key = Some(KeyConstraint::new(vec![
        link.fk_column.clone(),
        link.language_column.clone(),
    ]));
    Ok(detail)
}

/// Foreign key from the detail table to its base row
pub fn detail_foreign_key(
    ctx: &mut Context,
    config: &TableConfig,
    detail: &TableDefinition,
) -> SynthResult<String> {
    let link = link_of(config)?;
    let key = base_key(config)?.to_string();
    let name = ctx.constraint(
        ObjectKind::ForeignKey,
        &detail.name,
        &detail.name,
        &[link.fk_column.clone()],
        None,
    )?;
    Ok(format!(
        "alter table {} add constraint {} foreign key ({}) references {} ({}) on delete cascade",
        detail.name, name, link.fk_column, config.table_name, key
    ))
}

/// Queue the reconstructing view and its instead-of triggers on the tail
pub fn view_and_triggers(
    ctx: &mut Context,
    config: &TableConfig,
    base: &TableDefinition,
    detail: &TableDefinition,
) -> SynthResult<()> {
    let link = link_of(config)?.clone();
    let key = base_key(config)?.to_string();
    let names = I18nNames::derive(ctx, config)?;
    ctx.register(ObjectKind::View, &names.view, &config.table_name)?;
    for (_, trigger) in &names.triggers {
        ctx.register(ObjectKind::Trigger, trigger, &names.view)?;
    }
    if let Some(function) = &names.function {
        ctx.register(ObjectKind::Function, function, &names.view)?;
    }

    let dialect = ctx.dialect();
    let mut select: Vec<String> = base.columns.iter().map(|c| format!("b.{}", c.name)).collect();
    select.push(format!("d.{}", link.language_column));
    select.extend(link.translatable.iter().map(|c| format!("d.{}", c)));
    let create = if dialect == Dialect::Hsql {
        "create view"
    } else {
        "create or replace view"
    };
    ctx.tail.push_simple(format!(
        "{} {} as\nselect {}\nfrom {} b\nleft join {} d on d.{} = b.{}",
        create,
        names.view,
        select.join(", "),
        base.name,
        detail.name,
        link.fk_column,
        key
    ));

    let dml = ViewDml {
        dialect,
        base,
        detail: &detail.name,
        link: &link,
        key: &key,
    };

    match dialect {
        Dialect::Oracle => {
            let mut body = vec!["if inserting then".to_string()];
            body.push(indent(&dml.insert(), 1));
            body.push("elsif updating then".to_string());
            body.push(indent(&dml.update(), 1));
            body.push("else".to_string());
            body.push(indent(&dml.delete(), 1));
            body.push("end if;".to_string());
            ctx.tail.push_block(format!(
                "create or replace trigger {}\ninstead of insert or update or delete on {}\nfor each row\nbegin\n{}\nend;",
                names.triggers[0].1,
                names.view,
                indent(&body, 1)
            ));
        }
        Dialect::Postgres => {
            let function = names.function.clone().unwrap_or_default();
            let mut body = vec!["if tg_op = 'INSERT' then".to_string()];
            body.push(indent(&dml.insert(), 1));
            body.push(indent(&["return new;".to_string()], 1));
            body.push("elsif tg_op = 'UPDATE' then".to_string());
            body.push(indent(&dml.update(), 1));
            body.push(indent(&["return new;".to_string()], 1));
            body.push("end if;".to_string());
            body.extend(dml.delete());
            body.push("return old;".to_string());
            ctx.tail.push_block(format!(
                "create or replace function {}() returns trigger as $$\nbegin\n{}\nend;\n$$ language plpgsql",
                function,
                indent(&body, 1)
            ));
            ctx.tail.push_simple(format!(
                "create trigger {} instead of insert or update or delete on {} for each row execute procedure {}()",
                names.triggers[0].1, names.view, function
            ));
        }
        Dialect::Hsql => {
            for (op, trigger) in &names.triggers {
                let (referencing, body) = match op {
                    Operation::Insert => ("referencing new row as newrow", dml.insert()),
                    Operation::Update => (
                        "referencing old row as oldrow new row as newrow",
                        dml.update(),
                    ),
                    Operation::Delete => ("referencing old row as oldrow", dml.delete()),
                };
                ctx.tail.push_block(format!(
                    "create trigger {} instead of {} on {}\n{}\nfor each row\nbegin atomic\n{}\nend",
                    trigger,
                    op.keyword(),
                    names.view,
                    referencing,
                    indent(&body, 1)
                ));
            }
        }
    }
    log::debug!("i18n view '{}' over '{}'", names.view, config.table_name);
    Ok(())
}

/// DML statements of the instead-of triggers
struct ViewDml<'a> {
    dialect: Dialect,
    base: &'a TableDefinition,
    detail: &'a str,
    link: &'a I18nLink,
    key: &'a str,
}

impl<'a> ViewDml<'a> {
    fn new_ref(&self, column: &str) -> String {
        RowImage::New.reference(self.dialect, column)
    }

    fn old_ref(&self, column: &str) -> String {
        RowImage::Old.reference(self.dialect, column)
    }

    fn base_columns(&self) -> Vec<String> {
        self.base.column_names()
    }

    /// Create the base row unless it exists
    fn ensure_base(&self) -> String {
        let columns = self.base_columns();
        let values: Vec<String> = columns.iter().map(|c| self.new_ref(c)).collect();
        match self.dialect {
            Dialect::Oracle => format!(
                "merge into {b} t using (select {v} as {k} from dual) s on (t.{k} = s.{k}) \
                 when not matched then insert ({c}) values ({vals});",
                b = self.base.name,
                v = self.new_ref(self.key),
                k = self.key,
                c = columns.join(", "),
                vals = values.join(", ")
            ),
            Dialect::Postgres => format!(
                "insert into {b} ({c}) select {vals} where not exists (select 1 from {b} where {k} = {v});",
                b = self.base.name,
                c = columns.join(", "),
                vals = values.join(", "),
                k = self.key,
                v = self.new_ref(self.key)
            ),
            Dialect::Hsql => format!(
                "merge into {b} t using (values ({v})) as s({k}) on t.{k} = s.{k} \
                 when not matched then insert ({c}) values ({vals});",
                b = self.base.name,
                v = self.new_ref(self.key),
                k = self.key,
                c = columns.join(", "),
                vals = values.join(", ")
            ),
        }
    }

    /// Update the detail row of (key, language), inserting it when missing
    fn upsert_detail(&self) -> Vec<String> {
        let fk = &self.link.fk_column;
        let lang = &self.link.language_column;
        let translatable = &self.link.translatable;
        let mut insert_columns = vec![fk.clone(), lang.clone()];
        insert_columns.extend(translatable.iter().cloned());
        let mut insert_values = vec![self.new_ref(self.key), self.new_ref(lang)];
        insert_values.extend(translatable.iter().map(|c| self.new_ref(c)));
        let assignments: Vec<String> = translatable
            .iter()
            .map(|c| format!("{} = {}", c, self.new_ref(c)))
            .collect();
        let insert = format!(
            "insert into {} ({}) values ({});",
            self.detail,
            insert_columns.join(", "),
            insert_values.join(", ")
        );

        match self.dialect {
            Dialect::Hsql => vec![format!(
                "merge into {d} t using (values ({kv}, {lv})) as s({fk}, {lang}) on t.{fk} = s.{fk} and t.{lang} = s.{lang} \
                 when matched then update set {set} \
                 when not matched then insert ({cols}) values ({vals});",
                d = self.detail,
                kv = self.new_ref(self.key),
                lv = self.new_ref(lang),
                fk = fk,
                lang = lang,
                set = assignments.join(", "),
                cols = insert_columns.join(", "),
                vals = insert_values.join(", ")
            )],
            Dialect::Oracle | Dialect::Postgres => {
                let missing = if self.dialect == Dialect::Oracle {
                    "sql%rowcount = 0"
                } else {
                    "not found"
                };
                vec![
                    format!(
                        "update {} set {} where {} = {} and {} = {};",
                        self.detail,
                        assignments.join(", "),
                        fk,
                        self.new_ref(self.key),
                        lang,
                        self.new_ref(lang)
                    ),
                    format!("if {} then", missing),
                    indent(&[insert], 1),
                    "end if;".to_string(),
                ]
            }
        }
    }

    fn insert(&self) -> Vec<String> {
        let mut lines = vec![self.ensure_base()];
        lines.extend(self.upsert_detail());
        lines
    }

    fn update(&self) -> Vec<String> {
        let assignments: Vec<String> = self
            .base_columns()
            .iter()
            .filter(|c| c.as_str() != self.key)
            .map(|c| format!("{} = {}", c, self.new_ref(c)))
            .collect();
        let mut lines = Vec::new();
        if !assignments.is_empty() {
            lines.push(format!(
                "update {} set {} where {} = {};",
                self.base.name,
                assignments.join(", "),
                self.key,
                self.old_ref(self.key)
            ));
        }
        lines.extend(self.upsert_detail());
        lines
    }

    /// Removes the translation of one language; the base row is left alone
    fn delete(&self) -> Vec<String> {
        vec![format!(
            "delete from {} where {} = {} and {} = {};",
            self.detail,
            self.link.fk_column,
            self.old_ref(self.key),
            self.link.language_column,
            self.old_ref(&self.link.language_column)
        )]
    }
}
