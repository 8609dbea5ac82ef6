//! Audit columns, the stamping trigger and cascade-nullable triggers

use super::contract::RowImage;
use super::{indent, Context};
use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use crate::naming::ObjectKind;
use crate::script::Script;
use crate::statement::{ColumnDefinition, TableDefinition};
use crate::table_config::TableConfig;

const USER_COLUMN_LENGTH: usize = 64;

/// Add the four audit columns that are not present yet; returns how many were added
pub fn add_columns(ctx: &Context, table: &mut TableDefinition) -> usize {
    let dialect = ctx.dialect();
    let audit = &ctx.config.audit;
    let columns = [
        ColumnDefinition::new(audit.created_at.clone(), dialect.timestamp_type()),
        ColumnDefinition::new(audit.created_by.clone(), dialect.varchar_type(USER_COLUMN_LENGTH)),
        ColumnDefinition::new(audit.modified_at.clone(), dialect.timestamp_type()),
        ColumnDefinition::new(audit.modified_by.clone(), dialect.varchar_type(USER_COLUMN_LENGTH)),
    ];
    columns
        .into_iter()
        .filter(|c| table.add_column(c.clone()))
        .count()
}

/// Trigger (and function) names of the stamping trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditNames {
    pub triggers: Vec<String>,
    pub function: Option<String>,
}

impl AuditNames {
    pub fn derive(ctx: &Context, config: &TableConfig) -> SynthResult<Self> {
        let owner = config.owner_name();
        let triggers = match ctx.dialect() {
            Dialect::Hsql => vec![
                ctx.naming.trigger_name(owner, "aud_i")?,
                ctx.naming.trigger_name(owner, "aud_u")?,
            ],
            Dialect::Oracle | Dialect::Postgres => vec![ctx.naming.trigger_name(owner, "aud")?],
        };
        let function = if ctx.dialect().uses_trigger_functions() {
            Some(ctx.naming.function_name(owner, "aud")?)
        } else {
            None
        };
        Ok(Self { triggers, function })
    }
}

/// Value for `column` on update: the session user unless the statement set a new value
fn stamped_on_update(dialect: Dialect, column: &str) -> String {
    let new = RowImage::New.reference(dialect, column);
    let old = RowImage::Old.reference(dialect, column);
    format!(
        "case when {n} is null or not ({changed}) then {u} else {n} end",
        n = new,
        changed = dialect.distinct(&new, &old),
        u = dialect.session_user()
    )
}

/// BEFORE INSERT/UPDATE trigger stamping the audit columns
pub fn trigger(ctx: &mut Context, config: &TableConfig, table: &TableDefinition) -> SynthResult<Script> {
    let names = AuditNames::derive(ctx, config)?;
    for trigger in &names.triggers {
        ctx.register(ObjectKind::Trigger, trigger, &table.name)?;
    }
    if let Some(function) = &names.function {
        ctx.register(ObjectKind::Function, function, &table.name)?;
    }

    let dialect = ctx.dialect();
    let audit = ctx.config.audit.clone();
    let now = dialect.current_timestamp();
    let user = dialect.session_user();
    let mut script = ctx.script();

    match dialect {
        Dialect::Oracle => {
            let body = vec![
                "if inserting then".to_string(),
                indent(
                    &[
                        format!(":new.{} := {};", audit.created_at, now),
                        format!(":new.{c} := coalesce(:new.{c}, {u});", c = audit.created_by, u = user),
                        format!(":new.{c} := coalesce(:new.{c}, {u});", c = audit.modified_by, u = user),
                    ],
                    1,
                ),
                "else".to_string(),
                indent(
                    &[
                        format!(":new.{c} := :old.{c};", c = audit.created_at),
                        format!(":new.{c} := :old.{c};", c = audit.created_by),
                        format!(":new.{} := {};", audit.modified_by, stamped_on_update(dialect, &audit.modified_by)),
                    ],
                    1,
                ),
                "end if;".to_string(),
                format!(":new.{} := {};", audit.modified_at, now),
            ];
            script.push_block(format!(
                "create or replace trigger {}\nbefore insert or update on {}\nfor each row\nbegin\n{}\nend;",
                names.triggers[0],
                table.name,
                indent(&body, 1)
            ));
        }
        Dialect::Postgres => {
            let function = names.function.clone().unwrap_or_default();
            let body = vec![
                "if tg_op = 'INSERT' then".to_string(),
                indent(
                    &[
                        format!("new.{} := {};", audit.created_at, now),
                        format!("new.{c} := coalesce(new.{c}, {u});", c = audit.created_by, u = user),
                        format!("new.{c} := coalesce(new.{c}, {u});", c = audit.modified_by, u = user),
                    ],
                    1,
                ),
                "else".to_string(),
                indent(
                    &[
                        format!("new.{c} := old.{c};", c = audit.created_at),
                        format!("new.{c} := old.{c};", c = audit.created_by),
                        format!("new.{} := {};", audit.modified_by, stamped_on_update(dialect, &audit.modified_by)),
                    ],
                    1,
                ),
                "end if;".to_string(),
                format!("new.{} := {};", audit.modified_at, now),
                "return new;".to_string(),
            ];
            script.push_block(format!(
                "create or replace function {}() returns trigger as $$\nbegin\n{}\nend;\n$$ language plpgsql",
                function,
                indent(&body, 1)
            ));
            script.push_simple(format!(
                "create trigger {} before insert or update on {} for each row execute procedure {}()",
                names.triggers[0], table.name, function
            ));
        }
        Dialect::Hsql => {
            let insert = vec![
                format!("set newrow.{} = {};", audit.created_at, now),
                format!("set newrow.{c} = coalesce(newrow.{c}, {u});", c = audit.created_by, u = user),
                format!("set newrow.{} = {};", audit.modified_at, now),
                format!("set newrow.{c} = coalesce(newrow.{c}, {u});", c = audit.modified_by, u = user),
            ];
            script.push_block(format!(
                "create trigger {} before insert on {}\nreferencing new row as newrow\nfor each row\nbegin atomic\n{}\nend",
                names.triggers[0],
                table.name,
                indent(&insert, 1)
            ));
            let update = vec![
                format!("set newrow.{c} = oldrow.{c};", c = audit.created_at),
                format!("set newrow.{c} = oldrow.{c};", c = audit.created_by),
                format!("set newrow.{} = {};", audit.modified_at, now),
                format!("set newrow.{} = {};", audit.modified_by, stamped_on_update(dialect, &audit.modified_by)),
            ];
            script.push_block(format!(
                "create trigger {} before update on {}\nreferencing old row as oldrow new row as newrow\nfor each row\nbegin atomic\n{}\nend",
                names.triggers[1],
                table.name,
                indent(&update, 1)
            ));
        }
    }
    Ok(script)
}

/// Names of the trigger nulling `child.column` when its parent row goes away
pub fn cascade_nullable_names(
    ctx: &Context,
    child_owner: &str,
    column: &str,
) -> SynthResult<(String, Option<String>)> {
    let purpose = format!("{}_nul", column);
    let trigger = ctx.naming.trigger_name(child_owner, &purpose)?;
    let function = if ctx.dialect().uses_trigger_functions() {
        Some(ctx.naming.function_name(child_owner, &purpose)?)
    } else {
        None
    };
    Ok((trigger, function))
}

/// Queue the BEFORE DELETE trigger on `parent` that nulls `child.column`
///
/// The embedded dialect gets `on delete set null` on the foreign key instead.
pub fn cascade_nullable(
    ctx: &mut Context,
    parent: &TableConfig,
    child: &TableConfig,
    column: &str,
) -> SynthResult<()> {
    if !ctx.dialect().uses_plsql_blocks() && !ctx.dialect().uses_trigger_functions() {
        return Ok(());
    }
    let parent_key = match parent.pk_columns.as_slice() {
        [key] => key.clone(),
        _ => {
            return Err(SynthError::config(
                &parent.table_name,
                format!(
                    "cascade-nullable column '{}.{}' needs a single-column parent key",
                    child.table_name, column
                ),
            ))
        }
    };
    let (trigger, function) = cascade_nullable_names(ctx, child.owner_name(), column)?;
    ctx.register(ObjectKind::Trigger, &trigger, &child.table_name)?;

    match (ctx.dialect(), function) {
        (Dialect::Postgres, Some(function)) => {
            ctx.register(ObjectKind::Function, &function, &child.table_name)?;
            let body = vec![
                format!(
                    "update {} set {c} = null where {c} = old.{};",
                    child.table_name,
                    parent_key,
                    c = column
                ),
                "return old;".to_string(),
            ];
            ctx.tail.push_block(format!(
                "create or replace function {}() returns trigger as $$\nbegin\n{}\nend;\n$$ language plpgsql",
                function,
                indent(&body, 1)
            ));
            ctx.tail.push_simple(format!(
                "create trigger {} before delete on {} for each row execute procedure {}()",
                trigger, parent.table_name, function
            ));
        }
        _ => {
            let body = vec![format!(
                "update {} set {c} = null where {c} = :old.{};",
                child.table_name,
                parent_key,
                c = column
            )];
            ctx.tail.push_block(format!(
                "create or replace trigger {}\nbefore delete on {}\nfor each row\nbegin\n{}\nend;",
                trigger,
                parent.table_name,
                indent(&body, 1)
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthesisConfig;

    fn table() -> TableDefinition {
        TableDefinition::parse("create table invoice (id bigint not null, created_by varchar(20), primary key (id))")
            .unwrap()
    }

    #[test]
    fn test_add_columns_is_idempotent() {
        let ctx = Context::new(SynthesisConfig::default());
        let mut t = table();
        assert_eq!(add_columns(&ctx, &mut t), 3);
        assert_eq!(add_columns(&ctx, &mut t), 0);
        assert_eq!(
            t.column_names(),
            vec!["id", "created_by", "created_at", "modified_at", "modified_by"]
        );
        assert_eq!(t.column("created_by").unwrap().data_type, "varchar(20)");
    }

    #[test]
    fn test_trigger_per_dialect() {
        let mut config = TableConfig::new("invoice");
        config.auditable = true;

        let mut ctx = Context::new(SynthesisConfig::for_dialect(Dialect::Postgres));
        let script = trigger(&mut ctx, &config, &table()).unwrap();
        assert_eq!(script.len(), 2);
        assert!(script.statements()[0].sql.contains("new.created_at := transaction_timestamp();"));
        assert!(script.statements()[0].sql.contains(
            "new.modified_by := case when new.modified_by is null or not (new.modified_by is distinct from old.modified_by) \
             then current_user else new.modified_by end;"
        ));

        let mut ctx = Context::new(SynthesisConfig::for_dialect(Dialect::Hsql));
        let script = trigger(&mut ctx, &config, &table()).unwrap();
        assert_eq!(script.len(), 2);
        assert!(ctx.names.contains("tr_invoice_aud_u"));

        let mut ctx = Context::new(SynthesisConfig::for_dialect(Dialect::Oracle));
        let script = trigger(&mut ctx, &config, &table()).unwrap();
        assert_eq!(script.len(), 1);
        let body = &script.statements()[0].sql;
        let (insert, update) = body.split_once("else").unwrap();
        assert!(insert.contains(":new.modified_by := coalesce(:new.modified_by, user);"));
        assert!(update.contains(":new.modified_by := case when :new.modified_by is null or not ("));
        assert!(update.contains(") then user else :new.modified_by end;"));
    }

    #[test]
    fn test_cascade_nullable_goes_to_tail() {
        let mut parent = TableConfig::new("customer");
        parent.pk_columns = vec!["id".to_string()];
        let child = TableConfig::new("invoice");

        let mut ctx = Context::new(SynthesisConfig::for_dialect(Dialect::Oracle));
        cascade_nullable(&mut ctx, &parent, &child, "agent_id").unwrap();
        assert_eq!(ctx.tail.len(), 1);
        assert!(ctx.tail.statements()[0]
            .sql
            .contains("update invoice set agent_id = null where agent_id = :old.id;"));

        let mut ctx = Context::new(SynthesisConfig::for_dialect(Dialect::Hsql));
        cascade_nullable(&mut ctx, &parent, &child, "agent_id").unwrap();
        assert!(ctx.tail.is_empty());
    }
}
