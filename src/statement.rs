//! Structural matchers for raw DDL statements
//!
//! The base emitter produces a narrow set of statement shapes. Each shape has
//! one matcher here; anything outside those shapes is rejected with a
//! [`SynthError::Parse`] instead of being guessed at.
//!
//! CREATE TABLE text is parsed into a [`TableDefinition`] so the synthesis
//! steps can edit columns and constraints structurally and render the result
//! back to text. A rendered definition parses back to the same structure.

use crate::error::{SynthError, SynthResult};
use crate::naming::NamingStrategy;
use once_cell::sync::Lazy;
use regex::Regex;

const IDENT: &str = r#"[\w$#."]+"#;

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^create\s+table\s+(?P<name>{})\s*\(", IDENT)).unwrap()
});

static ALTER_FOREIGN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^alter\s+table\s+(?P<table>{i})\s+add\s+constraint\s+(?P<name>{i})\s+foreign\s+key\s*\((?P<cols>[^)]*)\)\s*references\s+(?P<target>{i})\s*(?:\((?P<tcols>[^)]*)\))?(?P<rest>.*)$",
        i = IDENT
    ))
    .unwrap()
});

static ALTER_UNIQUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^alter\s+table\s+(?P<table>{i})\s+add\s+constraint\s+(?P<name>{i})\s+unique\s*\((?P<cols>[^)]*)\)\s*$",
        i = IDENT
    ))
    .unwrap()
});

static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^create\s+(?P<unique>unique\s+)?index\s+(?P<name>{i})\s+on\s+(?P<table>{i})\s*\((?P<cols>.*)\)\s*$",
        i = IDENT
    ))
    .unwrap()
});

static CREATE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^create\s+sequence\s+(?P<name>{})(?P<rest>.*)$",
        IDENT
    ))
    .unwrap()
});

static DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^drop\s+table\s+(?:if\s+exists\s+)?(?P<name>{})(?:\s+cascade(?:\s+constraints)?)?(?:\s+if\s+exists)?\s*$",
        IDENT
    ))
    .unwrap()
});

static LEADING_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(create\s+table|alter\s+table|create\s+(?:unique\s+)?index|create\s+sequence|drop\s+table)\b")
        .unwrap()
});

/// Kind of a raw statement, judged from its leading keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreateTable,
    AlterTable,
    CreateIndex,
    CreateSequence,
    DropTable,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatementKind::CreateTable => "create table",
            StatementKind::AlterTable => "alter table",
            StatementKind::CreateIndex => "create index",
            StatementKind::CreateSequence => "create sequence",
            StatementKind::DropTable => "drop table",
        };
        write!(f, "{}", label)
    }
}

/// Unaugmented statement text from the base emitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    pub kind: StatementKind,
    pub sql: String,
}

impl RawStatement {
    /// Classify one statement; unknown leading keywords are a parse error
    pub fn new(sql: impl Into<String>) -> SynthResult<Self> {
        let sql = strip_terminator(&sql.into()).to_string();
        let caps = LEADING_KEYWORDS
            .captures(&sql)
            .ok_or_else(|| SynthError::parse("ddl", sql.clone()))?;
        let lead = caps[1].to_lowercase();
        let kind = if lead.starts_with("create") && lead.contains("table") {
            StatementKind::CreateTable
        } else if lead.starts_with("alter") {
            StatementKind::AlterTable
        } else if lead.contains("index") {
            StatementKind::CreateIndex
        } else if lead.contains("sequence") {
            StatementKind::CreateSequence
        } else {
            StatementKind::DropTable
        };
        Ok(Self { kind, sql })
    }

    /// Match the statement against the grammar of its kind
    pub fn parse(&self) -> SynthResult<ParsedStatement> {
        match self.kind {
            StatementKind::CreateTable => {
                TableDefinition::parse(&self.sql).map(ParsedStatement::CreateTable)
            }
            StatementKind::AlterTable => {
                if let Some(fk) = ForeignKeyDefinition::parse(&self.sql) {
                    Ok(ParsedStatement::ForeignKey(fk))
                } else if let Some(uk) = UniqueDefinition::parse(&self.sql) {
                    Ok(ParsedStatement::AddUnique(uk))
                } else {
                    Err(SynthError::parse(self.kind.to_string(), self.sql.clone()))
                }
            }
            StatementKind::CreateIndex => IndexDefinition::parse(&self.sql)
                .map(ParsedStatement::CreateIndex)
                .ok_or_else(|| SynthError::parse(self.kind.to_string(), self.sql.clone())),
            StatementKind::CreateSequence => SequenceDefinition::parse(&self.sql)
                .map(ParsedStatement::CreateSequence)
                .ok_or_else(|| SynthError::parse(self.kind.to_string(), self.sql.clone())),
            StatementKind::DropTable => DROP_TABLE
                .captures(&self.sql)
                .map(|caps| ParsedStatement::DropTable {
                    table: NamingStrategy::canonical(&caps["name"]),
                })
                .ok_or_else(|| SynthError::parse(self.kind.to_string(), self.sql.clone())),
        }
    }
}

/// A raw statement matched against its grammar
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    CreateTable(TableDefinition),
    ForeignKey(ForeignKeyDefinition),
    AddUnique(UniqueDefinition),
    CreateIndex(IndexDefinition),
    CreateSequence(SequenceDefinition),
    DropTable { table: String },
}

impl ParsedStatement {
    /// Table the statement belongs to
    pub fn table(&self) -> Option<&str> {
        match self {
            ParsedStatement::CreateTable(t) => Some(&t.name),
            ParsedStatement::ForeignKey(fk) => Some(&fk.table),
            ParsedStatement::AddUnique(uk) => Some(&uk.table),
            ParsedStatement::CreateIndex(ix) => Some(&ix.table),
            ParsedStatement::CreateSequence(_) => None,
            ParsedStatement::DropTable { table } => Some(table),
        }
    }
}

/// One column of a CREATE TABLE column block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub default: Option<String>,
    pub not_null: bool,
    pub not_null_name: Option<String>,
    pub unique: bool,
    pub unique_name: Option<String>,
    pub check: Option<String>,
    pub check_name: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    pub fn with_check(mut self, predicate: impl Into<String>) -> Self {
        self.check = Some(predicate.into());
        self
    }

    fn parse(text: &str) -> SynthResult<Self> {
        let tokens = tokenize(text);
        let fail = || SynthError::parse("column definition", text.trim());
        let mut iter = tokens.iter().peekable();
        let name = iter.next().ok_or_else(fail)?;
        let mut column = ColumnDefinition::new(NamingStrategy::canonical(name), String::new());

        let mut type_tokens: Vec<&str> = Vec::new();
        while let Some(token) = iter.peek() {
            if is_column_keyword(token) {
                break;
            }
            type_tokens.push(token.as_str());
            iter.next();
        }
        if type_tokens.is_empty() || type_tokens.iter().any(|t| is_foreign_clause(t)) {
            return Err(fail());
        }
        column.data_type = glue(&type_tokens);

        let mut pending_name: Option<String> = None;
        while let Some(token) = iter.next() {
            match token.to_lowercase().as_str() {
                "default" => {
                    // `default null` is an expression, not the nullability keyword
                    let mut expression: Vec<&str> = match iter.next() {
                        Some(first) if first.eq_ignore_ascii_case("null") || !is_column_keyword(first) => {
                            vec![first.as_str()]
                        }
                        _ => return Err(fail()),
                    };
                    while let Some(next) = iter.peek() {
                        if is_column_keyword(next) {
                            break;
                        }
                        expression.push(next.as_str());
                        iter.next();
                    }
                    if expression.is_empty() {
                        return Err(fail());
                    }
                    column.default = Some(glue(&expression));
                }
                "constraint" => {
                    let name = iter.next().ok_or_else(fail)?;
                    pending_name = Some(NamingStrategy::canonical(name));
                }
                "not" => {
                    match iter.next() {
                        Some(n) if n.eq_ignore_ascii_case("null") => {}
                        _ => return Err(fail()),
                    }
                    column.not_null = true;
                    column.not_null_name = pending_name.take();
                }
                "null" => {}
                "unique" => {
                    column.unique = true;
                    column.unique_name = pending_name.take();
                }
                "check" => {
                    let group = iter.next().ok_or_else(fail)?;
                    column.check = Some(unwrap_group(group).ok_or_else(fail)?.to_string());
                    column.check_name = pending_name.take();
                }
                _ => return Err(fail()),
            }
        }
        if pending_name.is_some() {
            return Err(fail());
        }
        Ok(column)
    }

    /// Render the column clause
    pub fn render(&self) -> String {
        let mut out = format!("{} {}", self.name, self.data_type);
        if let Some(default) = &self.default {
            out.push_str(&format!(" default {}", default));
        }
        if self.not_null {
            push_named(&mut out, self.not_null_name.as_deref(), "not null");
        }
        if self.unique {
            push_named(&mut out, self.unique_name.as_deref(), "unique");
        }
        if let Some(check) = &self.check {
            push_named(&mut out, self.check_name.as_deref(), &format!("check ({})", check));
        }
        out
    }
}

/// PRIMARY KEY or UNIQUE clause over a column list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
    /// `Some(initially_deferred)` when declared deferrable
    pub deferrable: Option<bool>,
}

impl KeyConstraint {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            name: None,
            columns,
            deferrable: None,
        }
    }
}

/// Table-level CHECK clause
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckConstraint {
    pub name: Option<String>,
    pub predicate: String,
    pub deferrable: Option<bool>,
}

/// Structural form of a CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Option<KeyConstraint>,
    pub uniques: Vec<KeyConstraint>,
    pub checks: Vec<CheckConstraint>,
    /// Verbatim `partition by ...` suffix
    pub partition: Option<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse CREATE TABLE text
    pub fn parse(sql: &str) -> SynthResult<Self> {
        let sql = strip_terminator(sql);
        let fail = || SynthError::parse("create table", sql);
        let caps = CREATE_TABLE.captures(sql).ok_or_else(fail)?;
        let open = caps.get(0).ok_or_else(fail)?.end() - 1;
        let close = matching_paren(sql, open).ok_or_else(fail)?;

        let mut table = TableDefinition::new(NamingStrategy::canonical(&caps["name"]));
        let suffix = sql[close + 1..].trim();
        if !suffix.is_empty() {
            if !suffix.to_lowercase().starts_with("partition") {
                return Err(fail());
            }
            table.partition = Some(suffix.to_string());
        }

        for item in split_top_level(&sql[open + 1..close]) {
            table.parse_item(item)?;
        }
        if table.columns.is_empty() {
            return Err(fail());
        }
        Ok(table)
    }

    fn parse_item(&mut self, item: &str) -> SynthResult<()> {
        let tokens = tokenize(item);
        let fail = || SynthError::parse("table constraint", item.trim());
        let Some(first) = tokens.first() else {
            return Err(fail());
        };
        let lead = first.to_lowercase();
        if !matches!(lead.as_str(), "constraint" | "primary" | "unique" | "check") {
            self.columns.push(ColumnDefinition::parse(item)?);
            return Ok(());
        }

        let mut rest = tokens.as_slice();
        let mut name = None;
        if lead == "constraint" {
            name = Some(NamingStrategy::canonical(rest.get(1).ok_or_else(fail)?));
            rest = &rest[2..];
        }
        let (deferrable, body) = split_deferrable(rest).ok_or_else(fail)?;
        let keyword = body.first().map(|t| t.to_lowercase()).unwrap_or_default();
        match (keyword.as_str(), body) {
            ("primary", [_, key, group]) if key.eq_ignore_ascii_case("key") => {
                self.primary_key = Some(KeyConstraint {
                    name,
                    columns: column_list(unwrap_group(group).ok_or_else(fail)?),
                    deferrable,
                });
            }
            ("unique", [_, group]) => {
                self.uniques.push(KeyConstraint {
                    name,
                    columns: column_list(unwrap_group(group).ok_or_else(fail)?),
                    deferrable,
                });
            }
            ("check", [_, group]) => {
                self.checks.push(CheckConstraint {
                    name,
                    predicate: unwrap_group(group).ok_or_else(fail)?.to_string(),
                    deferrable,
                });
            }
            _ => return Err(fail()),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDefinition> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Append a column unless one with the same name exists; returns whether it was added
    pub fn add_column(&mut self, column: ColumnDefinition) -> bool {
        if self.has_column(&column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn remove_column(&mut self, name: &str) -> Option<ColumnDefinition> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))?;
        Some(self.columns.remove(pos))
    }

    /// Render back to CREATE TABLE text, without terminator
    pub fn render(&self) -> String {
        let mut items: Vec<String> = self.columns.iter().map(ColumnDefinition::render).collect();
        if let Some(pk) = &self.primary_key {
            items.push(render_key("primary key", pk));
        }
        for uk in &self.uniques {
            items.push(render_key("unique", uk));
        }
        for ck in &self.checks {
            let mut item = String::new();
            push_named(&mut item, ck.name.as_deref(), &format!("check ({})", ck.predicate));
            push_deferrable(&mut item, ck.deferrable);
            items.push(item.trim_start().to_string());
        }
        let mut out = format!("create table {} (\n    {}\n)", self.name, items.join(",\n    "));
        if let Some(partition) = &self.partition {
            out.push(' ');
            out.push_str(partition);
        }
        out
    }
}

/// `alter table .. add constraint .. foreign key (..) references ..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub target: String,
    pub target_columns: Vec<String>,
}

impl ForeignKeyDefinition {
    fn parse(sql: &str) -> Option<Self> {
        let caps = ALTER_FOREIGN_KEY.captures(sql)?;
        // trailing options are re-derived from metadata
        let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");
        if !rest.is_empty() && !rest.to_lowercase().starts_with("on ") && !rest.to_lowercase().starts_with("deferrable") {
            return None;
        }
        Some(Self {
            table: NamingStrategy::canonical(&caps["table"]),
            name: NamingStrategy::canonical(&caps["name"]),
            columns: column_list(&caps["cols"]),
            target: NamingStrategy::canonical(&caps["target"]),
            target_columns: caps
                .name("tcols")
                .map(|m| column_list(m.as_str()))
                .unwrap_or_default(),
        })
    }
}

/// `alter table .. add constraint .. unique (..)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueDefinition {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

impl UniqueDefinition {
    fn parse(sql: &str) -> Option<Self> {
        let caps = ALTER_UNIQUE.captures(sql)?;
        Some(Self {
            table: NamingStrategy::canonical(&caps["table"]),
            name: NamingStrategy::canonical(&caps["name"]),
            columns: column_list(&caps["cols"]),
        })
    }
}

/// `create [unique] index .. on .. (..)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    fn parse(sql: &str) -> Option<Self> {
        let caps = CREATE_INDEX.captures(sql)?;
        Some(Self {
            name: NamingStrategy::canonical(&caps["name"]),
            table: NamingStrategy::canonical(&caps["table"]),
            columns: column_list(&caps["cols"]),
            unique: caps.name("unique").is_some(),
        })
    }
}

/// `create sequence .. [options]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDefinition {
    pub name: String,
    /// Options as written, e.g. `start with 1 increment by 50`
    pub options: String,
}

impl SequenceDefinition {
    fn parse(sql: &str) -> Option<Self> {
        let caps = CREATE_SEQUENCE.captures(sql)?;
        Some(Self {
            name: NamingStrategy::canonical(&caps["name"]),
            options: caps["rest"].trim().to_string(),
        })
    }
}

/// Trim whitespace and one trailing `;`
fn strip_terminator(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

/// Byte offset of the `)` matching the `(` at `open`
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside parentheses and string literals
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            ',' if !in_quote && depth == 0 => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(text[start..].trim());
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Whitespace tokens; a parenthesized group or string literal stays in one token
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in text.trim().chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '(' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quote => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quote && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Join tokens with spaces, attaching standalone groups to the preceding token
fn glue(tokens: &[&str]) -> String {
    let mut out = String::new();
    for token in tokens {
        if !out.is_empty() && !token.starts_with('(') {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

fn is_column_keyword(token: &str) -> bool {
    matches!(
        token.to_lowercase().as_str(),
        "default" | "constraint" | "not" | "null" | "unique" | "check"
    )
}

/// Clauses the base emitter never writes inline in a column definition
fn is_foreign_clause(token: &str) -> bool {
    matches!(
        token.to_lowercase().as_str(),
        "references" | "primary" | "key" | "generated" | "identity" | "as" | "collate"
    )
}

/// Contents of a `( .. )` token
fn unwrap_group(token: &str) -> Option<&str> {
    token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .map(str::trim)
}

fn column_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(NamingStrategy::canonical)
        .collect()
}

/// Peel a trailing `deferrable [initially deferred|immediate]`
fn split_deferrable(tokens: &[String]) -> Option<(Option<bool>, &[String])> {
    let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let Some(pos) = lower.iter().position(|t| t == "deferrable") else {
        return Some((None, tokens));
    };
    let initially_deferred = match &lower[pos + 1..] {
        [] => false,
        [a, b] if a == "initially" && b == "deferred" => true,
        [a, b] if a == "initially" && b == "immediate" => false,
        _ => return None,
    };
    Some((Some(initially_deferred), &tokens[..pos]))
}

fn push_named(out: &mut String, name: Option<&str>, clause: &str) {
    if let Some(name) = name {
        out.push_str(&format!(" constraint {}", name));
    }
    out.push(' ');
    out.push_str(clause);
}

fn push_deferrable(out: &mut String, deferrable: Option<bool>) {
    match deferrable {
        Some(true) => out.push_str(" deferrable initially deferred"),
        Some(false) => out.push_str(" deferrable initially immediate"),
        None => {}
    }
}

fn render_key(keyword: &str, key: &KeyConstraint) -> String {
    let mut out = String::new();
    push_named(
        &mut out,
        key.name.as_deref(),
        &format!("{} ({})", keyword, key.columns.join(", ")),
    );
    push_deferrable(&mut out, key.deferrable);
    out.trim_start().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CUSTOMER: &str = "create table Customer (id bigint not null, firstName varchar(255), \
        status varchar(16) default 'NEW' not null, email varchar(128) unique, \
        primary key (id))";

    #[test]
    fn test_classify() {
        let raw = RawStatement::new("CREATE UNIQUE INDEX ix_a ON a (b);").unwrap();
        assert_eq!(raw.kind, StatementKind::CreateIndex);
        assert_eq!(raw.sql, "CREATE UNIQUE INDEX ix_a ON a (b)");
        assert!(RawStatement::new("grant select on a to b").is_err());
    }

    #[test]
    fn test_parse_create_table() {
        let table = TableDefinition::parse(CUSTOMER).unwrap();
        assert_eq!(table.name, "customer");
        assert_eq!(table.column_names(), vec!["id", "first_name", "status", "email"]);
        let status = table.column("status").unwrap();
        assert_eq!(status.data_type, "varchar(16)");
        assert_eq!(status.default.as_deref(), Some("'NEW'"));
        assert!(status.not_null);
        assert!(table.column("email").unwrap().unique);
        assert_eq!(table.primary_key.as_ref().unwrap().columns, vec!["id"]);
        assert!(table.partition.is_none());
    }

    #[test]
    fn test_render_round_trip() {
        let mut table = TableDefinition::parse(CUSTOMER).unwrap();
        table.column_mut("id").unwrap().not_null_name = Some("nn_customer_id".to_string());
        table.primary_key.as_mut().unwrap().name = Some("pk_customer".to_string());
        table.checks.push(CheckConstraint {
            name: Some("ck_customer_status".to_string()),
            predicate: "status in ('NEW', 'OLD')".to_string(),
            deferrable: Some(true),
        });
        let rendered = table.render();
        assert_eq!(
            rendered,
            "create table customer (\n    \
             id bigint constraint nn_customer_id not null,\n    \
             first_name varchar(255),\n    \
             status varchar(16) default 'NEW' not null,\n    \
             email varchar(128) unique,\n    \
             constraint pk_customer primary key (id),\n    \
             constraint ck_customer_status check (status in ('NEW', 'OLD')) deferrable initially deferred\n)"
        );
        assert_eq!(TableDefinition::parse(&rendered).unwrap(), table);
    }

    #[test]
    fn test_default_null() {
        let table = TableDefinition::parse(
            "create table note (id bigint not null, body varchar(200) default null, \
             kind varchar(8) default null not null, primary key (id))",
        )
        .unwrap();
        let body = table.column("body").unwrap();
        assert_eq!(body.default.as_deref(), Some("null"));
        assert!(!body.not_null);
        let kind = table.column("kind").unwrap();
        assert_eq!(kind.default.as_deref(), Some("null"));
        assert!(kind.not_null);
        assert_eq!(body.render(), "body varchar(200) default null");
        assert!(TableDefinition::parse("create table t (a integer default)").is_err());
    }

    #[test]
    fn test_partition_suffix_kept() {
        let sql = "create table booking (id bigint not null, booked_at timestamp, primary key (id)) \
                   partition by range (booked_at)";
        let table = TableDefinition::parse(sql).unwrap();
        assert_eq!(table.partition.as_deref(), Some("partition by range (booked_at)"));
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_unsupported_shapes_fail() {
        assert!(TableDefinition::parse("create table t (a int) tablespace users").is_err());
        assert!(TableDefinition::parse("create table t (a int references u)").is_err());
        assert!(TableDefinition::parse("create table t ()").is_err());
        let err = TableDefinition::parse("create table t (a int").unwrap_err();
        assert!(matches!(err, SynthError::Parse { .. }));
    }

    #[test]
    fn test_parse_foreign_key() {
        let raw = RawStatement::new(
            "alter table OrderLine add constraint FK8s7d foreign key (order_id) references Orders",
        )
        .unwrap();
        match raw.parse().unwrap() {
            ParsedStatement::ForeignKey(fk) => {
                assert_eq!(fk.table, "order_line");
                assert_eq!(fk.columns, vec!["order_id"]);
                assert_eq!(fk.target, "orders");
                assert!(fk.target_columns.is_empty());
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_parse_other_statements() {
        let index = RawStatement::new("create index IDX1 on invoice (customer_id, issued_on)")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(
            index,
            ParsedStatement::CreateIndex(IndexDefinition {
                name: "idx1".to_string(),
                table: "invoice".to_string(),
                columns: vec!["customer_id".to_string(), "issued_on".to_string()],
                unique: false,
            })
        );

        let drop = RawStatement::new("drop table if exists invoice cascade").unwrap();
        assert_eq!(
            drop.parse().unwrap(),
            ParsedStatement::DropTable {
                table: "invoice".to_string()
            }
        );

        let seq = RawStatement::new("create sequence invoice_seq start with 1 increment by 50")
            .unwrap()
            .parse()
            .unwrap();
        match seq {
            ParsedStatement::CreateSequence(s) => {
                assert_eq!(s.name, "invoice_seq");
                assert_eq!(s.options, "start with 1 increment by 50");
            }
            other => panic!("unexpected statement {:?}", other),
        }

        let alter = RawStatement::new("alter table a drop column b").unwrap();
        assert!(alter.parse().is_err());
    }

    #[test]
    fn test_add_column_is_idempotent() {
        let mut table = TableDefinition::parse(CUSTOMER).unwrap();
        assert!(!table.add_column(ColumnDefinition::new("EMAIL", "text")));
        assert!(table.add_column(ColumnDefinition::new("created_at", "timestamp")));
        assert_eq!(table.columns.len(), 5);
        assert!(table.remove_column("created_at").is_some());
        assert!(table.remove_column("created_at").is_none());
    }
}
