//! Generated DDL payloads
//!
//! A [`Script`] is the ordered list of statements produced for one schema
//! object (or for the deferred tail of a run). Rendered, every statement is
//! preceded by a marker line so a downstream executor can split the payload
//! back into individually issuable statements with [`Script::split`]:
//!
//! ```text
//! -- @@statement@@
//! create table customer (...);
//! -- @@block@@
//! create or replace trigger tr_customer_hst ...
//! end;
//! /
//! ```

use crate::dialect::Dialect;
use crate::error::{SynthError, SynthResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const STATEMENT_MARKER: &str = "-- @@statement@@";
pub const BLOCK_MARKER: &str = "-- @@block@@";
pub const COMMENT_MARKER: &str = "-- @@comment@@";

static MARKER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^-- @@(statement|block|comment)@@[ \t]*\r?$").unwrap());

/// How a statement ends when rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Plain statement ending with `;`
    Semicolon,
    /// Procedural body that must not be split internally
    Block,
    /// Placeholder text, not executable
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub terminator: Terminator,
}

impl Statement {
    pub fn simple(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            terminator: Terminator::Semicolon,
        }
    }

    pub fn block(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            terminator: Terminator::Block,
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            sql: text.into(),
            terminator: Terminator::Comment,
        }
    }

    pub fn is_executable(&self) -> bool {
        self.terminator != Terminator::Comment
    }

    fn render(&self, dialect: Dialect) -> String {
        match self.terminator {
            Terminator::Semicolon => format!("{}\n{};", STATEMENT_MARKER, self.sql),
            Terminator::Block if dialect.uses_plsql_blocks() => {
                format!("{}\n{}\n/", BLOCK_MARKER, self.sql)
            }
            Terminator::Block => format!("{}\n{};", BLOCK_MARKER, self.sql),
            Terminator::Comment => {
                let lines: Vec<String> = self.sql.lines().map(|l| format!("-- {}", l)).collect();
                format!("{}\n{}", COMMENT_MARKER, lines.join("\n"))
            }
        }
    }
}

/// Ordered statements for one dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    dialect: Dialect,
    statements: Vec<Statement>,
}

impl Script {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn push_simple(&mut self, sql: impl Into<String>) {
        self.push(Statement::simple(sql));
    }

    pub fn push_block(&mut self, sql: impl Into<String>) {
        self.push(Statement::block(sql));
    }

    pub fn append(&mut self, other: Script) {
        self.statements.extend(other.statements);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statement texts an executor can issue one by one, placeholders skipped
    pub fn executable(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.is_executable())
            .map(|s| s.sql.as_str())
            .collect()
    }

    /// Render the payload with marker lines
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .statements
            .iter()
            .map(|s| s.render(self.dialect))
            .collect();
        parts.join("\n")
    }

    /// Recover the statements of a rendered payload
    pub fn split(payload: &str, dialect: Dialect) -> SynthResult<Script> {
        let mut script = Script::new(dialect);
        let markers: Vec<_> = MARKER_LINE.captures_iter(payload).collect();
        let leading = markers
            .first()
            .and_then(|c| c.get(0))
            .map(|m| &payload[..m.start()])
            .unwrap_or(payload);
        if !leading.trim().is_empty() {
            return Err(SynthError::parse("script", leading.trim()));
        }

        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(kind)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map(|m| m.start())
                .unwrap_or(payload.len());
            let body = payload[whole.end()..end].trim();
            let statement = match kind.as_str() {
                "statement" => Statement::simple(strip_suffix(body, ";")),
                "block" if dialect.uses_plsql_blocks() => Statement::block(strip_suffix(body, "/")),
                "block" => Statement::block(strip_suffix(body, ";")),
                _ => {
                    let lines: Vec<&str> = body
                        .lines()
                        .map(|l| l.strip_prefix("-- ").or_else(|| l.strip_prefix("--")).unwrap_or(l))
                        .collect();
                    Statement::comment(lines.join("\n"))
                }
            };
            script.push(statement);
        }
        Ok(script)
    }
}

impl IntoIterator for Script {
    type Item = Statement;
    type IntoIter = std::vec::IntoIter<Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.into_iter()
    }
}

fn strip_suffix<'a>(body: &'a str, suffix: &str) -> &'a str {
    body.strip_suffix(suffix).unwrap_or(body).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(dialect: Dialect) -> Script {
        let mut script = Script::new(dialect);
        script.push(Statement::comment("table tmp_import is not rendered"));
        script.push_simple("create table a (\n    id bigint\n)");
        script.push_block("begin\n    null;\nend;");
        script.push_simple("create index ix_a_id on a (id)");
        script
    }

    #[test]
    fn test_render_oracle_blocks() {
        let rendered = sample(Dialect::Oracle).render();
        assert_eq!(
            rendered,
            "-- @@comment@@\n-- table tmp_import is not rendered\n\
             -- @@statement@@\ncreate table a (\n    id bigint\n);\n\
             -- @@block@@\nbegin\n    null;\nend;\n/\n\
             -- @@statement@@\ncreate index ix_a_id on a (id);"
        );
    }

    #[test]
    fn test_split_inverts_render() {
        for dialect in Dialect::ALL {
            let script = sample(dialect);
            let split = Script::split(&script.render(), dialect).unwrap();
            assert_eq!(split, script);
        }
    }

    #[test]
    fn test_executable_skips_placeholders() {
        let script = sample(Dialect::Postgres);
        assert_eq!(script.executable().len(), 3);
    }

    #[test]
    fn test_split_rejects_unmarked_text() {
        assert!(Script::split("create table a (id int);", Dialect::Hsql).is_err());
        assert!(Script::split("", Dialect::Hsql).unwrap().is_empty());
    }
}
