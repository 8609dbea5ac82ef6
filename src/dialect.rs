//! Target dialect families and their capabilities
//!
//! Three families are modeled. Everything dialect-specific that is not a
//! whole template (types, expressions, capability flags) lives here so the
//! sub-generators can stay template-shaped.

use serde::Deserialize;

/// SQL dialect family of the generated script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Oracle-like: PL/SQL blocks, interval partitioning, 30 char identifiers
    Oracle,
    /// PostgreSQL-like: trigger functions, declarative partitioning
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    /// Embedded HSQL-like: BEGIN ATOMIC triggers, no partitioning
    #[serde(alias = "hsqldb")]
    Hsql,
}

impl Dialect {
    /// All modeled dialects, in a stable order
    pub const ALL: [Dialect; 3] = [Dialect::Oracle, Dialect::Postgres, Dialect::Hsql];

    /// Hard identifier length limit of the database
    pub fn max_identifier_length(&self) -> usize {
        match self {
            Dialect::Oracle => 30,
            Dialect::Postgres => 63,
            Dialect::Hsql => 128,
        }
    }

    /// Whether FK and UNIQUE constraints may be declared `DEFERRABLE`
    pub fn supports_deferrable_constraints(&self) -> bool {
        matches!(self, Dialect::Oracle | Dialect::Postgres)
    }

    /// Whether CHECK constraints may be declared `DEFERRABLE`
    pub fn supports_deferrable_check(&self) -> bool {
        matches!(self, Dialect::Oracle)
    }

    /// Whether deferred checks can be emulated with a constraint trigger
    pub fn supports_constraint_triggers(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether range partitioning is available
    pub fn supports_partitioning(&self) -> bool {
        matches!(self, Dialect::Oracle | Dialect::Postgres)
    }

    /// Whether `DROP ... IF EXISTS` is available
    pub fn supports_drop_if_exists(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Hsql)
    }

    /// Whether procedural bodies are standalone PL/SQL blocks terminated by `/`
    pub fn uses_plsql_blocks(&self) -> bool {
        matches!(self, Dialect::Oracle)
    }

    /// Whether row triggers delegate to a separately created function
    pub fn uses_trigger_functions(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// 64-bit integer type
    pub fn bigint_type(&self) -> &'static str {
        match self {
            Dialect::Oracle => "number(19,0)",
            Dialect::Postgres | Dialect::Hsql => "bigint",
        }
    }

    /// Timestamp type with microsecond precision
    pub fn timestamp_type(&self) -> &'static str {
        match self {
            Dialect::Oracle => "timestamp(6)",
            Dialect::Postgres | Dialect::Hsql => "timestamp",
        }
    }

    /// Variable-length character type of the given length
    pub fn varchar_type(&self, length: usize) -> String {
        match self {
            Dialect::Oracle => format!("varchar2({} char)", length),
            Dialect::Postgres | Dialect::Hsql => format!("varchar({})", length),
        }
    }

    /// Single-character flag type
    pub fn flag_type(&self) -> &'static str {
        "char(1)"
    }

    /// Current timestamp expression
    ///
    /// Fixed for the whole transaction on PostgreSQL only. Oracle and HSQL read
    /// the clock per statement, so triggers capture it once in a local variable.
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            Dialect::Oracle => "systimestamp",
            Dialect::Postgres => "transaction_timestamp()",
            Dialect::Hsql => "current_timestamp",
        }
    }

    /// Name of the connected database user
    pub fn session_user(&self) -> &'static str {
        match self {
            Dialect::Oracle => "user",
            Dialect::Postgres | Dialect::Hsql => "current_user",
        }
    }

    /// Expression drawing the next value of a sequence
    pub fn next_value(&self, sequence: &str) -> String {
        match self {
            Dialect::Oracle => format!("{}.nextval", sequence),
            Dialect::Postgres => format!("nextval('{}')", sequence),
            Dialect::Hsql => format!("next value for {}", sequence),
        }
    }

    /// Null-safe "value changed" predicate between two expressions
    ///
    /// NULL compared with NULL reads as unchanged on every dialect.
    pub fn distinct(&self, left: &str, right: &str) -> String {
        match self {
            Dialect::Oracle => format!(
                "({l} <> {r} or ({l} is null and {r} is not null) or ({l} is not null and {r} is null))",
                l = left,
                r = right
            ),
            Dialect::Postgres | Dialect::Hsql => format!("{} is distinct from {}", left, right),
        }
    }

    /// Timestamp literal for a partition boundary
    pub fn timestamp_literal(&self, value: &chrono::NaiveDateTime) -> String {
        format!("timestamp '{}'", value.format("%Y-%m-%d %H:%M:%S"))
    }

    /// Statement creating a sequence
    pub fn create_sequence(&self, name: &str, start: i64, increment: i64) -> String {
        format!(
            "create sequence {} start with {} increment by {}",
            name, start, increment
        )
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Oracle => write!(f, "oracle"),
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Hsql => write!(f, "hsql"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(Dialect::Oracle.supports_deferrable_check());
        assert!(!Dialect::Postgres.supports_deferrable_check());
        assert!(Dialect::Postgres.supports_constraint_triggers());
        assert!(!Dialect::Hsql.supports_partitioning());
        assert!(!Dialect::Oracle.supports_drop_if_exists());
    }

    #[test]
    fn test_distinct_is_null_safe() {
        assert_eq!(
            Dialect::Postgres.distinct("old.a", "new.a"),
            "old.a is distinct from new.a"
        );
        let oracle = Dialect::Oracle.distinct(":old.a", ":new.a");
        assert!(oracle.contains(":old.a is null and :new.a is not null"));
        assert!(oracle.contains(":old.a is not null and :new.a is null"));
    }

    #[test]
    fn test_next_value() {
        assert_eq!(Dialect::Oracle.next_value("s"), "s.nextval");
        assert_eq!(Dialect::Postgres.next_value("s"), "nextval('s')");
        assert_eq!(Dialect::Hsql.next_value("s"), "next value for s");
    }
}
