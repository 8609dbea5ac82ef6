//! Physical object naming
//!
//! [`NamingStrategy`] turns logical names into length-bounded physical
//! identifiers. It is pure: asking for the same name twice yields the same
//! answer. Uniqueness is enforced separately by [`NameRegistry`], which
//! lives for exactly one synthesis run.

use crate::config::SynthesisConfig;
use crate::error::{SynthError, SynthResult};
use std::collections::HashMap;

/// Kind of schema object a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    View,
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    NotNull,
    Index,
    Sequence,
    Trigger,
    Function,
}

impl ObjectKind {
    /// Prefix of auto-derived names
    pub fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::Table => "t",
            ObjectKind::View => "v",
            ObjectKind::PrimaryKey => "pk",
            ObjectKind::ForeignKey => "fk",
            ObjectKind::Unique => "uk",
            ObjectKind::Check => "ck",
            ObjectKind::NotNull => "nn",
            ObjectKind::Index => "ix",
            ObjectKind::Sequence => "sq",
            ObjectKind::Trigger => "tr",
            ObjectKind::Function => "fn",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::PrimaryKey => "primary key",
            ObjectKind::ForeignKey => "foreign key",
            ObjectKind::Unique => "unique constraint",
            ObjectKind::Check => "check constraint",
            ObjectKind::NotNull => "not-null constraint",
            ObjectKind::Index => "index",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Function => "function",
        };
        write!(f, "{}", label)
    }
}

/// Maps logical names to physical identifiers
#[derive(Debug, Clone)]
pub struct NamingStrategy {
    limit: usize,
    suffix_reserve: usize,
    segment_chars: usize,
}

impl NamingStrategy {
    pub fn new(limit: usize, suffix_reserve: usize, segment_chars: usize) -> Self {
        Self {
            limit,
            suffix_reserve: suffix_reserve.min(limit.saturating_sub(1)),
            segment_chars: segment_chars.max(1),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            config.identifier_limit(),
            config.suffix_reserve,
            config.segment_chars,
        )
    }

    /// Identifier budget
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Budget for tables that may later gain a history/i18n suffix
    pub fn suffixable_limit(&self) -> usize {
        self.limit - self.suffix_reserve
    }

    /// Canonical form of a logical name: unquoted, snake_case, lowercase
    ///
    /// Idempotent: `canonical(canonical(x)) == canonical(x)`.
    pub fn canonical(name: &str) -> String {
        let trimmed = name.trim().trim_matches(|c| c == '"' || c == '`');
        let mut out = String::with_capacity(trimmed.len() + 4);
        let mut prev_lower = false;
        for c in trimmed.chars() {
            if c.is_ascii_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
                prev_lower = false;
            } else if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '#' || c == '.' {
                out.push(c);
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            } else {
                out.push('_');
                prev_lower = false;
            }
        }
        out
    }

    /// Physical table name
    pub fn table_name(&self, logical: &str, may_gain_suffix: bool) -> SynthResult<String> {
        let name = Self::canonical(logical);
        let limit = if may_gain_suffix {
            self.suffixable_limit()
        } else {
            self.limit
        };
        self.check(name, limit)
    }

    /// Physical column name
    pub fn column_name(&self, logical: &str) -> SynthResult<String> {
        self.check(Self::canonical(logical), self.limit)
    }

    /// Constraint name: the explicit one if declared, else derived from owner and columns
    pub fn constraint_name(
        &self,
        kind: ObjectKind,
        owner: &str,
        columns: &[String],
        explicit: Option<&str>,
    ) -> SynthResult<String> {
        match explicit {
            Some(name) => self.check(Self::canonical(name), self.limit),
            None => self.derive(kind.prefix(), owner, &columns.join("_")),
        }
    }

    /// Index name: the explicit one if declared, else derived from owner and columns
    pub fn index_name(
        &self,
        owner: &str,
        columns: &[String],
        explicit: Option<&str>,
    ) -> SynthResult<String> {
        self.constraint_name(ObjectKind::Index, owner, columns, explicit)
    }

    /// Sequence name: the explicit one if declared, else derived from the owner
    pub fn sequence_name(&self, owner: &str, explicit: Option<&str>) -> SynthResult<String> {
        match explicit {
            Some(name) => self.check(Self::canonical(name), self.limit),
            None => self.derive(ObjectKind::Sequence.prefix(), owner, ""),
        }
    }

    /// Trigger name for one purpose (`hst`, `aud`, ...) on a table or view
    pub fn trigger_name(&self, owner: &str, purpose: &str) -> SynthResult<String> {
        self.derive(ObjectKind::Trigger.prefix(), owner, purpose)
    }

    /// Stored function name for one purpose on a table
    pub fn function_name(&self, owner: &str, purpose: &str) -> SynthResult<String> {
        self.derive(ObjectKind::Function.prefix(), owner, purpose)
    }

    /// `base` followed by a fixed suffix, truncating `base` to fit the budget
    pub fn suffixed(&self, base: &str, suffix: &str) -> SynthResult<String> {
        let base = Self::canonical(base);
        if suffix.len() >= self.limit {
            return Err(SynthError::Naming {
                name: format!("{}{}", base, suffix),
                limit: self.limit,
            });
        }
        let keep = self.limit - suffix.len();
        let head: String = base.chars().take(keep).collect();
        Ok(format!("{}{}", head.trim_end_matches('_'), suffix))
    }

    fn check(&self, name: String, limit: usize) -> SynthResult<String> {
        if name.is_empty() || name.len() > limit {
            return Err(SynthError::Naming { name, limit });
        }
        Ok(name)
    }

    /// `prefix_owner[_detail]`, compressing detail then owner when over budget
    fn derive(&self, prefix: &str, owner: &str, detail: &str) -> SynthResult<String> {
        let owner = Self::canonical(owner);
        let detail = Self::canonical(detail);
        let compose = |owner: &str, detail: &str| {
            if detail.is_empty() {
                format!("{}_{}", prefix, owner)
            } else {
                format!("{}_{}_{}", prefix, owner, detail)
            }
        };

        let full = compose(&owner, &detail);
        if full.len() <= self.limit {
            return Ok(full);
        }

        let short_detail = self.compress(&detail);
        let candidate = compose(&owner, &short_detail);
        if candidate.len() <= self.limit {
            return Ok(candidate);
        }

        let candidate = compose(&self.compress(&owner), &short_detail);
        if candidate.len() <= self.limit {
            return Ok(candidate);
        }

        Err(SynthError::Naming {
            name: full,
            limit: self.limit,
        })
    }

    /// Keep `segment_chars` characters of every `_`-delimited segment
    fn compress(&self, name: &str) -> String {
        name.split('_')
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(self.segment_chars).collect::<String>())
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Run-scoped registry of every physical name emitted
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: HashMap<String, (ObjectKind, String)>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a physical name; a second registration (case-insensitive) is fatal
    pub fn register(&mut self, kind: ObjectKind, name: &str, owner: &str) -> SynthResult<()> {
        let key = name.to_lowercase();
        if let Some((first_kind, first_owner)) = self.names.get(&key) {
            return Err(SynthError::NameCollision {
                name: name.to_string(),
                first_owner: format!("{} on {}", first_kind, first_owner),
                second_owner: format!("{} on {}", kind, owner),
            });
        }
        self.names.insert(key, (kind, owner.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_lowercase())
    }

    pub fn kind_of(&self, name: &str) -> Option<ObjectKind> {
        self.names.get(&name.to_lowercase()).map(|(kind, _)| *kind)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> NamingStrategy {
        NamingStrategy::new(30, 4, 3)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical() {
        assert_eq!(NamingStrategy::canonical("firstName"), "first_name");
        assert_eq!(NamingStrategy::canonical("\"Customer\""), "customer");
        assert_eq!(NamingStrategy::canonical("order-line"), "order_line");
        assert_eq!(NamingStrategy::canonical("already_snake"), "already_snake");
        let once = NamingStrategy::canonical("HTTPServerConfig2Name");
        assert_eq!(NamingStrategy::canonical(&once), once);
    }

    #[test]
    fn test_table_name_budget() {
        let naming = strategy();
        let name = "a".repeat(27);
        assert!(naming.table_name(&name, false).is_ok());
        let err = naming.table_name(&name, true).unwrap_err();
        assert!(matches!(err, SynthError::Naming { limit: 26, .. }));
    }

    #[test]
    fn test_derived_constraint_name() {
        let naming = strategy();
        let name = naming
            .constraint_name(ObjectKind::ForeignKey, "order_line", &cols(&["product_id"]), None)
            .unwrap();
        assert_eq!(name, "fk_order_line_product_id");
    }

    #[test]
    fn test_derived_name_compresses_columns() {
        let naming = strategy();
        let name = naming
            .constraint_name(
                ObjectKind::Unique,
                "customer",
                &cols(&["billing_address_id", "shipping_address_id"]),
                None,
            )
            .unwrap();
        // columns alone do not fit, so the owner is compressed as well
        assert_eq!(name, "uk_cus_bil_add_id_shi_add_id");
    }

    #[test]
    fn test_derived_name_within_limit() {
        let naming = strategy();
        let name = naming
            .constraint_name(
                ObjectKind::Unique,
                "customer_account",
                &cols(&["billing_address_id"]),
                None,
            )
            .unwrap();
        assert_eq!(name, "uk_customer_account_bil_add_id");
    }

    #[test]
    fn test_derived_name_is_deterministic() {
        let naming = strategy();
        let a = naming.index_name("invoice", &cols(&["customer_id", "issued_on"]), None).unwrap();
        let b = naming.index_name("invoice", &cols(&["customer_id", "issued_on"]), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_explicit_name_too_long() {
        let naming = strategy();
        let explicit = "an_explicit_constraint_name_that_is_too_long";
        let err = naming
            .constraint_name(ObjectKind::Check, "t", &[], Some(explicit))
            .unwrap_err();
        assert!(matches!(err, SynthError::Naming { limit: 30, .. }));
    }

    #[test]
    fn test_uncompressible_name_fails() {
        let naming = NamingStrategy::new(8, 0, 3);
        let err = naming
            .constraint_name(ObjectKind::Unique, "customer", &cols(&["name"]), None)
            .unwrap_err();
        assert!(matches!(err, SynthError::Naming { .. }));
    }

    #[test]
    fn test_suffixed_truncates_base() {
        let naming = strategy();
        let name = naming.suffixed("product_description_text", "_i18n_v").unwrap();
        assert_eq!(name.len(), 30);
        assert!(name.ends_with("_i18n_v"));
        assert_eq!(naming.suffixed("product", "_i18n").unwrap(), "product_i18n");
    }

    #[test]
    fn test_registry_rejects_duplicates_case_insensitively() {
        let mut registry = NameRegistry::new();
        registry.register(ObjectKind::Table, "customer", "customer").unwrap();
        let err = registry
            .register(ObjectKind::Index, "CUSTOMER", "order")
            .unwrap_err();
        match err {
            SynthError::NameCollision { first_owner, .. } => {
                assert!(first_owner.contains("table"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.kind_of("Customer"), Some(ObjectKind::Table));
    }
}
