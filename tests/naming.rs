//! Naming strategy over the public API

use ddl_synth::{Dialect, NameRegistry, NamingStrategy, ObjectKind, SynthError, SynthesisConfig};
use rstest::rstest;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[rstest]
#[case("customer", &["id"])]
#[case("order_line", &["product_id", "batch_no"])]
#[case("warehouse_stock_movement", &["source_location_id"])]
#[case("a", &["b"])]
fn test_derived_names_fit_and_repeat(#[case] owner: &str, #[case] columns: &[&str]) {
    let naming = NamingStrategy::new(30, 4, 3);
    for kind in [ObjectKind::ForeignKey, ObjectKind::Unique, ObjectKind::Index, ObjectKind::NotNull] {
        let first = naming.constraint_name(kind, owner, &cols(columns), None).unwrap();
        let second = naming.constraint_name(kind, owner, &cols(columns), None).unwrap();
        assert_eq!(first, second);
        assert!(first.len() <= 30, "{}", first);
        assert!(first.starts_with(kind.prefix()));
    }
}

#[rstest]
#[case(Dialect::Oracle, 63, 30)]
#[case(Dialect::Postgres, 63, 63)]
#[case(Dialect::Hsql, 30, 30)]
fn test_limit_follows_budget_and_dialect(#[case] dialect: Dialect, #[case] budget: usize, #[case] limit: usize) {
    let config = SynthesisConfig {
        dialect,
        identifier_budget: budget,
        ..SynthesisConfig::default()
    };
    let naming = NamingStrategy::from_config(&config);
    assert_eq!(naming.limit(), limit);
    assert_eq!(naming.suffixable_limit(), limit - config.suffix_reserve);
}

#[test]
fn test_too_many_columns_is_a_naming_error() {
    let naming = NamingStrategy::new(30, 4, 3);
    let err = naming
        .index_name(
            "warehouse_stock_movement",
            &cols(&["source_location_id", "target_location_id", "moved_at"]),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, SynthError::Naming { limit: 30, .. }));
}

#[test]
fn test_table_that_gains_a_suffix_still_fits() {
    let naming = NamingStrategy::new(30, 4, 3);
    let table = naming.table_name("customer_loyalty_programme", true).unwrap();
    assert_eq!(table.len(), 26);
    let history = naming.suffixed(&table, "_hst").unwrap();
    assert_eq!(history, "customer_loyalty_programme_hst");
    assert!(naming.table_name("customer_loyalty_programmes", true).is_err());
}

#[test]
fn test_explicit_names_are_kept() {
    let naming = NamingStrategy::new(30, 4, 3);
    let name = naming
        .constraint_name(ObjectKind::Unique, "customer", &cols(&["email"]), Some("UK_CUSTOMER_MAIL"))
        .unwrap();
    assert_eq!(name, "uk_customer_mail");
    assert_eq!(naming.sequence_name("invoice", None).unwrap(), "sq_invoice");
    assert_eq!(naming.sequence_name("invoice", Some("invoiceSeq")).unwrap(), "invoice_seq");
}

#[test]
fn test_registry_collision_names_both_owners() {
    let mut registry = NameRegistry::new();
    registry.register(ObjectKind::Index, "ix_invoice_customer_id", "invoice").unwrap();
    match registry.register(ObjectKind::Index, "IX_INVOICE_CUSTOMER_ID", "invoice_archive") {
        Err(SynthError::NameCollision {
            name,
            first_owner,
            second_owner,
        }) => {
            assert_eq!(name.to_lowercase(), "ix_invoice_customer_id");
            assert!(first_owner.contains("invoice"));
            assert!(second_owner.contains("invoice_archive"));
        }
        other => panic!("expected a collision, got {:?}", other),
    }
}
