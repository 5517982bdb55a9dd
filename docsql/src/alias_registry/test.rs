use super::{declared_aliases, normalize_column_name, AliasRegistry};
use crate::ir::{JoinNode, Statement};

macro_rules! test_normalize_column_name {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, normalize_column_name($input));
        }
    };
}

test_normalize_column_name!(plain_name_is_unchanged, expected = "Name", input = "Name");
test_normalize_column_name!(
    type_suffix_is_dropped,
    expected = "Customer",
    input = "Customer,System.Int32"
);
test_normalize_column_name!(
    association_marker_becomes_dot,
    expected = "Customer.Name",
    input = "Customer!.Name"
);
test_normalize_column_name!(
    escaped_association_marker_becomes_dot,
    expected = "Customer.Name",
    input = "Customer!\\.Name"
);
test_normalize_column_name!(backslashes_are_removed, expected = "AB", input = "A\\B");
test_normalize_column_name!(outer_dots_are_trimmed, expected = "a.b", input = "..a.b.");
test_normalize_column_name!(empty_stays_empty, expected = "", input = "");

#[test]
fn root_alias_resolves_to_top_level_field() {
    let registry = AliasRegistry::new(Some("N0"), "Orders");
    assert_eq!("$Total", registry.field_path(Some("N0"), "Total"));
    assert_eq!("$Total", registry.field_path(None, "Total"));
}

#[test]
fn registered_alias_prefixes_its_path() {
    let mut registry = AliasRegistry::new(Some("N0"), "Orders");
    registry.register(Some("N1"), "N1");
    assert_eq!("$N1.Name", registry.field_path(Some("n1"), "Name"));
    assert!(registry.contains(Some("N1")));
}

#[test]
fn unknown_alias_resolves_against_root() {
    let registry = AliasRegistry::new(None, "Orders");
    assert!(!registry.contains(Some("X")));
    assert_eq!("$Name", registry.field_path(Some("X"), "Name"));
}

#[test]
fn declared_aliases_include_nested_joins() {
    let statement = Statement {
        table: "Orders".to_string(),
        alias: Some("N0".to_string()),
        joins: vec![JoinNode {
            table: "Customers".to_string(),
            alias: Some("N1".to_string()),
            joins: vec![JoinNode {
                table: "Regions".to_string(),
                alias: Some("N2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    let aliases = declared_aliases(&statement);
    assert_eq!(vec!["N0", "N1", "N2"], aliases.keys().collect::<Vec<_>>());
    assert!(aliases.contains_key("n2"));
}
