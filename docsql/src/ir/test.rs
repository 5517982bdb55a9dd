use crate::ir::*;

macro_rules! test_signature {
    ($func_name:ident, equal = $equal:expr, left = $left:expr, right = $right:expr) => {
        #[test]
        fn $func_name() {
            let (left, right): (Expression, Expression) = ($left, $right);
            assert_eq!($equal, left.signature() == right.signature());
        }
    };
}

mod signature {
    use super::*;

    test_signature!(
        alias_case_is_ignored,
        equal = true,
        left = Expression::column(Some("N0"), "Category", ColumnType::String),
        right = Expression::column(Some("n0"), "category", ColumnType::String)
    );
    test_signature!(
        column_spelling_is_normalized,
        equal = true,
        left = Expression::column(None, "Customer!.Name", ColumnType::String),
        right = Expression::column(None, "customer.name,System.String", ColumnType::String)
    );
    test_signature!(
        different_columns_differ,
        equal = false,
        left = Expression::column(None, "A", ColumnType::Int32),
        right = Expression::column(None, "B", ColumnType::Int32)
    );
    test_signature!(
        different_constants_differ,
        equal = false,
        left = Expression::binary(
            BinaryOp::Equal,
            Expression::column(None, "A", ColumnType::Int32),
            Expression::constant(Constant::Int32(1))
        ),
        right = Expression::binary(
            BinaryOp::Equal,
            Expression::column(None, "A", ColumnType::Int32),
            Expression::constant(Constant::Int32(2))
        )
    );
    test_signature!(
        custom_tags_ignore_case,
        equal = true,
        left = Expression::function(Function::Custom("LIKE".to_string()), vec![]),
        right = Expression::function(Function::Custom("like".to_string()), vec![])
    );
    test_signature!(
        nested_statement_tables_ignore_case,
        equal = true,
        left = Expression::aggregate(
            AggregateKind::Count,
            None,
            Some(Statement {
                table: "Orders".to_string(),
                alias: Some("S0".to_string()),
                ..Default::default()
            })
        ),
        right = Expression::aggregate(
            AggregateKind::Count,
            None,
            Some(Statement {
                table: "ORDERS".to_string(),
                alias: Some("s0".to_string()),
                ..Default::default()
            })
        )
    );
    test_signature!(
        aggregate_kinds_differ,
        equal = false,
        left = Expression::aggregate(
            AggregateKind::Min,
            Some(Expression::column(None, "A", ColumnType::Int32)),
            None
        ),
        right = Expression::aggregate(
            AggregateKind::Max,
            Some(Expression::column(None, "A", ColumnType::Int32)),
            None
        )
    );

    #[test]
    fn double_constants_hash_by_bits() {
        use std::collections::HashSet;
        let set: HashSet<_> = [
            Expression::constant(Constant::Double(1.5)).signature(),
            Expression::constant(Constant::Double(1.5)).signature(),
            Expression::constant(Constant::Double(2.5)).signature(),
        ]
        .into_iter()
        .collect();
        assert_eq!(2, set.len());
    }
}

mod function {
    use super::*;

    #[test]
    fn from_name_ignores_case() {
        assert_eq!(Some(Function::StartsWith), Function::from_name("startswith"));
        assert_eq!(Some(Function::Iif), Function::from_name("IIF"));
    }

    #[test]
    fn from_name_rejects_unknown() {
        assert_eq!(None, Function::from_name("soundex"));
        assert_eq!(None, Function::from_name("Custom"));
    }

    #[test]
    fn custom_name_includes_tag() {
        assert_eq!("Custom(Like)", Function::Custom("Like".to_string()).name());
        assert_eq!("Len", Function::Len.name());
    }
}

mod json {
    use super::*;

    #[test]
    fn statement_deserializes_with_defaults() {
        let json = r#"{
            "table": "Orders",
            "alias": "N0",
            "operands": [
                {"expression": {"Column": {"alias": "N0", "name": "Total", "column_type": "Double"}}}
            ],
            "condition": {"Binary": {
                "op": "Greater",
                "left": {"Column": {"name": "Total"}},
                "right": {"Constant": {"Int32": 10}}
            }},
            "limit": 5
        }"#;
        let statement: Statement = serde_json::from_str(json).unwrap();
        assert_eq!("Orders", statement.table);
        assert_eq!(Some(5), statement.limit);
        assert_eq!(None, statement.skip);
        assert!(statement.joins.is_empty());
        assert_eq!(
            Some(Expression::binary(
                BinaryOp::Greater,
                Expression::column(None, "Total", ColumnType::Unknown),
                Expression::constant(Constant::Int32(10))
            )),
            statement.condition
        );
    }

    #[test]
    fn typed_constants_survive_json() {
        let constants = vec![
            Constant::DateTime(bson::DateTime::from_millis(1_700_000_000_000)),
            Constant::Guid(bson::Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap()),
            Constant::Decimal("12.50".to_string()),
        ];
        let text = serde_json::to_string(&constants).unwrap();
        let parsed: Vec<Constant> = serde_json::from_str(&text).unwrap();
        assert_eq!(constants, parsed);
    }
}

#[test]
fn join_nodes_are_in_tree_order() {
    let statement = Statement {
        table: "A".to_string(),
        joins: vec![
            JoinNode {
                table: "B".to_string(),
                joins: vec![JoinNode {
                    table: "C".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            JoinNode {
                table: "D".to_string(),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let tables: Vec<_> = statement
        .join_nodes()
        .into_iter()
        .map(|n| n.table.as_str())
        .collect();
    assert_eq!(vec!["B", "C", "D"], tables);
}
