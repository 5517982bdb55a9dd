use super::{CorrelationBindings, ExpressionScope};
use crate::{
    alias_registry::AliasRegistry,
    ir::{AggregateKind, ColumnRef, ColumnType, Expression, Statement},
};
use bson::{doc, Bson};

fn column(alias: Option<&str>, name: &str) -> ColumnRef {
    ColumnRef {
        alias: alias.map(str::to_string),
        name: name.to_string(),
        column_type: ColumnType::Unknown,
    }
}

mod correlation_bindings {
    use super::*;

    #[test]
    fn names_are_sequential() {
        let mut bindings = CorrelationBindings::new();
        assert_eq!("outer_0", bindings.bind_column("N0", "Id", Bson::String("$Id".into())));
        assert_eq!("outer_1", bindings.bind_column("N0", "Name", Bson::String("$Name".into())));
        assert_eq!(2, bindings.len());
    }

    #[test]
    fn rebinding_is_case_insensitive() {
        let mut bindings = CorrelationBindings::new();
        bindings.bind_column("N0", "Id", Bson::String("$Id".into()));
        assert_eq!("outer_0", bindings.bind_column("n0", "ID", Bson::String("$ID".into())));
        assert_eq!(1, bindings.len());
    }

    #[test]
    fn let_document_lists_values_in_binding_order() {
        let mut bindings = CorrelationBindings::new();
        assert_eq!(None, bindings.let_document());
        bindings.bind_column("N0", "Id", Bson::String("$Id".into()));
        bindings.bind_column("N1", "Code", Bson::String("$N1.Code".into()));
        assert_eq!(
            Some(doc! {"outer_0": "$Id", "outer_1": "$N1.Code"}),
            bindings.let_document()
        );
    }
}

mod expression_scope {
    use super::*;

    #[test]
    fn plain_columns_resolve_to_field_paths() {
        let mut registry = AliasRegistry::new(Some("N0"), "Orders");
        registry.register(Some("N1"), "N1");
        let scope = ExpressionScope::new(registry);
        assert_eq!("$Total", scope.resolve_column(&column(Some("N0"), "Total")));
        assert_eq!("$N1.Name", scope.resolve_column(&column(Some("N1"), "Name")));
    }

    #[test]
    fn correlation_variables_win_over_field_paths() {
        let mut bindings = CorrelationBindings::new();
        bindings.bind_column("N0", "Id", Bson::String("$Id".into()));
        let scope = ExpressionScope::with_correlations(AliasRegistry::new(Some("N1"), "Items"), bindings);
        assert_eq!("$$outer_0", scope.resolve_column(&column(Some("n0"), "id")));
        assert_eq!("$Id", scope.resolve_column(&column(Some("N1"), "Id")));
        assert_eq!("$Id", scope.resolve_column(&column(None, "Id")));
    }

    #[test]
    fn properties_are_normalized() {
        let scope = ExpressionScope::new(AliasRegistry::new(None, "Orders"));
        assert_eq!("$Customer.Name", scope.resolve_property("Customer!.Name"));
    }

    #[test]
    fn subqueries_resolve_to_planned_fields() {
        let subquery = Expression::aggregate(
            AggregateKind::Count,
            None,
            Some(Statement {
                table: "Items".to_string(),
                ..Default::default()
            }),
        )
        .signature();

        let mut scope = ExpressionScope::new(AliasRegistry::new(None, "Orders"));
        assert_eq!(None, scope.resolve_subquery(&subquery));
        scope.register_subquery(subquery.clone(), "SubAgg0");
        assert_eq!(Some("$SubAgg0".to_string()), scope.resolve_subquery(&subquery));
    }
}
