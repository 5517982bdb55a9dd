use crate::{
    alias_registry::declared_aliases,
    ir::{AggregateRef, ColumnRef, Expression, Statement},
};
use docsql_datastructures::case_insensitive_map::CaseInsensitiveMap;

/// Collects the correlated subqueries of `expression`. Nested statements are
/// not entered; they plan their own subqueries.
pub(super) fn subqueries<'e>(
    expression: &'e Expression,
    found: &mut Vec<(&'e AggregateRef, &'e Statement)>,
) {
    match expression {
        Expression::Aggregate(aggregate) if aggregate.statement.is_some() => {
            if let Some(statement) = &aggregate.statement {
                found.push((aggregate, statement));
            }
        }
        other => other.for_each_child(|child| subqueries(child, found)),
    }
}

/// Collects the aggregates over the current grouping. Their targets and
/// correlated subqueries are not entered.
pub(super) fn local_aggregates<'e>(expression: &'e Expression, found: &mut Vec<&'e AggregateRef>) {
    match expression {
        Expression::Aggregate(aggregate) => {
            if aggregate.statement.is_none() {
                found.push(aggregate);
            }
        }
        other => other.for_each_child(|child| local_aggregates(child, found)),
    }
}

/// Finds aliased column references that no statement on the path to them
/// declares. Unaliased columns always belong to the innermost statement.
#[derive(Default)]
pub(super) struct OuterColumns<'e> {
    declared: Vec<CaseInsensitiveMap<()>>,
    found: Vec<&'e ColumnRef>,
}

impl<'e> OuterColumns<'e> {
    pub fn of_subquery(aggregate: &'e AggregateRef, statement: &'e Statement) -> Vec<&'e ColumnRef> {
        let mut visitor = OuterColumns::default();
        visitor.visit_statement(statement, aggregate.target.as_ref());
        visitor.found
    }

    pub fn of_expression(expression: &'e Expression) -> Vec<&'e ColumnRef> {
        let mut visitor = OuterColumns::default();
        visitor.visit_expression(expression);
        visitor.found
    }

    fn visit_statement(&mut self, statement: &'e Statement, target: Option<&'e Expression>) {
        self.declared.push(declared_aliases(statement));
        if let Some(target) = target {
            self.visit_expression(target);
        }
        for expression in statement.expressions() {
            self.visit_expression(expression);
        }
        for node in statement.join_nodes() {
            if let Some(condition) = &node.condition {
                self.visit_expression(condition);
            }
        }
        self.declared.pop();
    }

    fn visit_expression(&mut self, expression: &'e Expression) {
        match expression {
            Expression::Column(column) => {
                if let Some(alias) = &column.alias {
                    if !self.declared.iter().any(|d| d.contains_key(alias)) {
                        self.found.push(column);
                    }
                }
            }
            Expression::Aggregate(aggregate) => match &aggregate.statement {
                Some(statement) => self.visit_statement(statement, aggregate.target.as_ref()),
                None => expression.for_each_child(|child| self.visit_expression(child)),
            },
            other => other.for_each_child(|child| self.visit_expression(child)),
        }
    }
}
