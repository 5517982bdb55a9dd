//! Structural signatures: equality by shape rather than by identity.
//!
//! Two expressions have the same signature when they differ only in the case
//! of aliases, property names, custom tags and table names, or in the
//! spelling of a column that normalizes to the same path.
use super::*;
use crate::alias_registry::normalize_column_name;

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct Signature(Expression);

impl Signature {
    pub fn expression(&self) -> &Expression {
        &self.0
    }
}

impl Expression {
    pub fn signature(&self) -> Signature {
        Signature(self.normalized())
    }

    fn normalized(&self) -> Expression {
        match self {
            Expression::Column(c) => Expression::Column(ColumnRef {
                alias: fold_opt(&c.alias),
                name: normalize_column_name(&c.name).to_lowercase(),
                column_type: c.column_type,
            }),
            Expression::Property(p) => Expression::Property(normalize_column_name(p).to_lowercase()),
            Expression::Constant(c) => Expression::Constant(c.clone()),
            Expression::Unary(u) => Expression::unary(u.op, u.operand.normalized()),
            Expression::Binary(b) => {
                Expression::binary(b.op, b.left.normalized(), b.right.normalized())
            }
            Expression::Between(b) => Expression::between(
                b.test.normalized(),
                b.begin.normalized(),
                b.end.normalized(),
            ),
            Expression::In(i) => Expression::in_list(
                i.left.normalized(),
                i.candidates.iter().map(Expression::normalized).collect(),
            ),
            Expression::Group(g) => Expression::Group(Group {
                op: g.op,
                operands: g.operands.iter().map(Expression::normalized).collect(),
            }),
            Expression::Function(f) => Expression::function(
                match &f.function {
                    Function::Custom(tag) => Function::Custom(tag.to_lowercase()),
                    other => other.clone(),
                },
                f.arguments.iter().map(Expression::normalized).collect(),
            ),
            Expression::Aggregate(a) => Expression::aggregate(
                match &a.kind {
                    AggregateKind::Custom(name) => AggregateKind::Custom(name.to_lowercase()),
                    other => other.clone(),
                },
                a.target.as_ref().map(Expression::normalized),
                a.statement.as_ref().map(Statement::normalized),
            ),
        }
    }
}

impl Statement {
    fn normalized(&self) -> Statement {
        Statement {
            table: self.table.to_lowercase(),
            alias: fold_opt(&self.alias),
            operands: self
                .operands
                .iter()
                .map(|o| OutputColumn {
                    expression: o.expression.normalized(),
                    alias: fold_opt(&o.alias),
                })
                .collect(),
            condition: self.condition.as_ref().map(Expression::normalized),
            joins: self.joins.iter().map(JoinNode::normalized).collect(),
            group_by: self.group_by.iter().map(Expression::normalized).collect(),
            having: self.having.as_ref().map(Expression::normalized),
            sorts: self
                .sorts
                .iter()
                .map(|s| SortKey {
                    expression: s.expression.normalized(),
                    direction: s.direction,
                })
                .collect(),
            skip: self.skip,
            limit: self.limit,
        }
    }
}

impl JoinNode {
    fn normalized(&self) -> JoinNode {
        JoinNode {
            table: self.table.to_lowercase(),
            alias: fold_opt(&self.alias),
            kind: self.kind,
            condition: self.condition.as_ref().map(Expression::normalized),
            joins: self.joins.iter().map(JoinNode::normalized).collect(),
        }
    }
}

fn fold_opt(s: &Option<String>) -> Option<String> {
    s.as_ref().map(|s| s.to_lowercase())
}
