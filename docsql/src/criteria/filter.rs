use super::{
    binary_operator, compare, complement, group_operator, present, requires_null_guard,
    CriteriaTranslator, Result, TypedExpression,
};
use crate::ir::{Between, BinaryOp, Expression, Group, In, Unary, UnaryOp};
use bson::{bson, doc, Bson, Document};

impl CriteriaTranslator<'_> {
    /// Attempts a native filter. `Ok(None)` means the predicate has no
    /// filter form at all and must be compiled as a whole into `$expr`.
    pub(super) fn native_filter(&self, predicate: &Expression) -> Result<Option<Document>> {
        if self.resolve_grouped(predicate).is_some() {
            return Ok(None);
        }
        match predicate {
            Expression::Binary(binary) if binary.op.is_comparison() => {
                let left = self.compile_expression(&binary.left)?;
                let right = self.compile_expression(&binary.right)?;
                Ok(Some(match comparison_filter(binary.op, &left, &right) {
                    Some(filter) => filter,
                    None => doc! {"$expr": compare(binary.op, left, right)},
                }))
            }
            Expression::Group(group) => self.group_filter(group),
            Expression::Between(between) => self.between_filter(between).map(Some),
            Expression::In(in_list) => self.in_filter(in_list).map(Some),
            Expression::Unary(Unary {
                op: UnaryOp::Not,
                operand,
            }) => match complement(operand) {
                Some(complement) => self.native_filter(&complement),
                None => self.negated_filter(operand).map(Some),
            },
            _ => Ok(None),
        }
    }

    fn negated_filter(&self, operand: &Expression) -> Result<Document> {
        Ok(match self.native_filter(operand)? {
            Some(inner) if !inner.is_empty() => doc! {"$nor": [inner]},
            _ => doc! {"$expr": {"$not": [self.compile_bson(operand)?]}},
        })
    }

    /// A group is native only when every child is. One child in `$expr`
    /// form moves the whole group into `$expr`.
    fn group_filter(&self, group: &Group) -> Result<Option<Document>> {
        let mut filters = vec![];
        let mut expressions = vec![];
        let mut requires_expr = false;
        for operand in &group.operands {
            match self.native_filter(operand)? {
                Some(nested) if !nested.is_empty() => {
                    match nested.get("$expr") {
                        Some(expr) => {
                            requires_expr = true;
                            expressions.push(expr.clone());
                        }
                        None => {
                            requires_expr |= nested.values().any(contains_correlation_reference);
                            expressions.push(match_to_expr(&nested));
                        }
                    }
                    filters.push(nested);
                }
                _ => {
                    let expr = self.compile_bson(operand)?;
                    requires_expr = true;
                    filters.push(doc! {"$expr": expr.clone()});
                    expressions.push(expr);
                }
            }
        }
        if filters.is_empty() {
            return Ok(None);
        }
        let operator = group_operator(group.op);
        Ok(Some(if requires_expr {
            doc! {"$expr": { operator: expressions }}
        } else {
            doc! { operator: filters }
        }))
    }

    fn between_filter(&self, between: &Between) -> Result<Document> {
        let test = self.compile_expression(&between.test)?;
        let begin = self.compile_expression(&between.begin)?;
        let end = self.compile_expression(&between.end)?;
        if let (Some(field), Some(low), Some(high)) =
            (test.field_name(), begin.constant_value(), end.constant_value())
        {
            return Ok(doc! { field: {"$gte": low.clone(), "$lte": high.clone()} });
        }
        Ok(doc! {"$expr": {"$and": [
            compare(BinaryOp::GreaterOrEqual, test.clone(), begin),
            compare(BinaryOp::LessOrEqual, test, end),
        ]}})
    }

    fn in_filter(&self, in_list: &In) -> Result<Document> {
        let left = self.compile_expression(&in_list.left)?;
        let candidates = in_list
            .candidates
            .iter()
            .map(|c| self.compile_expression(c))
            .collect::<Result<Vec<_>>>()?;
        if let Some(field) = left.field_name() {
            if candidates.iter().all(TypedExpression::is_constant) {
                let values: Vec<Bson> = candidates
                    .into_iter()
                    .filter_map(|c| c.constant_value().cloned())
                    .collect();
                return Ok(doc! { field: {"$in": values} });
            }
        }
        let values: Vec<Bson> = candidates.into_iter().map(TypedExpression::into_bson).collect();
        Ok(doc! {"$expr": {"$in": [left.into_bson(), values]}})
    }
}

/// The native form of `field op constant`, mirrored when the constant comes
/// first. Correlation references never qualify.
fn comparison_filter(
    op: BinaryOp,
    left: &TypedExpression,
    right: &TypedExpression,
) -> Option<Document> {
    if let (Some(field), Some(value)) = (left.field_name(), right.constant_value()) {
        return Some(field_comparison(field, op, value.clone()));
    }
    if let (Some(field), Some(value)) = (right.field_name(), left.constant_value()) {
        return Some(field_comparison(field, op.mirrored(), value.clone()));
    }
    None
}

fn field_comparison(field: &str, op: BinaryOp, value: Bson) -> Document {
    match op {
        BinaryOp::Equal => doc! { field: value },
        op => doc! { field: { binary_operator(op): value } },
    }
}

fn contains_correlation_reference(value: &Bson) -> bool {
    match value {
        Bson::String(s) => s.starts_with("$$"),
        Bson::Document(d) => d.values().any(contains_correlation_reference),
        Bson::Array(items) => items.iter().any(contains_correlation_reference),
        _ => false,
    }
}

/// Re-expresses a native filter as an aggregation expression. Inequalities
/// get a presence guard, matching the filter's type bracketing.
pub(super) fn match_to_expr(filter: &Document) -> Bson {
    if let Some(expr) = filter.get("$expr") {
        return expr.clone();
    }
    if let Ok(items) = filter.get_array("$or") {
        return bson!({ "$or": convert_all(items) });
    }
    if let Ok(items) = filter.get_array("$and") {
        return bson!({ "$and": convert_all(items) });
    }
    if let Ok(items) = filter.get_array("$nor") {
        return bson!({ "$not": [{ "$or": convert_all(items) }] });
    }
    let mut clauses: Vec<Bson> = filter
        .iter()
        .map(|(field, value)| field_comparison_to_expr(field, value))
        .collect();
    match clauses.len() {
        0 => Bson::Boolean(true),
        1 => clauses.remove(0),
        _ => bson!({ "$and": clauses }),
    }
}

fn convert_all(items: &[Bson]) -> Vec<Bson> {
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => match_to_expr(d),
            other => other.clone(),
        })
        .collect()
}

fn field_comparison_to_expr(field: &str, value: &Bson) -> Bson {
    let path = if field.starts_with('$') {
        field.to_string()
    } else {
        format!("${field}")
    };
    match value {
        Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            let mut clauses: Vec<Bson> = ops
                .iter()
                .map(|(operator, operand)| {
                    let comparison = bson!({ operator: [path.clone(), literal(operand)] });
                    if requires_null_guard(operator) {
                        bson!({ "$and": [comparison, present(Bson::String(path.clone()))] })
                    } else {
                        comparison
                    }
                })
                .collect();
            if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                bson!({ "$and": clauses })
            }
        }
        other => bson!({ "$eq": [path, literal(other)] }),
    }
}

/// Protects constant strings that would otherwise read as field paths.
fn literal(value: &Bson) -> Bson {
    match value {
        Bson::String(s) if s.starts_with('$') => bson!({ "$literal": s.clone() }),
        Bson::Array(items) => Bson::Array(items.iter().map(literal).collect()),
        other => other.clone(),
    }
}
