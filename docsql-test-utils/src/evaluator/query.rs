use super::{
    expression::{get_path, ExpressionEvaluator},
    invalid_argument, Error, Result, Variables,
};
use crate::compare::{bson_eq, compare_bson, is_truthy, type_rank};
use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Evaluates a `$match` filter. In the query language a missing field
/// compares as null; ordering operators only match values of the operand's
/// own type. `$expr` keeps the expression semantics of missing.
pub fn matches(document: &Document, filter: &Document, variables: &Variables) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let mut results = vec![];
                for clause in clauses(key, condition)? {
                    results.push(matches(document, clause, variables)?);
                }
                match key.as_str() {
                    "$and" => results.iter().all(|r| *r),
                    "$or" => results.iter().any(|r| *r),
                    _ => !results.iter().any(|r| *r),
                }
            }
            "$expr" => is_truthy(&ExpressionEvaluator::new(document, variables).evaluate(condition)?),
            operator if operator.starts_with('$') => {
                return Err(Error::UnsupportedOperator(operator.to_string()))
            }
            field => field_matches(get_path(document, field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'f>(operator: &str, condition: &'f Bson) -> Result<Vec<&'f Document>> {
    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d),
                _ => Err(invalid_argument(operator, "clauses must be documents")),
            })
            .collect(),
        _ => Err(invalid_argument(operator, "expected an array of clauses")),
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };
    let value = value.unwrap_or(&Bson::Null);
    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals(Some(value), operand),
            "$ne" => !equals(Some(value), operand),
            "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(value, operand, |o| o != Ordering::Less),
            "$lt" => ordered(value, operand, |o| o == Ordering::Less),
            "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
            "$in" | "$nin" => {
                let Bson::Array(candidates) = operand else {
                    return Err(invalid_argument(operator, "expected an array"));
                };
                let found = candidates.iter().any(|c| equals(Some(value), c));
                found == (operator == "$in")
            }
            "$not" => !field_matches(Some(value), operand)?,
            "$exists" => is_truthy(operand) != matches!(value, Bson::Null),
            "$regex" => {
                let pattern = match operand {
                    Bson::String(s) => s.clone(),
                    Bson::RegularExpression(r) => r.pattern.clone(),
                    _ => return Err(invalid_argument(operator, "expected a pattern")),
                };
                let options = match operators.get("$options") {
                    Some(Bson::String(s)) => s.clone(),
                    _ => String::new(),
                };
                let regex = RegexBuilder::new(&pattern)
                    .case_insensitive(options.contains('i'))
                    .build()
                    .map_err(|e| Error::InvalidRegex(e.to_string()))?;
                matches!(value, Bson::String(s) if regex.is_match(s))
            }
            "$options" => true,
            other => return Err(Error::UnsupportedOperator(other.to_string())),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A null target also matches a missing field.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None | Some(Bson::Null), Bson::Null) => true,
        (Some(value), target) => bson_eq(value, target),
        (None, _) => false,
    }
}

fn ordered(value: &Bson, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    type_rank(value) == type_rank(operand) && accept(compare_bson(value, operand))
}
