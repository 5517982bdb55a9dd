use super::{invalid_argument, Error, Result, Variables};
use crate::compare::{bson_eq, compare_bson, is_numeric, is_truthy, numeric_to_double, numeric_to_i64};
use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Follows a dotted path through nested documents.
pub fn get_path<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(nested) => nested.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluates aggregation expressions against one document. A missing field
/// evaluates to `Bson::Undefined`, which like the server's missing value is
/// not equal to null and orders below it.
pub struct ExpressionEvaluator<'a> {
    document: &'a Document,
    variables: &'a Variables,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(document: &'a Document, variables: &'a Variables) -> Self {
        ExpressionEvaluator {
            document,
            variables,
        }
    }

    pub fn evaluate(&self, expression: &Bson) -> Result<Bson> {
        match expression {
            Bson::String(s) if s.starts_with("$$") => Ok(self.variable(&s[2..])),
            Bson::String(s) if s.starts_with('$') => {
                Ok(get_path(self.document, &s[1..]).cloned().unwrap_or(Bson::Undefined))
            }
            // Missing array elements become null.
            Bson::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|i| self.evaluate(i).map(present_or_null))
                    .collect::<Result<_>>()?,
            )),
            Bson::Document(d) => match d.iter().next() {
                Some((operator, argument)) if d.len() == 1 && operator.starts_with('$') => {
                    self.operator(operator, argument)
                }
                _ => {
                    let mut output = Document::new();
                    for (field, value) in d {
                        match self.evaluate(value)? {
                            Bson::Undefined => {}
                            value => {
                                output.insert(field.clone(), value);
                            }
                        }
                    }
                    Ok(Bson::Document(output))
                }
            },
            literal => Ok(literal.clone()),
        }
    }

    fn variable(&self, reference: &str) -> Bson {
        let (name, path) = match reference.split_once('.') {
            Some((name, path)) => (name, Some(path)),
            None => (reference, None),
        };
        let value = match name {
            "ROOT" | "CURRENT" => Some(Bson::Document(self.document.clone())),
            _ => self.variables.get(name).cloned(),
        };
        match (value, path) {
            (Some(Bson::Document(d)), Some(path)) => {
                get_path(&d, path).cloned().unwrap_or(Bson::Undefined)
            }
            (Some(value), None) => value,
            _ => Bson::Undefined,
        }
    }

    fn arguments(&self, argument: &Bson) -> Result<Vec<Bson>> {
        match argument {
            Bson::Array(items) => items.iter().map(|i| self.evaluate(i)).collect(),
            single => Ok(vec![self.evaluate(single)?]),
        }
    }

    fn exactly<const N: usize>(&self, operator: &str, argument: &Bson) -> Result<[Bson; N]> {
        self.arguments(argument)?
            .try_into()
            .map_err(|_| invalid_argument(operator, format!("expected {N} argument(s)")))
    }

    fn operator(&self, operator: &str, argument: &Bson) -> Result<Bson> {
        Ok(match operator {
            "$literal" => argument.clone(),
            "$and" => {
                for operand in unevaluated(argument) {
                    if !is_truthy(&self.evaluate(operand)?) {
                        return Ok(Bson::Boolean(false));
                    }
                }
                Bson::Boolean(true)
            }
            "$or" => {
                for operand in unevaluated(argument) {
                    if is_truthy(&self.evaluate(operand)?) {
                        return Ok(Bson::Boolean(true));
                    }
                }
                Bson::Boolean(false)
            }
            "$not" => {
                let [value] = self.exactly(operator, argument)?;
                Bson::Boolean(!is_truthy(&value))
            }
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$cmp" => {
                let [left, right] = self.exactly(operator, argument)?;
                let ordering = compare_bson(&left, &right);
                match operator {
                    "$cmp" => Bson::Int32(ordering as i32),
                    "$eq" => Bson::Boolean(ordering == Ordering::Equal),
                    "$ne" => Bson::Boolean(ordering != Ordering::Equal),
                    "$gt" => Bson::Boolean(ordering == Ordering::Greater),
                    "$gte" => Bson::Boolean(ordering != Ordering::Less),
                    "$lt" => Bson::Boolean(ordering == Ordering::Less),
                    _ => Bson::Boolean(ordering != Ordering::Greater),
                }
            }
            "$in" => {
                let [value, candidates] = self.exactly(operator, argument)?;
                match candidates {
                    Bson::Array(items) => Bson::Boolean(items.iter().any(|c| bson_eq(c, &value))),
                    _ => return Err(invalid_argument(operator, "second argument must be an array")),
                }
            }
            "$add" | "$multiply" => {
                let operands = self.arguments(argument)?;
                arithmetic(operator, &operands)?
            }
            "$subtract" | "$divide" | "$mod" => {
                let operands: [Bson; 2] = self.exactly(operator, argument)?;
                arithmetic(operator, &operands)?
            }
            "$abs" | "$floor" | "$ceil" | "$trunc" => {
                let [value] = self.exactly(operator, argument)?;
                rounding(operator, &value)
            }
            "$toLower" | "$toUpper" => {
                let [value] = self.exactly(operator, argument)?;
                let text = text_of(&value);
                Bson::String(if operator == "$toLower" {
                    text.to_lowercase()
                } else {
                    text.to_uppercase()
                })
            }
            "$toString" => {
                let [value] = self.exactly(operator, argument)?;
                match value {
                    Bson::Null | Bson::Undefined => Bson::Null,
                    other => Bson::String(text_of(&other)),
                }
            }
            "$concat" => {
                let mut output = String::new();
                for value in self.arguments(argument)? {
                    match value {
                        Bson::String(s) => output.push_str(&s),
                        Bson::Null | Bson::Undefined => return Ok(Bson::Null),
                        _ => return Err(invalid_argument(operator, "only strings concatenate")),
                    }
                }
                Bson::String(output)
            }
            "$strLenCP" => {
                let [value] = self.exactly(operator, argument)?;
                match value {
                    Bson::String(s) => Bson::Int32(s.chars().count() as i32),
                    _ => return Err(invalid_argument(operator, "argument must be a string")),
                }
            }
            "$substrCP" => {
                let [value, start, length] = self.exactly(operator, argument)?;
                let start = index_of(operator, &start)?;
                let length = index_of(operator, &length)?;
                Bson::String(text_of(&value).chars().skip(start).take(length).collect())
            }
            "$trim" | "$ltrim" | "$rtrim" => self.trim(operator, argument)?,
            "$ifNull" => {
                let operands = self.arguments(argument)?;
                let last = operands.len().saturating_sub(1);
                operands
                    .iter()
                    .take(last)
                    .find(|v| !matches!(v, Bson::Null | Bson::Undefined))
                    .or(operands.last())
                    .cloned()
                    .unwrap_or(Bson::Null)
            }
            "$cond" => {
                let (condition, then, otherwise) = match argument {
                    Bson::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                    Bson::Document(d) => match (d.get("if"), d.get("then"), d.get("else")) {
                        (Some(i), Some(t), Some(e)) => (i, t, e),
                        _ => return Err(invalid_argument(operator, "needs if, then and else")),
                    },
                    _ => return Err(invalid_argument(operator, "needs three arguments")),
                };
                if is_truthy(&self.evaluate(condition)?) {
                    self.evaluate(then)?
                } else {
                    self.evaluate(otherwise)?
                }
            }
            "$regexMatch" => self.regex_match(argument)?,
            "$toInt" | "$toLong" => {
                let [value] = self.exactly(operator, argument)?;
                match converted_integer(&value) {
                    None => Bson::Null,
                    Some(i) if operator == "$toInt" => Bson::Int32(i as i32),
                    Some(i) => Bson::Int64(i),
                }
            }
            "$toDouble" => {
                let [value] = self.exactly(operator, argument)?;
                match value {
                    Bson::String(s) => s.trim().parse().map(Bson::Double).unwrap_or(Bson::Null),
                    Bson::Boolean(b) => Bson::Double(if b { 1.0 } else { 0.0 }),
                    other => numeric_to_double(&other).map_or(Bson::Null, Bson::Double),
                }
            }
            other => return Err(Error::UnsupportedOperator(other.to_string())),
        })
    }

    fn trim(&self, operator: &str, argument: &Bson) -> Result<Bson> {
        let spec = match argument {
            Bson::Document(d) => d,
            _ => return Err(invalid_argument(operator, "argument must be a document")),
        };
        let input = match spec.get("input") {
            Some(input) => self.evaluate(input)?,
            None => return Err(invalid_argument(operator, "missing input")),
        };
        let Bson::String(input) = input else {
            return Ok(Bson::Null);
        };
        let chars: Vec<char> = match spec.get("chars") {
            Some(chars) => text_of(&self.evaluate(chars)?).chars().collect(),
            None => vec![' ', '\t', '\n', '\r'],
        };
        let trimmed = match operator {
            "$ltrim" => input.trim_start_matches(chars.as_slice()),
            "$rtrim" => input.trim_end_matches(chars.as_slice()),
            _ => input.trim_matches(chars.as_slice()),
        };
        Ok(Bson::String(trimmed.to_string()))
    }

    fn regex_match(&self, argument: &Bson) -> Result<Bson> {
        let spec = match argument {
            Bson::Document(d) => d,
            _ => return Err(invalid_argument("$regexMatch", "argument must be a document")),
        };
        let field = |name: &str| -> Result<Bson> {
            spec.get(name)
                .map(|v| self.evaluate(v))
                .transpose()
                .map(|v| v.unwrap_or(Bson::Null))
        };
        let input = match field("input")? {
            Bson::String(s) => s,
            Bson::Null | Bson::Undefined => return Ok(Bson::Boolean(false)),
            _ => return Err(invalid_argument("$regexMatch", "input must be a string")),
        };
        let pattern = match field("regex")? {
            Bson::String(s) => s,
            _ => return Err(invalid_argument("$regexMatch", "regex must be a string")),
        };
        let options = text_of(&field("options")?);
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(options.contains('i'))
            .multi_line(options.contains('m'))
            .dot_matches_new_line(options.contains('s'))
            .build()
            .map_err(|e| Error::InvalidRegex(e.to_string()))?;
        Ok(Bson::Boolean(regex.is_match(&input)))
    }
}

/// `$and`/`$or` short-circuit, so their operands are evaluated lazily.
fn unevaluated(argument: &Bson) -> Vec<&Bson> {
    match argument {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

pub(super) fn present_or_null(value: Bson) -> Bson {
    match value {
        Bson::Undefined => Bson::Null,
        value => value,
    }
}

fn text_of(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Null | Bson::Undefined => String::new(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(d) => d.to_string(),
        other => other.to_string(),
    }
}

fn index_of(operator: &str, value: &Bson) -> Result<usize> {
    numeric_to_i64(value)
        .filter(|n| *n >= 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .ok_or_else(|| invalid_argument(operator, "expected a non-negative index"))
}

fn converted_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::String(s) => s.trim().parse().ok(),
        Bson::Boolean(b) => Some(i64::from(*b)),
        other => numeric_to_i64(other),
    }
}

/// Integer arithmetic stays integral (Int32 while it fits); anything with a
/// double or decimal operand is computed in doubles. A null operand makes
/// the result null.
fn arithmetic(operator: &str, operands: &[Bson]) -> Result<Bson> {
    if operands.iter().any(|o| matches!(o, Bson::Null | Bson::Undefined)) {
        return Ok(Bson::Null);
    }
    if let Some(bad) = operands.iter().find(|o| !is_numeric(o)) {
        return Err(invalid_argument(operator, format!("non-numeric operand {bad}")));
    }
    let integral = operands
        .iter()
        .all(|o| matches!(o, Bson::Int32(_) | Bson::Int64(_)));
    if integral && operator != "$divide" {
        let values = operands.iter().filter_map(numeric_to_i64);
        let result = match operator {
            "$add" => values.fold(Some(0_i64), |acc, v| acc?.checked_add(v)),
            "$multiply" => values.fold(Some(1_i64), |acc, v| acc?.checked_mul(v)),
            "$subtract" => {
                let v = values.collect::<Vec<_>>();
                v[0].checked_sub(v[1])
            }
            _ => {
                let v = values.collect::<Vec<_>>();
                if v[1] == 0 {
                    return Err(invalid_argument(operator, "division by zero"));
                }
                v[0].checked_rem(v[1])
            }
        };
        let result =
            result.ok_or_else(|| invalid_argument(operator, "integer overflow"))?;
        let all_int32 = operands.iter().all(|o| matches!(o, Bson::Int32(_)));
        return Ok(match i32::try_from(result) {
            Ok(small) if all_int32 => Bson::Int32(small),
            _ => Bson::Int64(result),
        });
    }
    let values = operands
        .iter()
        .filter_map(numeric_to_double)
        .collect::<Vec<_>>();
    Ok(Bson::Double(match operator {
        "$add" => values.iter().sum(),
        "$multiply" => values.iter().product(),
        "$subtract" => values[0] - values[1],
        "$divide" => {
            if values[1] == 0.0 {
                return Err(invalid_argument(operator, "division by zero"));
            }
            values[0] / values[1]
        }
        _ => values[0] % values[1],
    }))
}

fn rounding(operator: &str, value: &Bson) -> Bson {
    match value {
        Bson::Int32(i) if operator == "$abs" => Bson::Int32(i.wrapping_abs()),
        Bson::Int64(i) if operator == "$abs" => Bson::Int64(i.wrapping_abs()),
        Bson::Int32(_) | Bson::Int64(_) => value.clone(),
        other => match numeric_to_double(other) {
            Some(d) => Bson::Double(match operator {
                "$abs" => d.abs(),
                "$floor" => d.floor(),
                "$ceil" => d.ceil(),
                _ => d.trunc(),
            }),
            None => Bson::Null,
        },
    }
}
