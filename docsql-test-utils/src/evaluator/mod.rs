mod expression;
mod query;
#[cfg(test)]
mod test;

use crate::compare::{compare_bson, is_numeric, numeric_to_double, numeric_to_i64};
use bson::{Bson, Document};
use expression::{present_or_null, ExpressionEvaluator};
use std::{cmp::Ordering, collections::HashMap};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// `$$` variables in scope, without the `$$` prefix.
pub type Variables = HashMap<String, Bson>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("a stage must be a document with exactly one operator, found {0}")]
    MalformedStage(Document),
    #[error("stage {0} is not supported")]
    UnsupportedStage(String),
    #[error("operator {0} is not supported")]
    UnsupportedOperator(String),
    #[error("invalid argument to {operator}: {reason}")]
    InvalidArgument { operator: String, reason: String },
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
}

fn invalid_argument(operator: &str, reason: impl Into<String>) -> Error {
    Error::InvalidArgument {
        operator: operator.to_string(),
        reason: reason.into(),
    }
}

/// Named in-memory collections that pipelines run against.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: HashMap<String, Vec<Document>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.insert(name.to_string(), documents);
        self
    }

    /// Missing collections are empty.
    pub fn collection(&self, name: &str) -> &[Document] {
        self.collections.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        self.run_pipeline(
            self.collection(collection).to_vec(),
            pipeline,
            &Variables::new(),
        )
    }

    fn run_pipeline(
        &self,
        mut documents: Vec<Document>,
        pipeline: &[Document],
        variables: &Variables,
    ) -> Result<Vec<Document>> {
        for stage in pipeline {
            let (operator, body) = match stage.iter().next() {
                Some((operator, body)) if stage.len() == 1 => (operator.as_str(), body),
                _ => return Err(Error::MalformedStage(stage.clone())),
            };
            documents = match operator {
                "$match" => self.match_stage(documents, stage_document(operator, body)?, variables)?,
                "$lookup" => self.lookup_stage(documents, stage_document(operator, body)?, variables)?,
                "$unwind" => unwind_stage(documents, stage_document(operator, body)?)?,
                "$group" => group_stage(documents, stage_document(operator, body)?, variables)?,
                "$project" => project_stage(documents, stage_document(operator, body)?, variables)?,
                "$addFields" => add_fields_stage(documents, stage_document(operator, body)?, variables)?,
                "$sort" => sort_stage(documents, stage_document(operator, body)?),
                "$skip" => documents.into_iter().skip(count(operator, body)?).collect(),
                "$limit" => documents.into_iter().take(count(operator, body)?).collect(),
                other => return Err(Error::UnsupportedStage(other.to_string())),
            };
        }
        Ok(documents)
    }

    fn match_stage(
        &self,
        documents: Vec<Document>,
        filter: &Document,
        variables: &Variables,
    ) -> Result<Vec<Document>> {
        let mut matched = vec![];
        for document in documents {
            if query::matches(&document, filter, variables)? {
                matched.push(document);
            }
        }
        Ok(matched)
    }

    /// Only the `let` + `pipeline` form is modeled. The sub-pipeline sees the
    /// enclosing variables as well as its own.
    fn lookup_stage(
        &self,
        documents: Vec<Document>,
        body: &Document,
        variables: &Variables,
    ) -> Result<Vec<Document>> {
        let from = body
            .get_str("from")
            .map_err(|_| invalid_argument("$lookup", "'from' must be a string"))?;
        let alias = body
            .get_str("as")
            .map_err(|_| invalid_argument("$lookup", "'as' must be a string"))?;
        let pipeline = match body.get("pipeline") {
            Some(Bson::Array(stages)) => stages
                .iter()
                .map(|s| match s {
                    Bson::Document(d) => Ok(d.clone()),
                    _ => Err(invalid_argument("$lookup", "pipeline stages must be documents")),
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![],
            Some(_) => return Err(invalid_argument("$lookup", "'pipeline' must be an array")),
        };
        let lets = match body.get("let") {
            Some(Bson::Document(d)) => d.clone(),
            None => Document::new(),
            Some(_) => return Err(invalid_argument("$lookup", "'let' must be a document")),
        };

        let mut joined = Vec::with_capacity(documents.len());
        for mut document in documents {
            let mut inner = variables.clone();
            let evaluator = ExpressionEvaluator::new(&document, variables);
            for (name, value) in &lets {
                inner.insert(name.clone(), evaluator.evaluate(value)?);
            }
            let found = self.run_pipeline(self.collection(from).to_vec(), &pipeline, &inner)?;
            document.insert(alias, found.into_iter().map(Bson::Document).collect::<Vec<_>>());
            joined.push(document);
        }
        Ok(joined)
    }
}

fn stage_document<'b>(operator: &str, body: &'b Bson) -> Result<&'b Document> {
    match body {
        Bson::Document(d) => Ok(d),
        _ => Err(invalid_argument(operator, "stage body must be a document")),
    }
}

fn count(operator: &str, body: &Bson) -> Result<usize> {
    numeric_to_i64(body)
        .filter(|n| *n >= 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .ok_or_else(|| invalid_argument(operator, "expected a non-negative number"))
}

fn unwind_stage(documents: Vec<Document>, body: &Document) -> Result<Vec<Document>> {
    let path = body
        .get_str("path")
        .ok()
        .and_then(|p| p.strip_prefix('$'))
        .ok_or_else(|| invalid_argument("$unwind", "'path' must be a field path"))?;
    let preserve = body
        .get_bool("preserveNullAndEmptyArrays")
        .unwrap_or(false);

    let mut unwound = vec![];
    for document in documents {
        match document.get(path) {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items.clone() {
                    let mut copy = document.clone();
                    copy.insert(path, item);
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    let mut copy = document;
                    copy.remove(path);
                    unwound.push(copy);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

/// Groups keep the order in which their first document arrived.
fn group_stage(
    documents: Vec<Document>,
    body: &Document,
    variables: &Variables,
) -> Result<Vec<Document>> {
    let id_expression = body
        .get("_id")
        .ok_or_else(|| invalid_argument("$group", "missing '_id'"))?;
    let mut accumulators = vec![];
    for (field, spec) in body.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (operator, input) = match spec {
            Bson::Document(d) if d.len() == 1 => d
                .iter()
                .next()
                .ok_or_else(|| invalid_argument("$group", "empty accumulator"))?,
            _ => return Err(invalid_argument("$group", format!("bad accumulator for {field}"))),
        };
        accumulators.push((field.as_str(), operator.as_str(), input));
    }

    let mut groups: Vec<(Bson, Vec<Vec<Bson>>)> = vec![];
    for document in &documents {
        let evaluator = ExpressionEvaluator::new(document, variables);
        let key = present_or_null(evaluator.evaluate(id_expression)?);
        let inputs = accumulators
            .iter()
            .map(|(_, _, input)| evaluator.evaluate(input))
            .collect::<Result<Vec<_>>>()?;
        let position = groups
            .iter()
            .position(|(existing, _)| compare_bson(existing, &key) == Ordering::Equal);
        let values = match position {
            Some(i) => &mut groups[i].1,
            None => {
                groups.push((key, vec![vec![]; accumulators.len()]));
                let last = groups.len() - 1;
                &mut groups[last].1
            }
        };
        for (slot, input) in values.iter_mut().zip(inputs) {
            slot.push(input);
        }
    }

    groups
        .into_iter()
        .map(|(key, values)| {
            let mut output = Document::new();
            output.insert("_id", key);
            for ((field, operator, _), inputs) in accumulators.iter().zip(values) {
                output.insert(*field, accumulate(operator, inputs)?);
            }
            Ok(output)
        })
        .collect()
}

fn accumulate(operator: &str, inputs: Vec<Bson>) -> Result<Bson> {
    let numbers = || inputs.iter().filter(|b| is_numeric(b));
    Ok(match operator {
        "$sum" => {
            if numbers().all(|b| matches!(b, Bson::Int32(_) | Bson::Int64(_))) {
                let total: i64 = numbers().filter_map(numeric_to_i64).sum();
                match i32::try_from(total) {
                    Ok(small) if numbers().all(|b| matches!(b, Bson::Int32(_))) => Bson::Int32(small),
                    _ => Bson::Int64(total),
                }
            } else {
                Bson::Double(numbers().filter_map(numeric_to_double).sum())
            }
        }
        "$avg" => {
            let values = numbers().filter_map(numeric_to_double).collect::<Vec<_>>();
            if values.is_empty() {
                Bson::Null
            } else {
                Bson::Double(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        "$min" => extreme(&inputs, Ordering::Less),
        "$max" => extreme(&inputs, Ordering::Greater),
        "$first" => inputs.first().cloned().map_or(Bson::Null, present_or_null),
        other => return Err(Error::UnsupportedOperator(other.to_string())),
    })
}

/// Nulls are ignored; an all-null group yields null.
fn extreme(inputs: &[Bson], wanted: Ordering) -> Bson {
    inputs
        .iter()
        .filter(|b| !matches!(b, Bson::Null | Bson::Undefined))
        .fold(None::<&Bson>, |best, candidate| match best {
            Some(best) if compare_bson(candidate, best) != wanted => Some(best),
            _ => Some(candidate),
        })
        .cloned()
        .unwrap_or(Bson::Null)
}

fn is_flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => numeric_to_double(value).map(|d| d != 0.0),
        _ => None,
    }
}

/// Inclusion flags copy fields, `_id: 0` drops the id and everything else is
/// evaluated as an expression. Expressions that come out missing add no
/// field.
fn project_stage(
    documents: Vec<Document>,
    body: &Document,
    variables: &Variables,
) -> Result<Vec<Document>> {
    let keep_id = body.get("_id").and_then(is_flag).unwrap_or(true);
    documents
        .iter()
        .map(|document| {
            let evaluator = ExpressionEvaluator::new(document, variables);
            let mut output = Document::new();
            if keep_id && !body.contains_key("_id") {
                if let Some(id) = document.get("_id") {
                    output.insert("_id", id.clone());
                }
            }
            for (field, spec) in body {
                match is_flag(spec) {
                    Some(true) => {
                        if let Some(value) = expression::get_path(document, field) {
                            output.insert(field.clone(), value.clone());
                        }
                    }
                    Some(false) => {}
                    None => match evaluator.evaluate(spec)? {
                        Bson::Undefined => {}
                        value => {
                            output.insert(field.clone(), value);
                        }
                    },
                }
            }
            Ok(output)
        })
        .collect()
}

fn add_fields_stage(
    documents: Vec<Document>,
    body: &Document,
    variables: &Variables,
) -> Result<Vec<Document>> {
    documents
        .into_iter()
        .map(|mut document| {
            let mut added = Document::new();
            let evaluator = ExpressionEvaluator::new(&document, variables);
            for (field, spec) in body {
                match evaluator.evaluate(spec)? {
                    Bson::Undefined => {}
                    value => {
                        added.insert(field.clone(), value);
                    }
                }
            }
            for (field, value) in added {
                document.insert(field, value);
            }
            Ok(document)
        })
        .collect()
}

/// Stable, so ties keep their input order.
fn sort_stage(mut documents: Vec<Document>, body: &Document) -> Vec<Document> {
    let keys = body
        .iter()
        .map(|(field, direction)| {
            let descending = numeric_to_double(direction).is_some_and(|d| d < 0.0);
            (field.as_str(), descending)
        })
        .collect::<Vec<_>>();
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(field, descending)| {
                let left = expression::get_path(a, field).unwrap_or(&Bson::Null);
                let right = expression::get_path(b, field).unwrap_or(&Bson::Null);
                let ordering = compare_bson(left, right);
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    documents
}
