//! Compiles IR predicates and scalar expressions into MongoDB filters and
//! aggregation expressions.
//!
//! A predicate becomes a native filter when every comparison in it is a
//! plain field against a constant. Anything else, including any reference to
//! a correlation variable, is compiled as an aggregation expression and
//! wrapped in `$expr`.
mod filter;
mod functions;
mod like;
mod typed;

pub use like::{escape_regex_literal, like_to_regex};
pub use typed::TypedExpression;

use crate::{
    ir::{
        AggregateKind, AggregateRef, Between, Binary, BinaryOp, Constant, Expression, Group,
        GroupOp, In, Unary, UnaryOp,
    },
    options::TranslateOptions,
    scope::ExpressionScope,
    translator::GroupMapping,
};
use bson::{bson, doc, spec::BinarySubtype, Binary as BsonBinary, Bson, Document};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{function} expects {expected} argument(s), found {found}")]
    InvalidArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("custom function '{0}' is not supported")]
    UnsupportedCustomFunction(String),
    #[error("pattern must be a string constant, found {0:?}")]
    NonConstantPattern(Box<Expression>),
    #[error("'{0}' is not a valid decimal constant")]
    InvalidDecimal(String),
    #[error("aggregate used outside of a grouping: {0:?}")]
    AggregateOutsideGrouping(Box<AggregateRef>),
    #[error("subquery referenced before it was planned: {0:?}")]
    UnplannedSubquery(Box<AggregateRef>),
}

impl Error {
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedCustomFunction(_) | Error::NonConstantPattern(_)
        )
    }
}

/// Compiles expressions against one scope. With a group mapping attached,
/// grouped expressions and aggregates resolve to the outputs of the
/// `$group` stage.
#[derive(Clone, Copy)]
pub struct CriteriaTranslator<'a> {
    scope: &'a ExpressionScope,
    group: Option<&'a GroupMapping>,
    options: TranslateOptions,
}

impl<'a> CriteriaTranslator<'a> {
    pub fn new(scope: &'a ExpressionScope, options: TranslateOptions) -> Self {
        CriteriaTranslator {
            scope,
            group: None,
            options,
        }
    }

    pub fn with_group(self, group: &'a GroupMapping) -> Self {
        CriteriaTranslator {
            group: Some(group),
            ..self
        }
    }

    /// Compiles `predicate` into the body of a `$match` stage.
    pub fn compile_filter(&self, predicate: &Expression) -> Result<Document> {
        match self.native_filter(predicate)? {
            Some(filter) => Ok(filter),
            None => Ok(doc! {"$expr": self.compile_expression(predicate)?.into_bson()}),
        }
    }

    pub fn compile_expression(&self, expression: &Expression) -> Result<TypedExpression> {
        if let Some(grouped) = self.resolve_grouped(expression) {
            return Ok(grouped);
        }
        match expression {
            Expression::Column(column) => Ok(TypedExpression::Field(self.scope.resolve_column(column))),
            Expression::Property(name) => Ok(TypedExpression::Field(self.scope.resolve_property(name))),
            Expression::Constant(constant) => Ok(TypedExpression::Constant(compile_constant(constant)?)),
            Expression::Unary(unary) => self.compile_unary(unary),
            Expression::Binary(binary) => self.compile_binary(binary),
            Expression::Between(between) => self.compile_between(between),
            Expression::In(in_list) => self.compile_in(in_list),
            Expression::Group(group) => self.compile_group(group),
            Expression::Function(call) => self.compile_function(&call.function, &call.arguments),
            Expression::Aggregate(aggregate) => self.compile_aggregate(aggregate),
        }
    }

    fn compile_bson(&self, expression: &Expression) -> Result<Bson> {
        Ok(self.compile_expression(expression)?.into_bson())
    }

    fn compile_all(&self, expressions: &[Expression]) -> Result<Vec<Bson>> {
        expressions.iter().map(|e| self.compile_bson(e)).collect()
    }

    /// Looks the expression up in the attached group mapping, if any.
    fn resolve_grouped(&self, expression: &Expression) -> Option<TypedExpression> {
        let group = self.group?;
        if matches!(expression, Expression::Constant(_)) {
            return None;
        }
        let signature = expression.signature();
        if let Some(alias) = group.key_alias(&signature) {
            return Some(TypedExpression::Field(format!("$_id.{alias}")));
        }
        let aggregate = group.aggregate(&signature)?;
        let field = format!("${}", aggregate.alias);
        Some(match aggregate.kind() {
            AggregateKind::Exists => TypedExpression::Computed(bson!({ "$gt": [field, 0] })),
            _ => TypedExpression::Field(field),
        })
    }

    fn compile_unary(&self, unary: &Unary) -> Result<TypedExpression> {
        if unary.op == UnaryOp::Not {
            if let Some(complement) = complement(&unary.operand) {
                return self.compile_expression(&complement);
            }
        }
        let operand = self.compile_expression(&unary.operand)?;
        Ok(match unary.op {
            UnaryOp::Plus => operand,
            UnaryOp::Not => TypedExpression::Computed(bson!({ "$not": [operand.into_bson()] })),
            UnaryOp::Minus => {
                TypedExpression::Computed(bson!({ "$multiply": [-1, operand.into_bson()] }))
            }
            UnaryOp::BitwiseNot => TypedExpression::Computed(bson!({ "$bitNot": operand.into_bson() })),
            UnaryOp::IsNull => TypedExpression::Computed(is_null(operand.into_bson())),
        })
    }

    fn compile_binary(&self, binary: &Binary) -> Result<TypedExpression> {
        match binary.op {
            BinaryOp::Like => {
                let input = self.compile_bson(&binary.left)?;
                let regex = like_to_regex(&self.pattern_text(&binary.right)?);
                Ok(TypedExpression::Computed(self.regex_match(input, regex)))
            }
            op => {
                let left = self.compile_expression(&binary.left)?;
                let right = self.compile_expression(&binary.right)?;
                Ok(TypedExpression::Computed(if op.is_comparison() {
                    compare(op, left, right)
                } else {
                    bson!({ binary_operator(op): [left.into_bson(), right.into_bson()] })
                }))
            }
        }
    }

    fn compile_between(&self, between: &Between) -> Result<TypedExpression> {
        let test = self.compile_expression(&between.test)?;
        let begin = self.compile_expression(&between.begin)?;
        let end = self.compile_expression(&between.end)?;
        Ok(TypedExpression::Computed(bson!({
            "$and": [
                compare(BinaryOp::GreaterOrEqual, test.clone(), begin),
                compare(BinaryOp::LessOrEqual, test, end),
            ]
        })))
    }

    fn compile_in(&self, in_list: &In) -> Result<TypedExpression> {
        let left = self.compile_bson(&in_list.left)?;
        let candidates = self.compile_all(&in_list.candidates)?;
        Ok(TypedExpression::Computed(bson!({ "$in": [left, candidates] })))
    }

    fn compile_group(&self, group: &Group) -> Result<TypedExpression> {
        let operands = self.compile_all(&group.operands)?;
        Ok(TypedExpression::Computed(bson!({ group_operator(group.op): operands })))
    }

    fn compile_aggregate(&self, aggregate: &AggregateRef) -> Result<TypedExpression> {
        if aggregate.statement.is_none() {
            return Err(Error::AggregateOutsideGrouping(Box::new(aggregate.clone())));
        }
        let signature = Expression::Aggregate(Box::new(aggregate.clone())).signature();
        self.scope
            .resolve_subquery(&signature)
            .map(TypedExpression::Field)
            .ok_or_else(|| Error::UnplannedSubquery(Box::new(aggregate.clone())))
    }

    /// Builds `$regexMatch`, case-insensitive unless the options say
    /// otherwise.
    fn regex_match(&self, input: Bson, regex: String) -> Bson {
        let mut body = doc! {"input": input, "regex": regex};
        if !self.options.is_case_sensitive() {
            body.insert("options", "i");
        }
        bson!({ "$regexMatch": body })
    }

    /// The text of a pattern argument. Null patterns are empty.
    fn pattern_text(&self, pattern: &Expression) -> Result<String> {
        match self.compile_expression(pattern)? {
            TypedExpression::Constant(value) => match value {
                Bson::Null => Ok(String::new()),
                Bson::String(s) => Ok(s),
                Bson::Int32(i) => Ok(i.to_string()),
                Bson::Int64(l) => Ok(l.to_string()),
                Bson::Double(d) => Ok(d.to_string()),
                _ => Err(Error::NonConstantPattern(Box::new(pattern.clone()))),
            },
            _ => Err(Error::NonConstantPattern(Box::new(pattern.clone()))),
        }
    }
}

fn group_operator(op: GroupOp) -> &'static str {
    match op {
        GroupOp::And => "$and",
        GroupOp::Or => "$or",
    }
}

fn binary_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "$add",
        BinaryOp::Subtract => "$subtract",
        BinaryOp::Multiply => "$multiply",
        BinaryOp::Divide => "$divide",
        BinaryOp::Modulo => "$mod",
        BinaryOp::BitwiseAnd => "$bitAnd",
        BinaryOp::BitwiseOr => "$bitOr",
        BinaryOp::BitwiseXor => "$bitXor",
        BinaryOp::Equal => "$eq",
        BinaryOp::NotEqual => "$ne",
        BinaryOp::Less => "$lt",
        BinaryOp::LessOrEqual => "$lte",
        BinaryOp::Greater => "$gt",
        BinaryOp::GreaterOrEqual => "$gte",
        BinaryOp::Like => "$regexMatch",
    }
}

fn requires_null_guard(operator: &str) -> bool {
    matches!(operator, "$lt" | "$lte" | "$gt" | "$gte")
}

/// True only for values that are neither null nor missing. Missing orders
/// below null, so `$ne: null` would let absent fields through.
fn present(value: Bson) -> Bson {
    bson!({ "$gt": [value, Bson::Null] })
}

/// True for null and for missing fields alike.
fn is_null(value: Bson) -> Bson {
    bson!({ "$eq": [{ "$ifNull": [value, Bson::Null] }, Bson::Null] })
}

/// The negation of `predicate` as a predicate of its own, where NULL
/// operands still match nothing: inequalities flip their operator and keep
/// their guards, BETWEEN becomes an OR of the two outer ranges and a double
/// NOT cancels.
fn complement(predicate: &Expression) -> Option<Expression> {
    match predicate {
        Expression::Unary(Unary {
            op: UnaryOp::Not,
            operand,
        }) => Some((**operand).clone()),
        Expression::Binary(binary) => binary.op.complement().map(|op| {
            Expression::binary(op, (*binary.left).clone(), (*binary.right).clone())
        }),
        Expression::Between(between) => Some(Expression::or(vec![
            Expression::binary(
                BinaryOp::Less,
                (*between.test).clone(),
                (*between.begin).clone(),
            ),
            Expression::binary(
                BinaryOp::Greater,
                (*between.test).clone(),
                (*between.end).clone(),
            ),
        ])),
        _ => None,
    }
}

/// Builds a comparison expression. Inequalities involving fields are
/// conjoined with a presence guard per field, since aggregation comparisons
/// order null and missing below every value instead of failing.
fn compare(op: BinaryOp, left: TypedExpression, right: TypedExpression) -> Bson {
    let operator = binary_operator(op);
    let guards: Vec<Bson> = if requires_null_guard(operator) {
        [&left, &right]
            .into_iter()
            .filter(|e| e.is_field())
            .map(|e| present(e.clone().into_bson()))
            .collect()
    } else {
        vec![]
    };
    let comparison = bson!({ operator: [left.into_bson(), right.into_bson()] });
    if guards.is_empty() {
        return comparison;
    }
    let mut clauses = vec![comparison];
    clauses.extend(guards);
    bson!({ "$and": clauses })
}

fn compile_constant(constant: &Constant) -> Result<Bson> {
    Ok(match constant {
        Constant::Null => Bson::Null,
        Constant::Boolean(b) => Bson::Boolean(*b),
        Constant::Int32(i) => Bson::Int32(*i),
        Constant::Int64(l) => Bson::Int64(*l),
        Constant::Double(d) => Bson::Double(*d),
        Constant::Decimal(text) => Bson::Decimal128(
            text.parse()
                .map_err(|_| Error::InvalidDecimal(text.clone()))?,
        ),
        Constant::String(s) => Bson::String(s.clone()),
        Constant::DateTime(dt) => Bson::DateTime(*dt),
        Constant::Guid(uuid) => Bson::Binary(BsonBinary::from_uuid(*uuid)),
        Constant::Bytes(bytes) => Bson::Binary(BsonBinary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
    })
}
