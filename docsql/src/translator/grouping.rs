use super::{references, Error, Result};
use crate::{
    alias_registry::normalize_column_name,
    criteria::CriteriaTranslator,
    ir::{AggregateKind, AggregateRef, Expression, Function, Signature, Statement},
};
use bson::{bson, Bson, Document};
use linked_hash_map::LinkedHashMap;

#[derive(PartialEq, Debug, Clone)]
pub struct GroupKey {
    pub alias: String,
    pub expression: Expression,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupAggregate {
    pub alias: String,
    pub aggregate: AggregateRef,
}

impl GroupAggregate {
    pub fn kind(&self) -> &AggregateKind {
        &self.aggregate.kind
    }
}

/// The group keys and scope-local aggregates of one statement, each keyed
/// by structural signature and kept in discovery order.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct GroupMapping {
    keys: LinkedHashMap<Signature, GroupKey>,
    aggregates: LinkedHashMap<Signature, GroupAggregate>,
}

impl GroupMapping {
    /// Registers every group-by expression, then every aggregate found in the
    /// operands, the having clause and the sort keys.
    pub fn collect(statement: &Statement) -> Self {
        let mut mapping = GroupMapping::default();
        for (index, expression) in statement.group_by.iter().enumerate() {
            mapping.register_key(expression, index);
        }

        let mut found = vec![];
        statement
            .operands
            .iter()
            .map(|o| &o.expression)
            .chain(statement.having.iter())
            .chain(statement.sorts.iter().map(|s| &s.expression))
            .for_each(|e| references::local_aggregates(e, &mut found));
        for aggregate in found {
            mapping.register_aggregate(aggregate);
        }
        mapping
    }

    fn register_key(&mut self, expression: &Expression, index: usize) {
        let signature = expression.signature();
        if self.keys.contains_key(&signature) {
            return;
        }
        let alias = match key_alias(expression) {
            Some(alias) if !self.keys.values().any(|k| k.alias == alias) => alias,
            _ => format!("K{index}"),
        };
        self.keys.insert(
            signature,
            GroupKey {
                alias,
                expression: expression.clone(),
            },
        );
    }

    fn register_aggregate(&mut self, aggregate: &AggregateRef) {
        let signature = Expression::Aggregate(Box::new(aggregate.clone())).signature();
        if self.aggregates.contains_key(&signature) {
            return;
        }
        let alias = format!("Agg{}", self.aggregates.len());
        self.aggregates.insert(
            signature,
            GroupAggregate {
                alias,
                aggregate: aggregate.clone(),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.aggregates.is_empty()
    }

    pub fn key_alias(&self, signature: &Signature) -> Option<&str> {
        self.keys.get(signature).map(|k| k.alias.as_str())
    }

    pub fn aggregate(&self, signature: &Signature) -> Option<&GroupAggregate> {
        self.aggregates.get(signature)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.keys.values()
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &GroupAggregate> {
        self.aggregates.values()
    }

    /// The body of the `$group` stage, or `None` when nothing is grouped.
    /// Keys and accumulator inputs are compiled against the ungrouped
    /// document.
    pub fn group_stage(&self, translator: &CriteriaTranslator) -> Result<Option<Document>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut id = Document::new();
        for key in self.keys.values() {
            id.insert(key.alias.clone(), group_key_value(translator, &key.expression)?);
        }
        let mut body = Document::new();
        body.insert("_id", if id.is_empty() { Bson::Null } else { Bson::Document(id) });
        for aggregate in self.aggregates.values() {
            let input = aggregate
                .aggregate
                .target
                .as_ref()
                .map(|target| translator.compile_expression(target).map(|t| t.into_bson()))
                .transpose()?;
            body.insert(
                aggregate.alias.clone(),
                accumulator(aggregate.kind(), input)?,
            );
        }
        Ok(Some(body))
    }
}

/// Column keys are named after the column, with path separators flattened.
fn key_alias(expression: &Expression) -> Option<String> {
    match expression {
        Expression::Column(column) => {
            let alias = normalize_column_name(&column.name)
                .replace(['.', '!'], "_")
                .replace('\\', "");
            (!alias.is_empty()).then_some(alias)
        }
        _ => None,
    }
}

/// An integer cast used as a key groups on the truncated value.
fn group_key_value(translator: &CriteriaTranslator, expression: &Expression) -> Result<Bson> {
    if let Expression::Function(call) = expression {
        if let (Function::ToInt, Some(argument)) = (&call.function, call.arguments.first()) {
            let argument = translator.compile_expression(argument)?.into_bson();
            return Ok(bson!({ "$trunc": argument }));
        }
    }
    Ok(translator.compile_expression(expression)?.into_bson())
}

/// Count and Exists sum ones; every other kind needs an input expression.
pub(super) fn accumulator(kind: &AggregateKind, input: Option<Bson>) -> Result<Bson> {
    let operator = match kind {
        AggregateKind::Count | AggregateKind::Exists => return Ok(bson!({ "$sum": 1 })),
        AggregateKind::Sum => "$sum",
        AggregateKind::Avg => "$avg",
        AggregateKind::Min => "$min",
        AggregateKind::Max => "$max",
        AggregateKind::Custom(name) => return Err(Error::UnsupportedAggregate(name.clone())),
    };
    match input {
        Some(input) => Ok(bson!({ operator: input })),
        None => Err(Error::MissingAggregateTarget(kind.clone())),
    }
}
