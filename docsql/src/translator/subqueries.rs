use super::{
    grouping::accumulator, references, references::OuterColumns, Error, Result,
    StatementTranslator, TranslationContext,
};
use crate::{
    criteria::CriteriaTranslator,
    ir::{AggregateKind, AggregateRef, Expression, Statement},
    options::TranslateOptions,
    plan::{AggregationPlan, StageKind},
    scope::{CorrelationBindings, ExpressionScope},
};
use bson::{bson, doc, Bson};
use log::trace;

/// Plans correlated subqueries against one scope. Each planned subquery adds
/// a lookup, an unwind and a default-filling `$addFields` to `plan`, after
/// which its result is the top-level field `SubAgg{n}`.
pub(super) struct SubqueryPlanner<'p> {
    scope: &'p mut ExpressionScope,
    plan: &'p mut AggregationPlan,
    children: &'p mut Vec<(String, TranslationContext)>,
    options: TranslateOptions,
}

impl<'p> SubqueryPlanner<'p> {
    pub fn new(
        scope: &'p mut ExpressionScope,
        plan: &'p mut AggregationPlan,
        children: &'p mut Vec<(String, TranslationContext)>,
        options: TranslateOptions,
    ) -> Self {
        SubqueryPlanner {
            scope,
            plan,
            children,
            options,
        }
    }

    pub fn plan_all<'e>(&mut self, expressions: impl IntoIterator<Item = &'e Expression>) -> Result<()> {
        let mut found = vec![];
        for expression in expressions {
            references::subqueries(expression, &mut found);
        }
        for (aggregate, statement) in found {
            self.ensure_lookup(aggregate, statement)?;
        }
        Ok(())
    }

    /// Plans the subquery unless a structurally equal one already was.
    fn ensure_lookup(&mut self, aggregate: &AggregateRef, statement: &Statement) -> Result<()> {
        let signature = Expression::Aggregate(Box::new(aggregate.clone())).signature();
        if self.scope.subquery_field(&signature).is_some() {
            return Ok(());
        }
        if let AggregateKind::Custom(name) = &aggregate.kind {
            return Err(Error::UnsupportedAggregate(name.clone()));
        }
        let alias = format!("SubAgg{}", self.scope.subquery_count());
        trace!("planning subquery on {} as {alias}", statement.table);

        let mut correlations = CorrelationBindings::new();
        for column in OuterColumns::of_subquery(aggregate, statement) {
            let value = self.scope.resolve_column(column);
            if let Some(outer_alias) = &column.alias {
                correlations.bind_column(outer_alias, &column.name, Bson::String(value));
            }
        }
        let let_document = correlations.let_document();

        let (pipeline, context) = nested_pipeline(aggregate, statement, correlations, self.options)?;

        let mut lookup = doc! {"from": statement.table.clone(), "as": alias.clone()};
        if let Some(let_document) = let_document {
            lookup.insert("let", let_document);
        }
        lookup.insert("pipeline", pipeline.pipeline());
        self.plan.add_stage(StageKind::Lookup, lookup);
        self.plan.add_stage(
            StageKind::Unwind,
            doc! {"path": format!("${alias}"), "preserveNullAndEmptyArrays": true},
        );
        self.plan.add_stage(
            StageKind::AddFields,
            doc! { alias.clone(): {"$ifNull": [format!("${alias}.value"), empty_value(&aggregate.kind)]} },
        );

        self.scope.register_subquery(signature, alias.clone());
        self.children.push((alias, context));
        Ok(())
    }
}

/// Translates the nested statement like any other and reduces it to a
/// single `{value}` document.
fn nested_pipeline(
    aggregate: &AggregateRef,
    statement: &Statement,
    correlations: CorrelationBindings,
    options: TranslateOptions,
) -> Result<(AggregationPlan, TranslationContext)> {
    let mut translator = StatementTranslator::with_correlations(statement, options, correlations);
    let group = translator.translate_source()?;

    let target = aggregate
        .target
        .as_ref()
        .or_else(|| statement.operands.first().map(|o| &o.expression));
    let input = match target {
        Some(target) => CriteriaTranslator::new(&translator.scope, options)
            .with_group(&group)
            .compile_expression(target)?
            .into_bson(),
        None => Bson::Int32(1),
    };
    translator.plan.add_stage(
        StageKind::Group,
        doc! {"_id": Bson::Null, "agg": accumulator(&aggregate.kind, Some(input))?},
    );
    let value = match aggregate.kind {
        AggregateKind::Exists => bson!({"$gt": ["$agg", 0]}),
        _ => Bson::String("$agg".to_string()),
    };
    translator.plan.add_stage(StageKind::Project, doc! {"value": value});
    Ok(translator.into_context(group, vec![]))
}

/// What a subquery yields when the lookup matched nothing.
fn empty_value(kind: &AggregateKind) -> Bson {
    match kind {
        AggregateKind::Count => Bson::Int32(0),
        AggregateKind::Exists => Bson::Boolean(false),
        _ => Bson::Null,
    }
}
