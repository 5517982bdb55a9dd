//! Drives the translation of one statement: joins, correlated subqueries,
//! filtering, grouping, having, projection, sorting and paging, in that
//! pipeline order.
mod grouping;
mod joins;
mod projection;
mod references;
mod subqueries;

pub(crate) use grouping::GroupMapping;
pub(crate) use projection::output_aliases;

use crate::{
    alias_registry::AliasRegistry,
    criteria::{self, CriteriaTranslator},
    ir::{AggregateKind, Statement},
    options::TranslateOptions,
    plan::{AggregationPlan, StageKind},
    scope::{CorrelationBindings, ExpressionScope},
};
use bson::Bson;
use projection::Projection;
use subqueries::SubqueryPlanner;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("aggregate {0:?} requires a target expression")]
    MissingAggregateTarget(AggregateKind),
    #[error("aggregate '{0}' is not supported")]
    UnsupportedAggregate(String),
    #[error(transparent)]
    Criteria(#[from] criteria::Error),
}

impl Error {
    pub fn is_unsupported(&self) -> bool {
        match self {
            Error::MissingAggregateTarget(_) => false,
            Error::UnsupportedAggregate(_) => true,
            Error::Criteria(e) => e.is_unsupported(),
        }
    }
}

/// The state one statement was compiled in. Correlated subqueries appear as
/// child contexts under their `SubAgg{n}` alias.
#[derive(PartialEq, Debug, Clone)]
pub struct TranslationContext {
    collection: String,
    scope: ExpressionScope,
    group: GroupMapping,
    output_aliases: Vec<String>,
    children: Vec<(String, TranslationContext)>,
}

impl TranslationContext {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Registered aliases and their paths in the working document.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.scope
            .aliases()
            .aliases()
            .map(|(alias, path)| (alias, path.as_str()))
    }

    /// The `let` variables this statement's pipeline was given.
    pub fn correlation_variables(&self) -> impl Iterator<Item = (&str, &Bson)> {
        self.scope
            .correlations()
            .iter()
            .map(|binding| (binding.name.as_str(), &binding.value))
    }

    pub fn group_mapping(&self) -> &GroupMapping {
        &self.group
    }

    pub fn output_aliases(&self) -> &[String] {
        &self.output_aliases
    }

    pub fn subqueries(&self) -> impl Iterator<Item = (&str, &TranslationContext)> {
        self.children
            .iter()
            .map(|(alias, context)| (alias.as_str(), context))
    }
}

pub(crate) struct StatementTranslator<'a> {
    statement: &'a Statement,
    options: TranslateOptions,
    scope: ExpressionScope,
    plan: AggregationPlan,
    children: Vec<(String, TranslationContext)>,
}

impl<'a> StatementTranslator<'a> {
    pub fn for_statement(statement: &'a Statement, options: TranslateOptions) -> Self {
        Self::with_correlations(statement, options, CorrelationBindings::new())
    }

    /// A translator for a statement nested in a lookup, where `correlations`
    /// are the lookup's `let` variables.
    fn with_correlations(
        statement: &'a Statement,
        options: TranslateOptions,
        correlations: CorrelationBindings,
    ) -> Self {
        let aliases = AliasRegistry::new(statement.alias.as_deref(), &statement.table);
        StatementTranslator {
            statement,
            options,
            scope: ExpressionScope::with_correlations(aliases, correlations),
            plan: AggregationPlan::new(statement.table.clone()),
            children: vec![],
        }
    }

    pub fn translate(mut self) -> Result<(AggregationPlan, TranslationContext)> {
        let statement = self.statement;
        let group = self.translate_source()?;

        let translator = CriteriaTranslator::new(&self.scope, self.options).with_group(&group);
        let projection = Projection::build(statement, &translator, &group)?;
        self.plan.add_stage(StageKind::Project, projection.stage);
        if let Some(sort) = projection.sort {
            self.plan.add_stage(StageKind::Sort, sort);
        }
        if let Some(final_stage) = projection.final_stage {
            self.plan.add_stage(StageKind::Project, final_stage);
        }
        if let Some(skip) = statement.skip.filter(|n| *n > 0) {
            self.plan.add_stage(StageKind::Skip, paging_value(skip));
        }
        if let Some(limit) = statement.limit.filter(|n| *n > 0) {
            self.plan.add_stage(StageKind::Limit, paging_value(limit));
        }
        Ok(self.into_context(group, projection.output_aliases))
    }

    /// Emits every stage up to and including the having filter and returns
    /// the grouping the remaining stages must resolve against.
    fn translate_source(&mut self) -> Result<GroupMapping> {
        let statement = self.statement;
        for node in &statement.joins {
            self.compile_join(node)?;
        }

        SubqueryPlanner::new(
            &mut self.scope,
            &mut self.plan,
            &mut self.children,
            self.options,
        )
        .plan_all(statement.expressions())?;

        let translator = CriteriaTranslator::new(&self.scope, self.options);
        if let Some(condition) = &statement.condition {
            self.plan
                .add_stage(StageKind::Match, translator.compile_filter(condition)?);
        }

        let group = GroupMapping::collect(statement);
        if let Some(stage) = group.group_stage(&translator)? {
            self.plan.add_stage(StageKind::Group, stage);
        }

        if let Some(having) = &statement.having {
            let filter = translator.with_group(&group).compile_filter(having)?;
            self.plan.add_stage(StageKind::Match, filter);
        }
        Ok(group)
    }

    fn into_context(
        self,
        group: GroupMapping,
        output_aliases: Vec<String>,
    ) -> (AggregationPlan, TranslationContext) {
        let context = TranslationContext {
            collection: self.plan.collection.clone(),
            scope: self.scope,
            group,
            output_aliases,
            children: self.children,
        };
        (self.plan, context)
    }
}

fn paging_value(n: u64) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}
