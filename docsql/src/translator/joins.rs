use super::{references::OuterColumns, subqueries::SubqueryPlanner, Result, StatementTranslator};
use crate::{
    alias_registry::AliasRegistry,
    criteria::CriteriaTranslator,
    ir::{JoinKind, JoinNode},
    plan::{AggregationPlan, StageKind},
    scope::{CorrelationBindings, ExpressionScope},
};
use bson::{doc, Bson};
use log::trace;

impl StatementTranslator<'_> {
    /// Emits `$lookup` + `$unwind` for `node`, then for its children. The
    /// joined document lands under the join alias, which is registered
    /// before the children so their conditions can reference it.
    pub(super) fn compile_join(&mut self, node: &JoinNode) -> Result<()> {
        let alias = join_alias(node, self.plan.stages.len());
        trace!("joining {} as {alias}", node.table);

        let mut correlations = CorrelationBindings::new();
        if let Some(condition) = &node.condition {
            for column in OuterColumns::of_expression(condition) {
                let Some(outer_alias) = column.alias.as_deref() else {
                    continue;
                };
                if outer_alias.to_lowercase() == alias.to_lowercase()
                    || !self.scope.aliases().contains(Some(outer_alias))
                {
                    continue;
                }
                let value = self.scope.resolve_column(column);
                correlations.bind_column(outer_alias, &column.name, Bson::String(value));
            }
        }
        let let_document = correlations.let_document();

        // The condition runs inside the joined collection, so its own fields
        // resolve from the root there.
        let mut scope = ExpressionScope::with_correlations(
            AliasRegistry::new(Some(&alias), &node.table),
            correlations,
        );
        let mut pipeline = AggregationPlan::new(node.table.clone());
        if let Some(condition) = &node.condition {
            SubqueryPlanner::new(&mut scope, &mut pipeline, &mut self.children, self.options)
                .plan_all([condition])?;
            let filter = CriteriaTranslator::new(&scope, self.options).compile_filter(condition)?;
            pipeline.add_stage(StageKind::Match, filter);
        }

        let mut lookup = doc! {"from": node.table.clone(), "as": alias.clone()};
        if let Some(let_document) = let_document {
            lookup.insert("let", let_document);
        }
        lookup.insert("pipeline", pipeline.pipeline());
        self.plan.add_stage(StageKind::Lookup, lookup);
        self.plan.add_stage(
            StageKind::Unwind,
            doc! {
                "path": format!("${alias}"),
                "preserveNullAndEmptyArrays": node.kind != JoinKind::Inner,
            },
        );

        self.scope.aliases_mut().register(Some(&alias), alias.clone());
        for child in &node.joins {
            self.compile_join(child)?;
        }
        Ok(())
    }
}

fn join_alias(node: &JoinNode, stage_count: usize) -> String {
    match (&node.alias, node.table.is_empty()) {
        (Some(alias), _) if !alias.is_empty() => alias.clone(),
        (_, false) => node.table.clone(),
        _ => format!("j{stage_count}"),
    }
}
