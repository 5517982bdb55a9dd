// criteria and grouping state is keyed by `Signature`, a normalized clone of the
// expression tree; nothing inside it has interior mutability.
#![allow(clippy::mutable_key_type)]

mod alias_registry;
mod criteria;
pub mod ir;
pub mod materializer;
pub mod options;
pub mod plan;
pub mod result;
mod scope;
mod translator;
mod util;

pub use crate::{
    materializer::{Row, Value},
    options::{CaseSensitivity, TranslateOptions},
    plan::{AggregationPlan, Stage, StageKind},
    result::{Error, Result},
    translator::TranslationContext,
};
use crate::{ir::Statement, translator::StatementTranslator};
use log::debug;

/// Everything produced by translating one statement: the executable plan and
/// the context it was compiled in, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct Translation {
    pub plan: AggregationPlan,
    pub context: TranslationContext,
}

/// Returns the aggregation pipeline equivalent to `statement`.
///
/// Translation either produces a complete plan or fails on the first
/// unsupported or malformed construct; no partial plan is ever returned.
pub fn translate(statement: &Statement, options: TranslateOptions) -> Result<Translation> {
    let (plan, context) = StatementTranslator::for_statement(statement, options).translate()?;
    debug!(
        "translated statement on {} into {} stages",
        plan.collection,
        plan.stages.len()
    );
    Ok(Translation { plan, context })
}

/// Converts result documents into rows ordered like the statement's output
/// columns. Conversion problems degrade to a best-effort value, never an error.
pub fn materialize(statement: &Statement, documents: &[bson::Document]) -> Vec<Row> {
    materializer::Materializer::for_statement(statement).materialize(documents)
}
