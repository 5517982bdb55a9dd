use super::{GroupMapping, Result};
use crate::{
    alias_registry::normalize_column_name,
    criteria::{CriteriaTranslator, TypedExpression},
    ir::{Expression, OutputColumn, Signature, SortDirection, SortKey, Statement},
    util::sanitize_field_name,
};
use bson::{bson, doc, Bson, Document};
use docsql_datastructures::case_insensitive_map::CaseInsensitiveMap;
use log::debug;
use std::collections::HashMap;

/// The shaping stages of a statement: the primary `$project`, the `$sort`
/// over it and, when sort helpers were projected, a final `$project` that
/// drops them again.
#[derive(PartialEq, Debug, Clone)]
pub(super) struct Projection {
    pub stage: Document,
    pub sort: Option<Document>,
    pub final_stage: Option<Document>,
    pub output_aliases: Vec<String>,
}

impl Projection {
    pub fn build(
        statement: &Statement,
        translator: &CriteriaTranslator,
        group: &GroupMapping,
    ) -> Result<Self> {
        let output_aliases = output_aliases(&statement.operands);
        let mut stage = doc! {"_id": 0};
        let mut projected: HashMap<Signature, String> = HashMap::new();
        let mut user_fields: CaseInsensitiveMap<()> = CaseInsensitiveMap::new();
        for (operand, alias) in statement.operands.iter().zip(&output_aliases) {
            let value = translator.compile_expression(&operand.expression)?;
            stage.insert(alias.clone(), projected_value(value));
            projected
                .entry(operand.expression.signature())
                .or_insert_with(|| alias.clone());
            user_fields.insert(alias.clone(), ());
        }

        let mut sort = Document::new();
        let mut helpers = 0;
        for (index, key) in statement.sorts.iter().enumerate() {
            let field = match SortResolver::new(&projected, &user_fields, group).resolve(key) {
                Resolution::Field(field) => field,
                Resolution::Helper { fold } => {
                    let value = sort_value(translator, group, &key.expression)?;
                    let helper = format!("_sort{index}");
                    stage.insert(
                        helper.clone(),
                        if fold { bson!({ "$toLower": value }) } else { value },
                    );
                    helpers += 1;
                    helper
                }
                Resolution::Unresolved => {
                    debug!("dropping sort key with no value after grouping: {:?}", key.expression);
                    continue;
                }
            };
            sort.insert(field, sort_direction(key.direction));
        }

        let final_stage = (helpers > 0).then(|| {
            let mut final_stage = doc! {"_id": 0};
            for field in user_fields.keys() {
                final_stage.insert(field, 1);
            }
            final_stage
        });

        Ok(Projection {
            stage,
            sort: (!sort.is_empty()).then_some(sort),
            final_stage,
            output_aliases,
        })
    }
}

enum Resolution {
    /// Sort directly on an already projected field.
    Field(String),
    /// Project the key under a `_sort{n}` helper, case-folded when `fold`.
    Helper { fold: bool },
    Unresolved,
}

struct SortResolver<'r> {
    projected: &'r HashMap<Signature, String>,
    user_fields: &'r CaseInsensitiveMap<()>,
    group: &'r GroupMapping,
}

impl<'r> SortResolver<'r> {
    fn new(
        projected: &'r HashMap<Signature, String>,
        user_fields: &'r CaseInsensitiveMap<()>,
        group: &'r GroupMapping,
    ) -> Self {
        SortResolver {
            projected,
            user_fields,
            group,
        }
    }

    /// Output aliases come first, then user fields named by a property
    /// reference, then a helper. Keys that need case folding always get a
    /// helper since the projected value keeps its case.
    fn resolve(&self, key: &SortKey) -> Resolution {
        let fold = needs_case_fold(&key.expression);
        if !fold {
            if let Some(alias) = self.projected.get(&key.expression.signature()) {
                return Resolution::Field(alias.clone());
            }
        }
        if let Expression::Property(name) = &key.expression {
            let name = normalize_column_name(name);
            if let Some(field) = self
                .user_fields
                .keys()
                .find(|f| f.to_lowercase() == name.to_lowercase())
            {
                return Resolution::Field(field.to_string());
            }
        }
        if self.group.is_empty() || self.available_after_grouping(&key.expression) {
            Resolution::Helper { fold }
        } else {
            Resolution::Unresolved
        }
    }

    /// After `$group` only group keys, aggregates and constants are left to
    /// compute with.
    fn available_after_grouping(&self, expression: &Expression) -> bool {
        if matches!(expression, Expression::Constant(_)) {
            return true;
        }
        let signature = expression.signature();
        if self.group.key_alias(&signature).is_some() || self.group.aggregate(&signature).is_some() {
            return true;
        }
        match expression {
            Expression::Column(_) | Expression::Property(_) | Expression::Aggregate(_) => false,
            other => {
                let mut available = true;
                other.for_each_child(|child| available &= self.available_after_grouping(child));
                available
            }
        }
    }
}

/// Existence aggregates sort on their underlying count.
fn sort_value(
    translator: &CriteriaTranslator,
    group: &GroupMapping,
    expression: &Expression,
) -> Result<Bson> {
    if let Some(aggregate) = group.aggregate(&expression.signature()) {
        return Ok(Bson::String(format!("${}", aggregate.alias)));
    }
    Ok(projected_value(translator.compile_expression(expression)?))
}

/// Literal numbers and booleans in `$project` would read as inclusion flags.
fn projected_value(value: TypedExpression) -> Bson {
    match value {
        TypedExpression::Constant(constant) if !matches!(constant, Bson::String(_)) => {
            bson!({ "$literal": constant })
        }
        other => other.into_bson(),
    }
}

fn needs_case_fold(expression: &Expression) -> bool {
    match expression {
        Expression::Column(column) => column.column_type.is_textual(),
        Expression::Property(_) => true,
        _ => false,
    }
}

fn sort_direction(direction: SortDirection) -> i32 {
    match direction {
        SortDirection::Ascending => 1,
        SortDirection::Descending => -1,
    }
}

/// Derives the field name of every output column. Plain columns are named
/// `{alias}_{column}` (or just the column when unaliased) and disambiguated
/// with `_{index}`; other expressions fall back to `PrP{index}`. Explicit
/// aliases always win.
pub(crate) fn output_aliases(operands: &[OutputColumn]) -> Vec<String> {
    let mut used: CaseInsensitiveMap<()> = CaseInsensitiveMap::new();
    operands
        .iter()
        .enumerate()
        .map(|(index, operand)| {
            let alias = output_alias(index, operand, &used);
            used.insert(alias.clone(), ());
            alias
        })
        .collect()
}

fn output_alias(index: usize, operand: &OutputColumn, used: &CaseInsensitiveMap<()>) -> String {
    let explicit = operand.alias.as_deref().filter(|a| !a.is_empty());
    match &operand.expression {
        Expression::Column(column) if !column.name.is_empty() => {
            if let Some(explicit) = explicit {
                return sanitize_field_name(explicit);
            }
            let normalized = normalize_column_name(&column.name);
            let mut candidate = match column.alias.as_deref() {
                Some(alias) if !alias.is_empty() => format!("{alias}_{normalized}"),
                _ => normalized,
            };
            if candidate.is_empty() {
                candidate = format!("PrP{index}");
            }
            if used.contains_key(&candidate) {
                candidate = format!("{candidate}_{index}");
            }
            sanitize_field_name(&candidate)
        }
        _ => sanitize_field_name(&explicit.map_or_else(|| format!("PrP{index}"), str::to_string)),
    }
}
