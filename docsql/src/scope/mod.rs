#[cfg(test)]
mod test;

use crate::{
    alias_registry::{normalize_column_name, AliasRegistry},
    ir::{ColumnRef, Signature},
};
use bson::{Bson, Document};
use std::collections::HashMap;

/// A column of an enclosing alias, as seen from inside a lookup
/// sub-pipeline. Both parts are stored case-folded and the column is
/// normalized.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CorrelationKey {
    alias: String,
    column: String,
}

impl CorrelationKey {
    pub fn new(alias: &str, column: &str) -> Self {
        CorrelationKey {
            alias: alias.to_lowercase(),
            column: normalize_column_name(column).to_lowercase(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct CorrelationBinding {
    pub key: CorrelationKey,
    pub name: String,
    pub value: Bson,
}

/// The `let` variables of one lookup, in binding order. Names are
/// `outer_{n}` and unique within the lookup.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CorrelationBindings {
    entries: Vec<CorrelationBinding>,
}

impl CorrelationBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `alias.column` to `value` unless an equal key is already bound,
    /// and returns the variable name either way.
    pub fn bind_column(&mut self, alias: &str, column: &str, value: Bson) -> String {
        let key = CorrelationKey::new(alias, column);
        if let Some(existing) = self.entries.iter().find(|e| e.key == key) {
            return existing.name.clone();
        }
        let name = format!("outer_{}", self.entries.len());
        self.entries.push(CorrelationBinding {
            key,
            name: name.clone(),
            value,
        });
        name
    }

    pub fn lookup(&self, key: &CorrelationKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorrelationBinding> {
        self.entries.iter()
    }

    /// The `let` document of a `$lookup` stage, or `None` when nothing is
    /// bound.
    pub fn let_document(&self) -> Option<Document> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|e| (e.name.clone(), e.value.clone()))
                .collect(),
        )
    }
}

/// Resolves references to the `$`-prefixed paths or `$$` variables that
/// address them in the working document.
#[derive(PartialEq, Debug, Clone)]
pub struct ExpressionScope {
    aliases: AliasRegistry,
    correlations: CorrelationBindings,
    subquery_fields: HashMap<Signature, String>,
}

impl ExpressionScope {
    pub fn new(aliases: AliasRegistry) -> Self {
        Self::with_correlations(aliases, CorrelationBindings::new())
    }

    pub fn with_correlations(aliases: AliasRegistry, correlations: CorrelationBindings) -> Self {
        ExpressionScope {
            aliases,
            correlations,
            subquery_fields: HashMap::new(),
        }
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasRegistry {
        &mut self.aliases
    }

    pub fn correlations(&self) -> &CorrelationBindings {
        &self.correlations
    }

    /// Correlation variables win over field paths.
    pub fn resolve_column(&self, column: &ColumnRef) -> String {
        let alias = column
            .alias
            .as_deref()
            .unwrap_or(self.aliases.root_alias());
        match self
            .correlations
            .lookup(&CorrelationKey::new(alias, &column.name))
        {
            Some(name) => format!("$${name}"),
            None => self.aliases.field_path(column.alias.as_deref(), &column.name),
        }
    }

    pub fn resolve_property(&self, name: &str) -> String {
        format!("${}", normalize_column_name(name))
    }

    /// Records the top-level field holding a planned subquery's result.
    pub fn register_subquery(&mut self, signature: Signature, field: impl Into<String>) {
        self.subquery_fields.insert(signature, field.into());
    }

    pub fn subquery_field(&self, signature: &Signature) -> Option<&str> {
        self.subquery_fields.get(signature).map(String::as_str)
    }

    pub fn subquery_count(&self) -> usize {
        self.subquery_fields.len()
    }

    pub fn resolve_subquery(&self, signature: &Signature) -> Option<String> {
        self.subquery_field(signature).map(|f| format!("${f}"))
    }
}
