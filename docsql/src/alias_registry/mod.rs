#[cfg(test)]
mod test;

use crate::ir::Statement;
use docsql_datastructures::case_insensitive_map::CaseInsensitiveMap;

/// Maps statement and join aliases to their dot-path inside the working
/// document. The root alias maps to the empty path.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct AliasRegistry {
    root_alias: String,
    root_collection: String,
    paths: CaseInsensitiveMap<String>,
}

impl AliasRegistry {
    pub fn new(root_alias: Option<&str>, root_collection: &str) -> Self {
        let root_alias = root_alias.unwrap_or_default().to_string();
        let mut paths = CaseInsensitiveMap::new();
        paths.insert(root_alias.clone(), String::new());
        AliasRegistry {
            root_alias,
            root_collection: root_collection.to_string(),
            paths,
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn root_collection(&self) -> &str {
        &self.root_collection
    }

    /// Registers or overwrites the path for `alias`; `None` means the root.
    pub fn register(&mut self, alias: Option<&str>, path: impl Into<String>) {
        let alias = alias.unwrap_or(&self.root_alias).to_string();
        self.paths.insert(alias, path.into());
    }

    pub fn contains(&self, alias: Option<&str>) -> bool {
        self.paths.contains_key(alias.unwrap_or(&self.root_alias))
    }

    /// Returns the `$`-prefixed field path of `column` under `alias`. Unknown
    /// aliases resolve against the root document.
    pub fn field_path(&self, alias: Option<&str>, column: &str) -> String {
        let column = normalize_column_name(column);
        match self.paths.get(alias.unwrap_or(&self.root_alias)) {
            Some(path) if !path.is_empty() => format!("${path}.{column}"),
            _ => format!("${column}"),
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &String)> {
        self.paths.iter()
    }
}

/// Collects the aliases a statement declares for itself and its joins.
pub fn declared_aliases(statement: &Statement) -> CaseInsensitiveMap<()> {
    std::iter::once(statement.alias.clone().unwrap_or_default())
        .chain(
            statement
                .join_nodes()
                .into_iter()
                .map(|node| match &node.alias {
                    Some(alias) if !alias.is_empty() => alias.clone(),
                    _ => node.table.clone(),
                }),
        )
        .map(|alias| (alias, ()))
        .collect()
}

/// Normalizes a column name by trimming type suffixes and association
/// markers: everything after the first ',' is dropped, `!.` becomes `.`,
/// backslashes are removed and leading or trailing dots are trimmed.
pub fn normalize_column_name(column: &str) -> String {
    let column = column.split(',').next().unwrap_or_default();
    column
        .replace("!\\.", ".")
        .replace("!.", ".")
        .replace('\\', "")
        .trim_matches('.')
        .to_string()
}
