use bson::{bson, Bson};

/// A compiled expression tagged with enough shape to decide whether it can
/// take part in a native filter.
#[derive(PartialEq, Debug, Clone)]
pub enum TypedExpression {
    /// A `$path` into the working document or a `$$variable`.
    Field(String),
    /// A literal value, kept unwrapped so native filters can embed it as is.
    Constant(Bson),
    /// Any other aggregation expression.
    Computed(Bson),
}

impl TypedExpression {
    pub fn is_field(&self) -> bool {
        matches!(self, TypedExpression::Field(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, TypedExpression::Constant(_))
    }

    pub fn is_correlation_reference(&self) -> bool {
        matches!(self, TypedExpression::Field(path) if path.starts_with("$$"))
    }

    /// The dotted field name usable as a native filter key. Correlation
    /// references have none.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            TypedExpression::Field(path) if !self.is_correlation_reference() => {
                path.strip_prefix('$')
            }
            _ => None,
        }
    }

    pub fn constant_value(&self) -> Option<&Bson> {
        match self {
            TypedExpression::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Renders the expression for use inside an aggregation expression.
    /// String constants that would read as field paths are wrapped in
    /// `$literal`.
    pub fn into_bson(self) -> Bson {
        match self {
            TypedExpression::Field(path) => Bson::String(path),
            TypedExpression::Constant(Bson::String(s)) if s.starts_with('$') => {
                bson!({ "$literal": s })
            }
            TypedExpression::Constant(value) | TypedExpression::Computed(value) => value,
        }
    }
}
