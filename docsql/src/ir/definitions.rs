use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
};

/// A relational SELECT as produced by the host query frontend.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Statement {
    pub table: String,
    pub alias: Option<String>,
    pub operands: Vec<OutputColumn>,
    pub condition: Option<Expression>,
    pub joins: Vec<JoinNode>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub sorts: Vec<SortKey>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct OutputColumn {
    pub expression: Expression,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinNode {
    pub table: String,
    pub alias: Option<String>,
    pub kind: JoinKind,
    pub condition: Option<Expression>,
    pub joins: Vec<JoinNode>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub expression: Expression,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Column(ColumnRef),
    Property(String),
    Constant(Constant),
    Unary(Unary),
    Binary(Binary),
    Between(Between),
    In(In),
    Group(Group),
    Function(FunctionCall),
    Aggregate(Box<AggregateRef>),
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default)]
    pub alias: Option<String>,
    pub name: String,
    #[serde(default)]
    pub column_type: ColumnType,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expression>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitwiseNot,
    IsNull,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic operators
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Bitwise operators
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,

    // Comparison operators
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,

    // Pattern operators
    Like,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual
        )
    }

    /// The operator that gives the same answer with its operands swapped.
    pub fn mirrored(self) -> Self {
        match self {
            BinaryOp::Less => BinaryOp::Greater,
            BinaryOp::LessOrEqual => BinaryOp::GreaterOrEqual,
            BinaryOp::Greater => BinaryOp::Less,
            BinaryOp::GreaterOrEqual => BinaryOp::LessOrEqual,
            other => other,
        }
    }

    /// The inequality that holds exactly when this one is false, for
    /// operands that are both present.
    pub fn complement(self) -> Option<Self> {
        match self {
            BinaryOp::Less => Some(BinaryOp::GreaterOrEqual),
            BinaryOp::LessOrEqual => Some(BinaryOp::Greater),
            BinaryOp::Greater => Some(BinaryOp::LessOrEqual),
            BinaryOp::GreaterOrEqual => Some(BinaryOp::Less),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Between {
    pub test: Box<Expression>,
    pub begin: Box<Expression>,
    pub end: Box<Expression>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct In {
    pub left: Box<Expression>,
    pub candidates: Vec<Expression>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub op: GroupOp,
    pub operands: Vec<Expression>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum GroupOp {
    And,
    Or,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function: Function,
    #[serde(default)]
    pub arguments: Vec<Expression>,
}

/// The enumerated scalar functions the translator knows how to compile.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum Function {
    // String functions
    Concat,
    Lower,
    Upper,
    Trim,
    IsNullOrEmpty,
    Len,
    Substring,
    ToStr,
    Replace,
    Reverse,
    Insert,
    Remove,
    CharIndex,

    // Numeric functions
    Abs,
    Sign,
    Round,
    Floor,
    Ceiling,
    Sqr,
    Cos,
    Sin,
    Tan,
    Atn,
    Atn2,
    Acos,
    Asin,
    Cosh,
    Sinh,
    Tanh,
    Exp,
    Log,
    Log10,
    Power,
    Rnd,
    BigMul,

    // Date part functions
    GetYear,
    GetMonth,
    GetDay,
    GetHour,
    GetMinute,
    GetSecond,
    GetMilliSecond,
    GetDayOfWeek,
    GetDayOfYear,

    // Conditional functions
    Iif,
    IsNull,

    // Pattern functions
    Contains,
    StartsWith,
    EndsWith,

    // Conversion functions
    ToInt,
    ToLong,
    ToDouble,
    ToFloat,
    ToDecimal,

    /// Escape hatch: the tag names the function to apply.
    Custom(String),
}

lazy_static! {
    static ref STANDARD_FUNCTIONS: HashMap<String, Function> = {
        use Function::*;
        [
            Concat, Lower, Upper, Trim, IsNullOrEmpty, Len, Substring, ToStr, Replace, Reverse,
            Insert, Remove, CharIndex, Abs, Sign, Round, Floor, Ceiling, Sqr, Cos, Sin, Tan, Atn,
            Atn2, Acos, Asin, Cosh, Sinh, Tanh, Exp, Log, Log10, Power, Rnd, BigMul, GetYear,
            GetMonth, GetDay, GetHour, GetMinute, GetSecond, GetMilliSecond, GetDayOfWeek,
            GetDayOfYear, Iif, IsNull, Contains, StartsWith, EndsWith, ToInt, ToLong, ToDouble,
            ToFloat, ToDecimal,
        ]
        .into_iter()
        .map(|f| (format!("{f:?}").to_lowercase(), f))
        .collect()
    };
}

impl Function {
    /// Looks up a standard (non-custom) function by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Function> {
        STANDARD_FUNCTIONS.get(&name.to_lowercase()).cloned()
    }

    pub fn name(&self) -> String {
        match self {
            Function::Custom(tag) => format!("Custom({tag})"),
            other => format!("{other:?}"),
        }
    }
}

/// An aggregate reference. With a nested statement it is a correlated scalar
/// subquery; without one it aggregates over the enclosing statement's groups.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRef {
    pub kind: AggregateKind,
    #[serde(default)]
    pub target: Option<Expression>,
    #[serde(default)]
    pub statement: Option<Statement>,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Exists,
    Custom(String),
}

/// Declared column types, as reported by the host's schema metadata.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    Unknown,
    Boolean,
    Byte,
    SByte,
    Char,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    DateTime,
    Date,
    Time,
    TimeSpan,
    Guid,
    ByteArray,
}

impl ColumnType {
    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Unknown)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ColumnType::Byte
                | ColumnType::SByte
                | ColumnType::Int16
                | ColumnType::UInt16
                | ColumnType::Int32
                | ColumnType::UInt32
                | ColumnType::Int64
                | ColumnType::UInt64
        )
    }
}

/// A typed literal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    /// Decimal in its canonical text form, e.g. `"12.50"`.
    Decimal(String),
    String(String),
    DateTime(#[serde(with = "rfc3339")] bson::DateTime),
    Guid(#[serde(with = "hyphenated")] bson::Uuid),
    Bytes(Vec<u8>),
}

impl Constant {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Constant::Null => ColumnType::Unknown,
            Constant::Boolean(_) => ColumnType::Boolean,
            Constant::Int32(_) => ColumnType::Int32,
            Constant::Int64(_) => ColumnType::Int64,
            Constant::Double(_) => ColumnType::Double,
            Constant::Decimal(_) => ColumnType::Decimal,
            Constant::String(_) => ColumnType::String,
            Constant::DateTime(_) => ColumnType::DateTime,
            Constant::Guid(_) => ColumnType::Guid,
            Constant::Bytes(_) => ColumnType::ByteArray,
        }
    }
}

// Doubles compare by bit pattern so that constants can key hash maps.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        use Constant::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Decimal(a), Decimal(b)) => a == b,
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a.timestamp_millis() == b.timestamp_millis(),
            (Guid(a), Guid(b)) => a.bytes() == b.bytes(),
            (Bytes(a), Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Null => {}
            Constant::Boolean(b) => b.hash(state),
            Constant::Int32(i) => i.hash(state),
            Constant::Int64(l) => l.hash(state),
            Constant::Double(d) => d.to_bits().hash(state),
            Constant::Decimal(s) | Constant::String(s) => s.hash(state),
            Constant::DateTime(d) => d.timestamp_millis().hash(state),
            Constant::Guid(g) => g.bytes().hash(state),
            Constant::Bytes(b) => b.hash(state),
        }
    }
}

mod rfc3339 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &bson::DateTime, s: S) -> Result<S::Ok, S::Error> {
        let text = dt
            .try_to_rfc3339_string()
            .map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bson::DateTime, D::Error> {
        let text = String::deserialize(d)?;
        bson::DateTime::parse_rfc3339_str(&text).map_err(D::Error::custom)
    }
}

mod hyphenated {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(uuid: &bson::Uuid, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&uuid.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bson::Uuid, D::Error> {
        let text = String::deserialize(d)?;
        bson::Uuid::parse_str(&text).map_err(D::Error::custom)
    }
}

/// Builders used to keep hand-written IR terse.
impl Expression {
    pub fn column(alias: Option<&str>, name: &str, column_type: ColumnType) -> Self {
        Expression::Column(ColumnRef {
            alias: alias.map(str::to_string),
            name: name.to_string(),
            column_type,
        })
    }

    pub fn constant(value: Constant) -> Self {
        Expression::Constant(value)
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary(Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn between(test: Expression, begin: Expression, end: Expression) -> Self {
        Expression::Between(Between {
            test: Box::new(test),
            begin: Box::new(begin),
            end: Box::new(end),
        })
    }

    pub fn in_list(left: Expression, candidates: Vec<Expression>) -> Self {
        Expression::In(In {
            left: Box::new(left),
            candidates,
        })
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::Group(Group {
            op: GroupOp::And,
            operands,
        })
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Group(Group {
            op: GroupOp::Or,
            operands,
        })
    }

    pub fn function(function: Function, arguments: Vec<Expression>) -> Self {
        Expression::Function(FunctionCall {
            function,
            arguments,
        })
    }

    pub fn aggregate(
        kind: AggregateKind,
        target: Option<Expression>,
        statement: Option<Statement>,
    ) -> Self {
        Expression::Aggregate(Box::new(AggregateRef {
            kind,
            target,
            statement,
        }))
    }

    /// Calls `visit` on every direct child expression. Nested statements of
    /// subqueries are not entered.
    pub fn for_each_child<'a>(&'a self, mut visit: impl FnMut(&'a Expression)) {
        match self {
            Expression::Column(_) | Expression::Property(_) | Expression::Constant(_) => {}
            Expression::Unary(u) => visit(&u.operand),
            Expression::Binary(b) => {
                visit(&b.left);
                visit(&b.right);
            }
            Expression::Between(b) => {
                visit(&b.test);
                visit(&b.begin);
                visit(&b.end);
            }
            Expression::In(i) => {
                visit(&i.left);
                i.candidates.iter().for_each(visit);
            }
            Expression::Group(g) => g.operands.iter().for_each(visit),
            Expression::Function(f) => f.arguments.iter().for_each(visit),
            Expression::Aggregate(a) => {
                if let Some(target) = &a.target {
                    visit(target);
                }
            }
        }
    }
}

impl Statement {
    /// Every expression position of the statement itself, in translation
    /// order: operands, condition, group-by, having, sort keys. Join
    /// conditions are excluded.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.operands
            .iter()
            .map(|o| &o.expression)
            .chain(self.condition.iter())
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(self.sorts.iter().map(|s| &s.expression))
    }

    /// Join nodes in tree order (parent before children).
    pub fn join_nodes(&self) -> Vec<&JoinNode> {
        fn walk<'a>(nodes: &'a [JoinNode], out: &mut Vec<&'a JoinNode>) {
            for node in nodes {
                out.push(node);
                walk(&node.joins, out);
            }
        }
        let mut out = vec![];
        walk(&self.joins, &mut out);
        out
    }
}
