use super::{
    escape_regex_literal, like_to_regex, CriteriaTranslator, Error, Result, TypedExpression,
};
use crate::ir::{Expression, Function};
use bson::{bson, Bson};
use std::fmt;

/// How many arguments a function accepts.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    Range(usize, usize),
    AtLeast(usize),
    /// Condition/value pairs followed by a final else value.
    Odd(usize),
}

impl Arity {
    fn of(function: &Function) -> Self {
        use Function::*;
        match function {
            Concat => Arity::AtLeast(1),
            Lower | Upper | Trim | IsNullOrEmpty | Len | ToStr | Reverse => Arity::Exactly(1),
            Substring | Replace | Remove | CharIndex => Arity::Range(2, 3),
            Insert => Arity::Exactly(3),
            Abs | Sign | Floor | Ceiling | Sqr | Cos | Sin | Tan | Atn | Acos | Asin | Cosh
            | Sinh | Tanh | Exp | Log10 => Arity::Exactly(1),
            Round | Atn2 | Log => Arity::Range(1, 2),
            Power | BigMul => Arity::Exactly(2),
            Rnd => Arity::Range(0, 1),
            GetYear | GetMonth | GetDay | GetHour | GetMinute | GetSecond | GetMilliSecond
            | GetDayOfWeek | GetDayOfYear => Arity::Exactly(1),
            Iif => Arity::Odd(3),
            IsNull => Arity::Range(1, 2),
            Contains | StartsWith | EndsWith => Arity::Exactly(2),
            ToInt | ToLong | ToDouble | ToFloat | ToDecimal => Arity::Exactly(1),
            Custom(_) => Arity::AtLeast(0),
        }
    }

    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(n) => count >= n,
            Arity::Odd(n) => count >= n && count % 2 == 1,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Odd(n) => write!(f, "an odd number of, at least {n},"),
        }
    }
}

impl CriteriaTranslator<'_> {
    pub(super) fn compile_function(
        &self,
        function: &Function,
        arguments: &[Expression],
    ) -> Result<TypedExpression> {
        let arity = Arity::of(function);
        if !arity.accepts(arguments.len()) {
            return Err(Error::InvalidArgumentCount {
                function: function.name(),
                expected: arity.to_string(),
                found: arguments.len(),
            });
        }
        Ok(TypedExpression::Computed(self.compile_call(function, arguments)?))
    }

    fn argument(&self, arguments: &[Expression], index: usize) -> Result<Bson> {
        arguments
            .get(index)
            .map_or(Ok(Bson::Null), |a| self.compile_bson(a))
    }

    fn optional_argument(&self, arguments: &[Expression], index: usize) -> Result<Option<Bson>> {
        arguments.get(index).map(|a| self.compile_bson(a)).transpose()
    }

    fn compile_call(&self, function: &Function, arguments: &[Expression]) -> Result<Bson> {
        use Function::*;
        let arg = |index| self.argument(arguments, index);
        let unary = |operator: &str| -> Result<Bson> { Ok(bson!({ operator: arg(0)? })) };
        Ok(match function {
            // String functions
            Concat => bson!({ "$concat": self.compile_all(arguments)? }),
            Lower => unary("$toLower")?,
            Upper => unary("$toUpper")?,
            Trim => bson!({ "$trim": { "input": arg(0)? } }),
            IsNullOrEmpty => bson!({ "$eq": [{ "$ifNull": [arg(0)?, ""] }, ""] }),
            Len => {
                // Trailing spaces do not count, leading spaces do.
                let input = arg(0)?;
                let trimmed = bson!({ "$strLenCP": { "$trim": { "input": input.clone(), "chars": " " } } });
                let total = bson!({ "$strLenCP": input.clone() });
                let left_trimmed = bson!({ "$strLenCP": { "$ltrim": { "input": input, "chars": " " } } });
                bson!({ "$add": [trimmed, { "$subtract": [total, left_trimmed] }] })
            }
            Substring => {
                let input = arg(0)?;
                let length = match self.optional_argument(arguments, 2)? {
                    Some(length) => length,
                    None => bson!({ "$strLenCP": input.clone() }),
                };
                bson!({ "$substrCP": [input, arg(1)?, length] })
            }
            ToStr => unary("$toString")?,
            Replace => bson!({ "$replaceAll": {
                "input": arg(0)?,
                "find": arg(1)?,
                "replacement": self.optional_argument(arguments, 2)?.unwrap_or_else(|| Bson::String(String::new())),
            }}),
            Reverse => bson!({ "$reduce": {
                "input": { "$reverseArray": { "$split": [arg(0)?, ""] } },
                "initialValue": "",
                "in": { "$concat": ["$$value", "$$this"] },
            }}),
            Insert => {
                let source = arg(0)?;
                let position = arg(1)?;
                bson!({ "$concat": [
                    { "$substrCP": [source.clone(), 0, position.clone()] },
                    arg(2)?,
                    { "$substrCP": [source.clone(), position, { "$strLenCP": source }] },
                ]})
            }
            Remove => {
                let source = arg(0)?;
                let start = arg(1)?;
                let length = match self.optional_argument(arguments, 2)? {
                    Some(length) => length,
                    None => bson!({ "$strLenCP": source.clone() }),
                };
                let rest = bson!({ "$add": [start.clone(), length] });
                bson!({ "$concat": [
                    { "$substrCP": [source.clone(), 0, start] },
                    { "$substrCP": [
                        source.clone(),
                        rest.clone(),
                        { "$subtract": [{ "$strLenCP": source }, rest] },
                    ]},
                ]})
            }
            CharIndex => {
                // CharIndex(substring, source[, start])
                let mut operands = vec![
                    bson!({ "$toLower": arg(1)? }),
                    bson!({ "$toLower": arg(0)? }),
                ];
                operands.extend(self.optional_argument(arguments, 2)?);
                bson!({ "$indexOfCP": operands })
            }

            // Numeric functions
            Abs => unary("$abs")?,
            Sign => bson!({ "$cmp": [arg(0)?, 0] }),
            Round => {
                let mut operands = vec![arg(0)?];
                operands.extend(self.optional_argument(arguments, 1)?);
                bson!({ "$round": operands })
            }
            Floor => unary("$floor")?,
            Ceiling => unary("$ceil")?,
            Sqr => unary("$sqrt")?,
            Cos => unary("$cos")?,
            Sin => unary("$sin")?,
            Tan => unary("$tan")?,
            Atn => unary("$atan")?,
            Atn2 => bson!({ "$atan2": [
                arg(0)?,
                self.optional_argument(arguments, 1)?.unwrap_or(Bson::Int32(0)),
            ]}),
            Acos => unary("$acos")?,
            Asin => unary("$asin")?,
            Cosh => unary("$cosh")?,
            Sinh => unary("$sinh")?,
            Tanh => unary("$tanh")?,
            Exp => unary("$exp")?,
            Log => match self.optional_argument(arguments, 1)? {
                None => unary("$ln")?,
                Some(base) => bson!({ "$divide": [{ "$ln": arg(0)? }, { "$ln": base }] }),
            },
            Log10 => unary("$log10")?,
            Power => bson!({ "$pow": [arg(0)?, arg(1)?] }),
            Rnd => bson!({ "$rand": {} }),
            BigMul => bson!({ "$multiply": [arg(0)?, arg(1)?] }),

            // Date part functions
            GetYear => unary("$year")?,
            GetMonth => unary("$month")?,
            GetDay => unary("$dayOfMonth")?,
            GetHour => unary("$hour")?,
            GetMinute => unary("$minute")?,
            GetSecond => unary("$second")?,
            GetMilliSecond => unary("$millisecond")?,
            GetDayOfWeek => unary("$dayOfWeek")?,
            GetDayOfYear => unary("$dayOfYear")?,

            // Conditional functions
            Iif => {
                let branches = self.compile_all(arguments)?;
                fold_conditions(branches)
            }
            IsNull => bson!({ "$ifNull": [
                arg(0)?,
                self.optional_argument(arguments, 1)?.unwrap_or(Bson::Null),
            ]}),

            // Pattern functions
            Contains => {
                let pattern = escape_regex_literal(&self.pattern_text(&arguments[1])?);
                self.regex_match(arg(0)?, pattern)
            }
            StartsWith => {
                let pattern = escape_regex_literal(&self.pattern_text(&arguments[1])?);
                self.regex_match(arg(0)?, format!("^{pattern}"))
            }
            EndsWith => {
                let pattern = escape_regex_literal(&self.pattern_text(&arguments[1])?);
                self.regex_match(arg(0)?, format!("{pattern}$"))
            }

            // Conversion functions
            ToInt => bson!({ "$toInt": round_half_away_from_zero(arg(0)?) }),
            ToLong => bson!({ "$toLong": round_half_away_from_zero(arg(0)?) }),
            ToDouble | ToFloat => unary("$toDouble")?,
            ToDecimal => unary("$toDecimal")?,

            Custom(tag) => self.compile_custom(tag, arguments)?,
        })
    }

    /// Recognized tags are `Like`, `NotLike` and the name of any standard
    /// function, all matched without regard to case.
    fn compile_custom(&self, tag: &str, arguments: &[Expression]) -> Result<Bson> {
        match tag.to_lowercase().as_str() {
            "like" => self.custom_like(tag, arguments),
            "notlike" => Ok(bson!({ "$not": [self.custom_like(tag, arguments)?] })),
            name => match Function::from_name(name) {
                Some(function) => Ok(self.compile_function(&function, arguments)?.into_bson()),
                None => Err(Error::UnsupportedCustomFunction(tag.to_string())),
            },
        }
    }

    fn custom_like(&self, tag: &str, arguments: &[Expression]) -> Result<Bson> {
        if arguments.len() != 2 {
            return Err(Error::InvalidArgumentCount {
                function: tag.to_string(),
                expected: Arity::Exactly(2).to_string(),
                found: arguments.len(),
            });
        }
        let input = self.compile_bson(&arguments[0])?;
        let regex = like_to_regex(&self.pattern_text(&arguments[1])?);
        Ok(self.regex_match(input, regex))
    }
}

/// Folds `c1, v1, c2, v2, ..., else` into nested `$cond`s from the right,
/// so the final else value ends up innermost.
fn fold_conditions(mut branches: Vec<Bson>) -> Bson {
    let mut otherwise = branches.pop().unwrap_or(Bson::Null);
    while branches.len() >= 2 {
        let then = branches.pop().unwrap_or(Bson::Null);
        let condition = branches.pop().unwrap_or(Bson::Null);
        otherwise = bson!({ "$cond": { "if": condition, "then": then, "else": otherwise } });
    }
    otherwise
}

fn round_half_away_from_zero(input: Bson) -> Bson {
    bson!({ "$cond": [
        { "$gt": [input.clone(), 0] },
        { "$floor": { "$add": [input.clone(), 0.5] } },
        { "$ceil": { "$subtract": [input, 0.5] } },
    ]})
}
