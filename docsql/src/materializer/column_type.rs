use crate::ir::{AggregateKind, ColumnType, Expression, Function};

/// The type an output column is materialized as. Anything without a known
/// type is converted loosely from its native BSON type.
pub fn resolve_column_type(expression: &Expression) -> ColumnType {
    match expression {
        Expression::Column(column) => column.column_type,
        Expression::Constant(constant) => constant.column_type(),
        Expression::Aggregate(aggregate) => {
            let target = || {
                aggregate
                    .target
                    .as_ref()
                    .map_or(ColumnType::Unknown, resolve_column_type)
            };
            match aggregate.kind {
                AggregateKind::Exists => ColumnType::Boolean,
                AggregateKind::Count => ColumnType::Int32,
                AggregateKind::Avg => match target() {
                    t @ (ColumnType::Decimal | ColumnType::Single | ColumnType::Double) => t,
                    t if t.is_integral() => ColumnType::Int32,
                    _ => ColumnType::Double,
                },
                AggregateKind::Custom(_) => ColumnType::Unknown,
                AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => target(),
            }
        }
        Expression::Function(call) => match call.function {
            Function::ToInt | Function::Len => ColumnType::Int32,
            Function::ToLong => ColumnType::Int64,
            Function::ToDouble | Function::ToFloat => ColumnType::Double,
            Function::ToDecimal => ColumnType::Decimal,
            Function::GetYear
            | Function::GetMonth
            | Function::GetDay
            | Function::GetHour
            | Function::GetMinute
            | Function::GetSecond
            | Function::GetMilliSecond
            | Function::GetDayOfWeek
            | Function::GetDayOfYear => ColumnType::Int32,
            Function::Iif => call
                .arguments
                .get(1)
                .map_or(ColumnType::Unknown, resolve_column_type),
            _ => ColumnType::Unknown,
        },
        _ => ColumnType::Unknown,
    }
}
