//! Turns the documents a plan produced back into rows shaped like the
//! statement's output columns.
mod column_type;
mod convert;
#[cfg(test)]
mod test;

pub use column_type::resolve_column_type;
pub use convert::convert;

use crate::{
    ir::{ColumnType, Statement},
    translator::output_aliases,
};
use bson::{Bson, Decimal128, Document, Timestamp, Uuid};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::ops::Index;

/// A materialized cell.
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Char(char),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal128),
    String(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeSpan(Duration),
    Guid(Uuid),
    Bytes(Vec<u8>),
    Document(Document),
    Array(Vec<Value>),
    Timestamp(Timestamp),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One result row, values in output-column order.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// Where a column's value lives in a result document and what it is
/// converted to.
#[derive(PartialEq, Debug, Clone)]
pub struct ColumnDescriptor {
    pub alias: String,
    pub column_type: ColumnType,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Materializer {
    columns: Vec<ColumnDescriptor>,
}

impl Materializer {
    pub fn for_statement(statement: &Statement) -> Self {
        let columns = output_aliases(&statement.operands)
            .into_iter()
            .zip(&statement.operands)
            .map(|(alias, operand)| ColumnDescriptor {
                alias,
                column_type: resolve_column_type(&operand.expression),
            })
            .collect();
        Materializer { columns }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn materialize(&self, documents: &[Document]) -> Vec<Row> {
        documents.iter().map(|d| self.materialize_row(d)).collect()
    }

    pub fn materialize_row(&self, document: &Document) -> Row {
        Row::new(
            self.columns
                .iter()
                .map(|column| match lookup(document, &column.alias) {
                    Some(value) => convert(value, column.column_type),
                    None => Value::Null,
                })
                .collect(),
        )
    }
}

/// The value stored under `alias`, either as a literal key or as a dotted
/// path into nested documents.
fn lookup<'d>(document: &'d Document, alias: &str) -> Option<&'d Bson> {
    if let Some(value) = document.get(alias) {
        return Some(value);
    }
    let mut segments = alias.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(nested) => nested.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}
