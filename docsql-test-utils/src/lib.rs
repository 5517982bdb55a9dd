//! An in-memory model of the aggregation stages the translator emits, used
//! to run translated plans against fixture collections in tests.
pub mod compare;
pub mod evaluator;

pub use evaluator::{Catalog, Error, Result};
