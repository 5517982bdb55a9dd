use crate::{criteria, translator};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("expression translation error: {0}")]
    Criteria(#[from] criteria::Error),
    #[error("statement translation error: {0}")]
    Translator(translator::Error),
}

impl From<translator::Error> for Error {
    fn from(e: translator::Error) -> Self {
        match e {
            translator::Error::Criteria(e) => Error::Criteria(e),
            other => Error::Translator(other),
        }
    }
}

impl Error {
    /// True when the failure comes from a construct with no compilation rule,
    /// as opposed to a malformed input tree.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Error::Criteria(e) => e.is_unsupported(),
            Error::Translator(e) => e.is_unsupported(),
        }
    }
}
