mod definitions;
pub use definitions::*;
pub mod signature;
#[cfg(test)]
mod test;

pub use signature::Signature;
