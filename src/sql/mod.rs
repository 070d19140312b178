//! SQL text handling.
//!
//! - [`dialect`] - parser dialect with lambdas and subscripted field access
//! - [`parse`] - dialect selection, parsing, formatting and quoting
//! - [`walk`] - generic expression traversal and dotted path helpers

pub mod dialect;
pub mod parse;
pub mod walk;

pub use parse::SqlDialect;
