//! Semantic analysis of SQL against the MDL catalog.
//!
//! - [`scope`] - lexical scopes and field resolution
//! - [`relationship`] - relationship paths inside single-entity expressions
//! - [`statement`] - the statement walk that produces an [`Analysis`]

mod analysis;
pub mod relationship;
pub mod scope;
mod statement;

pub use analysis::{
    Analysis, ArrayCall, ArrayFunction, ArrayInput, MetricRollupInfo, PathStep, PathUsage,
    SelectAnalysis, TableKind,
};
pub use relationship::{bare_identifiers, RelationshipInfo, RelationshipResolver};
pub use scope::{Field, RelationType, ScopeId, Scopes};
pub use statement::StatementAnalyzer;

pub(crate) use statement::{lambda_arg, lambda_param};
