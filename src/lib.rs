//! # mdlsql
//!
//! Semantic SQL rewriting over an MDL catalog.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Manifest (JSON / builder API)               │
//! │  (models, relationships, metrics, cumulative metrics,    │
//! │   views, macros, date spine)                             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [mdl::Catalog]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Immutable, name-indexed catalog               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!          ┌───────────────┴────────────────┐
//!          ▼ [analyzer]                     ▼ [lineage]
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ scopes, relationship     │   │ required fields per      │
//! │ paths, array functions,  │   │ entity, cycle detection  │
//! │ metric rollups           │   └──────────────────────────┘
//! └──────────────────────────┘
//!          │
//!          ▼ [rewrite]
//! ┌─────────────────────────────────────────────────────────┐
//! │  metric_view → (syntactic_sugar) → accio → plain SQL    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use mdlsql::{rewrite, Catalog, Manifest, SessionContext};
//!
//! let catalog = Catalog::new(Manifest::new("accio", "test")).unwrap();
//! let session = SessionContext::new("accio", "test");
//! let sql = rewrite("select 1 as one", &session, &catalog).unwrap();
//! assert_eq!(sql, "SELECT 1 AS one");
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod lineage;
pub mod mdl;
pub mod rewrite;
pub mod sql;

pub use error::{Error, ErrorCode, Result};
pub use lineage::{DataLineage, RequiredFields};
pub use mdl::{Catalog, Manifest, SessionContext};
pub use rewrite::{rewrite, RuleKind, SqlRewriter};
pub use sql::SqlDialect;
