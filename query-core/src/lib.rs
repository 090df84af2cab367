//! Schema-safe, read-only relational query core.
//!
//! Layers, bottom-up: [`pool_manager`] runs statements on one backend,
//! [`schema_inspector`] owns the schema snapshot, [`query_builder`] turns
//! requests into parameterized statements using only snapshot identifiers,
//! [`formatter`] canonicalizes rows, and [`service`] / [`dialogue`] expose the
//! operations.

pub mod classifier;
mod decode;
pub mod dialect;
pub mod dialogue;
pub mod executor;
pub mod formatter;
pub mod pool_manager;
pub mod query_builder;
pub mod schema_inspector;
pub mod service;
pub mod value;

#[cfg(test)]
mod testing;

pub use dialect::{dialect_for, Dialect};
pub use dialogue::{ActionRequest, DialogueAdapter, DialogueOutcome, Intent, Slots};
pub use executor::StatementExecutor;
pub use pool_manager::{PoolManager, PoolStats};
pub use schema_inspector::{SchemaInspector, SchemaSnapshot};
pub use service::{DataService, QueryOutcome, RefreshSummary};
pub use value::{BoundValue, Cell, Row, Statement};
