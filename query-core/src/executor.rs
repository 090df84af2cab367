//! The seam between statement producers and the pool that runs them.

use async_trait::async_trait;
use common::errors::AppResult;

use crate::dialect::Dialect;
use crate::value::{Row, Statement};

/// Runs parameterized statements against one backend.
///
/// [`crate::pool_manager::PoolManager`] is the production implementation.
/// Everything above it (inspector, builder, service) only sees this trait.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Dialect of the backend behind this executor.
    fn dialect(&self) -> &'static dyn Dialect;

    /// Executes `statement` and returns every row it produced.
    async fn fetch_all(&self, statement: &Statement) -> AppResult<Vec<Row>>;
}
