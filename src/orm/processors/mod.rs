//! Persistence processors: build and execute the SQL for scheduled
//! insertions, updates, and deletions.
//!
//! All SQL goes through the injected [`DatabaseInterface`] inside the
//! ambient flush transaction, and every processor is idempotent with
//! respect to the queued set: re-processing the same instance in one
//! flush emits nothing.

mod deletion;
mod insertion;
mod update;

pub use deletion::DeletionProcessor;
pub use insertion::InsertionProcessor;
pub use update::UpdateProcessor;

use sea_query::{MysqlQueryBuilder, QueryStatementWriter};

use crate::backends::DatabaseInterface;
use crate::backends::DbResult;
use crate::value::Value;

/// Build and execute one sea-query statement, returning affected rows.
pub(crate) fn execute_statement<S: QueryStatementWriter>(
	db: &dyn DatabaseInterface,
	statement: &S,
) -> DbResult<u64> {
	let (sql, values) = statement.build(MysqlQueryBuilder);
	let params: Vec<Value> = values.into_iter().collect();
	tracing::debug!(sql = %sql, bindings = params.len(), "executing statement");
	db.execute(&sql, &params)
}
