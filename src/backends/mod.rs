//! Database access boundary.
//!
//! The engine never talks to a driver directly: everything goes through
//! [`DatabaseInterface`], a narrow blocking surface a backend implements
//! over its connection handle. Processors run inside the ambient
//! transaction opened by `flush()`; the migration manager opens one
//! transaction per migration.

pub mod test_utils;

use indexmap::IndexMap;

use crate::error::DbError;
use crate::value::Value;

pub type DbResult<T> = Result<T, DbError>;

/// One result row: column name to value, in select order.
#[derive(Debug, Clone, Default)]
pub struct Row {
	columns: IndexMap<String, Value>,
}

impl Row {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style cell insertion, used by backends and test fixtures.
	pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
		self.columns.insert(column.into(), value.into());
		self
	}

	pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
		self.columns.insert(column.into(), value.into());
	}

	pub fn get(&self, column: &str) -> Option<&Value> {
		self.columns.get(column)
	}

	pub fn contains(&self, column: &str) -> bool {
		self.columns.contains_key(column)
	}

	pub fn columns(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.columns.iter()
	}

	pub fn len(&self) -> usize {
		self.columns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.columns.is_empty()
	}
}

/// Narrow blocking interface to the database driver.
///
/// The contract is synchronous: every call blocks the caller. An async
/// backend wraps these primitives without leaking concurrency into the
/// persistence state machine.
pub trait DatabaseInterface {
	/// Execute a statement, returning the number of affected rows.
	fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64>;

	/// Run a query, returning all rows.
	fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>>;

	fn begin_transaction(&self) -> DbResult<()>;

	fn commit(&self) -> DbResult<()>;

	fn rollback(&self) -> DbResult<()>;

	fn in_transaction(&self) -> bool;

	/// The id generated by the most recent successful INSERT.
	fn last_insert_id(&self) -> DbResult<u64>;
}
