//! Test utilities for exercising SQL-emitting components without a server.
//!
//! [`MockDatabase`] records every statement it is handed, replays scripted
//! result sets, and tracks transaction boundaries, which is enough to
//! assert on everything the processors and the migration manager emit.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::backends::{DatabaseInterface, DbResult, Row};
use crate::error::DbError;
use crate::value::Value;

/// A statement as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedStatement {
	pub sql: String,
	pub params: Vec<Value>,
}

/// Transaction events in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
	Begin,
	Commit,
	Rollback,
}

#[derive(Debug, Default)]
struct MockState {
	statements: Vec<RecordedStatement>,
	queries: Vec<RecordedStatement>,
	scripted_rows: VecDeque<Vec<Row>>,
	next_insert_id: u64,
	last_insert_id: u64,
	transaction_depth: usize,
	transaction_log: Vec<TransactionEvent>,
	fail_on: Option<String>,
}

/// In-memory stand-in for a MySQL connection.
#[derive(Debug, Default)]
pub struct MockDatabase {
	state: RefCell<MockState>,
}

impl MockDatabase {
	pub fn new() -> Self {
		let db = Self::default();
		db.state.borrow_mut().next_insert_id = 1;
		db
	}

	/// Queue a result set for the next `query` call. Unqueued queries
	/// return no rows.
	pub fn push_rows(&self, rows: Vec<Row>) {
		self.state.borrow_mut().scripted_rows.push_back(rows);
	}

	/// Set the id the next INSERT will be assigned.
	pub fn set_next_insert_id(&self, id: u64) {
		self.state.borrow_mut().next_insert_id = id;
	}

	/// Fail any `execute` whose SQL contains the given fragment.
	pub fn fail_on(&self, fragment: impl Into<String>) {
		self.state.borrow_mut().fail_on = Some(fragment.into());
	}

	/// Every executed (non-query) statement, in order.
	pub fn statements(&self) -> Vec<RecordedStatement> {
		self.state.borrow().statements.clone()
	}

	/// SQL text of every executed statement, in order.
	pub fn executed_sql(&self) -> Vec<String> {
		self.state
			.borrow()
			.statements
			.iter()
			.map(|s| s.sql.clone())
			.collect()
	}

	/// Every query statement, in order.
	pub fn queries(&self) -> Vec<RecordedStatement> {
		self.state.borrow().queries.clone()
	}

	pub fn transaction_log(&self) -> Vec<TransactionEvent> {
		self.state.borrow().transaction_log.clone()
	}

	pub fn statement_count(&self) -> usize {
		self.state.borrow().statements.len()
	}
}

impl DatabaseInterface for MockDatabase {
	fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
		let mut state = self.state.borrow_mut();
		if let Some(fragment) = &state.fail_on
			&& sql.contains(fragment.as_str())
		{
			return Err(DbError::Execution(format!("scripted failure for `{sql}`")));
		}
		state.statements.push(RecordedStatement {
			sql: sql.to_string(),
			params: params.to_vec(),
		});
		if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
			state.last_insert_id = state.next_insert_id;
			state.next_insert_id += 1;
		}
		Ok(1)
	}

	fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
		let mut state = self.state.borrow_mut();
		state.queries.push(RecordedStatement {
			sql: sql.to_string(),
			params: params.to_vec(),
		});
		Ok(state.scripted_rows.pop_front().unwrap_or_default())
	}

	fn begin_transaction(&self) -> DbResult<()> {
		let mut state = self.state.borrow_mut();
		state.transaction_depth += 1;
		state.transaction_log.push(TransactionEvent::Begin);
		Ok(())
	}

	fn commit(&self) -> DbResult<()> {
		let mut state = self.state.borrow_mut();
		if state.transaction_depth == 0 {
			return Err(DbError::Transaction("commit without begin".into()));
		}
		state.transaction_depth -= 1;
		state.transaction_log.push(TransactionEvent::Commit);
		Ok(())
	}

	fn rollback(&self) -> DbResult<()> {
		let mut state = self.state.borrow_mut();
		if state.transaction_depth == 0 {
			return Err(DbError::Transaction("rollback without begin".into()));
		}
		state.transaction_depth -= 1;
		state.transaction_log.push(TransactionEvent::Rollback);
		Ok(())
	}

	fn in_transaction(&self) -> bool {
		self.state.borrow().transaction_depth > 0
	}

	fn last_insert_id(&self) -> DbResult<u64> {
		Ok(self.state.borrow().last_insert_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_records_statements_in_order() {
		let db = MockDatabase::new();
		db.execute("INSERT INTO `users_` (`a`) VALUES (?)", &[Value::Int(Some(1))])
			.unwrap();
		db.execute("UPDATE `users_` SET `a` = ?", &[Value::Int(Some(2))])
			.unwrap();
		let sql = db.executed_sql();
		assert_eq!(sql.len(), 2);
		assert!(sql[0].starts_with("INSERT"));
		assert!(sql[1].starts_with("UPDATE"));
	}

	#[test]
	fn test_insert_advances_last_insert_id() {
		let db = MockDatabase::new();
		db.set_next_insert_id(7);
		db.execute("INSERT INTO `t` (`a`) VALUES (?)", &[]).unwrap();
		assert_eq!(db.last_insert_id().unwrap(), 7);
		db.execute("INSERT INTO `t` (`a`) VALUES (?)", &[]).unwrap();
		assert_eq!(db.last_insert_id().unwrap(), 8);
	}

	#[test]
	fn test_scripted_rows_are_replayed_once() {
		let db = MockDatabase::new();
		db.push_rows(vec![Row::new().with("id", Value::Int(Some(1)))]);
		assert_eq!(db.query("SELECT 1", &[]).unwrap().len(), 1);
		assert!(db.query("SELECT 1", &[]).unwrap().is_empty());
	}

	#[test]
	fn test_transaction_log() {
		let db = MockDatabase::new();
		db.begin_transaction().unwrap();
		assert!(db.in_transaction());
		db.rollback().unwrap();
		assert!(!db.in_transaction());
		assert_eq!(
			db.transaction_log(),
			vec![TransactionEvent::Begin, TransactionEvent::Rollback]
		);
	}

	#[test]
	fn test_scripted_failure() {
		let db = MockDatabase::new();
		db.fail_on("DROP TABLE");
		assert!(db.execute("DROP TABLE `x`", &[]).is_err());
		assert!(db.execute("SELECT 1", &[]).is_ok());
	}
}
