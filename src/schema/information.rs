//! Live schema introspection through `information_schema`.
//!
//! Reads run outside any transaction; the snapshot is a point-in-time
//! structural view feeding the comparer.

use std::rc::Rc;

use tracing::debug;

use crate::backends::{DatabaseInterface, DbResult, Row};
use crate::schema::{ColumnInfo, ForeignKeyInfo, IndexInfo, SchemaSnapshot};
use crate::value::{self, Value};

const COLUMNS_QUERY: &str = "SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, \
	 COLUMN_DEFAULT, EXTRA, COLUMN_KEY FROM information_schema.COLUMNS \
	 WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME, ORDINAL_POSITION";

const FOREIGN_KEYS_QUERY: &str = "SELECT kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.COLUMN_NAME, \
	 kcu.REFERENCED_TABLE_NAME, kcu.REFERENCED_COLUMN_NAME, rc.DELETE_RULE, rc.UPDATE_RULE \
	 FROM information_schema.KEY_COLUMN_USAGE kcu \
	 JOIN information_schema.REFERENTIAL_CONSTRAINTS rc \
	 ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
	 WHERE kcu.TABLE_SCHEMA = ? AND kcu.REFERENCED_TABLE_NAME IS NOT NULL \
	 ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME";

const INDEXES_QUERY: &str = "SELECT TABLE_NAME, INDEX_NAME, COLUMN_NAME, NON_UNIQUE \
	 FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = ? \
	 ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX";

/// Reads the structure of a live database.
pub struct SchemaInformation {
	db: Rc<dyn DatabaseInterface>,
}

impl SchemaInformation {
	pub fn new(db: Rc<dyn DatabaseInterface>) -> Self {
		Self { db }
	}

	/// Snapshot every table of `database`.
	pub fn snapshot(&self, database: &str) -> DbResult<SchemaSnapshot> {
		let params = [Value::from(database)];
		let mut snapshot = SchemaSnapshot::new();

		for row in self.db.query(COLUMNS_QUERY, &params)? {
			let table = required(&row, "TABLE_NAME");
			let column = required(&row, "COLUMN_NAME");
			let info = ColumnInfo {
				column_type: required(&row, "COLUMN_TYPE"),
				nullable: required(&row, "IS_NULLABLE").eq_ignore_ascii_case("YES"),
				default: optional(&row, "COLUMN_DEFAULT"),
				extra: required(&row, "EXTRA"),
				key: required(&row, "COLUMN_KEY"),
			};
			snapshot
				.tables
				.entry(table)
				.or_default()
				.columns
				.insert(column, info);
		}

		for row in self.db.query(FOREIGN_KEYS_QUERY, &params)? {
			let table = required(&row, "TABLE_NAME");
			let info = ForeignKeyInfo {
				constraint: required(&row, "CONSTRAINT_NAME"),
				column: required(&row, "COLUMN_NAME"),
				referenced_table: required(&row, "REFERENCED_TABLE_NAME"),
				referenced_column: required(&row, "REFERENCED_COLUMN_NAME"),
				on_delete: required(&row, "DELETE_RULE"),
				on_update: required(&row, "UPDATE_RULE"),
			};
			snapshot
				.tables
				.entry(table)
				.or_default()
				.foreign_keys
				.insert(info.constraint.clone(), info);
		}

		for row in self.db.query(INDEXES_QUERY, &params)? {
			let table = required(&row, "TABLE_NAME");
			let index = required(&row, "INDEX_NAME");
			if index == "PRIMARY" {
				continue;
			}
			let column = required(&row, "COLUMN_NAME");
			let unique = value::to_i64(row.get("NON_UNIQUE").unwrap_or(&Value::Int(Some(0))))
				.unwrap_or(0) == 0;
			let entry = snapshot
				.tables
				.entry(table)
				.or_default()
				.indexes
				.entry(index.clone())
				.or_insert_with(|| IndexInfo {
					name: index,
					columns: Vec::new(),
					unique,
				});
			entry.columns.push(column);
		}

		debug!(tables = snapshot.tables.len(), database, "schema snapshot read");
		Ok(snapshot)
	}
}

fn required(row: &Row, column: &str) -> String {
	row.get(column).and_then(value::to_string).unwrap_or_default()
}

fn optional(row: &Row, column: &str) -> Option<String> {
	row.get(column).and_then(value::to_string)
}
