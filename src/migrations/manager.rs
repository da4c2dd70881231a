//! Migration registration, ordering, execution, and rollback with
//! history tracking.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use sea_query::{Alias, Expr, MysqlQueryBuilder, Order, Query};
use tracing::info;

use crate::backends::DatabaseInterface;
use crate::error::MigrationError;
use crate::migrations::loader::is_migration_file;
use crate::migrations::{
	HISTORY_TABLE, HistoryEntry, Migration, load_migration_file, validate_version,
};
use crate::schema::builder::SchemaBuilder;
use crate::value::{self, Value};

const CREATE_HISTORY_TABLE: &str = "CREATE TABLE IF NOT EXISTS `migration_history` (\
	 `id` INT UNSIGNED NOT NULL AUTO_INCREMENT, \
	 `version` VARCHAR(20) NOT NULL UNIQUE, \
	 `executed_at` DATETIME NOT NULL, \
	 `execution_time` INT NOT NULL, \
	 PRIMARY KEY (`id`))";

/// Registers migrations, applies pending ones in version order, and rolls
/// back the most recent, one transaction per migration.
pub struct MigrationManager {
	db: Rc<dyn DatabaseInterface>,
	migrations: BTreeMap<String, Box<dyn Migration>>,
}

impl MigrationManager {
	/// Ensures the history table exists.
	pub fn new(db: Rc<dyn DatabaseInterface>) -> Result<Self, MigrationError> {
		db.execute(CREATE_HISTORY_TABLE, &[])?;
		Ok(Self {
			db,
			migrations: BTreeMap::new(),
		})
	}

	/// Register one migration, keyed by version.
	pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
		let version = migration.version().to_string();
		validate_version(&version)?;
		if self.migrations.contains_key(&version) {
			return Err(MigrationError::DuplicateMigrationVersion(version));
		}
		self.migrations.insert(version, migration);
		Ok(())
	}

	/// Load and register every `Migration*.rs` file in a directory.
	/// Returns the number of migrations loaded.
	pub fn register_from(&mut self, dir: &Path) -> Result<usize, MigrationError> {
		if !dir.is_dir() {
			return Err(MigrationError::MigrationDirectoryMissing(dir.to_path_buf()));
		}
		let mut files: Vec<_> = std::fs::read_dir(dir)?
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| {
				path.file_name()
					.and_then(|n| n.to_str())
					.is_some_and(is_migration_file)
			})
			.collect();
		files.sort();
		let count = files.len();
		for file in files {
			self.register(load_migration_file(&file)?)?;
		}
		Ok(count)
	}

	pub fn registered_versions(&self) -> Vec<String> {
		self.migrations.keys().cloned().collect()
	}

	/// History rows, version-ascending.
	pub fn executed(&self) -> Result<Vec<HistoryEntry>, MigrationError> {
		let mut statement = Query::select();
		statement
			.from(Alias::new(HISTORY_TABLE))
			.columns([
				Alias::new("id"),
				Alias::new("version"),
				Alias::new("executed_at"),
				Alias::new("execution_time"),
			])
			.order_by(Alias::new("version"), Order::Asc);
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		let rows = self.db.query(&sql, &params)?;
		Ok(rows
			.iter()
			.map(|row| HistoryEntry {
				id: row.get("id").and_then(value::to_u64).unwrap_or_default(),
				version: row
					.get("version")
					.and_then(value::to_string)
					.unwrap_or_default(),
				executed_at: row
					.get("executed_at")
					.and_then(value::to_datetime_utc)
					.unwrap_or(chrono::DateTime::UNIX_EPOCH),
				execution_time_ms: row
					.get("execution_time")
					.and_then(value::to_u64)
					.unwrap_or_default(),
			})
			.collect())
	}

	/// Registered but not yet executed, version-ascending.
	pub fn pending(&self) -> Result<Vec<&dyn Migration>, MigrationError> {
		let executed: Vec<String> = self.executed()?.into_iter().map(|e| e.version).collect();
		Ok(self
			.migrations
			.iter()
			.filter(|(version, _)| !executed.contains(version))
			.map(|(_, migration)| migration.as_ref())
			.collect())
	}

	/// Apply every pending migration; returns how many ran.
	pub fn migrate(&self) -> Result<usize, MigrationError> {
		let pending = self.pending()?;
		let count = pending.len();
		for migration in pending {
			self.execute(migration)?;
		}
		Ok(count)
	}

	/// Run one migration's `up` inside its own transaction and record it.
	pub fn execute(&self, migration: &dyn Migration) -> Result<(), MigrationError> {
		let version = migration.version().to_string();
		let executed: Vec<String> = self.executed()?.into_iter().map(|e| e.version).collect();
		if executed.contains(&version) {
			return Err(MigrationError::AlreadyExecuted(version));
		}

		let mut schema = SchemaBuilder::new();
		migration.up(&mut schema);

		self.db.begin_transaction()?;
		let started = Instant::now();
		let result = self.run_statements(&schema).and_then(|()| {
			self.record_execution(&version, started.elapsed().as_millis() as u64)
		});
		match result {
			Ok(()) => {
				self.db.commit().map_err(|e| MigrationError::MigrationFailed {
					version: version.clone(),
					cause: e.to_string(),
				})?;
				info!(
					version = %version,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"migration applied"
				);
				Ok(())
			}
			Err(cause) => {
				let _ = self.db.rollback();
				Err(MigrationError::MigrationFailed {
					version,
					cause: cause.to_string(),
				})
			}
		}
	}

	/// Revert the most recently executed migration. Returns `false` when
	/// the history is empty.
	pub fn rollback(&self) -> Result<bool, MigrationError> {
		let Some(last) = self.executed()?.into_iter().map(|e| e.version).max() else {
			return Ok(false);
		};
		let migration = self
			.migrations
			.get(&last)
			.ok_or_else(|| MigrationError::OrphanExecuted(last.clone()))?;

		let mut schema = SchemaBuilder::new();
		migration.down(&mut schema);

		self.db.begin_transaction()?;
		let result = self
			.run_statements(&schema)
			.and_then(|()| self.delete_history(&last));
		match result {
			Ok(()) => {
				self.db.commit().map_err(|e| MigrationError::MigrationFailed {
					version: last.clone(),
					cause: e.to_string(),
				})?;
				info!(version = %last, "migration rolled back");
				Ok(true)
			}
			Err(cause) => {
				let _ = self.db.rollback();
				Err(MigrationError::MigrationFailed {
					version: last,
					cause: cause.to_string(),
				})
			}
		}
	}

	/// The SQL `rollback` would run, without executing it. `None` when
	/// the history is empty.
	pub fn plan_rollback(&self) -> Result<Option<(String, Vec<String>)>, MigrationError> {
		let Some(last) = self.executed()?.into_iter().map(|e| e.version).max() else {
			return Ok(None);
		};
		let migration = self
			.migrations
			.get(&last)
			.ok_or_else(|| MigrationError::OrphanExecuted(last.clone()))?;
		let mut schema = SchemaBuilder::new();
		migration.down(&mut schema);
		Ok(Some((last, schema.to_sql())))
	}

	/// Every known version with its applied flag, version-ascending.
	/// Versions only present in history (orphans) are included.
	pub fn status(&self) -> Result<Vec<(String, bool)>, MigrationError> {
		let executed: Vec<String> = self.executed()?.into_iter().map(|e| e.version).collect();
		let mut all: BTreeMap<String, bool> = self
			.migrations
			.keys()
			.map(|version| (version.clone(), executed.contains(version)))
			.collect();
		for version in executed {
			all.entry(version).or_insert(true);
		}
		Ok(all.into_iter().collect())
	}

	fn run_statements(&self, schema: &SchemaBuilder) -> Result<(), MigrationError> {
		for sql in schema.to_sql() {
			self.db.execute(&sql, &[])?;
		}
		Ok(())
	}

	fn record_execution(&self, version: &str, elapsed_ms: u64) -> Result<(), MigrationError> {
		let mut statement = Query::insert();
		statement
			.into_table(Alias::new(HISTORY_TABLE))
			.columns([
				Alias::new("version"),
				Alias::new("executed_at"),
				Alias::new("execution_time"),
			])
			.values_panic([
				sea_query::SimpleExpr::from(Value::from(version)),
				sea_query::SimpleExpr::from(value::utc_now()),
				sea_query::SimpleExpr::from(Value::BigInt(Some(elapsed_ms as i64))),
			]);
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		self.db.execute(&sql, &params)?;
		Ok(())
	}

	fn delete_history(&self, version: &str) -> Result<(), MigrationError> {
		let mut statement = Query::delete();
		statement
			.from_table(Alias::new(HISTORY_TABLE))
			.and_where(Expr::col(Alias::new("version")).eq(version));
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		self.db.execute(&sql, &params)?;
		Ok(())
	}
}
