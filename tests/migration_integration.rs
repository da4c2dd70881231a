//! Migration pipeline end-to-end: generation, loading, execution,
//! rollback, history.

use std::rc::Rc;
use std::sync::Arc;

use grappelli::backends::Row;
use grappelli::backends::test_utils::{MockDatabase, TransactionEvent};
use grappelli::error::MigrationError;
use grappelli::metadata::{ColumnMetadata, ColumnType, EntityMetadata, MetadataRegistry};
use grappelli::migrations::{Migration, MigrationGenerator, MigrationManager};
use grappelli::schema::builder::SchemaBuilder;
use grappelli::value::Value;

/// Model for the generation scenarios: a single `users_test` table.
fn users_test_registry() -> Arc<MetadataRegistry> {
	let registry = MetadataRegistry::new();
	registry
		.register(
			EntityMetadata::new("UserTest", "users_test")
				.column(
					ColumnMetadata::new("id", "id", ColumnType::Int)
						.unsigned()
						.primary_key()
						.auto_increment(),
				)
				.column(
					ColumnMetadata::new("username", "username", ColumnType::Varchar(100))
						.default_value("John"),
				),
		)
		.unwrap();
	Arc::new(registry)
}

/// Script the three introspection reads for an empty database.
fn script_empty_schema(db: &MockDatabase) {
	db.push_rows(vec![]);
	db.push_rows(vec![]);
	db.push_rows(vec![]);
}

/// Script the three introspection reads for a live `users_test` matching
/// the registry above, plus an optional extra column.
fn script_users_test_schema(db: &MockDatabase, extra_column: bool) {
	let mut columns = vec![
		Row::new()
			.with("TABLE_NAME", "users_test")
			.with("COLUMN_NAME", "id")
			.with("COLUMN_TYPE", "int(10) unsigned")
			.with("IS_NULLABLE", "NO")
			.with("COLUMN_DEFAULT", Value::String(None))
			.with("EXTRA", "auto_increment")
			.with("COLUMN_KEY", "PRI"),
		Row::new()
			.with("TABLE_NAME", "users_test")
			.with("COLUMN_NAME", "username")
			.with("COLUMN_TYPE", "varchar(100)")
			.with("IS_NULLABLE", "NO")
			.with("COLUMN_DEFAULT", "John")
			.with("EXTRA", "")
			.with("COLUMN_KEY", ""),
	];
	if extra_column {
		columns.push(
			Row::new()
				.with("TABLE_NAME", "users_test")
				.with("COLUMN_NAME", "fake")
				.with("COLUMN_TYPE", "varchar(100)")
				.with("IS_NULLABLE", "YES")
				.with("COLUMN_DEFAULT", Value::String(None))
				.with("EXTRA", "")
				.with("COLUMN_KEY", ""),
		);
	}
	db.push_rows(columns);
	db.push_rows(vec![]);
	db.push_rows(vec![]);
}

#[test]
fn test_generate_and_run_initial_migration() {
	let dir = tempfile::tempdir().unwrap();
	let db = Rc::new(MockDatabase::new());
	script_empty_schema(&db);

	let generator =
		MigrationGenerator::new(users_test_registry(), db.clone(), "app", dir.path()).unwrap();
	let path = generator
		.generate_migration("202505011024")
		.unwrap()
		.expect("differences must yield a migration");
	assert_eq!(path.file_name().unwrap(), "Migration202505011024.rs");

	let source = std::fs::read_to_string(&path).unwrap();
	assert!(source.contains("pub struct Migration202505011024;"));
	assert!(source.contains("impl Migration for Migration202505011024"));
	assert!(source.contains(r#""20250501-1024""#));
	assert!(source.contains(r#".create_table("users_test")"#));
	assert!(source.contains(r#".default_value("John")"#));
	// Statements sit at the documented eight-space indent.
	assert!(source.contains("\n        schema\n"));

	// Load the file back and apply it.
	let mut manager = MigrationManager::new(db.clone()).unwrap();
	assert_eq!(manager.register_from(dir.path()).unwrap(), 1);
	db.push_rows(vec![]); // empty history for pending()
	db.push_rows(vec![]); // empty history for execute()
	assert_eq!(manager.migrate().unwrap(), 1);

	let sql = db.executed_sql();
	assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS `migration_history`"));
	assert!(
		sql.iter().any(|s| s.starts_with("CREATE TABLE `users_test`")),
		"migration DDL executed: {sql:?}"
	);
	let history_insert = db
		.statements()
		.into_iter()
		.find(|s| s.sql.starts_with("INSERT INTO `migration_history`"))
		.expect("history row recorded");
	assert_eq!(history_insert.params[0], Value::from("20250501-1024"));
	assert_eq!(
		db.transaction_log(),
		vec![TransactionEvent::Begin, TransactionEvent::Commit]
	);
}

#[test]
fn test_generate_is_idempotent_once_schema_matches() {
	let dir = tempfile::tempdir().unwrap();
	let db = Rc::new(MockDatabase::new());
	let generator =
		MigrationGenerator::new(users_test_registry(), db.clone(), "app", dir.path()).unwrap();

	script_empty_schema(&db);
	assert!(generator.generate_migration("202505011024").unwrap().is_some());

	// Second run against a live schema equal to the model: nothing to do.
	script_users_test_schema(&db, false);
	assert!(generator.generate_migration("202505011025").unwrap().is_none());
}

#[test]
fn test_drop_column_migration_restores_structure_on_down() {
	let dir = tempfile::tempdir().unwrap();
	let db = Rc::new(MockDatabase::new());
	script_users_test_schema(&db, true);

	let generator =
		MigrationGenerator::new(users_test_registry(), db.clone(), "app", dir.path()).unwrap();
	let path = generator.generate_migration("202505011024").unwrap().unwrap();
	let source = std::fs::read_to_string(&path).unwrap();

	assert!(source.contains(r#".alter_table("users_test")"#));
	assert!(source.contains(r#".drop_column("fake")"#));
	// The down path re-adds the column as VARCHAR(100) nullable.
	assert!(source.contains(r#".add_column(ColumnDefinition::new("fake").string(100))"#));

	// The loaded migration replays the same structure.
	let migration = grappelli::migrations::load_migration_file(&path).unwrap();
	let mut up = SchemaBuilder::new();
	migration.up(&mut up);
	assert_eq!(
		up.to_sql(),
		vec!["ALTER TABLE `users_test` DROP COLUMN `fake`".to_string()]
	);
	let mut down = SchemaBuilder::new();
	migration.down(&mut down);
	assert_eq!(
		down.to_sql(),
		vec!["ALTER TABLE `users_test` ADD COLUMN `fake` VARCHAR(100)".to_string()]
	);
}

#[test]
fn test_invalid_datetime_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let db = Rc::new(MockDatabase::new());
	let generator =
		MigrationGenerator::new(users_test_registry(), db, "app", dir.path()).unwrap();
	for stamp in ["invalid-datetime", "2025", "202513011024", "202505011061"] {
		assert!(matches!(
			generator.generate_migration(stamp),
			Err(MigrationError::InvalidDatetime(_))
		));
	}
}

#[test]
fn test_missing_migrations_directory_fails_at_construction() {
	let db = Rc::new(MockDatabase::new());
	let result = MigrationGenerator::new(
		users_test_registry(),
		db,
		"app",
		"/nonexistent/migrations/dir",
	);
	assert!(matches!(
		result,
		Err(MigrationError::MigrationDirectoryMissing(_))
	));
}

struct Noop {
	version: &'static str,
}

impl Migration for Noop {
	fn version(&self) -> &str {
		self.version
	}

	fn up(&self, schema: &mut SchemaBuilder) {
		schema.drop_table("noop");
	}

	fn down(&self, _schema: &mut SchemaBuilder) {}
}

fn history_row(id: u64, version: &str) -> Row {
	Row::new()
		.with("id", Value::BigUnsigned(Some(id)))
		.with("version", version)
		.with("executed_at", Value::ChronoDateTime(None))
		.with("execution_time", Value::BigInt(Some(12)))
}

#[test]
fn test_duplicate_version_registration_fails() {
	let db = Rc::new(MockDatabase::new());
	let mut manager = MigrationManager::new(db).unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250501-1024",
		}))
		.unwrap();
	assert!(matches!(
		manager.register(Box::new(Noop {
			version: "20250501-1024",
		})),
		Err(MigrationError::DuplicateMigrationVersion(_))
	));
}

#[test]
fn test_executing_a_recorded_migration_fails() {
	let db = Rc::new(MockDatabase::new());
	let mut manager = MigrationManager::new(db.clone()).unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250501-1024",
		}))
		.unwrap();
	db.push_rows(vec![history_row(1, "20250501-1024")]);
	let migration = Noop {
		version: "20250501-1024",
	};
	assert!(matches!(
		manager.execute(&migration),
		Err(MigrationError::AlreadyExecuted(_))
	));
}

#[test]
fn test_rollback_with_empty_history_returns_false() {
	let db = Rc::new(MockDatabase::new());
	let manager = MigrationManager::new(db.clone()).unwrap();
	db.push_rows(vec![]);
	assert!(!manager.rollback().unwrap());
}

#[test]
fn test_rollback_of_unregistered_version_is_an_orphan() {
	let db = Rc::new(MockDatabase::new());
	let manager = MigrationManager::new(db.clone()).unwrap();
	db.push_rows(vec![history_row(1, "20240101-0900")]);
	assert!(matches!(
		manager.rollback(),
		Err(MigrationError::OrphanExecuted(_))
	));
}

#[test]
fn test_rollback_reverts_highest_version_and_deletes_history() {
	let db = Rc::new(MockDatabase::new());
	let mut manager = MigrationManager::new(db.clone()).unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250501-1024",
		}))
		.unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250401-0900",
		}))
		.unwrap();
	db.push_rows(vec![
		history_row(1, "20250401-0900"),
		history_row(2, "20250501-1024"),
	]);
	assert!(manager.rollback().unwrap());

	let statements = db.statements();
	let delete = statements
		.iter()
		.find(|s| s.sql.starts_with("DELETE FROM `migration_history`"))
		.expect("history row deleted");
	assert_eq!(delete.params[0], Value::from("20250501-1024"));
	assert_eq!(
		db.transaction_log(),
		vec![TransactionEvent::Begin, TransactionEvent::Commit]
	);
}

#[test]
fn test_failed_migration_rolls_back_and_names_version() {
	let db = Rc::new(MockDatabase::new());
	let mut manager = MigrationManager::new(db.clone()).unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250501-1024",
		}))
		.unwrap();
	db.fail_on("DROP TABLE `noop`");
	db.push_rows(vec![]); // pending()
	db.push_rows(vec![]); // execute() history check
	let err = manager.migrate().unwrap_err();
	match err {
		MigrationError::MigrationFailed { version, cause } => {
			assert_eq!(version, "20250501-1024");
			assert!(!cause.is_empty());
		}
		other => panic!("expected MigrationFailed, got {other:?}"),
	}
	assert_eq!(
		db.transaction_log(),
		vec![TransactionEvent::Begin, TransactionEvent::Rollback]
	);
}

#[test]
fn test_status_lists_applied_and_pending() {
	let db = Rc::new(MockDatabase::new());
	let mut manager = MigrationManager::new(db.clone()).unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250401-0900",
		}))
		.unwrap();
	manager
		.register(Box::new(Noop {
			version: "20250501-1024",
		}))
		.unwrap();
	db.push_rows(vec![history_row(1, "20250401-0900")]);
	let status = manager.status().unwrap();
	assert_eq!(
		status,
		vec![
			("20250401-0900".to_string(), true),
			("20250501-1024".to_string(), false),
		]
	);
}
