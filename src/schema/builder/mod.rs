//! The schema-builder DSL: a small in-memory AST with fluent construction
//! that renders MySQL DDL.
//!
//! Migration `up`/`down` programs are written against this module, both
//! when generated and when hand-written:
//!
//! ```
//! use grappelli::schema::builder::{ColumnDefinition, SchemaBuilder};
//!
//! let mut schema = SchemaBuilder::new();
//! schema
//!     .create_table("users_test")
//!     .column(ColumnDefinition::new("id").integer().unsigned().not_null().auto_increment())
//!     .column(ColumnDefinition::new("username").string(100).not_null().default_value("John"))
//!     .primary_key(&["id"]);
//! let sql = schema.to_sql();
//! assert!(sql[0].starts_with("CREATE TABLE `users_test`"));
//! ```
//!
//! Rendering rules: identifiers in backticks, string literals in single
//! quotes with doubled interior quotes, enum/set literals in source order,
//! defaults verbatim except NULL which is omitted.

mod column;
mod foreign_key;
mod table;

pub use column::ColumnDefinition;
pub use foreign_key::ForeignKeyDefinition;
pub use table::{TableCommand, TableDefinition};

pub use crate::metadata::ReferenceOption;

/// One DSL statement.
#[derive(Debug, Clone)]
pub enum SchemaStatement {
	CreateTable(TableDefinition),
	AlterTable(TableDefinition),
	DropTable(String),
}

impl SchemaStatement {
	pub fn to_sql(&self) -> String {
		match self {
			SchemaStatement::CreateTable(table) => table.render_create(),
			SchemaStatement::AlterTable(table) => table.render_alter(),
			SchemaStatement::DropTable(name) => format!("DROP TABLE {}", quote_identifier(name)),
		}
	}
}

/// Collects DSL statements in program order.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
	pub(crate) statements: Vec<SchemaStatement>,
}

impl SchemaBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Begin a CREATE TABLE statement and return its definition for
	/// fluent completion.
	pub fn create_table(&mut self, name: impl Into<String>) -> &mut TableDefinition {
		self.statements
			.push(SchemaStatement::CreateTable(TableDefinition::new(name)));
		match self.statements.last_mut() {
			Some(SchemaStatement::CreateTable(table)) => table,
			_ => unreachable!(),
		}
	}

	/// Begin an ALTER TABLE statement.
	pub fn alter_table(&mut self, name: impl Into<String>) -> &mut TableDefinition {
		self.statements
			.push(SchemaStatement::AlterTable(TableDefinition::new(name)));
		match self.statements.last_mut() {
			Some(SchemaStatement::AlterTable(table)) => table,
			_ => unreachable!(),
		}
	}

	pub fn drop_table(&mut self, name: impl Into<String>) {
		self.statements
			.push(SchemaStatement::DropTable(name.into()));
	}

	pub fn statements(&self) -> &[SchemaStatement] {
		&self.statements
	}

	pub fn is_empty(&self) -> bool {
		self.statements.is_empty()
	}

	/// Render every statement into dialect SQL, in program order.
	pub fn to_sql(&self) -> Vec<String> {
		self.statements.iter().map(SchemaStatement::to_sql).collect()
	}
}

/// Backtick-quote an identifier, doubling interior backticks.
pub(crate) fn quote_identifier(name: &str) -> String {
	format!("`{}`", name.replace('`', "``"))
}

/// Single-quote a string literal, doubling interior quotes.
pub(crate) fn quote_string(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

/// Render a DEFAULT clause value: numbers and the CURRENT_TIMESTAMP family
/// verbatim, everything else as a quoted string. NULL defaults are the
/// caller's responsibility to omit.
pub(crate) fn render_default(value: &str) -> String {
	let upper = value.to_ascii_uppercase();
	if value.parse::<f64>().is_ok()
		|| upper.starts_with("CURRENT_TIMESTAMP")
		|| upper == "CURRENT_DATE"
	{
		value.to_string()
	} else {
		quote_string(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_create_table_rendering() {
		let mut schema = SchemaBuilder::new();
		schema
			.create_table("users_test")
			.column(
				ColumnDefinition::new("id")
					.integer()
					.unsigned()
					.not_null()
					.auto_increment(),
			)
			.column(
				ColumnDefinition::new("username")
					.string(100)
					.not_null()
					.default_value("John"),
			)
			.primary_key(&["id"])
			.engine("InnoDB");
		let sql = schema.to_sql();
		assert_eq!(sql.len(), 1);
		assert_eq!(
			sql[0],
			"CREATE TABLE `users_test` (`id` INT UNSIGNED NOT NULL AUTO_INCREMENT, \
			 `username` VARCHAR(100) NOT NULL DEFAULT 'John', PRIMARY KEY (`id`)) ENGINE=InnoDB"
		);
	}

	#[test]
	fn test_alter_table_command_order_is_preserved() {
		let mut schema = SchemaBuilder::new();
		schema
			.alter_table("users_test")
			.drop_foreign_key("fk_users_unit")
			.drop_column("fake");
		let sql = schema.to_sql();
		assert_eq!(
			sql[0],
			"ALTER TABLE `users_test` DROP FOREIGN KEY `fk_users_unit`, DROP COLUMN `fake`"
		);
	}

	#[test]
	fn test_drop_table_rendering() {
		let mut schema = SchemaBuilder::new();
		schema.drop_table("old");
		assert_eq!(schema.to_sql(), vec!["DROP TABLE `old`".to_string()]);
	}

	#[test]
	fn test_null_default_is_omitted() {
		let mut schema = SchemaBuilder::new();
		schema
			.alter_table("t")
			.add_column(ColumnDefinition::new("c").string(50).default_value("NULL"));
		let sql = schema.to_sql();
		assert_eq!(sql[0], "ALTER TABLE `t` ADD COLUMN `c` VARCHAR(50)");
	}

	#[test]
	fn test_string_default_doubles_interior_quotes() {
		let mut schema = SchemaBuilder::new();
		schema
			.alter_table("t")
			.add_column(ColumnDefinition::new("c").string(50).default_value("O'Brien"));
		let sql = schema.to_sql();
		assert!(sql[0].contains("DEFAULT 'O''Brien'"));
	}

	#[test]
	fn test_foreign_key_rendering() {
		let mut schema = SchemaBuilder::new();
		schema.alter_table("users_").add_foreign_key(
			ForeignKeyDefinition::new("fk_users_unit")
				.column("unit_id")
				.references("units_", "id")
				.on_delete(ReferenceOption::Cascade),
		);
		let sql = schema.to_sql();
		assert_eq!(
			sql[0],
			"ALTER TABLE `users_` ADD CONSTRAINT `fk_users_unit` FOREIGN KEY (`unit_id`) \
			 REFERENCES `units_` (`id`) ON DELETE CASCADE ON UPDATE RESTRICT"
		);
	}

	#[test]
	fn test_enum_literals_render_in_source_order() {
		let mut schema = SchemaBuilder::new();
		schema.alter_table("t").add_column(
			ColumnDefinition::new("state").enumeration(&["done", "open"]),
		);
		let sql = schema.to_sql();
		assert!(sql[0].contains("ENUM('done','open')"));
	}
}
