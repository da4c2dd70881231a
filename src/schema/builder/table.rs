//! Table definitions for the schema-builder DSL.

use crate::schema::builder::{ColumnDefinition, ForeignKeyDefinition, quote_identifier};

/// One command inside a table definition, kept in call order.
#[derive(Debug, Clone)]
pub enum TableCommand {
	AddColumn(ColumnDefinition),
	DropColumn(String),
	ModifyColumn(ColumnDefinition),
	AddForeignKey(ForeignKeyDefinition),
	DropForeignKey(String),
}

/// A CREATE TABLE or ALTER TABLE statement under fluent construction.
#[derive(Debug, Clone)]
pub struct TableDefinition {
	pub(crate) name: String,
	pub(crate) commands: Vec<TableCommand>,
	pub(crate) primary_key: Vec<String>,
	pub(crate) engine: Option<String>,
	pub(crate) charset: Option<String>,
	pub(crate) collation: Option<String>,
}

impl TableDefinition {
	pub(crate) fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			commands: Vec::new(),
			primary_key: Vec::new(),
			engine: None,
			charset: None,
			collation: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn commands(&self) -> &[TableCommand] {
		&self.commands
	}

	pub fn primary_key_columns(&self) -> Option<&[String]> {
		if self.primary_key.is_empty() {
			None
		} else {
			Some(&self.primary_key)
		}
	}

	pub fn engine_option(&self) -> Option<&str> {
		self.engine.as_deref()
	}

	pub fn charset_option(&self) -> Option<&str> {
		self.charset.as_deref()
	}

	pub fn collation_option(&self) -> Option<&str> {
		self.collation.as_deref()
	}

	/// Add a column (CREATE body entry, or ADD COLUMN under ALTER).
	pub fn column(&mut self, column: ColumnDefinition) -> &mut Self {
		self.commands.push(TableCommand::AddColumn(column));
		self
	}

	/// Alias of [`TableDefinition::column`], reads naturally under ALTER.
	pub fn add_column(&mut self, column: ColumnDefinition) -> &mut Self {
		self.column(column)
	}

	pub fn drop_column(&mut self, name: impl Into<String>) -> &mut Self {
		self.commands.push(TableCommand::DropColumn(name.into()));
		self
	}

	pub fn modify_column(&mut self, column: ColumnDefinition) -> &mut Self {
		self.commands.push(TableCommand::ModifyColumn(column));
		self
	}

	pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
		self.primary_key = columns.iter().map(|c| c.to_string()).collect();
		self
	}

	/// Add a foreign key (CREATE body entry, or ADD CONSTRAINT under ALTER).
	pub fn foreign_key(&mut self, foreign_key: ForeignKeyDefinition) -> &mut Self {
		self.commands.push(TableCommand::AddForeignKey(foreign_key));
		self
	}

	/// Alias of [`TableDefinition::foreign_key`].
	pub fn add_foreign_key(&mut self, foreign_key: ForeignKeyDefinition) -> &mut Self {
		self.foreign_key(foreign_key)
	}

	pub fn drop_foreign_key(&mut self, name: impl Into<String>) -> &mut Self {
		self.commands.push(TableCommand::DropForeignKey(name.into()));
		self
	}

	pub fn engine(&mut self, engine: impl Into<String>) -> &mut Self {
		self.engine = Some(engine.into());
		self
	}

	pub fn charset(&mut self, charset: impl Into<String>) -> &mut Self {
		self.charset = Some(charset.into());
		self
	}

	pub fn collation(&mut self, collation: impl Into<String>) -> &mut Self {
		self.collation = Some(collation.into());
		self
	}

	pub(crate) fn render_create(&self) -> String {
		let mut body: Vec<String> = Vec::new();
		for command in &self.commands {
			match command {
				TableCommand::AddColumn(column) => body.push(column.render()),
				TableCommand::AddForeignKey(fk) => body.push(fk.render()),
				// Drop/modify commands have no meaning inside CREATE.
				_ => {}
			}
		}
		// Primary key renders between columns and constraints.
		if !self.primary_key.is_empty() {
			let columns = self
				.primary_key
				.iter()
				.map(|c| quote_identifier(c))
				.collect::<Vec<_>>()
				.join(", ");
			let position = body
				.iter()
				.position(|clause| clause.starts_with("CONSTRAINT"))
				.unwrap_or(body.len());
			body.insert(position, format!("PRIMARY KEY ({columns})"));
		}
		let mut sql = format!(
			"CREATE TABLE {} ({})",
			quote_identifier(&self.name),
			body.join(", ")
		);
		if let Some(engine) = &self.engine {
			sql.push_str(&format!(" ENGINE={engine}"));
		}
		if let Some(charset) = &self.charset {
			sql.push_str(&format!(" DEFAULT CHARSET={charset}"));
		}
		if let Some(collation) = &self.collation {
			sql.push_str(&format!(" COLLATE={collation}"));
		}
		sql
	}

	pub(crate) fn render_alter(&self) -> String {
		let clauses: Vec<String> = self
			.commands
			.iter()
			.map(|command| match command {
				TableCommand::AddColumn(column) => format!("ADD COLUMN {}", column.render()),
				TableCommand::DropColumn(name) => {
					format!("DROP COLUMN {}", quote_identifier(name))
				}
				TableCommand::ModifyColumn(column) => {
					format!("MODIFY COLUMN {}", column.render())
				}
				TableCommand::AddForeignKey(fk) => format!("ADD {}", fk.render()),
				TableCommand::DropForeignKey(name) => {
					format!("DROP FOREIGN KEY {}", quote_identifier(name))
				}
			})
			.collect();
		format!(
			"ALTER TABLE {} {}",
			quote_identifier(&self.name),
			clauses.join(", ")
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_primary_key_renders_before_constraints() {
		let mut table = TableDefinition::new("users_");
		table
			.column(ColumnDefinition::new("id").integer().not_null())
			.column(ColumnDefinition::new("unit_id").integer().not_null())
			.foreign_key(
				ForeignKeyDefinition::new("fk_users_unit")
					.column("unit_id")
					.references("units_", "id"),
			)
			.primary_key(&["id"]);
		let sql = table.render_create();
		let pk = sql.find("PRIMARY KEY").unwrap();
		let fk = sql.find("CONSTRAINT").unwrap();
		assert!(pk < fk);
	}

	#[test]
	fn test_table_options_render_in_order() {
		let mut table = TableDefinition::new("t");
		table
			.column(ColumnDefinition::new("id").integer())
			.engine("InnoDB")
			.charset("utf8mb4")
			.collation("utf8mb4_unicode_ci");
		assert!(
			table
				.render_create()
				.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci")
		);
	}
}
