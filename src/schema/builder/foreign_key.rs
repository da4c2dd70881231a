//! Foreign-key definitions for the schema-builder DSL.

use crate::metadata::ReferenceOption;
use crate::schema::ForeignKeyInfo;
use crate::schema::builder::quote_identifier;

/// One foreign-key constraint, built fluently:
/// `ForeignKeyDefinition::new("fk_users_unit").column("unit_id").references("units_", "id")`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDefinition {
	pub(crate) name: String,
	pub(crate) column: Option<String>,
	pub(crate) referenced_table: Option<String>,
	pub(crate) referenced_column: Option<String>,
	pub(crate) on_delete: ReferenceOption,
	pub(crate) on_update: ReferenceOption,
}

impl ForeignKeyDefinition {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			column: None,
			referenced_table: None,
			referenced_column: None,
			on_delete: ReferenceOption::Restrict,
			on_update: ReferenceOption::Restrict,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn local_column(&self) -> Option<&str> {
		self.column.as_deref()
	}

	pub fn referenced_table(&self) -> Option<&str> {
		self.referenced_table.as_deref()
	}

	pub fn referenced_column(&self) -> Option<&str> {
		self.referenced_column.as_deref()
	}

	pub fn on_delete_rule(&self) -> ReferenceOption {
		self.on_delete
	}

	pub fn on_update_rule(&self) -> ReferenceOption {
		self.on_update
	}

	pub fn column(mut self, column: impl Into<String>) -> Self {
		self.column = Some(column.into());
		self
	}

	pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
		self.referenced_table = Some(table.into());
		self.referenced_column = Some(column.into());
		self
	}

	pub fn on_delete(mut self, rule: ReferenceOption) -> Self {
		self.on_delete = rule;
		self
	}

	pub fn on_update(mut self, rule: ReferenceOption) -> Self {
		self.on_update = rule;
		self
	}

	/// A definition is renderable only when the local column and the
	/// referenced table/column are all present.
	pub fn is_complete(&self) -> bool {
		self.column.is_some() && self.referenced_table.is_some() && self.referenced_column.is_some()
	}

	pub fn from_info(info: &ForeignKeyInfo) -> Self {
		Self {
			name: info.constraint.clone(),
			column: Some(info.column.clone()),
			referenced_table: Some(info.referenced_table.clone()),
			referenced_column: Some(info.referenced_column.clone()),
			on_delete: ReferenceOption::from_rule(&info.on_delete),
			on_update: ReferenceOption::from_rule(&info.on_update),
		}
	}

	/// Render the constraint clause of a CREATE/ALTER statement.
	pub(crate) fn render(&self) -> String {
		let column = self.column.as_deref().unwrap_or("");
		let table = self.referenced_table.as_deref().unwrap_or("");
		let referenced = self.referenced_column.as_deref().unwrap_or("");
		format!(
			"CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
			quote_identifier(&self.name),
			quote_identifier(column),
			quote_identifier(table),
			quote_identifier(referenced),
			self.on_delete.sql(),
			self.on_update.sql(),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_completeness() {
		let partial = ForeignKeyDefinition::new("fk").column("unit_id");
		assert!(!partial.is_complete());
		let complete = partial.references("units_", "id");
		assert!(complete.is_complete());
	}

	#[test]
	fn test_render_includes_both_rules() {
		let fk = ForeignKeyDefinition::new("fk_users_unit")
			.column("unit_id")
			.references("units_", "id")
			.on_delete(ReferenceOption::SetNull)
			.on_update(ReferenceOption::Cascade);
		assert_eq!(
			fk.render(),
			"CONSTRAINT `fk_users_unit` FOREIGN KEY (`unit_id`) REFERENCES `units_` (`id`) \
			 ON DELETE SET NULL ON UPDATE CASCADE"
		);
	}
}
