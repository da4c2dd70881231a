//! Schema model: snapshots of a live database, the target schema derived
//! from entity metadata, and the structural difference between them.

pub mod builder;
mod comparer;
mod information;
mod target;

pub use comparer::{ColumnDiff, SchemaComparer, SchemaDifference, normalize_type};
pub use information::SchemaInformation;
pub use target::target_schema;

use indexmap::IndexMap;

/// One column as `information_schema` describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
	/// COLUMN_TYPE string form, e.g. `int(10) unsigned` or `varchar(100)`.
	pub column_type: String,
	/// IS_NULLABLE.
	pub nullable: bool,
	/// COLUMN_DEFAULT; `None` means no default (NULL).
	pub default: Option<String>,
	/// EXTRA, e.g. `auto_increment`.
	pub extra: String,
	/// COLUMN_KEY: `PRI`, `UNI`, `MUL`, or empty.
	pub key: String,
}

impl ColumnInfo {
	pub fn new(column_type: impl Into<String>) -> Self {
		Self {
			column_type: column_type.into(),
			nullable: false,
			default: None,
			extra: String::new(),
			key: String::new(),
		}
	}

	pub fn nullable(mut self) -> Self {
		self.nullable = true;
		self
	}

	pub fn default_value(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn extra(mut self, extra: impl Into<String>) -> Self {
		self.extra = extra.into();
		self
	}

	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();
		self
	}
}

/// One foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
	pub constraint: String,
	pub column: String,
	pub referenced_table: String,
	pub referenced_column: String,
	/// DELETE_RULE string form (`RESTRICT`, `CASCADE`, ...).
	pub on_delete: String,
	/// UPDATE_RULE string form.
	pub on_update: String,
}

/// One secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
	pub name: String,
	pub columns: Vec<String>,
	pub unique: bool,
}

/// Table options relevant to DDL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableOptions {
	pub engine: Option<String>,
	pub charset: Option<String>,
	pub collation: Option<String>,
}

/// One table's structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSnapshot {
	pub columns: IndexMap<String, ColumnInfo>,
	pub foreign_keys: IndexMap<String, ForeignKeyInfo>,
	pub indexes: IndexMap<String, IndexInfo>,
	pub options: TableOptions,
}

impl TableSnapshot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_column(mut self, name: impl Into<String>, info: ColumnInfo) -> Self {
		self.columns.insert(name.into(), info);
		self
	}

	pub fn with_foreign_key(mut self, info: ForeignKeyInfo) -> Self {
		self.foreign_keys.insert(info.constraint.clone(), info);
		self
	}
}

/// The structure of a whole database, table by table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaSnapshot {
	pub tables: IndexMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_table(mut self, name: impl Into<String>, table: TableSnapshot) -> Self {
		self.tables.insert(name.into(), table);
		self
	}

	pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
		self.tables.get(name)
	}
}
