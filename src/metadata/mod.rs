//! Entity metadata: the canonical model of entities, columns, keys, and
//! relations.
//!
//! Metadata is computed once at registry load (programmatically or from
//! TOML definition files), cached, and read-only afterwards. Both the
//! persistence engine and the migration pipeline consume it; neither ever
//! mutates it.

mod loader;
mod registry;

pub use loader::load_entity_file;
pub use registry::MetadataRegistry;

use crate::error::OrmError;
use crate::orm::EntityRef;
use crate::value::Value;

/// Factory producing a blank instance for hydration.
pub type EntityFactory = fn() -> EntityRef;

/// Column type as rendered in MySQL DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
	TinyInt,
	SmallInt,
	Int,
	BigInt,
	Decimal { precision: u8, scale: u8 },
	Float,
	Double,
	Boolean,
	Char(u32),
	Varchar(u32),
	Text,
	MediumText,
	LongText,
	Blob,
	Date,
	Time,
	DateTime,
	Timestamp,
	Json,
	Enum(Vec<String>),
	Set(Vec<String>),
	Geometry,
}

impl ColumnType {
	/// DDL rendering of the bare type. Enum and set literals keep their
	/// source order.
	pub fn sql(&self) -> String {
		match self {
			ColumnType::TinyInt => "TINYINT".into(),
			ColumnType::SmallInt => "SMALLINT".into(),
			ColumnType::Int => "INT".into(),
			ColumnType::BigInt => "BIGINT".into(),
			ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
			ColumnType::Float => "FLOAT".into(),
			ColumnType::Double => "DOUBLE".into(),
			ColumnType::Boolean => "TINYINT(1)".into(),
			ColumnType::Char(len) => format!("CHAR({len})"),
			ColumnType::Varchar(len) => format!("VARCHAR({len})"),
			ColumnType::Text => "TEXT".into(),
			ColumnType::MediumText => "MEDIUMTEXT".into(),
			ColumnType::LongText => "LONGTEXT".into(),
			ColumnType::Blob => "BLOB".into(),
			ColumnType::Date => "DATE".into(),
			ColumnType::Time => "TIME".into(),
			ColumnType::DateTime => "DATETIME".into(),
			ColumnType::Timestamp => "TIMESTAMP".into(),
			ColumnType::Json => "JSON".into(),
			ColumnType::Enum(values) => format!("ENUM({})", quote_literals(values)),
			ColumnType::Set(values) => format!("SET({})", quote_literals(values)),
			ColumnType::Geometry => "GEOMETRY".into(),
		}
	}

	/// A typed NULL for this column, used to bind absent attributes and to
	/// reset primary keys on rollback.
	pub fn null_value(&self) -> Value {
		match self {
			ColumnType::TinyInt => Value::TinyInt(None),
			ColumnType::SmallInt => Value::SmallInt(None),
			ColumnType::Int => Value::Int(None),
			ColumnType::BigInt => Value::BigInt(None),
			ColumnType::Decimal { .. } | ColumnType::Float => Value::Float(None),
			ColumnType::Double => Value::Double(None),
			ColumnType::Boolean => Value::Bool(None),
			ColumnType::Date => Value::ChronoDate(None),
			ColumnType::Time => Value::ChronoTime(None),
			ColumnType::DateTime | ColumnType::Timestamp => Value::ChronoDateTime(None),
			ColumnType::Json => Value::Json(None),
			ColumnType::Blob => Value::Bytes(None),
			_ => Value::String(None),
		}
	}

}

fn quote_literals(values: &[String]) -> String {
	values
		.iter()
		.map(|v| format!("'{}'", v.replace('\'', "''")))
		.collect::<Vec<_>>()
		.join(",")
}

/// Key participation of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyKind {
	#[default]
	None,
	Primary,
	Unique,
	Index,
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceOption {
	#[default]
	Restrict,
	Cascade,
	SetNull,
	NoAction,
}

impl ReferenceOption {
	pub fn sql(&self) -> &'static str {
		match self {
			ReferenceOption::Restrict => "RESTRICT",
			ReferenceOption::Cascade => "CASCADE",
			ReferenceOption::SetNull => "SET NULL",
			ReferenceOption::NoAction => "NO ACTION",
		}
	}

	/// Parse the `information_schema` rule string form.
	pub fn from_rule(rule: &str) -> Self {
		match rule.to_ascii_uppercase().as_str() {
			"CASCADE" => ReferenceOption::Cascade,
			"SET NULL" => ReferenceOption::SetNull,
			"NO ACTION" => ReferenceOption::NoAction,
			_ => ReferenceOption::Restrict,
		}
	}
}

/// Mapping of one entity property to one table column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
	pub property: String,
	pub column: String,
	pub column_type: ColumnType,
	pub nullable: bool,
	/// Default rendered verbatim into DDL; `None` and `"NULL"` are omitted.
	pub default: Option<String>,
	pub key: KeyKind,
	pub auto_increment: bool,
	pub unsigned: bool,
	pub extra: Option<String>,
}

impl ColumnMetadata {
	pub fn new(
		property: impl Into<String>,
		column: impl Into<String>,
		column_type: ColumnType,
	) -> Self {
		Self {
			property: property.into(),
			column: column.into(),
			column_type,
			nullable: false,
			default: None,
			key: KeyKind::None,
			auto_increment: false,
			unsigned: false,
			extra: None,
		}
	}

	pub fn nullable(mut self) -> Self {
		self.nullable = true;
		self
	}

	pub fn unsigned(mut self) -> Self {
		self.unsigned = true;
		self
	}

	pub fn auto_increment(mut self) -> Self {
		self.auto_increment = true;
		self
	}

	pub fn primary_key(mut self) -> Self {
		self.key = KeyKind::Primary;
		self
	}

	pub fn unique(mut self) -> Self {
		self.key = KeyKind::Unique;
		self
	}

	pub fn indexed(mut self) -> Self {
		self.key = KeyKind::Index;
		self
	}

	pub fn default_value(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn extra(mut self, extra: impl Into<String>) -> Self {
		self.extra = Some(extra.into());
		self
	}

	/// Wrap a freshly generated insert id in this column's value type.
	pub fn value_from_insert_id(&self, id: u64) -> Value {
		if self.unsigned {
			match self.column_type {
				ColumnType::BigInt => Value::BigUnsigned(Some(id)),
				_ => Value::Unsigned(Some(id as u32)),
			}
		} else {
			match self.column_type {
				ColumnType::BigInt => Value::BigInt(Some(id as i64)),
				_ => Value::Int(Some(id as i32)),
			}
		}
	}
}

/// Relation arity, tagged the way the model carries cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
	OneToOne,
	OneToMany,
	ManyToOne,
	ManyToMany,
}

impl RelationKind {
	/// Relations whose value is a single instance.
	pub fn is_to_one(&self) -> bool {
		matches!(self, RelationKind::OneToOne | RelationKind::ManyToOne)
	}

	/// Relations whose value is a collection.
	pub fn is_to_many(&self) -> bool {
		!self.is_to_one()
	}
}

/// Join table backing an owning many-to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTableMetadata {
	pub table: String,
	/// Column holding this side's primary key.
	pub local_column: String,
	/// Column holding the target side's primary key.
	pub target_column: String,
}

/// One declared relation between two entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationMetadata {
	pub property: String,
	pub kind: RelationKind,
	pub target: String,
	/// The owning side carries the foreign-key column (or defines the join
	/// table for many-to-many).
	pub owning: bool,
	/// Local FK column, for owning *-to-one relations.
	pub column: Option<String>,
	/// Property on the target pointing back, for cascading.
	pub inverse_property: Option<String>,
	pub join_table: Option<JoinTableMetadata>,
	pub on_delete: ReferenceOption,
	pub on_update: ReferenceOption,
}

impl RelationMetadata {
	pub fn many_to_one(
		property: impl Into<String>,
		target: impl Into<String>,
		column: impl Into<String>,
	) -> Self {
		Self {
			property: property.into(),
			kind: RelationKind::ManyToOne,
			target: target.into(),
			owning: true,
			column: Some(column.into()),
			inverse_property: None,
			join_table: None,
			on_delete: ReferenceOption::Restrict,
			on_update: ReferenceOption::Restrict,
		}
	}

	pub fn one_to_one(
		property: impl Into<String>,
		target: impl Into<String>,
		column: impl Into<String>,
	) -> Self {
		Self {
			kind: RelationKind::OneToOne,
			..Self::many_to_one(property, target, column)
		}
	}

	pub fn one_to_many(
		property: impl Into<String>,
		target: impl Into<String>,
		inverse_property: impl Into<String>,
	) -> Self {
		Self {
			property: property.into(),
			kind: RelationKind::OneToMany,
			target: target.into(),
			owning: false,
			column: None,
			inverse_property: Some(inverse_property.into()),
			join_table: None,
			on_delete: ReferenceOption::Restrict,
			on_update: ReferenceOption::Restrict,
		}
	}

	pub fn many_to_many(
		property: impl Into<String>,
		target: impl Into<String>,
		join_table: JoinTableMetadata,
	) -> Self {
		Self {
			property: property.into(),
			kind: RelationKind::ManyToMany,
			target: target.into(),
			owning: true,
			column: None,
			inverse_property: None,
			join_table: Some(join_table),
			on_delete: ReferenceOption::Restrict,
			on_update: ReferenceOption::Restrict,
		}
	}

	pub fn inverse(mut self) -> Self {
		self.owning = false;
		self
	}

	pub fn inverse_property(mut self, property: impl Into<String>) -> Self {
		self.inverse_property = Some(property.into());
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
}

/// A secondary index over one or more columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
	pub name: String,
	pub columns: Vec<String>,
	pub unique: bool,
}

/// The full metadata of one entity.
#[derive(Clone)]
pub struct EntityMetadata {
	pub entity: String,
	pub table: String,
	pub columns: Vec<ColumnMetadata>,
	pub relations: Vec<RelationMetadata>,
	pub indexes: Vec<IndexMetadata>,
	pub factory: Option<EntityFactory>,
}

impl std::fmt::Debug for EntityMetadata {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EntityMetadata")
			.field("entity", &self.entity)
			.field("table", &self.table)
			.field("columns", &self.columns)
			.field("relations", &self.relations)
			.field("indexes", &self.indexes)
			.field("factory", &self.factory.map(|_| "fn"))
			.finish()
	}
}

impl PartialEq for EntityMetadata {
	/// Structural equality; the hydration factory is not part of identity.
	fn eq(&self, other: &Self) -> bool {
		self.entity == other.entity
			&& self.table == other.table
			&& self.columns == other.columns
			&& self.relations == other.relations
			&& self.indexes == other.indexes
	}
}

impl EntityMetadata {
	pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
		Self {
			entity: entity.into(),
			table: table.into(),
			columns: Vec::new(),
			relations: Vec::new(),
			indexes: Vec::new(),
			factory: None,
		}
	}

	pub fn column(mut self, column: ColumnMetadata) -> Self {
		self.columns.push(column);
		self
	}

	pub fn relation(mut self, relation: RelationMetadata) -> Self {
		self.relations.push(relation);
		self
	}

	pub fn index(mut self, index: IndexMetadata) -> Self {
		self.indexes.push(index);
		self
	}

	pub fn factory(mut self, factory: EntityFactory) -> Self {
		self.factory = Some(factory);
		self
	}

	/// The single primary-key column.
	pub fn primary_key_column(&self) -> Result<&ColumnMetadata, OrmError> {
		let mut primaries = self.columns.iter().filter(|c| c.key == KeyKind::Primary);
		match (primaries.next(), primaries.next()) {
			(Some(pk), None) => Ok(pk),
			_ => Err(OrmError::NoPrimaryKey(self.entity.clone())),
		}
	}

	pub fn column_for_property(&self, property: &str) -> Option<&ColumnMetadata> {
		self.columns.iter().find(|c| c.property == property)
	}

	pub fn column_by_name(&self, column: &str) -> Option<&ColumnMetadata> {
		self.columns.iter().find(|c| c.column == column)
	}

	pub fn relation_for_property(&self, property: &str) -> Option<&RelationMetadata> {
		self.relations.iter().find(|r| r.property == property)
	}

	/// Owning *-to-one relations, the ones that serialise as FK columns.
	pub fn owning_to_one_relations(&self) -> impl Iterator<Item = &RelationMetadata> {
		self.relations
			.iter()
			.filter(|r| r.kind.is_to_one() && r.owning && r.column.is_some())
	}

	/// Owning many-to-many relations, the ones that drive join rows.
	pub fn owning_many_to_many_relations(&self) -> impl Iterator<Item = &RelationMetadata> {
		self.relations
			.iter()
			.filter(|r| r.kind == RelationKind::ManyToMany && r.owning && r.join_table.is_some())
	}

	/// To-many relations tracked at the collection level.
	pub fn collection_relations(&self) -> impl Iterator<Item = &RelationMetadata> {
		self.relations.iter().filter(|r| r.kind.is_to_many())
	}

	/// Resolve a property to the column an UPDATE would touch: either a
	/// scalar column or the FK column of an owning *-to-one relation.
	pub fn update_column_for(&self, property: &str) -> Option<&str> {
		if let Some(column) = self.column_for_property(property) {
			return Some(&column.column);
		}
		self.relation_for_property(property)
			.and_then(|r| r.column.as_deref())
	}

	/// Single-entity invariants: exactly one primary key, unique column
	/// names, unique property names (across columns and relations).
	pub fn validate(&self) -> Result<(), OrmError> {
		self.primary_key_column()?;
		let mut columns = std::collections::HashSet::new();
		let mut properties = std::collections::HashSet::new();
		for column in &self.columns {
			if !columns.insert(column.column.as_str()) {
				return Err(OrmError::InvalidMetadata {
					entity: self.entity.clone(),
					message: format!("duplicate column `{}`", column.column),
				});
			}
			if !properties.insert(column.property.as_str()) {
				return Err(OrmError::InvalidMetadata {
					entity: self.entity.clone(),
					message: format!("duplicate property `{}`", column.property),
				});
			}
		}
		for relation in &self.relations {
			if !properties.insert(relation.property.as_str()) {
				return Err(OrmError::InvalidMetadata {
					entity: self.entity.clone(),
					message: format!("duplicate property `{}`", relation.property),
				});
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn user_metadata() -> EntityMetadata {
		EntityMetadata::new("User", "users_")
			.column(
				ColumnMetadata::new("id", "id", ColumnType::Int)
					.unsigned()
					.primary_key()
					.auto_increment(),
			)
			.column(ColumnMetadata::new("username", "username", ColumnType::Varchar(100)))
			.relation(RelationMetadata::many_to_one("unit", "Unit", "unit_id"))
	}

	#[test]
	fn test_primary_key_column_is_found() {
		let meta = user_metadata();
		assert_eq!(meta.primary_key_column().unwrap().column, "id");
	}

	#[test]
	fn test_missing_primary_key_is_rejected() {
		let meta = EntityMetadata::new("Unit", "units_")
			.column(ColumnMetadata::new("name", "name", ColumnType::Varchar(50)));
		assert!(matches!(
			meta.primary_key_column(),
			Err(OrmError::NoPrimaryKey(_))
		));
	}

	#[test]
	fn test_two_primary_keys_are_rejected() {
		let meta = EntityMetadata::new("Broken", "broken")
			.column(ColumnMetadata::new("a", "a", ColumnType::Int).primary_key())
			.column(ColumnMetadata::new("b", "b", ColumnType::Int).primary_key());
		assert!(meta.validate().is_err());
	}

	#[test]
	fn test_duplicate_property_name_is_rejected() {
		let meta = EntityMetadata::new("Broken", "broken")
			.column(ColumnMetadata::new("id", "id", ColumnType::Int).primary_key())
			.column(ColumnMetadata::new("name", "name_a", ColumnType::Text))
			.column(ColumnMetadata::new("name", "name_b", ColumnType::Text));
		assert!(meta.validate().is_err());
	}

	#[test]
	fn test_update_column_resolves_relations_to_fk_column() {
		let meta = user_metadata();
		assert_eq!(meta.update_column_for("username"), Some("username"));
		assert_eq!(meta.update_column_for("unit"), Some("unit_id"));
		assert_eq!(meta.update_column_for("missing"), None);
	}

	#[test]
	fn test_enum_rendering_preserves_order_and_quoting() {
		let ty = ColumnType::Enum(vec!["b".into(), "a'c".into()]);
		assert_eq!(ty.sql(), "ENUM('b','a''c')");
	}
}
