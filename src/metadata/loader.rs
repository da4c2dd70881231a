//! TOML entity-definition loading.
//!
//! Entities can be declared in TOML files discovered by
//! [`MetadataRegistry::load_from_path`](crate::metadata::MetadataRegistry::load_from_path),
//! the crate's stand-in for attribute parsing:
//!
//! ```toml
//! entity = "User"
//! table = "users_"
//!
//! [[columns]]
//! property = "id"
//! column = "id"
//! type = { kind = "int" }
//! unsigned = true
//! key = "primary"
//! auto_increment = true
//!
//! [[relations]]
//! property = "unit"
//! kind = "many_to_one"
//! target = "Unit"
//! column = "unit_id"
//! on_delete = "cascade"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::OrmError;
use crate::metadata::{
	ColumnMetadata, ColumnType, EntityMetadata, IndexMetadata, JoinTableMetadata, KeyKind,
	ReferenceOption, RelationKind, RelationMetadata,
};

#[derive(Debug, Deserialize)]
struct RawEntity {
	entity: String,
	table: String,
	#[serde(default)]
	columns: Vec<RawColumn>,
	#[serde(default)]
	relations: Vec<RawRelation>,
	#[serde(default)]
	indexes: Vec<RawIndex>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
	property: String,
	column: String,
	#[serde(rename = "type")]
	column_type: RawColumnType,
	#[serde(default)]
	nullable: bool,
	#[serde(default)]
	default: Option<String>,
	#[serde(default)]
	key: Option<String>,
	#[serde(default)]
	auto_increment: bool,
	#[serde(default)]
	unsigned: bool,
	#[serde(default)]
	extra: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawColumnType {
	kind: String,
	#[serde(default)]
	length: Option<u32>,
	#[serde(default)]
	precision: Option<u8>,
	#[serde(default)]
	scale: Option<u8>,
	#[serde(default)]
	values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
	property: String,
	kind: String,
	target: String,
	#[serde(default)]
	owning: Option<bool>,
	#[serde(default)]
	column: Option<String>,
	#[serde(default)]
	inverse_property: Option<String>,
	#[serde(default)]
	join_table: Option<RawJoinTable>,
	#[serde(default)]
	on_delete: Option<String>,
	#[serde(default)]
	on_update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJoinTable {
	table: String,
	local_column: String,
	target_column: String,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
	name: String,
	columns: Vec<String>,
	#[serde(default)]
	unique: bool,
}

/// Parse one TOML entity definition into metadata.
pub fn load_entity_file(path: &Path) -> Result<EntityMetadata, OrmError> {
	let text = std::fs::read_to_string(path).map_err(|e| OrmError::MetadataLoad {
		file: path.to_path_buf(),
		message: e.to_string(),
	})?;
	let raw: RawEntity = toml::from_str(&text).map_err(|e| OrmError::MetadataLoad {
		file: path.to_path_buf(),
		message: e.to_string(),
	})?;
	convert(raw).map_err(|message| OrmError::MetadataLoad {
		file: path.to_path_buf(),
		message,
	})
}

fn convert(raw: RawEntity) -> Result<EntityMetadata, String> {
	let mut metadata = EntityMetadata::new(raw.entity, raw.table);
	for column in raw.columns {
		metadata.columns.push(convert_column(column)?);
	}
	for relation in raw.relations {
		metadata.relations.push(convert_relation(relation)?);
	}
	for index in raw.indexes {
		metadata.indexes.push(IndexMetadata {
			name: index.name,
			columns: index.columns,
			unique: index.unique,
		});
	}
	Ok(metadata)
}

fn convert_column(raw: RawColumn) -> Result<ColumnMetadata, String> {
	let column_type = convert_type(&raw.column_type)?;
	let key = match raw.key.as_deref() {
		None | Some("none") => KeyKind::None,
		Some("primary") => KeyKind::Primary,
		Some("unique") => KeyKind::Unique,
		Some("index") => KeyKind::Index,
		Some(other) => return Err(format!("unknown key kind `{other}`")),
	};
	Ok(ColumnMetadata {
		property: raw.property,
		column: raw.column,
		column_type,
		nullable: raw.nullable,
		default: raw.default,
		key,
		auto_increment: raw.auto_increment,
		unsigned: raw.unsigned,
		extra: raw.extra,
	})
}

fn convert_type(raw: &RawColumnType) -> Result<ColumnType, String> {
	let length = || {
		raw.length
			.ok_or_else(|| format!("type `{}` requires a length", raw.kind))
	};
	let values = || {
		raw.values
			.clone()
			.filter(|v| !v.is_empty())
			.ok_or_else(|| format!("type `{}` requires a non-empty values list", raw.kind))
	};
	Ok(match raw.kind.as_str() {
		"tiny_int" => ColumnType::TinyInt,
		"small_int" => ColumnType::SmallInt,
		"int" => ColumnType::Int,
		"big_int" => ColumnType::BigInt,
		"decimal" => ColumnType::Decimal {
			precision: raw.precision.ok_or("decimal requires a precision")?,
			scale: raw.scale.unwrap_or(0),
		},
		"float" => ColumnType::Float,
		"double" => ColumnType::Double,
		"boolean" => ColumnType::Boolean,
		"char" => ColumnType::Char(length()?),
		"varchar" => ColumnType::Varchar(length()?),
		"text" => ColumnType::Text,
		"medium_text" => ColumnType::MediumText,
		"long_text" => ColumnType::LongText,
		"blob" => ColumnType::Blob,
		"date" => ColumnType::Date,
		"time" => ColumnType::Time,
		"datetime" => ColumnType::DateTime,
		"timestamp" => ColumnType::Timestamp,
		"json" => ColumnType::Json,
		"enum" => ColumnType::Enum(values()?),
		"set" => ColumnType::Set(values()?),
		"geometry" => ColumnType::Geometry,
		other => return Err(format!("unknown column type `{other}`")),
	})
}

fn convert_relation(raw: RawRelation) -> Result<RelationMetadata, String> {
	let kind = match raw.kind.as_str() {
		"one_to_one" => RelationKind::OneToOne,
		"one_to_many" => RelationKind::OneToMany,
		"many_to_one" => RelationKind::ManyToOne,
		"many_to_many" => RelationKind::ManyToMany,
		other => return Err(format!("unknown relation kind `{other}`")),
	};
	let owning = raw.owning.unwrap_or(match kind {
		RelationKind::OneToMany => false,
		_ => true,
	});
	if kind.is_to_one() && owning && raw.column.is_none() {
		return Err(format!(
			"owning {}-to-one relation `{}` requires a column",
			if kind == RelationKind::OneToOne { "one" } else { "many" },
			raw.property
		));
	}
	if kind == RelationKind::ManyToMany && owning && raw.join_table.is_none() {
		return Err(format!(
			"owning many-to-many relation `{}` requires a join_table",
			raw.property
		));
	}
	Ok(RelationMetadata {
		property: raw.property,
		kind,
		target: raw.target,
		owning,
		column: raw.column,
		inverse_property: raw.inverse_property,
		join_table: raw.join_table.map(|j| JoinTableMetadata {
			table: j.table,
			local_column: j.local_column,
			target_column: j.target_column,
		}),
		on_delete: convert_rule(raw.on_delete.as_deref())?,
		on_update: convert_rule(raw.on_update.as_deref())?,
	})
}

fn convert_rule(rule: Option<&str>) -> Result<ReferenceOption, String> {
	Ok(match rule {
		None | Some("restrict") => ReferenceOption::Restrict,
		Some("cascade") => ReferenceOption::Cascade,
		Some("set_null") => ReferenceOption::SetNull,
		Some("no_action") => ReferenceOption::NoAction,
		Some(other) => return Err(format!("unknown reference option `{other}`")),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(text: &str) -> Result<EntityMetadata, String> {
		let raw: RawEntity = toml::from_str(text).map_err(|e| e.to_string())?;
		convert(raw)
	}

	#[test]
	fn test_full_entity_definition() {
		let meta = parse(
			r#"
			entity = "User"
			table = "users_"

			[[columns]]
			property = "id"
			column = "id"
			type = { kind = "int" }
			unsigned = true
			key = "primary"
			auto_increment = true

			[[columns]]
			property = "username"
			column = "username"
			type = { kind = "varchar", length = 100 }
			default = "John"

			[[relations]]
			property = "unit"
			kind = "many_to_one"
			target = "Unit"
			column = "unit_id"
			on_delete = "cascade"
			"#,
		)
		.unwrap();
		assert_eq!(meta.entity, "User");
		assert_eq!(meta.columns.len(), 2);
		assert_eq!(meta.columns[1].default.as_deref(), Some("John"));
		assert_eq!(meta.relations[0].kind, RelationKind::ManyToOne);
		assert_eq!(meta.relations[0].on_delete, ReferenceOption::Cascade);
		assert!(meta.validate().is_ok());
	}

	#[test]
	fn test_enum_type_requires_values() {
		let result = parse(
			r#"
			entity = "Bad"
			table = "bad"

			[[columns]]
			property = "status"
			column = "status"
			type = { kind = "enum" }
			"#,
		);
		assert!(result.is_err());
	}

	#[test]
	fn test_owning_to_one_requires_column() {
		let result = parse(
			r#"
			entity = "Bad"
			table = "bad"

			[[relations]]
			property = "unit"
			kind = "many_to_one"
			target = "Unit"
			"#,
		);
		assert!(result.is_err());
	}

	#[test]
	fn test_many_to_many_join_table() {
		let meta = parse(
			r#"
			entity = "User"
			table = "users_"

			[[columns]]
			property = "id"
			column = "id"
			type = { kind = "int" }
			key = "primary"

			[[relations]]
			property = "groups"
			kind = "many_to_many"
			target = "Group"
			join_table = { table = "users_groups", local_column = "user_id", target_column = "group_id" }
			"#,
		)
		.unwrap();
		let join = meta.relations[0].join_table.as_ref().unwrap();
		assert_eq!(join.table, "users_groups");
		assert_eq!(join.local_column, "user_id");
	}
}
