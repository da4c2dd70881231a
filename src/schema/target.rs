//! Derivation of the target schema from the metadata registry.
//!
//! The comparer diffs the live snapshot against this; migration programs
//! are rendered from the difference. FK constraints are named
//! `fk_<table>_<column>`; owning many-to-many relations imply their join
//! table.

use crate::error::OrmError;
use crate::metadata::{
	ColumnMetadata, EntityMetadata, KeyKind, MetadataRegistry, ReferenceOption,
};
use crate::schema::{ColumnInfo, ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableSnapshot};

/// Build the schema the registered model expects.
pub fn target_schema(registry: &MetadataRegistry) -> Result<SchemaSnapshot, OrmError> {
	registry.validate()?;
	let mut snapshot = SchemaSnapshot::new();
	for metadata in registry.all() {
		let table = table_for_entity(registry, &metadata)?;
		snapshot.tables.insert(metadata.table.clone(), table);
		for relation in metadata.owning_many_to_many_relations() {
			let join = relation.join_table.as_ref().expect("owning m2m has join table");
			if snapshot.tables.contains_key(&join.table) {
				continue;
			}
			let target = registry.get(&relation.target)?;
			let join_table = join_table_snapshot(&metadata, &target, join)?;
			snapshot.tables.insert(join.table.clone(), join_table);
		}
	}
	Ok(snapshot)
}

fn table_for_entity(
	registry: &MetadataRegistry,
	metadata: &EntityMetadata,
) -> Result<TableSnapshot, OrmError> {
	let mut table = TableSnapshot::new();
	for column in &metadata.columns {
		table
			.columns
			.insert(column.column.clone(), column_info(column));
	}
	for relation in metadata.owning_to_one_relations() {
		let fk_column = relation.column.as_deref().expect("owning to-one has column");
		let target = registry.get(&relation.target)?;
		let target_pk = target.primary_key_column()?;
		// Relation-only FK columns are added to the table implicitly.
		table
			.columns
			.entry(fk_column.to_string())
			.or_insert_with(|| ColumnInfo {
				column_type: fk_column_type(target_pk),
				nullable: true,
				default: None,
				extra: String::new(),
				key: "MUL".into(),
			});
		let constraint = format!("fk_{}_{}", metadata.table, fk_column);
		table.foreign_keys.insert(
			constraint.clone(),
			ForeignKeyInfo {
				constraint,
				column: fk_column.to_string(),
				referenced_table: target.table.clone(),
				referenced_column: target_pk.column.clone(),
				on_delete: relation.on_delete.sql().to_string(),
				on_update: relation.on_update.sql().to_string(),
			},
		);
	}
	for index in &metadata.indexes {
		table.indexes.insert(
			index.name.clone(),
			IndexInfo {
				name: index.name.clone(),
				columns: index.columns.clone(),
				unique: index.unique,
			},
		);
	}
	Ok(table)
}

fn join_table_snapshot(
	owner: &EntityMetadata,
	target: &EntityMetadata,
	join: &crate::metadata::JoinTableMetadata,
) -> Result<TableSnapshot, OrmError> {
	let owner_pk = owner.primary_key_column()?;
	let target_pk = target.primary_key_column()?;
	let mut table = TableSnapshot::new();
	table.columns.insert(
		join.local_column.clone(),
		ColumnInfo {
			column_type: fk_column_type(owner_pk),
			nullable: false,
			default: None,
			extra: String::new(),
			key: "MUL".into(),
		},
	);
	table.columns.insert(
		join.target_column.clone(),
		ColumnInfo {
			column_type: fk_column_type(target_pk),
			nullable: false,
			default: None,
			extra: String::new(),
			key: "MUL".into(),
		},
	);
	for (column, referenced) in [
		(&join.local_column, (&owner.table, &owner_pk.column)),
		(&join.target_column, (&target.table, &target_pk.column)),
	] {
		let constraint = format!("fk_{}_{}", join.table, column);
		table.foreign_keys.insert(
			constraint.clone(),
			ForeignKeyInfo {
				constraint,
				column: column.clone(),
				referenced_table: referenced.0.clone(),
				referenced_column: referenced.1.clone(),
				// Join rows follow their ends.
				on_delete: ReferenceOption::Cascade.sql().to_string(),
				on_update: ReferenceOption::Restrict.sql().to_string(),
			},
		);
	}
	let unique = format!("uniq_{}", join.table);
	table.indexes.insert(
		unique.clone(),
		IndexInfo {
			name: unique,
			columns: vec![join.local_column.clone(), join.target_column.clone()],
			unique: true,
		},
	);
	Ok(table)
}

fn column_info(column: &ColumnMetadata) -> ColumnInfo {
	let mut column_type = column.column_type.sql();
	if column.unsigned {
		column_type.push_str(" UNSIGNED");
	}
	ColumnInfo {
		column_type,
		nullable: column.nullable,
		default: column
			.default
			.clone()
			.filter(|d| !d.eq_ignore_ascii_case("NULL")),
		extra: if column.auto_increment {
			"auto_increment".into()
		} else {
			column.extra.clone().unwrap_or_default()
		},
		key: match column.key {
			KeyKind::Primary => "PRI".into(),
			KeyKind::Unique => "UNI".into(),
			KeyKind::Index => "MUL".into(),
			KeyKind::None => String::new(),
		},
	}
}

/// The column type an FK column mirrors from the referenced primary key.
fn fk_column_type(pk: &ColumnMetadata) -> String {
	let mut column_type = pk.column_type.sql();
	if pk.unsigned {
		column_type.push_str(" UNSIGNED");
	}
	column_type
}
