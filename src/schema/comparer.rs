//! Structural diffing of a live schema against the model-derived target.

use indexmap::IndexMap;

use crate::error::OrmError;
use crate::metadata::MetadataRegistry;
use crate::schema::{ColumnInfo, ForeignKeyInfo, SchemaSnapshot, target_schema};

/// How one shared column differs between live and target.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDiff {
	pub from: ColumnInfo,
	pub to: ColumnInfo,
	/// Which of {type, nullable, default, extra} differ.
	pub changed: Vec<&'static str>,
}

/// The full difference between a live snapshot and the target schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaDifference {
	/// Table name to entity class.
	pub tables_to_create: IndexMap<String, String>,
	pub tables_to_drop: Vec<String>,
	pub columns_to_add: IndexMap<String, IndexMap<String, ColumnInfo>>,
	pub columns_to_modify: IndexMap<String, IndexMap<String, ColumnDiff>>,
	pub columns_to_drop: IndexMap<String, Vec<String>>,
	pub foreign_keys_to_add: IndexMap<String, IndexMap<String, ForeignKeyInfo>>,
	pub foreign_keys_to_drop: IndexMap<String, Vec<String>>,
}

impl SchemaDifference {
	pub fn is_empty(&self) -> bool {
		self.tables_to_create.is_empty()
			&& self.tables_to_drop.is_empty()
			&& self.columns_to_add.is_empty()
			&& self.columns_to_modify.is_empty()
			&& self.columns_to_drop.is_empty()
			&& self.foreign_keys_to_add.is_empty()
			&& self.foreign_keys_to_drop.is_empty()
	}
}

/// Diffs live snapshots against the schema the registry implies.
pub struct SchemaComparer<'a> {
	registry: &'a MetadataRegistry,
}

impl<'a> SchemaComparer<'a> {
	pub fn new(registry: &'a MetadataRegistry) -> Self {
		Self { registry }
	}

	/// Compare the live snapshot against the registered model.
	pub fn compare(&self, live: &SchemaSnapshot) -> Result<SchemaDifference, OrmError> {
		let target = target_schema(self.registry)?;
		let mut entities: IndexMap<String, String> = IndexMap::new();
		for metadata in self.registry.all() {
			entities.insert(metadata.table.clone(), metadata.entity.clone());
			for relation in metadata.owning_many_to_many_relations() {
				if let Some(join) = &relation.join_table {
					entities
						.entry(join.table.clone())
						.or_insert_with(|| metadata.entity.clone());
				}
			}
		}
		Ok(diff_snapshots(live, &target, &entities))
	}
}

/// Tables the comparer never proposes to drop.
const PROTECTED_TABLES: &[&str] = &[crate::migrations::HISTORY_TABLE];

/// Structural diff between two snapshots. `entities` maps target table
/// names to the entity class that owns them.
pub(crate) fn diff_snapshots(
	live: &SchemaSnapshot,
	target: &SchemaSnapshot,
	entities: &IndexMap<String, String>,
) -> SchemaDifference {
	let mut diff = SchemaDifference::default();

	for (table, target_table) in &target.tables {
		let Some(live_table) = live.table(table) else {
			let entity = entities.get(table).cloned().unwrap_or_else(|| table.clone());
			diff.tables_to_create.insert(table.clone(), entity);
			continue;
		};

		// Shared table: classify columns.
		for (column, target_info) in &target_table.columns {
			match live_table.columns.get(column) {
				None => {
					diff.columns_to_add
						.entry(table.clone())
						.or_default()
						.insert(column.clone(), target_info.clone());
				}
				Some(live_info) => {
					let changed = changed_aspects(live_info, target_info);
					if !changed.is_empty() {
						diff.columns_to_modify.entry(table.clone()).or_default().insert(
							column.clone(),
							ColumnDiff {
								from: live_info.clone(),
								to: target_info.clone(),
								changed,
							},
						);
					}
				}
			}
		}
		for column in live_table.columns.keys() {
			if !target_table.columns.contains_key(column) {
				diff.columns_to_drop
					.entry(table.clone())
					.or_default()
					.push(column.clone());
			}
		}

		// Foreign keys compare by constraint name; a rule difference is a
		// drop followed by an add.
		for (name, target_fk) in &target_table.foreign_keys {
			match live_table.foreign_keys.get(name) {
				None => {
					diff.foreign_keys_to_add
						.entry(table.clone())
						.or_default()
						.insert(name.clone(), target_fk.clone());
				}
				Some(live_fk) if !foreign_keys_equal(live_fk, target_fk) => {
					diff.foreign_keys_to_drop
						.entry(table.clone())
						.or_default()
						.push(name.clone());
					diff.foreign_keys_to_add
						.entry(table.clone())
						.or_default()
						.insert(name.clone(), target_fk.clone());
				}
				Some(_) => {}
			}
		}
		for name in live_table.foreign_keys.keys() {
			if !target_table.foreign_keys.contains_key(name) {
				diff.foreign_keys_to_drop
					.entry(table.clone())
					.or_default()
					.push(name.clone());
			}
		}
	}

	for table in live.tables.keys() {
		if !target.tables.contains_key(table) && !PROTECTED_TABLES.contains(&table.as_str()) {
			diff.tables_to_drop.push(table.clone());
		}
	}

	diff
}

fn changed_aspects(live: &ColumnInfo, target: &ColumnInfo) -> Vec<&'static str> {
	let mut changed = Vec::new();
	if normalize_type(&live.column_type) != normalize_type(&target.column_type) {
		changed.push("type");
	}
	if live.nullable != target.nullable {
		changed.push("nullable");
	}
	if normalize_default(live.default.as_deref()) != normalize_default(target.default.as_deref()) {
		changed.push("default");
	}
	if live.extra.to_ascii_lowercase() != target.extra.to_ascii_lowercase() {
		changed.push("extra");
	}
	changed
}

fn foreign_keys_equal(a: &ForeignKeyInfo, b: &ForeignKeyInfo) -> bool {
	a.column == b.column
		&& a.referenced_table == b.referenced_table
		&& a.referenced_column == b.referenced_column
		&& a.on_delete.eq_ignore_ascii_case(&b.on_delete)
		&& a.on_update.eq_ignore_ascii_case(&b.on_update)
}

/// Normalised type form used for comparison: lowercase, integer display
/// widths stripped (`int(11)` ≡ `INT`), enum/set literal lists compared as
/// unordered sets.
pub fn normalize_type(column_type: &str) -> String {
	let lowered = column_type.trim().to_ascii_lowercase();
	let unsigned = lowered.contains(" unsigned");
	let (base, args) = match lowered.split_once('(') {
		Some((base, rest)) => {
			let args = rest.rsplit_once(')').map(|(a, _)| a).unwrap_or(rest);
			(base.trim(), Some(args))
		}
		None => (
			lowered
				.split_whitespace()
				.next()
				.unwrap_or(lowered.as_str()),
			None,
		),
	};
	let mut normalized = match (base, args) {
		// Integer display widths carry no structure.
		("tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint", _) => {
			let base = if base == "integer" { "int" } else { base };
			base.to_string()
		}
		("enum" | "set", Some(args)) => {
			let mut literals: Vec<&str> = args.split(',').map(str::trim).collect();
			literals.sort_unstable();
			format!("{base}({})", literals.join(","))
		}
		(base, Some(args)) => format!("{base}({})", args.replace(' ', "")),
		(base, None) => base.to_string(),
	};
	if unsigned {
		normalized.push_str(" unsigned");
	}
	normalized
}

fn normalize_default(default: Option<&str>) -> Option<String> {
	match default {
		None => None,
		Some(d) if d.eq_ignore_ascii_case("NULL") => None,
		Some(d) => Some(d.trim_matches('\'').to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::TableSnapshot;

	fn entities() -> IndexMap<String, String> {
		IndexMap::from([("users_".to_string(), "User".to_string())])
	}

	#[test]
	fn test_normalize_type_strips_display_width() {
		assert_eq!(normalize_type("int(11)"), "int");
		assert_eq!(normalize_type("INT"), "int");
		assert_eq!(normalize_type("int(10) unsigned"), "int unsigned");
		assert_eq!(normalize_type("INT UNSIGNED"), "int unsigned");
	}

	#[test]
	fn test_normalize_type_compares_enum_sets_unordered() {
		assert_eq!(
			normalize_type("enum('b','a')"),
			normalize_type("ENUM('a','b')")
		);
	}

	#[test]
	fn test_table_only_in_target_is_created() {
		let live = SchemaSnapshot::new();
		let target = SchemaSnapshot::new()
			.with_table("users_", TableSnapshot::new().with_column("id", ColumnInfo::new("INT")));
		let diff = diff_snapshots(&live, &target, &entities());
		assert_eq!(diff.tables_to_create.get("users_"), Some(&"User".to_string()));
		assert!(!diff.is_empty());
	}

	#[test]
	fn test_table_only_in_live_is_dropped() {
		let live = SchemaSnapshot::new()
			.with_table("legacy", TableSnapshot::new().with_column("id", ColumnInfo::new("int(11)")));
		let target = SchemaSnapshot::new();
		let diff = diff_snapshots(&live, &target, &entities());
		assert_eq!(diff.tables_to_drop, vec!["legacy"]);
	}

	#[test]
	fn test_history_table_is_never_dropped() {
		let live = SchemaSnapshot::new().with_table(
			crate::migrations::HISTORY_TABLE,
			TableSnapshot::new().with_column("id", ColumnInfo::new("int(10) unsigned")),
		);
		let target = SchemaSnapshot::new();
		let diff = diff_snapshots(&live, &target, &entities());
		assert!(diff.is_empty());
	}

	#[test]
	fn test_column_classification() {
		let live = SchemaSnapshot::new().with_table(
			"users_",
			TableSnapshot::new()
				.with_column("id", ColumnInfo::new("int(10) unsigned").key("PRI"))
				.with_column("fake", ColumnInfo::new("varchar(100)").nullable())
				.with_column("username", ColumnInfo::new("varchar(50)")),
		);
		let target = SchemaSnapshot::new().with_table(
			"users_",
			TableSnapshot::new()
				.with_column("id", ColumnInfo::new("INT UNSIGNED").key("PRI"))
				.with_column("username", ColumnInfo::new("VARCHAR(100)"))
				.with_column("email", ColumnInfo::new("VARCHAR(255)")),
		);
		let diff = diff_snapshots(&live, &target, &entities());
		assert!(diff.columns_to_add["users_"].contains_key("email"));
		assert_eq!(diff.columns_to_drop["users_"], vec!["fake"]);
		let modified = &diff.columns_to_modify["users_"]["username"];
		assert_eq!(modified.changed, vec!["type"]);
	}

	#[test]
	fn test_identical_snapshots_produce_empty_diff() {
		let snapshot = SchemaSnapshot::new().with_table(
			"users_",
			TableSnapshot::new().with_column("id", ColumnInfo::new("int(10) unsigned")),
		);
		let target = SchemaSnapshot::new().with_table(
			"users_",
			TableSnapshot::new().with_column("id", ColumnInfo::new("INT UNSIGNED")),
		);
		let diff = diff_snapshots(&snapshot, &target, &entities());
		assert!(diff.is_empty());
	}

	#[test]
	fn test_fk_rule_difference_is_drop_and_add() {
		let fk_live = ForeignKeyInfo {
			constraint: "fk_users__unit_id".into(),
			column: "unit_id".into(),
			referenced_table: "units_".into(),
			referenced_column: "id".into(),
			on_delete: "RESTRICT".into(),
			on_update: "RESTRICT".into(),
		};
		let mut fk_target = fk_live.clone();
		fk_target.on_delete = "CASCADE".into();
		let base = TableSnapshot::new().with_column("unit_id", ColumnInfo::new("INT"));
		let live = SchemaSnapshot::new()
			.with_table("users_", base.clone().with_foreign_key(fk_live));
		let target = SchemaSnapshot::new()
			.with_table("users_", base.with_foreign_key(fk_target));
		let diff = diff_snapshots(&live, &target, &entities());
		assert_eq!(diff.foreign_keys_to_drop["users_"], vec!["fk_users__unit_id"]);
		assert!(diff.foreign_keys_to_add["users_"].contains_key("fk_users__unit_id"));
	}
}
