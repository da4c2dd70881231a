//! Migration generation: diff the live schema against the model and
//! render a `Migration<datetime>` source file.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use tracing::info;

use crate::backends::DatabaseInterface;
use crate::error::{MigrationError, SchemaValidationError};
use crate::metadata::{ColumnType, MetadataRegistry, ReferenceOption};
use crate::migrations::{validate_datetime, version_from_datetime};
use crate::schema::builder::{
	ColumnDefinition, ForeignKeyDefinition, SchemaBuilder, SchemaStatement, TableCommand,
	TableDefinition,
};
use crate::schema::{
	ForeignKeyInfo, SchemaComparer, SchemaDifference, SchemaInformation, SchemaSnapshot,
	target_schema,
};

/// Renders schema differences into migration source files.
pub struct MigrationGenerator {
	registry: Arc<MetadataRegistry>,
	db: Rc<dyn DatabaseInterface>,
	database: String,
	migrations_dir: PathBuf,
}

impl MigrationGenerator {
	/// The migrations directory must already exist.
	pub fn new(
		registry: Arc<MetadataRegistry>,
		db: Rc<dyn DatabaseInterface>,
		database: impl Into<String>,
		migrations_dir: impl Into<PathBuf>,
	) -> Result<Self, MigrationError> {
		let migrations_dir = migrations_dir.into();
		if !migrations_dir.is_dir() {
			return Err(MigrationError::MigrationDirectoryMissing(migrations_dir));
		}
		Ok(Self {
			registry,
			db,
			database: database.into(),
			migrations_dir,
		})
	}

	/// Compare live schema and model; emit `Migration<datetime>.rs` when
	/// they differ. Returns `None` when there is nothing to migrate.
	pub fn generate_migration(&self, datetime: &str) -> Result<Option<PathBuf>, MigrationError> {
		validate_datetime(datetime)?;
		let live = SchemaInformation::new(self.db.clone()).snapshot(&self.database)?;
		let target = target_schema(&self.registry)?;
		let diff = SchemaComparer::new(&self.registry).compare(&live)?;
		if diff.is_empty() {
			return Ok(None);
		}
		validate_difference(&diff, &target, &live)?;

		let up = build_up(&diff, &target);
		let (down, down_comments) = build_down(&diff, &live);
		let source = render_source(datetime, &up, &down, &down_comments);

		let path = self.migrations_dir.join(format!("Migration{datetime}.rs"));
		std::fs::write(&path, source)?;
		info!(path = %path.display(), "generated migration");
		Ok(Some(path))
	}

	pub fn migrations_dir(&self) -> &Path {
		&self.migrations_dir
	}
}

/// Reject differences no valid migration can be rendered from.
fn validate_difference(
	diff: &SchemaDifference,
	target: &SchemaSnapshot,
	live: &SchemaSnapshot,
) -> Result<(), MigrationError> {
	for (table, entity) in &diff.tables_to_create {
		let empty = target
			.table(table)
			.map(|t| t.columns.is_empty())
			.unwrap_or(true);
		if empty {
			return Err(SchemaValidationError::EntityHasNoColumns(entity.clone()).into());
		}
	}

	let created_fks = diff
		.tables_to_create
		.keys()
		.filter_map(|table| target.table(table))
		.flat_map(|t| t.foreign_keys.iter().map(|(_, fk)| fk));
	let added_fks = diff
		.foreign_keys_to_add
		.values()
		.flat_map(|fks| fks.values());
	for fk in created_fks.chain(added_fks) {
		validate_foreign_key(fk, target, live)?;
	}
	Ok(())
}

fn validate_foreign_key(
	fk: &ForeignKeyInfo,
	target: &SchemaSnapshot,
	live: &SchemaSnapshot,
) -> Result<(), MigrationError> {
	let owner = owning_table_of(fk, target, live);
	if fk.column.is_empty() || fk.referenced_table.is_empty() || fk.referenced_column.is_empty() {
		return Err(SchemaValidationError::ForeignKeyIncomplete {
			table: owner,
			name: fk.constraint.clone(),
		}
		.into());
	}
	let referenced_exists = [target, live].iter().any(|snapshot| {
		snapshot
			.table(&fk.referenced_table)
			.map(|t| t.columns.contains_key(&fk.referenced_column))
			.unwrap_or(false)
	});
	if !referenced_exists {
		return Err(SchemaValidationError::ForeignKeyColumnMissing {
			table: fk.referenced_table.clone(),
			name: fk.constraint.clone(),
			column: fk.referenced_column.clone(),
		}
		.into());
	}
	Ok(())
}

fn owning_table_of(fk: &ForeignKeyInfo, target: &SchemaSnapshot, live: &SchemaSnapshot) -> String {
	for snapshot in [target, live] {
		for (name, table) in &snapshot.tables {
			if table.foreign_keys.contains_key(&fk.constraint) {
				return name.clone();
			}
		}
	}
	String::new()
}

/// The up program: drop FKs, drop columns, create tables, add columns,
/// modify columns, add FKs, drop tables.
fn build_up(diff: &SchemaDifference, target: &SchemaSnapshot) -> SchemaBuilder {
	let mut schema = SchemaBuilder::new();

	for (table, names) in &diff.foreign_keys_to_drop {
		let definition = schema.alter_table(table.as_str());
		for name in names {
			definition.drop_foreign_key(name.as_str());
		}
	}
	for (table, columns) in &diff.columns_to_drop {
		let definition = schema.alter_table(table.as_str());
		for column in columns {
			definition.drop_column(column.as_str());
		}
	}
	for table in diff.tables_to_create.keys() {
		let Some(snapshot) = target.table(table) else {
			continue;
		};
		let definition = schema.create_table(table.as_str());
		let mut primary = Vec::new();
		for (name, info) in &snapshot.columns {
			definition.column(ColumnDefinition::from_column_info(name, info));
			if info.key == "PRI" {
				primary.push(name.as_str());
			}
		}
		if !primary.is_empty() {
			definition.primary_key(&primary);
		}
		definition.engine("InnoDB");
	}
	for (table, columns) in &diff.columns_to_add {
		let definition = schema.alter_table(table.as_str());
		for (name, info) in columns {
			definition.add_column(ColumnDefinition::from_column_info(name, info));
		}
	}
	for (table, columns) in &diff.columns_to_modify {
		let definition = schema.alter_table(table.as_str());
		for (name, change) in columns {
			definition.modify_column(ColumnDefinition::from_column_info(name, &change.to));
		}
	}
	// FK additions follow every create so cross-table references resolve.
	for (table, fks) in &diff.foreign_keys_to_add {
		let definition = schema.alter_table(table.as_str());
		for fk in fks.values() {
			definition.add_foreign_key(ForeignKeyDefinition::from_info(fk));
		}
	}
	for table in diff.tables_to_create.keys() {
		let Some(snapshot) = target.table(table) else {
			continue;
		};
		if snapshot.foreign_keys.is_empty() {
			continue;
		}
		let definition = schema.alter_table(table.as_str());
		for fk in snapshot.foreign_keys.values() {
			definition.add_foreign_key(ForeignKeyDefinition::from_info(fk));
		}
	}
	for table in &diff.tables_to_drop {
		schema.drop_table(table.as_str());
	}
	schema
}

/// The down program reverses up, restoring structure only; dropped-table
/// contents are flagged as unrecoverable in a comment.
fn build_down(diff: &SchemaDifference, live: &SchemaSnapshot) -> (SchemaBuilder, Vec<String>) {
	let mut schema = SchemaBuilder::new();

	// Drop the FKs up added (on surviving tables; created tables fall
	// with their DROP TABLE below).
	for (table, fks) in &diff.foreign_keys_to_add {
		let definition = schema.alter_table(table.as_str());
		for name in fks.keys() {
			definition.drop_foreign_key(name.as_str());
		}
	}
	for (table, columns) in &diff.columns_to_add {
		let definition = schema.alter_table(table.as_str());
		for name in columns.keys() {
			definition.drop_column(name.as_str());
		}
	}
	for (table, columns) in &diff.columns_to_modify {
		let definition = schema.alter_table(table.as_str());
		for (name, change) in columns {
			definition.modify_column(ColumnDefinition::from_column_info(name, &change.from));
		}
	}
	// Restore what up dropped, from the live snapshot.
	for (table, columns) in &diff.columns_to_drop {
		let definition = schema.alter_table(table.as_str());
		for name in columns {
			if let Some(info) = live.table(table).and_then(|t| t.columns.get(name)) {
				definition.add_column(ColumnDefinition::from_column_info(name, info));
			}
		}
	}
	for (table, names) in &diff.foreign_keys_to_drop {
		let definition = schema.alter_table(table.as_str());
		for name in names {
			if let Some(fk) = live.table(table).and_then(|t| t.foreign_keys.get(name)) {
				definition.add_foreign_key(ForeignKeyDefinition::from_info(fk));
			}
		}
	}
	for table in diff.tables_to_create.keys() {
		schema.drop_table(table.as_str());
	}

	let comments = if diff.tables_to_drop.is_empty() {
		Vec::new()
	} else {
		vec![format!(
			"Dropped tables are not restored: structure and data of {} are gone.",
			diff.tables_to_drop
				.iter()
				.map(|t| format!("`{t}`"))
				.collect::<Vec<_>>()
				.join(", ")
		)]
	};
	(schema, comments)
}

// Source rendering. Generated files are plain Rust with the class body
// laid out at 4 spaces and every DSL statement at 8.

fn render_source(
	datetime: &str,
	up: &SchemaBuilder,
	down: &SchemaBuilder,
	down_comments: &[String],
) -> String {
	let mut imports = vec!["SchemaBuilder"];
	let statements: Vec<&SchemaStatement> =
		up.statements().iter().chain(down.statements()).collect();
	if statements.iter().any(|s| uses_columns(s)) {
		imports.insert(0, "ColumnDefinition");
	}
	if statements.iter().any(|s| uses_foreign_keys(s)) {
		imports.insert(imports.len() - 1, "ForeignKeyDefinition");
	}
	if statements.iter().any(|s| uses_reference_options(s)) {
		imports.insert(imports.len() - 1, "ReferenceOption");
	}

	let version = version_from_datetime(datetime);
	let mut source = String::new();
	source.push_str("//! Generated migration. The down path restores structure only.\n\n");
	source.push_str("use grappelli::migrations::Migration;\n");
	source.push_str(&format!(
		"use grappelli::schema::builder::{{{}}};\n\n",
		imports.join(", ")
	));
	source.push_str(&format!("pub struct Migration{datetime};\n\n"));
	source.push_str(&format!("impl Migration for Migration{datetime} {{\n"));
	source.push_str("    fn version(&self) -> &str {\n");
	source.push_str(&format!("        {version:?}\n"));
	source.push_str("    }\n\n");
	source.push_str("    fn up(&self, schema: &mut SchemaBuilder) {\n");
	for statement in up.statements() {
		source.push_str(&statement_source(statement));
	}
	source.push_str("    }\n\n");
	source.push_str("    fn down(&self, schema: &mut SchemaBuilder) {\n");
	for comment in down_comments {
		source.push_str(&format!("        // {comment}\n"));
	}
	for statement in down.statements() {
		source.push_str(&statement_source(statement));
	}
	source.push_str("    }\n");
	source.push_str("}\n");
	source
}

fn uses_columns(statement: &SchemaStatement) -> bool {
	match statement {
		SchemaStatement::CreateTable(t) | SchemaStatement::AlterTable(t) => t
			.commands()
			.iter()
			.any(|c| matches!(c, TableCommand::AddColumn(_) | TableCommand::ModifyColumn(_))),
		SchemaStatement::DropTable(_) => false,
	}
}

fn uses_foreign_keys(statement: &SchemaStatement) -> bool {
	match statement {
		SchemaStatement::CreateTable(t) | SchemaStatement::AlterTable(t) => t
			.commands()
			.iter()
			.any(|c| matches!(c, TableCommand::AddForeignKey(_))),
		SchemaStatement::DropTable(_) => false,
	}
}

fn uses_reference_options(statement: &SchemaStatement) -> bool {
	match statement {
		SchemaStatement::CreateTable(t) | SchemaStatement::AlterTable(t) => {
			t.commands().iter().any(|c| match c {
				TableCommand::AddForeignKey(fk) => {
					fk.on_delete_rule() != ReferenceOption::Restrict
						|| fk.on_update_rule() != ReferenceOption::Restrict
				}
				_ => false,
			})
		}
		SchemaStatement::DropTable(_) => false,
	}
}

fn statement_source(statement: &SchemaStatement) -> String {
	match statement {
		SchemaStatement::DropTable(name) => {
			format!("        schema.drop_table({name:?});\n")
		}
		SchemaStatement::CreateTable(table) => table_source(table, "create_table"),
		SchemaStatement::AlterTable(table) => table_source(table, "alter_table"),
	}
}

fn table_source(table: &TableDefinition, method: &str) -> String {
	let mut source = String::from("        schema\n");
	source.push_str(&format!("            .{method}({:?})\n", table.name()));
	for command in table.commands() {
		let call = match command {
			TableCommand::AddColumn(column) => {
				let method = if method == "alter_table" {
					"add_column"
				} else {
					"column"
				};
				format!(".{method}({})", column_source(column))
			}
			TableCommand::DropColumn(name) => format!(".drop_column({name:?})"),
			TableCommand::ModifyColumn(column) => {
				format!(".modify_column({})", column_source(column))
			}
			TableCommand::AddForeignKey(fk) => {
				format!(".add_foreign_key({})", foreign_key_source(fk))
			}
			TableCommand::DropForeignKey(name) => format!(".drop_foreign_key({name:?})"),
		};
		source.push_str(&format!("            {call}\n"));
	}
	if let Some(primary) = table.primary_key_columns() {
		let columns = primary
			.iter()
			.map(|c| format!("{c:?}"))
			.collect::<Vec<_>>()
			.join(", ");
		source.push_str(&format!("            .primary_key(&[{columns}])\n"));
	}
	if let Some(engine) = table.engine_option() {
		source.push_str(&format!("            .engine({engine:?})\n"));
	}
	if let Some(charset) = table.charset_option() {
		source.push_str(&format!("            .charset({charset:?})\n"));
	}
	if let Some(collation) = table.collation_option() {
		source.push_str(&format!("            .collation({collation:?})\n"));
	}
	// Close the chain on the last call.
	let trimmed = source.trim_end_matches('\n').to_string();
	format!("{trimmed};\n")
}

fn column_source(column: &ColumnDefinition) -> String {
	let mut source = format!("ColumnDefinition::new({:?})", column.name());
	if let Some(column_type) = column.column_type() {
		source.push_str(&type_call(column_type));
	}
	if column.is_unsigned() {
		source.push_str(".unsigned()");
	}
	if !column.is_nullable() {
		source.push_str(".not_null()");
	}
	if let Some(default) = column.default_clause() {
		source.push_str(&format!(".default_value({default:?})"));
	}
	if column.is_auto_increment() {
		source.push_str(".auto_increment()");
	}
	source
}

fn type_call(column_type: &ColumnType) -> String {
	match column_type {
		ColumnType::TinyInt => ".tiny_integer()".into(),
		ColumnType::SmallInt => ".small_integer()".into(),
		ColumnType::Int => ".integer()".into(),
		ColumnType::BigInt => ".big_integer()".into(),
		ColumnType::Decimal { precision, scale } => format!(".decimal({precision}, {scale})"),
		ColumnType::Float => ".float()".into(),
		ColumnType::Double => ".double()".into(),
		ColumnType::Boolean => ".boolean()".into(),
		ColumnType::Char(len) => format!(".fixed_string({len})"),
		ColumnType::Varchar(len) => format!(".string({len})"),
		ColumnType::Text => ".text()".into(),
		ColumnType::MediumText => ".medium_text()".into(),
		ColumnType::LongText => ".long_text()".into(),
		ColumnType::Blob => ".blob()".into(),
		ColumnType::Date => ".date()".into(),
		ColumnType::Time => ".time()".into(),
		ColumnType::DateTime => ".datetime()".into(),
		ColumnType::Timestamp => ".timestamp()".into(),
		ColumnType::Json => ".json()".into(),
		ColumnType::Enum(values) => format!(".enumeration(&[{}])", literal_list(values)),
		ColumnType::Set(values) => format!(".set(&[{}])", literal_list(values)),
		ColumnType::Geometry => ".geometry()".into(),
	}
}

fn literal_list(values: &[String]) -> String {
	values
		.iter()
		.map(|v| format!("{v:?}"))
		.collect::<Vec<_>>()
		.join(", ")
}

fn foreign_key_source(fk: &ForeignKeyDefinition) -> String {
	let mut source = format!("ForeignKeyDefinition::new({:?})", fk.name());
	if let Some(column) = fk.local_column() {
		source.push_str(&format!(".column({column:?})"));
	}
	if let (Some(table), Some(column)) = (fk.referenced_table(), fk.referenced_column()) {
		source.push_str(&format!(".references({table:?}, {column:?})"));
	}
	if fk.on_delete_rule() != ReferenceOption::Restrict {
		source.push_str(&format!(
			".on_delete(ReferenceOption::{})",
			option_variant(fk.on_delete_rule())
		));
	}
	if fk.on_update_rule() != ReferenceOption::Restrict {
		source.push_str(&format!(
			".on_update(ReferenceOption::{})",
			option_variant(fk.on_update_rule())
		));
	}
	source
}

fn option_variant(option: ReferenceOption) -> &'static str {
	match option {
		ReferenceOption::Restrict => "Restrict",
		ReferenceOption::Cascade => "Cascade",
		ReferenceOption::SetNull => "SetNull",
		ReferenceOption::NoAction => "NoAction",
	}
}
