//! Loading generated migration source files back into executable
//! programs.
//!
//! `register_from` cannot compile a `.rs` file at runtime, so the loader
//! parses the file with `syn` and interprets the fluent DSL calls the
//! generator emits, rebuilding the same statement AST the file was
//! rendered from.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use syn::{Expr, ImplItem, Item, Lit, Stmt};

use crate::error::MigrationError;
use crate::metadata::ReferenceOption;
use crate::migrations::{Migration, validate_version};
use crate::schema::builder::{
	ColumnDefinition, ForeignKeyDefinition, SchemaBuilder, SchemaStatement,
};

static FILE_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^Migration(\d{12})\.rs$").expect("valid file pattern"));

static CLASS_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^Migration(\d{12})$").expect("valid class pattern"));

/// Whether a file name looks like a generated migration.
pub(crate) fn is_migration_file(file_name: &str) -> bool {
	FILE_PATTERN.is_match(file_name)
}

/// A migration reconstructed from source; replays its parsed programs.
pub struct LoadedMigration {
	version: String,
	up: Vec<SchemaStatement>,
	down: Vec<SchemaStatement>,
}

impl Migration for LoadedMigration {
	fn version(&self) -> &str {
		&self.version
	}

	fn up(&self, schema: &mut SchemaBuilder) {
		schema.statements.extend(self.up.iter().cloned());
	}

	fn down(&self, schema: &mut SchemaBuilder) {
		schema.statements.extend(self.down.iter().cloned());
	}
}

/// Parse one `Migration<datetime>.rs` file.
pub fn load_migration_file(path: &Path) -> Result<Box<dyn Migration>, MigrationError> {
	let parse_error = |message: String| MigrationError::Parse {
		file: path.to_path_buf(),
		message,
	};
	let source = std::fs::read_to_string(path)?;
	let file = syn::parse_file(&source).map_err(|e| parse_error(e.to_string()))?;

	let mut class = None;
	for item in &file.items {
		if let Item::Struct(s) = item
			&& CLASS_PATTERN.is_match(&s.ident.to_string())
		{
			class = Some(s.ident.to_string());
		}
	}
	let class = class.ok_or_else(|| parse_error("no Migration<datetime> struct found".into()))?;

	let mut version = None;
	let mut up = None;
	let mut down = None;
	for item in &file.items {
		let Item::Impl(imp) = item else { continue };
		if imp.trait_.is_none() {
			continue;
		}
		let syn::Type::Path(self_ty) = &*imp.self_ty else {
			continue;
		};
		if self_ty.path.segments.last().map(|s| s.ident.to_string()) != Some(class.clone()) {
			continue;
		}
		for impl_item in &imp.items {
			let ImplItem::Fn(function) = impl_item else {
				continue;
			};
			match function.sig.ident.to_string().as_str() {
				"version" => version = Some(parse_version_body(function).map_err(parse_error)?),
				"up" => up = Some(parse_program_body(function).map_err(parse_error)?),
				"down" => down = Some(parse_program_body(function).map_err(parse_error)?),
				_ => {}
			}
		}
	}

	let version = version.ok_or_else(|| parse_error("missing version()".into()))?;
	validate_version(&version)?;
	Ok(Box::new(LoadedMigration {
		version,
		up: up.ok_or_else(|| parse_error("missing up()".into()))?,
		down: down.ok_or_else(|| parse_error("missing down()".into()))?,
	}))
}

fn parse_version_body(function: &syn::ImplItemFn) -> Result<String, String> {
	for stmt in &function.block.stmts {
		if let Stmt::Expr(expr, _) = stmt {
			return lit_str(expr);
		}
	}
	Err("version() has no body".into())
}

fn parse_program_body(function: &syn::ImplItemFn) -> Result<Vec<SchemaStatement>, String> {
	let mut statements = Vec::new();
	for stmt in &function.block.stmts {
		match stmt {
			Stmt::Expr(expr, _) => statements.push(parse_statement(expr)?),
			other => return Err(format!("unsupported statement: {other:?}")),
		}
	}
	Ok(statements)
}

/// Unroll one `schema.…` method chain into a DSL statement.
fn parse_statement(expr: &Expr) -> Result<SchemaStatement, String> {
	let calls = unroll_chain(expr, "schema")?;
	let (first, rest) = calls
		.split_first()
		.ok_or_else(|| "empty statement".to_string())?;
	let mut schema = SchemaBuilder::new();
	match first.0.as_str() {
		"drop_table" => {
			if !rest.is_empty() {
				return Err("drop_table takes no further calls".into());
			}
			schema.drop_table(single_str(&first.1)?);
		}
		"create_table" => {
			let table = schema.create_table(single_str(&first.1)?);
			apply_table_calls(table, rest)?;
		}
		"alter_table" => {
			let table = schema.alter_table(single_str(&first.1)?);
			apply_table_calls(table, rest)?;
		}
		other => return Err(format!("unknown schema method `{other}`")),
	}
	schema
		.statements
		.pop()
		.ok_or_else(|| "no statement built".to_string())
}

fn apply_table_calls(
	table: &mut crate::schema::builder::TableDefinition,
	calls: &[(String, Vec<Expr>)],
) -> Result<(), String> {
	for (method, args) in calls {
		match method.as_str() {
			"column" | "add_column" => {
				table.add_column(parse_column(single_arg(args)?)?);
			}
			"modify_column" => {
				table.modify_column(parse_column(single_arg(args)?)?);
			}
			"drop_column" => {
				table.drop_column(single_str(args)?);
			}
			"primary_key" => {
				let columns = str_slice(single_arg(args)?)?;
				let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
				table.primary_key(&refs);
			}
			"foreign_key" | "add_foreign_key" => {
				table.add_foreign_key(parse_foreign_key(single_arg(args)?)?);
			}
			"drop_foreign_key" => {
				table.drop_foreign_key(single_str(args)?);
			}
			"engine" => {
				table.engine(single_str(args)?);
			}
			"charset" => {
				table.charset(single_str(args)?);
			}
			"collation" => {
				table.collation(single_str(args)?);
			}
			other => return Err(format!("unknown table method `{other}`")),
		}
	}
	Ok(())
}

/// Interpret a `ColumnDefinition::new(..)` builder chain.
fn parse_column(expr: &Expr) -> Result<ColumnDefinition, String> {
	let calls = unroll_constructor_chain(expr, "ColumnDefinition")?;
	let (first, rest) = calls
		.split_first()
		.ok_or_else(|| "empty column expression".to_string())?;
	if first.0 != "new" {
		return Err(format!("expected ColumnDefinition::new, got `{}`", first.0));
	}
	let mut column = ColumnDefinition::new(single_str(&first.1)?);
	for (method, args) in rest {
		column = match method.as_str() {
			"tiny_integer" => column.tiny_integer(),
			"small_integer" => column.small_integer(),
			"integer" => column.integer(),
			"big_integer" => column.big_integer(),
			"decimal" => {
				let (precision, scale) = two_ints(args)?;
				column.decimal(precision, scale)
			}
			"float" => column.float(),
			"double" => column.double(),
			"boolean" => column.boolean(),
			"fixed_string" => column.fixed_string(single_int(args)?),
			"string" => column.string(single_int(args)?),
			"text" => column.text(),
			"medium_text" => column.medium_text(),
			"long_text" => column.long_text(),
			"blob" => column.blob(),
			"date" => column.date(),
			"time" => column.time(),
			"datetime" => column.datetime(),
			"timestamp" => column.timestamp(),
			"json" => column.json(),
			"enumeration" => {
				let values = str_slice(single_arg(args)?)?;
				let refs: Vec<&str> = values.iter().map(String::as_str).collect();
				column.enumeration(&refs)
			}
			"set" => {
				let values = str_slice(single_arg(args)?)?;
				let refs: Vec<&str> = values.iter().map(String::as_str).collect();
				column.set(&refs)
			}
			"geometry" => column.geometry(),
			"not_null" => column.not_null(),
			"unsigned" => column.unsigned(),
			"auto_increment" => column.auto_increment(),
			"default_value" => column.default_value(single_str(args)?),
			other => return Err(format!("unknown column method `{other}`")),
		};
	}
	Ok(column)
}

/// Interpret a `ForeignKeyDefinition::new(..)` builder chain.
fn parse_foreign_key(expr: &Expr) -> Result<ForeignKeyDefinition, String> {
	let calls = unroll_constructor_chain(expr, "ForeignKeyDefinition")?;
	let (first, rest) = calls
		.split_first()
		.ok_or_else(|| "empty foreign-key expression".to_string())?;
	if first.0 != "new" {
		return Err(format!(
			"expected ForeignKeyDefinition::new, got `{}`",
			first.0
		));
	}
	let mut fk = ForeignKeyDefinition::new(single_str(&first.1)?);
	for (method, args) in rest {
		fk = match method.as_str() {
			"column" => fk.column(single_str(args)?),
			"references" => {
				let mut iter = args.iter();
				let table = lit_str(iter.next().ok_or("references needs a table")?)?;
				let column = lit_str(iter.next().ok_or("references needs a column")?)?;
				fk.references(table, column)
			}
			"on_delete" => fk.on_delete(reference_option(single_arg(args)?)?),
			"on_update" => fk.on_update(reference_option(single_arg(args)?)?),
			other => return Err(format!("unknown foreign-key method `{other}`")),
		};
	}
	Ok(fk)
}

// Chain unrolling and literal extraction.

/// Flatten `base.a(..).b(..)` into `[(a, args), (b, args)]`, checking the
/// innermost receiver is the expected identifier.
fn unroll_chain(expr: &Expr, base: &str) -> Result<Vec<(String, Vec<Expr>)>, String> {
	let mut calls = Vec::new();
	let mut current = expr;
	loop {
		match current {
			Expr::MethodCall(call) => {
				calls.push((call.method.to_string(), call.args.iter().cloned().collect()));
				current = &call.receiver;
			}
			Expr::Path(path) => {
				let ident = path
					.path
					.get_ident()
					.map(|i| i.to_string())
					.unwrap_or_default();
				if ident != base {
					return Err(format!("expected `{base}` receiver, got `{ident}`"));
				}
				calls.reverse();
				return Ok(calls);
			}
			other => return Err(format!("unsupported receiver: {other:?}")),
		}
	}
}

/// Flatten `Type::new(..).a(..)` into `[(new, args), (a, args)]`.
fn unroll_constructor_chain(
	expr: &Expr,
	type_name: &str,
) -> Result<Vec<(String, Vec<Expr>)>, String> {
	let mut calls = Vec::new();
	let mut current = expr;
	loop {
		match current {
			Expr::MethodCall(call) => {
				calls.push((call.method.to_string(), call.args.iter().cloned().collect()));
				current = &call.receiver;
			}
			Expr::Call(call) => {
				let Expr::Path(path) = &*call.func else {
					return Err("unsupported constructor".into());
				};
				let segments: Vec<String> = path
					.path
					.segments
					.iter()
					.map(|s| s.ident.to_string())
					.collect();
				if segments.len() < 2 || segments[segments.len() - 2] != type_name {
					return Err(format!("expected {type_name}::new constructor"));
				}
				calls.push((
					segments.last().cloned().unwrap_or_default(),
					call.args.iter().cloned().collect(),
				));
				calls.reverse();
				return Ok(calls);
			}
			other => return Err(format!("unsupported expression: {other:?}")),
		}
	}
}

fn single_arg(args: &[Expr]) -> Result<&Expr, String> {
	match args {
		[only] => Ok(only),
		_ => Err(format!("expected one argument, got {}", args.len())),
	}
}

fn single_str(args: &[Expr]) -> Result<String, String> {
	lit_str(single_arg(args)?)
}

fn single_int<T: std::str::FromStr>(args: &[Expr]) -> Result<T, String> {
	lit_int(single_arg(args)?)
}

fn two_ints<T: std::str::FromStr, U: std::str::FromStr>(args: &[Expr]) -> Result<(T, U), String> {
	let mut iter = args.iter();
	let first = lit_int(iter.next().ok_or("expected two arguments")?)?;
	let second = lit_int(iter.next().ok_or("expected two arguments")?)?;
	Ok((first, second))
}

fn lit_str(expr: &Expr) -> Result<String, String> {
	match expr {
		Expr::Lit(lit) => match &lit.lit {
			Lit::Str(s) => Ok(s.value()),
			other => Err(format!("expected string literal, got {other:?}")),
		},
		other => Err(format!("expected string literal, got {other:?}")),
	}
}

fn lit_int<T: std::str::FromStr>(expr: &Expr) -> Result<T, String> {
	match expr {
		Expr::Lit(lit) => match &lit.lit {
			Lit::Int(i) => i
				.base10_digits()
				.parse::<T>()
				.map_err(|_| format!("invalid integer literal `{}`", i.base10_digits())),
			other => Err(format!("expected integer literal, got {other:?}")),
		},
		other => Err(format!("expected integer literal, got {other:?}")),
	}
}

/// `&["a", "b"]` → its literals.
fn str_slice(expr: &Expr) -> Result<Vec<String>, String> {
	let inner = match expr {
		Expr::Reference(reference) => &*reference.expr,
		other => other,
	};
	match inner {
		Expr::Array(array) => array.elems.iter().map(lit_str).collect(),
		other => Err(format!("expected a slice of string literals, got {other:?}")),
	}
}

fn reference_option(expr: &Expr) -> Result<ReferenceOption, String> {
	let Expr::Path(path) = expr else {
		return Err("expected a ReferenceOption variant".into());
	};
	let variant = path
		.path
		.segments
		.last()
		.map(|s| s.ident.to_string())
		.unwrap_or_default();
	match variant.as_str() {
		"Restrict" => Ok(ReferenceOption::Restrict),
		"Cascade" => Ok(ReferenceOption::Cascade),
		"SetNull" => Ok(ReferenceOption::SetNull),
		"NoAction" => Ok(ReferenceOption::NoAction),
		other => Err(format!("unknown ReferenceOption variant `{other}`")),
	}
}
