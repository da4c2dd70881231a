//! Column definitions for the schema-builder DSL.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::metadata::{ColumnMetadata, ColumnType};
use crate::schema::ColumnInfo;
use crate::schema::builder::{quote_identifier, render_default};

/// One column in a CREATE/ALTER statement, built fluently:
/// `ColumnDefinition::new("id").integer().unsigned().not_null().auto_increment()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
	pub(crate) name: String,
	pub(crate) column_type: Option<ColumnType>,
	pub(crate) nullable: bool,
	pub(crate) unsigned: bool,
	pub(crate) auto_increment: bool,
	pub(crate) default: Option<String>,
}

impl ColumnDefinition {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			column_type: None,
			nullable: true,
			unsigned: false,
			auto_increment: false,
			default: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn column_type(&self) -> Option<&ColumnType> {
		self.column_type.as_ref()
	}

	pub fn is_nullable(&self) -> bool {
		self.nullable
	}

	pub fn is_unsigned(&self) -> bool {
		self.unsigned
	}

	pub fn is_auto_increment(&self) -> bool {
		self.auto_increment
	}

	pub fn default_clause(&self) -> Option<&str> {
		self.default.as_deref()
	}

	// Typed constructors.

	pub fn tiny_integer(self) -> Self {
		self.with_type(ColumnType::TinyInt)
	}

	pub fn small_integer(self) -> Self {
		self.with_type(ColumnType::SmallInt)
	}

	pub fn integer(self) -> Self {
		self.with_type(ColumnType::Int)
	}

	pub fn big_integer(self) -> Self {
		self.with_type(ColumnType::BigInt)
	}

	pub fn decimal(self, precision: u8, scale: u8) -> Self {
		self.with_type(ColumnType::Decimal { precision, scale })
	}

	pub fn float(self) -> Self {
		self.with_type(ColumnType::Float)
	}

	pub fn double(self) -> Self {
		self.with_type(ColumnType::Double)
	}

	pub fn boolean(self) -> Self {
		self.with_type(ColumnType::Boolean)
	}

	pub fn fixed_string(self, length: u32) -> Self {
		self.with_type(ColumnType::Char(length))
	}

	pub fn string(self, length: u32) -> Self {
		self.with_type(ColumnType::Varchar(length))
	}

	pub fn text(self) -> Self {
		self.with_type(ColumnType::Text)
	}

	pub fn medium_text(self) -> Self {
		self.with_type(ColumnType::MediumText)
	}

	pub fn long_text(self) -> Self {
		self.with_type(ColumnType::LongText)
	}

	pub fn blob(self) -> Self {
		self.with_type(ColumnType::Blob)
	}

	pub fn date(self) -> Self {
		self.with_type(ColumnType::Date)
	}

	pub fn time(self) -> Self {
		self.with_type(ColumnType::Time)
	}

	pub fn datetime(self) -> Self {
		self.with_type(ColumnType::DateTime)
	}

	pub fn timestamp(self) -> Self {
		self.with_type(ColumnType::Timestamp)
	}

	pub fn json(self) -> Self {
		self.with_type(ColumnType::Json)
	}

	pub fn enumeration(self, values: &[&str]) -> Self {
		self.with_type(ColumnType::Enum(
			values.iter().map(|v| v.to_string()).collect(),
		))
	}

	pub fn set(self, values: &[&str]) -> Self {
		self.with_type(ColumnType::Set(
			values.iter().map(|v| v.to_string()).collect(),
		))
	}

	pub fn geometry(self) -> Self {
		self.with_type(ColumnType::Geometry)
	}

	// Modifiers.

	pub fn not_null(mut self) -> Self {
		self.nullable = false;
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

	pub fn default_value(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	fn with_type(mut self, column_type: ColumnType) -> Self {
		self.column_type = Some(column_type);
		self
	}

	/// Build a definition from column metadata.
	pub fn from_metadata(column: &ColumnMetadata) -> Self {
		let mut def = Self::new(&column.column).with_type(column.column_type.clone());
		def.nullable = column.nullable;
		def.unsigned = column.unsigned;
		def.auto_increment = column.auto_increment;
		def.default = column.default.clone();
		def
	}

	/// Build a definition from an `information_schema` column description,
	/// parsing the COLUMN_TYPE string form back into a typed column.
	pub fn from_column_info(name: &str, info: &ColumnInfo) -> Self {
		let (column_type, unsigned) = parse_column_type(&info.column_type);
		let mut def = Self::new(name);
		def.column_type = column_type;
		def.unsigned = unsigned;
		def.nullable = info.nullable;
		def.auto_increment = info.extra.to_ascii_lowercase().contains("auto_increment");
		def.default = info
			.default
			.clone()
			.filter(|d| !d.eq_ignore_ascii_case("NULL"));
		def
	}

	/// Render the column clause of a CREATE/ALTER statement.
	pub(crate) fn render(&self) -> String {
		let mut sql = quote_identifier(&self.name);
		if let Some(column_type) = &self.column_type {
			sql.push(' ');
			sql.push_str(&column_type.sql());
		}
		if self.unsigned {
			sql.push_str(" UNSIGNED");
		}
		if !self.nullable {
			sql.push_str(" NOT NULL");
		}
		if let Some(default) = &self.default
			&& !default.eq_ignore_ascii_case("NULL")
		{
			sql.push_str(" DEFAULT ");
			sql.push_str(&render_default(default));
		}
		if self.auto_increment {
			sql.push_str(" AUTO_INCREMENT");
		}
		sql
	}
}

static TYPE_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^([a-z]+)(?:\((.*)\))?").expect("valid type pattern"));

/// Parse a COLUMN_TYPE string (`int(10) unsigned`, `varchar(100)`,
/// `enum('a','b')`, ...) into a typed column. Returns `None` for types the
/// DSL does not model, leaving the definition typeless.
fn parse_column_type(raw: &str) -> (Option<ColumnType>, bool) {
	let lowered = raw.trim().to_ascii_lowercase();
	let unsigned = lowered.contains(" unsigned");
	let Some(captures) = TYPE_PATTERN.captures(&lowered) else {
		return (None, unsigned);
	};
	let base = &captures[1];
	let args = captures.get(2).map(|m| m.as_str()).unwrap_or("");
	let first_u32 = || args.split(',').next().and_then(|a| a.trim().parse::<u32>().ok());
	let column_type = match base {
		"tinyint" if args == "1" => Some(ColumnType::Boolean),
		"tinyint" => Some(ColumnType::TinyInt),
		"smallint" => Some(ColumnType::SmallInt),
		"int" | "integer" | "mediumint" => Some(ColumnType::Int),
		"bigint" => Some(ColumnType::BigInt),
		"decimal" | "numeric" => {
			let mut parts = args.split(',');
			let precision = parts.next().and_then(|p| p.trim().parse::<u8>().ok());
			let scale = parts
				.next()
				.and_then(|s| s.trim().parse::<u8>().ok())
				.unwrap_or(0);
			precision.map(|precision| ColumnType::Decimal { precision, scale })
		}
		"float" => Some(ColumnType::Float),
		"double" => Some(ColumnType::Double),
		"char" => first_u32().map(ColumnType::Char),
		"varchar" => first_u32().map(ColumnType::Varchar),
		"text" => Some(ColumnType::Text),
		"mediumtext" => Some(ColumnType::MediumText),
		"longtext" => Some(ColumnType::LongText),
		"blob" => Some(ColumnType::Blob),
		"date" => Some(ColumnType::Date),
		"time" => Some(ColumnType::Time),
		"datetime" => Some(ColumnType::DateTime),
		"timestamp" => Some(ColumnType::Timestamp),
		"json" => Some(ColumnType::Json),
		"enum" => Some(ColumnType::Enum(parse_literal_list(args))),
		"set" => Some(ColumnType::Set(parse_literal_list(args))),
		"geometry" => Some(ColumnType::Geometry),
		_ => None,
	};
	(column_type, unsigned)
}

/// Parse `'a','b','c'` into its literals, honouring doubled quotes.
fn parse_literal_list(args: &str) -> Vec<String> {
	let mut literals = Vec::new();
	let mut current = String::new();
	let mut in_literal = false;
	let mut chars = args.chars().peekable();
	while let Some(c) = chars.next() {
		match c {
			'\'' if !in_literal => in_literal = true,
			'\'' if chars.peek() == Some(&'\'') => {
				chars.next();
				current.push('\'');
			}
			'\'' => {
				in_literal = false;
				literals.push(std::mem::take(&mut current));
			}
			_ if in_literal => current.push(c),
			_ => {}
		}
	}
	literals
}
