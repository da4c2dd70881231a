//! Versioned, reversible schema migrations.
//!
//! A migration is a pair of `up`/`down` programs written against the
//! schema-builder DSL, carried by a type named `Migration<YYYYMMDDHHMM>`.
//! The [`MigrationGenerator`] renders such files from schema differences;
//! the [`MigrationManager`] registers, orders, executes, and rolls them
//! back, recording history in the `migration_history` table.

mod generator;
mod loader;
mod manager;

pub use generator::MigrationGenerator;
pub use loader::load_migration_file;
pub use manager::MigrationManager;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::MigrationError;
use crate::schema::builder::SchemaBuilder;

/// The history table every manager ensures at construction.
pub const HISTORY_TABLE: &str = "migration_history";

/// One versioned schema change.
pub trait Migration {
	/// Version in `YYYYMMDD-HHMM` form; orders and identifies the
	/// migration.
	fn version(&self) -> &str;

	/// Build the forward program.
	fn up(&self, schema: &mut SchemaBuilder);

	/// Build the reverse program. Restores structure only.
	fn down(&self, schema: &mut SchemaBuilder);
}

/// One row of the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
	pub id: u64,
	pub version: String,
	pub executed_at: DateTime<Utc>,
	pub execution_time_ms: u64,
}

static DATETIME_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\d{12}$").expect("valid datetime pattern"));

static VERSION_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\d{8}-\d{4}$").expect("valid version pattern"));

/// Validate a `YYYYMMDDHHMM` stamp: twelve digits with calendar-valid
/// date and time parts.
pub fn validate_datetime(datetime: &str) -> Result<(), MigrationError> {
	if !DATETIME_PATTERN.is_match(datetime) {
		return Err(MigrationError::InvalidDatetime(datetime.to_string()));
	}
	let year: i32 = datetime[0..4].parse().unwrap_or(0);
	let month: u32 = datetime[4..6].parse().unwrap_or(0);
	let day: u32 = datetime[6..8].parse().unwrap_or(0);
	let hour: u32 = datetime[8..10].parse().unwrap_or(99);
	let minute: u32 = datetime[10..12].parse().unwrap_or(99);
	if NaiveDate::from_ymd_opt(year, month, day).is_none() || hour > 23 || minute > 59 {
		return Err(MigrationError::InvalidDatetime(datetime.to_string()));
	}
	Ok(())
}

/// `202505011024` → `20250501-1024`.
pub fn version_from_datetime(datetime: &str) -> String {
	format!("{}-{}", &datetime[0..8], &datetime[8..12])
}

/// Validate a `YYYYMMDD-HHMM` version string.
pub fn validate_version(version: &str) -> Result<(), MigrationError> {
	if !VERSION_PATTERN.is_match(version) {
		return Err(MigrationError::InvalidDatetime(version.to_string()));
	}
	let compact = version.replace('-', "");
	validate_datetime(&compact)
		.map_err(|_| MigrationError::InvalidDatetime(version.to_string()))
}
