//! Error taxonomies for the persistence engine and the migration pipeline.
//!
//! Every fallible operation surfaces its failure by value; the flush
//! orchestrator and the migration manager roll back their enclosing
//! transaction before propagating. The CLI translates these kinds into
//! concise messages and exit codes (see [`crate::cli`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the database driver behind [`crate::backends::DatabaseInterface`].
#[derive(Debug, Error)]
pub enum DbError {
	/// A statement failed to prepare or execute.
	#[error("statement failed: {0}")]
	Execution(String),

	/// The connection is unusable.
	#[error("connection error: {0}")]
	Connection(String),

	/// Transaction bookkeeping was violated (commit without begin, ...).
	#[error("transaction error: {0}")]
	Transaction(String),
}

/// The operation kind a flush failure is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOperation {
	Insert,
	Update,
	Delete,
}

impl FlushOperation {
	pub fn as_str(&self) -> &'static str {
		match self {
			FlushOperation::Insert => "insert",
			FlushOperation::Update => "update",
			FlushOperation::Delete => "delete",
		}
	}
}

impl std::fmt::Display for FlushOperation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors raised by the unit-of-work persistence engine.
#[derive(Debug, Error)]
pub enum OrmError {
	/// No metadata is registered for the entity name.
	#[error("unknown entity `{0}`")]
	UnknownEntity(String),

	/// Different metadata was submitted for an already registered entity.
	#[error("metadata for `{0}` is already registered with a different definition")]
	AlreadyRegistered(String),

	/// The entity metadata declares no primary-key column, or more than one.
	#[error("entity `{0}` must declare exactly one primary-key column")]
	NoPrimaryKey(String),

	/// An insert produced an id but the instance exposes no primary-key writer.
	#[error("entity `{entity}` produced an id but has no primary-key mutator")]
	NoPrimaryKeyMutator { entity: String },

	/// The instance exposes no readable primary-key property.
	#[error("entity `{entity}` has no primary-key accessor")]
	NoPrimaryKeyAccessor { entity: String },

	/// The instance does not expose the named property.
	#[error("entity `{entity}` has no property `{property}`")]
	UnknownProperty { entity: String, property: String },

	/// A property write rejected the supplied value.
	#[error("invalid value for `{entity}.{property}`: {detail}")]
	InvalidValue {
		entity: String,
		property: String,
		detail: String,
	},

	/// persist/remove was called on a detached instance.
	#[error("entity `{entity}` is detached from this persistence context")]
	DetachedEntity { entity: String },

	/// remove() requires an assigned primary key at SQL time.
	#[error("cannot delete `{entity}`: no primary key value assigned")]
	CannotDelete { entity: String },

	/// An UPDATE requires an assigned primary key.
	#[error("cannot update `{entity}`: no primary key value assigned")]
	CannotUpdate { entity: String },

	/// A *-to-one reference points at an instance that is neither managed
	/// nor scheduled for insertion.
	#[error("entity `{entity}` references an unsaved `{property}` target")]
	UnresolvedReference { entity: String, property: String },

	/// The scheduled change set contains a relation cycle no insert/delete
	/// order can satisfy.
	#[error("cyclic dependency between scheduled entities: {0}")]
	CyclicDependency(String),

	/// An entity definition file could not be loaded into the registry.
	#[error("invalid entity definition in {file}: {message}")]
	MetadataLoad { file: PathBuf, message: String },

	/// Entity metadata violates a model invariant.
	#[error("invalid metadata for `{entity}`: {message}")]
	InvalidMetadata { entity: String, message: String },

	/// Row-to-entity conversion failed.
	#[error(transparent)]
	Hydration(#[from] HydrationError),

	/// The underlying driver failed.
	#[error(transparent)]
	Database(#[from] DbError),

	/// A processor failed during flush; carries the entity class and the
	/// operation kind, with the transaction already rolled back.
	#[error("flush failed while executing {operation} for `{entity}`: {source}")]
	Flush {
		entity: String,
		operation: FlushOperation,
		#[source]
		source: Box<OrmError>,
	},
}

/// Failures converting a database row into an entity instance.
///
/// Every variant carries the entity class and the offending property for
/// diagnostics.
#[derive(Debug, Error)]
pub enum HydrationError {
	#[error("missing column for `{entity}.{property}` in result row")]
	MissingColumn { entity: String, property: String },

	#[error("type mismatch hydrating `{entity}.{property}`: {detail}")]
	TypeMismatch {
		entity: String,
		property: String,
		detail: String,
	},

	#[error("NULL in non-nullable `{entity}.{property}`")]
	NullForNonNullable { entity: String, property: String },

	#[error("cannot hydrate `{entity}`: {reason}")]
	InvalidEntity { entity: String, reason: String },
}

/// Failures validating a schema difference before rendering a migration.
#[derive(Debug, Error)]
pub enum SchemaValidationError {
	#[error("entity `{0}` maps to a table with no columns")]
	EntityHasNoColumns(String),

	#[error("foreign key `{name}` on `{table}` is incomplete")]
	ForeignKeyIncomplete { table: String, name: String },

	#[error("foreign key `{name}` on `{table}` references missing column `{column}`")]
	ForeignKeyColumnMissing {
		table: String,
		name: String,
		column: String,
	},
}

/// Errors raised by the migration generator and manager.
#[derive(Debug, Error)]
pub enum MigrationError {
	/// The datetime argument is not a valid `YYYYMMDDHHMM` stamp.
	#[error("invalid migration datetime `{0}`: expected YYYYMMDDHHMM with valid calendar values")]
	InvalidDatetime(String),

	/// The configured migrations directory does not exist.
	#[error("migrations directory {0} does not exist")]
	MigrationDirectoryMissing(PathBuf),

	/// Two registered migrations share a version.
	#[error("duplicate migration version `{0}`")]
	DuplicateMigrationVersion(String),

	/// The migration is already recorded in the history table.
	#[error("migration `{0}` has already been executed")]
	AlreadyExecuted(String),

	/// The history table records a version no registered migration carries.
	#[error("executed migration `{0}` is not present in the registry")]
	OrphanExecuted(String),

	/// A migration's `up` failed; the transaction was rolled back.
	#[error("Migration {version} failed: {cause}")]
	MigrationFailed { version: String, cause: String },

	/// The schema difference is not a valid migration input.
	#[error(transparent)]
	Validation(#[from] SchemaValidationError),

	/// A migration source file could not be parsed back into a program.
	#[error("cannot load migration file {file}: {message}")]
	Parse { file: PathBuf, message: String },

	/// The underlying driver failed.
	#[error(transparent)]
	Database(#[from] DbError),

	/// Reading or writing a migration file failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Entity metadata needed for the target schema was invalid.
	#[error(transparent)]
	Metadata(Box<OrmError>),
}

impl From<OrmError> for MigrationError {
	fn from(err: OrmError) -> Self {
		MigrationError::Metadata(Box::new(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flush_error_carries_entity_and_operation() {
		let inner = OrmError::CannotUpdate {
			entity: "User".into(),
		};
		let err = OrmError::Flush {
			entity: "User".into(),
			operation: FlushOperation::Update,
			source: Box::new(inner),
		};
		let message = err.to_string();
		assert!(message.contains("update"));
		assert!(message.contains("User"));
	}

	#[test]
	fn test_migration_failed_message_prefix() {
		let err = MigrationError::MigrationFailed {
			version: "20250501-1024".into(),
			cause: "boom".into(),
		};
		assert_eq!(err.to_string(), "Migration 20250501-1024 failed: boom");
	}

	#[test]
	fn test_hydration_error_names_entity_and_property() {
		let err = HydrationError::NullForNonNullable {
			entity: "User".into(),
			property: "username".into(),
		};
		assert!(err.to_string().contains("User.username"));
	}
}
