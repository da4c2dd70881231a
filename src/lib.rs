//! Unit-of-work ORM and versioned schema migrations for MySQL/MariaDB.
//!
//! `grappelli` tracks entity instances inside a [`PersistenceContext`]
//! (identity map, original-value snapshots, lifecycle state machine) and
//! turns in-memory mutations into correctly ordered SQL on
//! [`PersistenceContext::flush`]. A schema pipeline diffs the live
//! database against the registered entity model and renders versioned,
//! reversible migration files in the schema-builder DSL.
//!
//! The raw driver stays behind the narrow blocking
//! [`DatabaseInterface`] trait; parameterised DML is built with
//! `sea-query` and treated as opaque.
//!
//! ```no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//!
//! use grappelli::metadata::{ColumnMetadata, ColumnType, EntityMetadata, MetadataRegistry};
//! use grappelli::orm::PersistenceContext;
//!
//! # fn connect() -> Rc<dyn grappelli::backends::DatabaseInterface> { unimplemented!() }
//! let registry = Arc::new(MetadataRegistry::new());
//! registry.register(
//!     EntityMetadata::new("User", "users_")
//!         .column(
//!             ColumnMetadata::new("id", "id", ColumnType::Int)
//!                 .unsigned()
//!                 .primary_key()
//!                 .auto_increment(),
//!         )
//!         .column(ColumnMetadata::new("username", "username", ColumnType::Varchar(100))),
//! )?;
//!
//! let context = PersistenceContext::new(registry, connect());
//! # Ok::<(), grappelli::error::OrmError>(())
//! ```

pub mod backends;
pub mod cli;
pub mod error;
pub mod metadata;
pub mod migrations;
pub mod orm;
pub mod schema;
pub mod value;

pub use crate::backends::{DatabaseInterface, Row};
pub use crate::error::{
	DbError, HydrationError, MigrationError, OrmError, SchemaValidationError,
};
pub use crate::metadata::{EntityMetadata, MetadataRegistry};
pub use crate::migrations::{Migration, MigrationGenerator, MigrationManager};
pub use crate::orm::{
	Entity, EntityRef, LifecycleEvent, LifecycleState, PersistenceContext, Repository,
};
pub use crate::schema::builder::SchemaBuilder;
pub use crate::value::Value;
