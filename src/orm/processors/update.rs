//! UPDATE processing for managed instances with detected changes.

use std::collections::HashSet;
use std::rc::Rc;

use sea_query::{Alias, Expr, Query};
use tracing::warn;

use crate::backends::DatabaseInterface;
use crate::error::OrmError;
use crate::metadata::{EntityMetadata, MetadataRegistry};
use crate::orm::{ChangeSet, EntityRef, instance_id, primary_key_value};
use crate::value::Value;

/// Builds and executes one UPDATE per changed instance.
pub struct UpdateProcessor {
	db: Rc<dyn DatabaseInterface>,
	processed: HashSet<usize>,
}

impl UpdateProcessor {
	pub fn new(db: Rc<dyn DatabaseInterface>) -> Self {
		Self {
			db,
			processed: HashSet::new(),
		}
	}

	/// Reset per-iteration idempotence; snapshots are refreshed between
	/// iterations so later passes only see genuinely new changes.
	pub fn begin_iteration(&mut self) {
		self.processed.clear();
	}

	/// Apply one instance's scalar and reference changes. An empty change
	/// set is a no-op.
	pub fn process(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		changes: &ChangeSet,
		registry: &MetadataRegistry,
	) -> Result<bool, OrmError> {
		if !changes.requires_update() {
			return Ok(false);
		}
		if !self.processed.insert(instance_id(entity)) {
			return Ok(false);
		}
		let pk_column = metadata.primary_key_column()?;
		let pk_value =
			primary_key_value(&*entity.borrow(), metadata)?.ok_or_else(|| {
				OrmError::CannotUpdate {
					entity: metadata.entity.clone(),
				}
			})?;

		let mut statement = Query::update();
		statement.table(Alias::new(metadata.table.as_str()));
		for change in changes.scalars.values() {
			let Some(column) = metadata.column_for_property(&change.name) else {
				continue;
			};
			let value = change
				.new_value
				.clone()
				.unwrap_or_else(|| column.column_type.null_value());
			statement.value(Alias::new(column.column.as_str()), value);
		}
		for change in changes.references.values() {
			// Inverse-side references carry no FK column on this row.
			let Some(column) = change.column.as_deref() else {
				continue;
			};
			let value = reference_value(metadata, change, registry)?;
			statement.value(Alias::new(column), value);
		}
		statement.and_where(Expr::col(Alias::new(pk_column.column.as_str())).eq(pk_value));

		let affected = super::execute_statement(&*self.db, &statement)?;
		if affected == 0 {
			// The row vanished underneath us; non-fatal, surfaced on the
			// warning channel.
			warn!(
				entity = %metadata.entity,
				"UPDATE matched zero rows for a managed instance"
			);
		}
		Ok(true)
	}
}

fn reference_value(
	metadata: &EntityMetadata,
	change: &crate::orm::ReferenceChange,
	registry: &MetadataRegistry,
) -> Result<Value, OrmError> {
	let relation = metadata
		.relation_for_property(&change.property)
		.ok_or_else(|| OrmError::UnknownProperty {
			entity: metadata.entity.clone(),
			property: change.property.clone(),
		})?;
	let target_meta = registry.get(&relation.target)?;
	match &change.new_target {
		Some(target) => primary_key_value(&*target.borrow(), &target_meta)?.ok_or_else(|| {
			OrmError::UnresolvedReference {
				entity: metadata.entity.clone(),
				property: change.property.clone(),
			}
		}),
		None => Ok(target_meta.primary_key_column()?.column_type.null_value()),
	}
}
