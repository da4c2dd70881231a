//! The metadata registry shared by persistence contexts and the migration
//! pipeline.
//!
//! Populated during startup (programmatic registration or a directory
//! scan of TOML entity definitions) and read-only from other threads
//! afterwards. There is no hidden global: every consumer receives its
//! registry explicitly.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::OrmError;
use crate::metadata::loader::load_entity_file;
use crate::metadata::{ColumnMetadata, EntityMetadata, RelationMetadata};
use crate::orm::{Entity, entity_ref};

/// Canonical store of entity metadata, keyed by entity name.
#[derive(Default)]
pub struct MetadataRegistry {
	entities: RwLock<IndexMap<String, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register one entity's metadata.
	///
	/// Submitting metadata identical to what is already registered is a
	/// no-op; submitting *different* metadata for the same entity fails
	/// with `AlreadyRegistered`.
	pub fn register(&self, metadata: EntityMetadata) -> Result<(), OrmError> {
		metadata.validate()?;
		let mut entities = self.entities.write();
		if let Some(existing) = entities.get(&metadata.entity) {
			if **existing == metadata {
				return Ok(());
			}
			return Err(OrmError::AlreadyRegistered(metadata.entity));
		}
		debug!(entity = %metadata.entity, table = %metadata.table, "registered entity metadata");
		entities.insert(metadata.entity.clone(), Arc::new(metadata));
		Ok(())
	}

	/// Register metadata together with the hydration factory for `T`.
	pub fn register_entity<T>(&self, metadata: EntityMetadata) -> Result<(), OrmError>
	where
		T: Entity + Default + 'static,
	{
		self.register(metadata.factory(|| entity_ref(T::default())))
	}

	/// Scan a directory for `*.toml` entity definitions and register each.
	/// Returns the number of entities loaded.
	pub fn load_from_path(&self, dir: &Path) -> Result<usize, OrmError> {
		let mut loaded = 0;
		for entry in WalkDir::new(dir).sort_by_file_name() {
			let entry = entry.map_err(|e| OrmError::MetadataLoad {
				file: dir.to_path_buf(),
				message: e.to_string(),
			})?;
			if !entry.file_type().is_file() {
				continue;
			}
			if entry.path().extension().and_then(|e| e.to_str()) != Some("toml") {
				continue;
			}
			let metadata = load_entity_file(entry.path())?;
			self.register(metadata)?;
			loaded += 1;
		}
		Ok(loaded)
	}

	pub fn get(&self, entity: &str) -> Result<Arc<EntityMetadata>, OrmError> {
		self.entities
			.read()
			.get(entity)
			.cloned()
			.ok_or_else(|| OrmError::UnknownEntity(entity.to_string()))
	}

	pub fn contains(&self, entity: &str) -> bool {
		self.entities.read().contains_key(entity)
	}

	pub fn table_for(&self, entity: &str) -> Result<String, OrmError> {
		Ok(self.get(entity)?.table.clone())
	}

	pub fn columns_of(&self, entity: &str) -> Result<Vec<ColumnMetadata>, OrmError> {
		Ok(self.get(entity)?.columns.clone())
	}

	pub fn relations_of(&self, entity: &str) -> Result<Vec<RelationMetadata>, OrmError> {
		Ok(self.get(entity)?.relations.clone())
	}

	pub fn primary_key_column_of(&self, entity: &str) -> Result<ColumnMetadata, OrmError> {
		Ok(self.get(entity)?.primary_key_column()?.clone())
	}

	/// All registered metadata, in registration order.
	pub fn all(&self) -> Vec<Arc<EntityMetadata>> {
		self.entities.read().values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entities.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entities.read().is_empty()
	}

	/// Cross-entity invariant: every relation targets a registered entity
	/// whose primary key exists.
	pub fn validate(&self) -> Result<(), OrmError> {
		let entities = self.entities.read();
		for metadata in entities.values() {
			for relation in &metadata.relations {
				let target = entities
					.get(&relation.target)
					.ok_or_else(|| OrmError::UnknownEntity(relation.target.clone()))?;
				target.primary_key_column()?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metadata::{ColumnType, KeyKind};

	fn unit_metadata() -> EntityMetadata {
		EntityMetadata::new("Unit", "units_").column(
			ColumnMetadata::new("id", "id", ColumnType::Int)
				.unsigned()
				.primary_key()
				.auto_increment(),
		)
	}

	#[test]
	fn test_register_then_get() {
		let registry = MetadataRegistry::new();
		registry.register(unit_metadata()).unwrap();
		let meta = registry.get("Unit").unwrap();
		assert_eq!(meta.table, "units_");
		assert_eq!(meta.primary_key_column().unwrap().key, KeyKind::Primary);
	}

	#[test]
	fn test_get_unknown_entity_fails() {
		let registry = MetadataRegistry::new();
		assert!(matches!(
			registry.get("Ghost"),
			Err(OrmError::UnknownEntity(_))
		));
	}

	#[test]
	fn test_identical_reregistration_is_noop() {
		let registry = MetadataRegistry::new();
		registry.register(unit_metadata()).unwrap();
		registry.register(unit_metadata()).unwrap();
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn test_conflicting_reregistration_fails() {
		let registry = MetadataRegistry::new();
		registry.register(unit_metadata()).unwrap();
		let different = EntityMetadata::new("Unit", "other_table").column(
			ColumnMetadata::new("id", "id", ColumnType::Int)
				.unsigned()
				.primary_key(),
		);
		assert!(matches!(
			registry.register(different),
			Err(OrmError::AlreadyRegistered(_))
		));
	}

	#[test]
	fn test_validate_rejects_unregistered_relation_target() {
		let registry = MetadataRegistry::new();
		let user = EntityMetadata::new("User", "users_")
			.column(ColumnMetadata::new("id", "id", ColumnType::Int).primary_key())
			.relation(RelationMetadata::many_to_one("unit", "Unit", "unit_id"));
		registry.register(user).unwrap();
		assert!(registry.validate().is_err());
		registry.register(unit_metadata()).unwrap();
		assert!(registry.validate().is_ok());
	}
}
