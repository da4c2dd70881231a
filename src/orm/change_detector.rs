//! Attribute-level change detection between current and original state.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::metadata::EntityMetadata;
use crate::orm::{instance_id, EntityRef, KeyedMetadataResolver, OriginalSnapshot, ReferenceKey};
use crate::value::{self, Value};

/// One scalar delta. Equality is by name and old value.
#[derive(Debug, Clone)]
pub struct PropertyChange {
	pub name: String,
	pub old_value: Option<Value>,
	pub new_value: Option<Value>,
}

impl PartialEq for PropertyChange {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.old_value == other.old_value
	}
}

/// One *-to-one reference delta; resolves to an FK column update.
#[derive(Clone)]
pub struct ReferenceChange {
	pub property: String,
	/// The FK column on the owning side, when this side owns the relation.
	pub column: Option<String>,
	pub old: Option<ReferenceKey>,
	pub new_target: Option<EntityRef>,
}

impl std::fmt::Debug for ReferenceChange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReferenceChange")
			.field("property", &self.property)
			.field("column", &self.column)
			.field("old", &self.old)
			.field("new_target", &self.new_target.as_ref().map(instance_id))
			.finish()
	}
}

/// Collection-level delta: membership added and removed since the
/// original snapshot. Drives join-row INSERT/DELETE, never UPDATEs of the
/// owning row.
#[derive(Clone)]
pub struct CollectionDelta {
	pub property: String,
	pub added: Vec<EntityRef>,
	pub removed: Vec<ReferenceKey>,
}

impl std::fmt::Debug for CollectionDelta {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CollectionDelta")
			.field("property", &self.property)
			.field("added", &self.added.iter().map(instance_id).collect::<Vec<_>>())
			.field("removed", &self.removed)
			.finish()
	}
}

/// Everything that changed on one instance.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
	pub scalars: IndexMap<String, PropertyChange>,
	pub references: IndexMap<String, ReferenceChange>,
	pub collections: IndexMap<String, CollectionDelta>,
}

impl ChangeSet {
	pub fn is_empty(&self) -> bool {
		self.scalars.is_empty() && self.references.is_empty() && self.collections.is_empty()
	}

	/// Whether the owning row itself needs an UPDATE.
	pub fn requires_update(&self) -> bool {
		!self.scalars.is_empty() || !self.references.is_empty()
	}
}

/// Computes change sets; stateless.
pub struct ChangeDetector;

impl ChangeDetector {
	/// Diff an instance against its original snapshot. Without a snapshot
	/// there is nothing to diff against and the change set is empty.
	pub fn detect(
		entity: &EntityRef,
		metadata: &EntityMetadata,
		snapshot: Option<&OriginalSnapshot>,
		resolve: KeyedMetadataResolver<'_>,
	) -> ChangeSet {
		let Some(snapshot) = snapshot else {
			return ChangeSet::default();
		};
		let borrowed = entity.borrow();
		let mut changes = ChangeSet::default();

		let pk_property = metadata
			.primary_key_column()
			.map(|pk| pk.property.clone())
			.unwrap_or_default();
		for column in &metadata.columns {
			if column.property == pk_property {
				continue;
			}
			let Some(current) = borrowed.get_property(&column.property) else {
				continue;
			};
			let original = snapshot.scalars.get(&column.property);
			let changed = match original {
				Some(original) => !value::values_equal(original, &current),
				None => !value::is_null(&current),
			};
			if changed {
				changes.scalars.insert(
					column.property.clone(),
					PropertyChange {
						name: column.property.clone(),
						old_value: original.cloned(),
						new_value: Some(current),
					},
				);
			}
		}

		for relation in metadata.relations.iter().filter(|r| r.kind.is_to_one()) {
			let Some(current) = borrowed.get_reference(&relation.property) else {
				continue;
			};
			let current_key = current.as_ref().and_then(|target| {
				resolve(&relation.target).map(|meta: Arc<EntityMetadata>| {
					ReferenceKey::of(target, &meta)
				})
			});
			let original = snapshot
				.references
				.get(&relation.property)
				.cloned()
				.unwrap_or(None);
			if current_key != original {
				changes.references.insert(
					relation.property.clone(),
					ReferenceChange {
						property: relation.property.clone(),
						column: relation.column.clone(),
						old: original,
						new_target: current,
					},
				);
			}
		}

		for relation in metadata.collection_relations() {
			let Some(members) = borrowed.get_collection(&relation.property) else {
				continue;
			};
			let Some(target_meta) = resolve(&relation.target) else {
				continue;
			};
			let original: Vec<ReferenceKey> = snapshot
				.collections
				.get(&relation.property)
				.cloned()
				.unwrap_or_default();
			let current_keys: Vec<ReferenceKey> = members
				.iter()
				.map(|member| ReferenceKey::of(member, &target_meta))
				.collect();
			let added: Vec<EntityRef> = members
				.iter()
				.zip(current_keys.iter())
				.filter(|(_, key)| !original.contains(key))
				.map(|(member, _)| member.clone())
				.collect();
			let removed: Vec<ReferenceKey> = original
				.iter()
				.filter(|key| !current_keys.contains(key))
				.cloned()
				.collect();
			if !added.is_empty() || !removed.is_empty() {
				changes.collections.insert(
					relation.property.clone(),
					CollectionDelta {
						property: relation.property.clone(),
						added,
						removed,
					},
				);
			}
		}

		changes
	}
}
