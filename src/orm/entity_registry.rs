//! Per-instance snapshots of original attribute values.
//!
//! Snapshots are captured at load, at persist-of-new once an id is
//! assigned, and after each successful flush; the change detector diffs
//! current state against them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::metadata::EntityMetadata;
use crate::orm::{EntityRef, KeyedMetadataResolver, instance_id, primary_key_key};
use crate::value::Value;

/// How a *-to-one reference target is identified in a snapshot: by its
/// persisted `(entity, primary key)` when saved, by instance identity
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
	Persisted { entity: String, key: String },
	Instance(usize),
}

impl ReferenceKey {
	/// Identify a target instance.
	pub fn of(target: &EntityRef, target_metadata: &EntityMetadata) -> Self {
		let key = primary_key_key(&*target.borrow(), target_metadata)
			.ok()
			.flatten();
		match key {
			Some(key) => ReferenceKey::Persisted {
				entity: target_metadata.entity.clone(),
				key,
			},
			None => ReferenceKey::Instance(instance_id(target)),
		}
	}
}

/// The original state of one instance.
#[derive(Debug, Clone)]
pub struct OriginalSnapshot {
	/// Scalar attributes by property name.
	pub scalars: IndexMap<String, Value>,
	/// *-to-one references by property name.
	pub references: IndexMap<String, Option<ReferenceKey>>,
	/// To-many collection membership by property name.
	pub collections: IndexMap<String, Vec<ReferenceKey>>,
	pub loaded_at: DateTime<Utc>,
	pub last_modified: DateTime<Utc>,
}

/// Snapshot store keyed by instance identity.
#[derive(Default)]
pub struct EntityRegistry {
	snapshots: HashMap<usize, OriginalSnapshot>,
}

impl EntityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Capture the instance's current state as its original state.
	pub fn capture(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		resolve: KeyedMetadataResolver<'_>,
	) {
		self.capture_inner(entity, metadata, resolve, true);
	}

	/// Capture scalars and references but leave collection membership
	/// untracked, so the join-row phase sees the initial members as
	/// additions. Used right after an INSERT.
	pub fn capture_without_collections(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		resolve: KeyedMetadataResolver<'_>,
	) {
		self.capture_inner(entity, metadata, resolve, false);
	}

	fn capture_inner(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		resolve: KeyedMetadataResolver<'_>,
		include_collections: bool,
	) {
		let id = instance_id(entity);
		let borrowed = entity.borrow();
		let mut scalars = IndexMap::new();
		for column in &metadata.columns {
			if let Some(value) = borrowed.get_property(&column.property) {
				scalars.insert(column.property.clone(), value);
			}
		}
		let mut references = IndexMap::new();
		for relation in metadata.relations.iter().filter(|r| r.kind.is_to_one()) {
			let Some(current) = borrowed.get_reference(&relation.property) else {
				continue;
			};
			let key = current.as_ref().and_then(|target| {
				resolve(&relation.target).map(|meta| ReferenceKey::of(target, &meta))
			});
			references.insert(relation.property.clone(), key);
		}
		let mut collections = IndexMap::new();
		if include_collections {
			for relation in metadata.collection_relations() {
				let Some(members) = borrowed.get_collection(&relation.property) else {
					continue;
				};
				let keys = resolve(&relation.target)
					.map(|meta| {
						members
							.iter()
							.map(|member| ReferenceKey::of(member, &meta))
							.collect()
					})
					.unwrap_or_default();
				collections.insert(relation.property.clone(), keys);
			}
		}
		drop(borrowed);
		let now = Utc::now();
		let loaded_at = self
			.snapshots
			.get(&id)
			.map(|s| s.loaded_at)
			.unwrap_or(now);
		self.snapshots.insert(
			id,
			OriginalSnapshot {
				scalars,
				references,
				collections,
				loaded_at,
				last_modified: now,
			},
		);
	}

	pub fn get(&self, instance: usize) -> Option<&OriginalSnapshot> {
		self.snapshots.get(&instance)
	}

	pub fn contains(&self, instance: usize) -> bool {
		self.snapshots.contains_key(&instance)
	}

	pub fn forget(&mut self, instance: usize) {
		self.snapshots.remove(&instance);
	}

	pub fn clear(&mut self) {
		self.snapshots.clear();
	}

	pub fn len(&self) -> usize {
		self.snapshots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.snapshots.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::OrmError;
	use crate::metadata::{ColumnMetadata, ColumnType, MetadataRegistry};
	use crate::orm::{Entity, entity_ref};
	use crate::value;

	#[derive(Default)]
	struct Note {
		id: Option<u32>,
		body: String,
	}

	impl Entity for Note {
		fn entity_name(&self) -> &'static str {
			"Note"
		}

		fn get_property(&self, property: &str) -> Option<Value> {
			match property {
				"id" => Some(match self.id {
					Some(v) => Value::Unsigned(Some(v)),
					None => Value::Unsigned(None),
				}),
				"body" => Some(Value::from(self.body.clone())),
				_ => None,
			}
		}

		fn set_property(&mut self, property: &str, v: Value) -> Result<(), OrmError> {
			match property {
				"id" => {
					self.id = value::to_u64(&v).map(|v| v as u32);
					Ok(())
				}
				"body" => {
					self.body = value::to_string(&v).unwrap_or_default();
					Ok(())
				}
				_ => Err(OrmError::UnknownProperty {
					entity: "Note".into(),
					property: property.into(),
				}),
			}
		}

		fn as_any(&self) -> &dyn std::any::Any {
			self
		}

		fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
			self
		}
	}

	fn registry() -> MetadataRegistry {
		let registry = MetadataRegistry::new();
		registry
			.register(
				EntityMetadata::new("Note", "notes")
					.column(
						ColumnMetadata::new("id", "id", ColumnType::Int)
							.unsigned()
							.primary_key()
							.auto_increment(),
					)
					.column(ColumnMetadata::new("body", "body", ColumnType::Text)),
			)
			.unwrap();
		registry
	}

	#[test]
	fn test_capture_snapshots_current_scalars() {
		let registry = registry();
		let meta = registry.get("Note").unwrap();
		let resolve = |name: &str| registry.get(name).ok();
		let note = entity_ref(Note {
			id: Some(1),
			body: "hello".into(),
		});
		let mut snapshots = EntityRegistry::new();
		snapshots.capture(&note, &meta, &resolve);
		let snapshot = snapshots.get(instance_id(&note)).unwrap();
		assert_eq!(snapshot.scalars["body"], Value::from("hello"));
	}

	#[test]
	fn test_recapture_keeps_loaded_at_and_bumps_last_modified() {
		let registry = registry();
		let meta = registry.get("Note").unwrap();
		let resolve = |name: &str| registry.get(name).ok();
		let note = entity_ref(Note {
			id: Some(1),
			body: "hello".into(),
		});
		let mut snapshots = EntityRegistry::new();
		snapshots.capture(&note, &meta, &resolve);
		let loaded_at = snapshots.get(instance_id(&note)).unwrap().loaded_at;
		snapshots.capture(&note, &meta, &resolve);
		let snapshot = snapshots.get(instance_id(&note)).unwrap();
		assert_eq!(snapshot.loaded_at, loaded_at);
		assert!(snapshot.last_modified >= loaded_at);
	}

	#[test]
	fn test_forget_drops_the_snapshot() {
		let registry = registry();
		let meta = registry.get("Note").unwrap();
		let resolve = |name: &str| registry.get(name).ok();
		let note = entity_ref(Note::default());
		let mut snapshots = EntityRegistry::new();
		snapshots.capture(&note, &meta, &resolve);
		assert!(snapshots.contains(instance_id(&note)));
		snapshots.forget(instance_id(&note));
		assert!(!snapshots.contains(instance_id(&note)));
		assert!(snapshots.is_empty());
	}

	#[test]
	fn test_reference_key_prefers_persisted_identity() {
		let registry = registry();
		let meta = registry.get("Note").unwrap();
		let saved = entity_ref(Note {
			id: Some(7),
			body: String::new(),
		});
		assert_eq!(
			ReferenceKey::of(&saved, &meta),
			ReferenceKey::Persisted {
				entity: "Note".into(),
				key: "7".into(),
			}
		);
		let unsaved = entity_ref(Note::default());
		assert_eq!(
			ReferenceKey::of(&unsaved, &meta),
			ReferenceKey::Instance(instance_id(&unsaved))
		);
	}
}
