//! Per-flush change-set composition.
//!
//! Snapshots one drain iteration's work: the drained insertion/deletion
//! queues plus the implicit updates (managed instances whose detected
//! change set is non-empty).

use crate::error::OrmError;
use crate::metadata::MetadataRegistry;
use crate::orm::{
	ChangeDetector, ChangeSet, EntityRef, EntityRegistry, IdentityMap, LifecycleState,
	StateManager, instance_id,
};

/// One drain iteration's worth of scheduled work.
#[derive(Default)]
pub struct ChangeSetSnapshot {
	pub insertions: Vec<EntityRef>,
	pub updates: Vec<(EntityRef, ChangeSet)>,
	pub deletions: Vec<EntityRef>,
}

impl ChangeSetSnapshot {
	pub fn is_empty(&self) -> bool {
		self.insertions.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
	}
}

/// Composes the detector, identity map, and entity registry into the
/// snapshot the flush orchestrator consumes.
pub struct ChangeSetManager;

impl ChangeSetManager {
	pub fn snapshot(
		state: &mut StateManager,
		identity: &IdentityMap,
		registry: &EntityRegistry,
		metadata: &MetadataRegistry,
	) -> Result<ChangeSetSnapshot, OrmError> {
		let (insertions, deletions) = state.drain_scheduled();
		let deleted_ids: Vec<usize> = deletions.iter().map(instance_id).collect();
		let resolve = |name: &str| metadata.get(name).ok();

		let mut updates = Vec::new();
		for entity in identity.all() {
			if state.state_of(&entity) != LifecycleState::Managed {
				continue;
			}
			let id = instance_id(&entity);
			if deleted_ids.contains(&id) {
				continue;
			}
			let entity_name = entity.borrow().entity_name().to_string();
			let meta = metadata.get(&entity_name)?;
			let changes =
				ChangeDetector::detect(&entity, &meta, registry.get(id), &resolve);
			if !changes.is_empty() {
				updates.push((entity, changes));
			}
		}

		Ok(ChangeSetSnapshot {
			insertions,
			updates,
			deletions,
		})
	}
}
