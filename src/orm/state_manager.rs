//! Entity lifecycle state machine and scheduled work queues.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::OrmError;
use crate::orm::{EntityRef, LifecycleState, instance_id};

/// Lifecycle bookkeeping of one instance.
#[derive(Debug, Clone, Copy)]
pub struct EntityState {
	pub lifecycle: LifecycleState,
	/// Monotonic sequence used as the stable ordering tie-break.
	pub sequence: u64,
}

/// Tracks lifecycle states and the insertion/deletion queues of one
/// persistence context. Updates are implicit: any managed instance with a
/// non-empty change set at flush time.
#[derive(Default)]
pub struct StateManager {
	states: HashMap<usize, EntityState>,
	insertions: IndexMap<usize, EntityRef>,
	deletions: IndexMap<usize, EntityRef>,
	sequence: u64,
}

impl StateManager {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state_of(&self, entity: &EntityRef) -> LifecycleState {
		self.states
			.get(&instance_id(entity))
			.map(|s| s.lifecycle)
			.unwrap_or(LifecycleState::New)
	}

	pub fn sequence_of(&self, entity: &EntityRef) -> u64 {
		self.states
			.get(&instance_id(entity))
			.map(|s| s.sequence)
			.unwrap_or(u64::MAX)
	}

	fn next_sequence(&mut self) -> u64 {
		self.sequence += 1;
		self.sequence
	}

	fn set_state(&mut self, id: usize, lifecycle: LifecycleState) {
		let sequence = self
			.states
			.get(&id)
			.map(|s| s.sequence)
			.unwrap_or_else(|| {
				self.sequence += 1;
				self.sequence
			});
		self.states.insert(id, EntityState { lifecycle, sequence });
	}

	/// Schedule an instance for insertion (NEW), restore a removed one,
	/// or no-op on an already managed one.
	pub fn persist(&mut self, entity: &EntityRef, entity_name: &str) -> Result<(), OrmError> {
		let id = instance_id(entity);
		match self.state_of(entity) {
			LifecycleState::New => {
				let sequence = self.next_sequence();
				self.states.insert(
					id,
					EntityState {
						lifecycle: LifecycleState::Managed,
						sequence,
					},
				);
				self.insertions.insert(id, entity.clone());
				Ok(())
			}
			LifecycleState::Removed => {
				self.deletions.shift_remove(&id);
				self.set_state(id, LifecycleState::Managed);
				Ok(())
			}
			LifecycleState::Managed => Ok(()),
			LifecycleState::Detached => Err(OrmError::DetachedEntity {
				entity: entity_name.to_string(),
			}),
		}
	}

	/// Schedule a managed instance for deletion, forget a scheduled-new
	/// one, or no-op on an already removed one.
	pub fn remove(&mut self, entity: &EntityRef, entity_name: &str) -> Result<(), OrmError> {
		let id = instance_id(entity);
		match self.state_of(entity) {
			LifecycleState::New => {
				// Covers both plain NEW (nothing to do) and scheduled NEW.
				self.insertions.shift_remove(&id);
				self.states.remove(&id);
				Ok(())
			}
			LifecycleState::Managed => {
				if self.insertions.shift_remove(&id).is_some() {
					// persist() then remove() before any flush: forget.
					self.states.remove(&id);
					return Ok(());
				}
				let sequence = self.next_sequence();
				self.states.insert(
					id,
					EntityState {
						lifecycle: LifecycleState::Removed,
						sequence,
					},
				);
				self.deletions.insert(id, entity.clone());
				Ok(())
			}
			LifecycleState::Removed => Ok(()),
			LifecycleState::Detached => Err(OrmError::DetachedEntity {
				entity: entity_name.to_string(),
			}),
		}
	}

	/// Detach: drop from every queue, mark detached.
	pub fn detach(&mut self, entity: &EntityRef) {
		let id = instance_id(entity);
		self.insertions.shift_remove(&id);
		self.deletions.shift_remove(&id);
		self.set_state(id, LifecycleState::Detached);
	}

	/// Mark an instance managed without scheduling (hydration path).
	pub fn mark_managed(&mut self, entity: &EntityRef) {
		let id = instance_id(entity);
		self.set_state(id, LifecycleState::Managed);
	}

	pub fn is_scheduled_for_insertion(&self, entity: &EntityRef) -> bool {
		self.insertions.contains_key(&instance_id(entity))
	}

	pub fn is_scheduled_for_deletion(&self, entity: &EntityRef) -> bool {
		self.deletions.contains_key(&instance_id(entity))
	}

	/// Scheduled insertions in persist order, without draining.
	pub fn scheduled_insertions(&self) -> Vec<EntityRef> {
		self.insertions.values().cloned().collect()
	}

	/// Scheduled deletions in remove order, without draining.
	pub fn scheduled_deletions(&self) -> Vec<EntityRef> {
		self.deletions.values().cloned().collect()
	}

	/// Drain both queues for one flush iteration.
	pub fn drain_scheduled(&mut self) -> (Vec<EntityRef>, Vec<EntityRef>) {
		let insertions = self.insertions.drain(..).map(|(_, e)| e).collect();
		let deletions = self.deletions.drain(..).map(|(_, e)| e).collect();
		(insertions, deletions)
	}

	pub fn has_scheduled_work(&self) -> bool {
		!self.insertions.is_empty() || !self.deletions.is_empty()
	}

	/// Detach every tracked instance and empty both queues.
	pub fn clear(&mut self) {
		self.insertions.clear();
		self.deletions.clear();
		for state in self.states.values_mut() {
			state.lifecycle = LifecycleState::Detached;
		}
	}

	/// Drop state tracking of instances entirely (rollback of failed
	/// inserts).
	pub fn forget(&mut self, ids: &HashSet<usize>) {
		for id in ids {
			self.states.remove(id);
			self.insertions.shift_remove(id);
			self.deletions.shift_remove(id);
		}
	}

	pub fn set_lifecycle(&mut self, entity: &EntityRef, lifecycle: LifecycleState) {
		self.set_state(instance_id(entity), lifecycle);
	}
}
