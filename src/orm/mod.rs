//! The unit-of-work persistence engine.
//!
//! A [`PersistenceContext`] owns an identity map, an entity registry of
//! original snapshots, and a state manager of scheduled work. User code
//! mutates entities freely between `flush()` calls; the flush orchestrator
//! turns the accumulated intents and detected changes into ordered SQL
//! inside one transaction.
//!
//! Contexts are single-threaded by contract: entities are
//! `Rc<RefCell<dyn Entity>>` values logically co-owned by the context (via
//! the identity map) and by user code; the context's reference is released
//! on detach/clear.

mod change_detector;
mod change_set;
mod context;
mod entity_registry;
mod events;
mod flush;
mod hydration;
mod identity_map;
pub mod processors;
mod relation_manager;
mod repository;
mod state_manager;

pub use change_detector::{ChangeDetector, ChangeSet, CollectionDelta, PropertyChange, ReferenceChange};
pub use change_set::{ChangeSetManager, ChangeSetSnapshot};
pub use context::PersistenceContext;
pub use entity_registry::{EntityRegistry, OriginalSnapshot, ReferenceKey};
pub use events::{EventDispatcher, EventHandler, LifecycleEvent};
pub use hydration::hydrate;
pub use identity_map::IdentityMap;
pub use relation_manager::RelationManager;
pub use repository::Repository;
pub use state_manager::{EntityState, StateManager};

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::OrmError;
use crate::metadata::EntityMetadata;
use crate::value::{self, Value};

/// Resolver from entity name to metadata, threaded into snapshot capture
/// and change detection so relation targets can be identified.
pub type KeyedMetadataResolver<'a> = &'a dyn Fn(&str) -> Option<Arc<EntityMetadata>>;

/// Lifecycle of an instance with respect to one persistence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
	/// Never persisted and not scheduled.
	#[default]
	New,
	/// Tracked by the context; changes are flushed.
	Managed,
	/// No longer tracked; usable as a plain value.
	Detached,
	/// Scheduled for deletion; terminal for the flush.
	Removed,
}

/// A context-managed entity instance.
pub type EntityRef = Rc<RefCell<dyn Entity>>;

/// The capability set entities expose to the engine.
///
/// Scalar attributes are read and written as [`Value`]s; *-to-one
/// relations as [`EntityRef`]s; to-many relations as collections. The
/// hand-written implementations play the role of generated adapters, so
/// the engine never needs reflection.
pub trait Entity: Any {
	/// The registered entity name (the metadata key).
	fn entity_name(&self) -> &'static str;

	/// Read a scalar property. `None` means the property does not exist.
	fn get_property(&self, property: &str) -> Option<Value>;

	/// Write a scalar property.
	fn set_property(&mut self, property: &str, value: Value) -> Result<(), OrmError>;

	/// Read a *-to-one relation. `None` means no such relation property;
	/// `Some(None)` means the reference is unset.
	fn get_reference(&self, _property: &str) -> Option<Option<EntityRef>> {
		None
	}

	/// Write a *-to-one relation.
	fn set_reference(
		&mut self,
		property: &str,
		_target: Option<EntityRef>,
	) -> Result<(), OrmError> {
		Err(OrmError::UnknownProperty {
			entity: self.entity_name().to_string(),
			property: property.to_string(),
		})
	}

	/// Read a to-many relation's current membership.
	fn get_collection(&self, _property: &str) -> Option<Vec<EntityRef>> {
		None
	}

	fn as_any(&self) -> &dyn Any;

	fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Wrap an entity value into a context-managed reference.
pub fn entity_ref<T: Entity>(entity: T) -> EntityRef {
	Rc::new(RefCell::new(entity))
}

/// Stable identity of an instance for the lifetime of its `Rc`.
pub fn instance_id(entity: &EntityRef) -> usize {
	Rc::as_ptr(entity).cast::<u8>() as usize
}

/// Read the primary-key value of an instance; `Ok(None)` when unassigned.
pub fn primary_key_value(
	entity: &dyn Entity,
	metadata: &EntityMetadata,
) -> Result<Option<Value>, OrmError> {
	let pk = metadata.primary_key_column()?;
	match entity.get_property(&pk.property) {
		Some(v) if value::is_null(&v) => Ok(None),
		Some(v) => Ok(Some(v)),
		None => Err(OrmError::NoPrimaryKeyAccessor {
			entity: metadata.entity.clone(),
		}),
	}
}

/// Write the primary-key value of an instance.
pub fn set_primary_key_value(
	entity: &mut dyn Entity,
	metadata: &EntityMetadata,
	value: Value,
) -> Result<(), OrmError> {
	let pk = metadata.primary_key_column()?;
	entity
		.set_property(&pk.property, value)
		.map_err(|_| OrmError::NoPrimaryKeyMutator {
			entity: metadata.entity.clone(),
		})
}

/// Canonical identity-map key of an instance, if its primary key is set.
pub fn primary_key_key(
	entity: &dyn Entity,
	metadata: &EntityMetadata,
) -> Result<Option<String>, OrmError> {
	Ok(primary_key_value(entity, metadata)?
		.as_ref()
		.and_then(value::key_string))
}
