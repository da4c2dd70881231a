//! One in-memory instance per `(entity, primary key)`.

use indexmap::IndexMap;

use crate::orm::EntityRef;

/// The identity map of one persistence context.
///
/// Within the map's lifetime, two lookups of the same `(entity, id)` yield
/// the same `Rc`; removing an entry leaves the instance usable as a
/// detached value.
#[derive(Default)]
pub struct IdentityMap {
	entries: IndexMap<(String, String), EntityRef>,
}

impl IdentityMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, entity: impl Into<String>, key: impl Into<String>, instance: EntityRef) {
		self.entries.insert((entity.into(), key.into()), instance);
	}

	pub fn get(&self, entity: &str, key: &str) -> Option<EntityRef> {
		self.entries
			.get(&(entity.to_string(), key.to_string()))
			.cloned()
	}

	pub fn contains(&self, entity: &str, key: &str) -> bool {
		self.entries
			.contains_key(&(entity.to_string(), key.to_string()))
	}

	pub fn remove(&mut self, entity: &str, key: &str) -> Option<EntityRef> {
		self.entries
			.shift_remove(&(entity.to_string(), key.to_string()))
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// All managed instances of one entity, in insertion order.
	pub fn all_of(&self, entity: &str) -> Vec<EntityRef> {
		self.entries
			.iter()
			.filter(|((name, _), _)| name == entity)
			.map(|(_, instance)| instance.clone())
			.collect()
	}

	/// All managed instances, in insertion order.
	pub fn all(&self) -> Vec<EntityRef> {
		self.entries.values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
