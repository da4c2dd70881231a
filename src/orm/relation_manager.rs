//! Cascade resolution and operation ordering over the relation graph.
//!
//! Inserts are ordered referent-first so FK values exist when the owning
//! row is written; deletes are ordered referrer-first so RESTRICT
//! constraints cannot fire. Ties break by scheduling sequence, keeping
//! the emitted SQL order independent of wiring order.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;

use crate::error::OrmError;
use crate::metadata::MetadataRegistry;
use crate::orm::{
	EntityRef, IdentityMap, LifecycleState, StateManager, instance_id,
};

/// Relation-graph services for the flush orchestrator; stateless.
pub struct RelationManager;

impl RelationManager {
	/// Cascade persist: every NEW instance reachable from scheduled or
	/// managed work through references and collections is scheduled for
	/// insertion too.
	pub fn cascade_insertions(
		state: &mut StateManager,
		identity: &IdentityMap,
		metadata: &MetadataRegistry,
	) -> Result<(), OrmError> {
		let mut work: Vec<EntityRef> = state.scheduled_insertions();
		work.extend(identity.all());
		while let Some(entity) = work.pop() {
			for target in related_instances(&entity, metadata)? {
				if state.state_of(&target) == LifecycleState::New {
					let name = target.borrow().entity_name().to_string();
					// Unregistered targets fail before any SQL is emitted.
					metadata.get(&name)?;
					state.persist(&target, &name)?;
					work.push(target);
				}
			}
		}
		Ok(())
	}

	/// Cascade remove: managed owners whose *-to-one relation carries
	/// ON DELETE CASCADE follow their scheduled target.
	pub fn cascade_deletions(
		state: &mut StateManager,
		identity: &IdentityMap,
		metadata: &MetadataRegistry,
	) -> Result<(), OrmError> {
		loop {
			let deletions = state.scheduled_deletions();
			let deleted_ids: Vec<usize> = deletions.iter().map(instance_id).collect();
			let mut newly_scheduled = false;
			for owner in identity.all() {
				if state.state_of(&owner) != LifecycleState::Managed {
					continue;
				}
				let owner_name = owner.borrow().entity_name().to_string();
				let meta = metadata.get(&owner_name)?;
				for relation in meta.owning_to_one_relations() {
					if relation.on_delete != crate::metadata::ReferenceOption::Cascade {
						continue;
					}
					let Some(Some(target)) = owner.borrow().get_reference(&relation.property)
					else {
						continue;
					};
					if deleted_ids.contains(&instance_id(&target)) {
						state.remove(&owner, &owner_name)?;
						newly_scheduled = true;
						break;
					}
				}
			}
			if !newly_scheduled {
				return Ok(());
			}
		}
	}

	/// Topological order for insertions: referenced targets first.
	pub fn order_insertions(
		insertions: Vec<EntityRef>,
		state: &StateManager,
		metadata: &MetadataRegistry,
	) -> Result<Vec<EntityRef>, OrmError> {
		let in_set: HashMap<usize, ()> =
			insertions.iter().map(|e| (instance_id(e), ())).collect();
		let mut edges = Vec::new();
		for entity in &insertions {
			let owner = instance_id(entity);
			for target in to_one_targets(entity, metadata)? {
				let target_id = instance_id(&target);
				if target_id != owner && in_set.contains_key(&target_id) {
					// The referent inserts before the owner.
					edges.push((target_id, owner));
				}
			}
		}
		stable_topological_order(insertions, &edges, state)
	}

	/// Topological order for deletions: referrers first.
	pub fn order_deletions(
		deletions: Vec<EntityRef>,
		state: &StateManager,
		metadata: &MetadataRegistry,
	) -> Result<Vec<EntityRef>, OrmError> {
		let in_set: HashMap<usize, ()> =
			deletions.iter().map(|e| (instance_id(e), ())).collect();
		let mut edges = Vec::new();
		for entity in &deletions {
			let owner = instance_id(entity);
			for target in to_one_targets(entity, metadata)? {
				let target_id = instance_id(&target);
				if target_id != owner && in_set.contains_key(&target_id) {
					// The referrer deletes before its referent.
					edges.push((owner, target_id));
				}
			}
		}
		stable_topological_order(deletions, &edges, state)
	}
}

/// Current *-to-one targets of an instance.
fn to_one_targets(
	entity: &EntityRef,
	metadata: &MetadataRegistry,
) -> Result<Vec<EntityRef>, OrmError> {
	let name = entity.borrow().entity_name().to_string();
	let meta = metadata.get(&name)?;
	let borrowed = entity.borrow();
	let mut targets = Vec::new();
	for relation in meta.relations.iter().filter(|r| r.kind.is_to_one()) {
		if let Some(Some(target)) = borrowed.get_reference(&relation.property) {
			targets.push(target);
		}
	}
	Ok(targets)
}

/// Current related instances (references and collection members).
fn related_instances(
	entity: &EntityRef,
	metadata: &MetadataRegistry,
) -> Result<Vec<EntityRef>, OrmError> {
	let name = entity.borrow().entity_name().to_string();
	let meta = metadata.get(&name)?;
	let borrowed = entity.borrow();
	let mut related = Vec::new();
	for relation in &meta.relations {
		if relation.kind.is_to_one() {
			if let Some(Some(target)) = borrowed.get_reference(&relation.property) {
				related.push(target);
			}
		} else if let Some(members) = borrowed.get_collection(&relation.property) {
			related.extend(members);
		}
	}
	Ok(related)
}

/// Kahn's algorithm with a deterministic tie-break: among ready nodes the
/// lowest scheduling sequence goes first. Unresolvable remainders are a
/// cycle.
fn stable_topological_order(
	items: Vec<EntityRef>,
	edges: &[(usize, usize)],
	state: &StateManager,
) -> Result<Vec<EntityRef>, OrmError> {
	let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
	let mut by_id: HashMap<usize, EntityRef> = HashMap::new();
	for entity in items {
		let id = instance_id(&entity);
		graph.add_node(id);
		by_id.insert(id, entity);
	}
	for (before, after) in edges {
		graph.add_edge(*before, *after, ());
	}

	let mut ordered = Vec::with_capacity(by_id.len());
	while graph.node_count() > 0 {
		let mut ready: Vec<usize> = graph
			.nodes()
			.filter(|n| {
				graph
					.neighbors_directed(*n, Direction::Incoming)
					.next()
					.is_none()
			})
			.collect();
		if ready.is_empty() {
			let names: Vec<String> = graph
				.nodes()
				.filter_map(|n| by_id.get(&n))
				.map(|e| e.borrow().entity_name().to_string())
				.collect();
			return Err(OrmError::CyclicDependency(names.join(" -> ")));
		}
		ready.sort_by_key(|n| {
			by_id
				.get(n)
				.map(|e| state.sequence_of(e))
				.unwrap_or(u64::MAX)
		});
		let next = ready[0];
		graph.remove_node(next);
		if let Some(entity) = by_id.remove(&next) {
			ordered.push(entity);
		}
	}
	Ok(ordered)
}
