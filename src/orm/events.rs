//! Lifecycle event dispatch.
//!
//! Handlers run synchronously during flush (or after load for
//! `postLoad`). Post-event handlers may persist/remove further entities;
//! the orchestrator drains that work before committing. Dispatches are
//! deduplicated per (instance, event, flush depth) and the processed set
//! resets at the start of every top-level flush.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::OrmError;
use crate::orm::{EntityRef, PersistenceContext, instance_id};

/// The lifecycle events the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
	PrePersist,
	PostPersist,
	PreUpdate,
	PostUpdate,
	PreRemove,
	PostRemove,
	PostLoad,
}

impl LifecycleEvent {
	pub fn name(&self) -> &'static str {
		match self {
			LifecycleEvent::PrePersist => "prePersist",
			LifecycleEvent::PostPersist => "postPersist",
			LifecycleEvent::PreUpdate => "preUpdate",
			LifecycleEvent::PostUpdate => "postUpdate",
			LifecycleEvent::PreRemove => "preRemove",
			LifecycleEvent::PostRemove => "postRemove",
			LifecycleEvent::PostLoad => "postLoad",
		}
	}
}

impl std::fmt::Display for LifecycleEvent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// A subscribed handler. Errors are not swallowed: they cancel the
/// enclosing flush.
pub type EventHandler = Rc<dyn Fn(&PersistenceContext, &EntityRef) -> Result<(), OrmError>>;

/// Handler registry plus per-flush dispatch deduplication.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: IndexMap<LifecycleEvent, Vec<EventHandler>>,
	processed: HashSet<(usize, LifecycleEvent, u32)>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on(&mut self, event: LifecycleEvent, handler: EventHandler) {
		self.handlers.entry(event).or_default().push(handler);
	}

	/// Clear the per-flush deduplication set.
	pub fn reset_processed(&mut self) {
		self.processed.clear();
	}

	/// Whether this (entity, event, depth) was already dispatched, marking
	/// it processed if not.
	pub fn mark_processed(&mut self, entity: &EntityRef, event: LifecycleEvent, depth: u32) -> bool {
		self.processed.insert((instance_id(entity), event, depth))
	}

	/// Snapshot the handlers for one event; dispatch happens outside the
	/// dispatcher borrow so handlers can reach back into the context.
	pub fn handlers_for(&self, event: LifecycleEvent) -> Vec<EventHandler> {
		self.handlers.get(&event).cloned().unwrap_or_default()
	}

	pub fn has_handlers(&self, event: LifecycleEvent) -> bool {
		self.handlers.get(&event).is_some_and(|h| !h.is_empty())
	}
}
