//! The flush orchestrator: drains scheduled work to a fixed point in
//! dependency order, inside one transaction.

use tracing::debug;

use crate::error::{FlushOperation, OrmError};
use crate::metadata::RelationKind;
use crate::orm::processors::{DeletionProcessor, InsertionProcessor, UpdateProcessor};
use crate::orm::{
	ChangeSet, ChangeSetManager, EntityRef, LifecycleEvent, LifecycleState, PersistenceContext,
	RelationManager, instance_id, primary_key_key, set_primary_key_value,
};

pub(crate) struct FlushOrchestrator;

impl FlushOrchestrator {
	/// Run one flush: drain loop, commit at depth zero, rollback and undo
	/// on any error. Re-entrant calls (a handler flushing during its own
	/// event) share the transaction of the outermost call.
	pub fn flush(ctx: &PersistenceContext) -> Result<(), OrmError> {
		let depth = ctx.flush_depth.get() + 1;
		ctx.flush_depth.set(depth);
		if depth == 1 {
			ctx.events.borrow_mut().reset_processed();
			*ctx.flush_log.borrow_mut() = Default::default();
		}

		let opened_transaction = if ctx.db().in_transaction() {
			false
		} else {
			if let Err(e) = ctx.db().begin_transaction() {
				ctx.flush_depth.set(depth - 1);
				return Err(e.into());
			}
			true
		};

		let result = Self::drain(ctx, depth);
		let result = match result {
			Ok(()) => {
				if opened_transaction {
					ctx.db().commit().map_err(OrmError::from)
				} else {
					Ok(())
				}
			}
			Err(err) => {
				if opened_transaction {
					// Best effort: the original error wins.
					let _ = ctx.db().rollback();
					Self::undo(ctx);
				}
				Err(err)
			}
		};

		ctx.flush_depth.set(depth - 1);
		if result.is_ok() && depth == 1 {
			Self::finalize(ctx);
		}
		result
	}

	/// Dispatch one lifecycle event, deduplicated per (instance, event,
	/// depth). Handler errors cancel the flush.
	pub fn dispatch(
		ctx: &PersistenceContext,
		event: LifecycleEvent,
		entity: &EntityRef,
	) -> Result<(), OrmError> {
		let depth = ctx.flush_depth.get();
		let handlers = {
			let mut events = ctx.events.borrow_mut();
			if !events.mark_processed(entity, event, depth) {
				return Ok(());
			}
			events.handlers_for(event)
		};
		for handler in handlers {
			handler(ctx, entity)?;
		}
		Ok(())
	}

	/// Drain scheduled work until no iteration produces anything: post
	/// events may schedule further persists/removes and the loop picks
	/// them up before commit.
	fn drain(ctx: &PersistenceContext, depth: u32) -> Result<(), OrmError> {
		let mut insertions = InsertionProcessor::new(ctx.db().clone());
		let mut updates = UpdateProcessor::new(ctx.db().clone());
		let mut deletions = DeletionProcessor::new(ctx.db().clone());

		loop {
			{
				let mut state = ctx.state.borrow_mut();
				let identity = ctx.identity.borrow();
				RelationManager::cascade_insertions(&mut state, &identity, ctx.metadata())?;
				RelationManager::cascade_deletions(&mut state, &identity, ctx.metadata())?;
			}
			let snapshot = ChangeSetManager::snapshot(
				&mut ctx.state.borrow_mut(),
				&ctx.identity.borrow(),
				&ctx.registry.borrow(),
				ctx.metadata(),
			)?;
			if snapshot.is_empty() {
				break;
			}
			debug!(
				depth,
				inserts = snapshot.insertions.len(),
				updates = snapshot.updates.len(),
				deletes = snapshot.deletions.len(),
				"flush iteration"
			);
			updates.begin_iteration();

			let ordered = RelationManager::order_insertions(
				snapshot.insertions,
				&ctx.state.borrow(),
				ctx.metadata(),
			)?;
			for entity in ordered {
				let meta = ctx.metadata().get(&entity.borrow().entity_name().to_string())?;
				Self::dispatch(ctx, LifecycleEvent::PrePersist, &entity)?;
				let inserted = insertions
					.process(&entity, &meta, ctx.metadata())
					.map_err(|e| tag(e, &meta.entity, FlushOperation::Insert))?;
				if inserted {
					if let Some(key) = primary_key_key(&*entity.borrow(), &meta)? {
						ctx.identity
							.borrow_mut()
							.add(&meta.entity, &key, entity.clone());
					}
					let resolve = |name: &str| ctx.metadata().get(name).ok();
					ctx.registry.borrow_mut().capture_without_collections(
						&entity,
						&meta,
						&resolve,
					);
					let pk_generated = meta.primary_key_column()?.auto_increment;
					ctx.flush_log.borrow_mut().inserted.push((
						entity.clone(),
						meta.entity.clone(),
						pk_generated,
					));
				}
				Self::dispatch(ctx, LifecycleEvent::PostPersist, &entity)?;
			}

			for (entity, changes) in snapshot.updates {
				let meta = ctx.metadata().get(&entity.borrow().entity_name().to_string())?;
				let row_update = changes.requires_update();
				if row_update {
					Self::dispatch(ctx, LifecycleEvent::PreUpdate, &entity)?;
					updates
						.process(&entity, &meta, &changes, ctx.metadata())
						.map_err(|e| tag(e, &meta.entity, FlushOperation::Update))?;
				}
				Self::apply_collections(
					ctx,
					&entity,
					&meta,
					&changes,
					&mut insertions,
					&mut deletions,
				)?;
				ctx.capture(&entity, &meta);
				if row_update {
					Self::dispatch(ctx, LifecycleEvent::PostUpdate, &entity)?;
				}
			}

			let ordered = RelationManager::order_deletions(
				snapshot.deletions,
				&ctx.state.borrow(),
				ctx.metadata(),
			)?;
			for entity in ordered {
				let meta = ctx.metadata().get(&entity.borrow().entity_name().to_string())?;
				let key = primary_key_key(&*entity.borrow(), &meta)?;
				Self::dispatch(ctx, LifecycleEvent::PreRemove, &entity)?;
				deletions
					.process(&entity, &meta, &mut ctx.identity.borrow_mut())
					.map_err(|e| tag(e, &meta.entity, FlushOperation::Delete))?;
				ctx.registry.borrow_mut().forget(instance_id(&entity));
				if let Some(key) = key {
					ctx.flush_log.borrow_mut().deleted.push((
						entity.clone(),
						meta.entity.clone(),
						key,
					));
				}
				Self::dispatch(ctx, LifecycleEvent::PostRemove, &entity)?;
			}
		}
		Ok(())
	}

	/// Apply collection deltas as join-row work (owning many-to-many
	/// side only; one-to-many members carry their own FK).
	fn apply_collections(
		ctx: &PersistenceContext,
		entity: &EntityRef,
		meta: &crate::metadata::EntityMetadata,
		changes: &ChangeSet,
		insertions: &mut InsertionProcessor,
		deletions: &mut DeletionProcessor,
	) -> Result<(), OrmError> {
		for delta in changes.collections.values() {
			let Some(relation) = meta.relation_for_property(&delta.property) else {
				continue;
			};
			if relation.kind != RelationKind::ManyToMany || !relation.owning {
				continue;
			}
			for member in &delta.added {
				insertions
					.insert_join_row(entity, meta, relation, member, ctx.metadata())
					.map_err(|e| tag(e, &meta.entity, FlushOperation::Insert))?;
			}
			for removed in &delta.removed {
				deletions
					.delete_join_row(entity, meta, relation, removed)
					.map_err(|e| tag(e, &meta.entity, FlushOperation::Delete))?;
			}
		}
		Ok(())
	}

	/// Roll the in-memory bookkeeping back after a failed flush: fresh
	/// inserts lose their generated id and identity entry; deleted rows
	/// re-enter the identity map and deletion queue. Pre-existing state is
	/// left intact.
	fn undo(ctx: &PersistenceContext) {
		let log = std::mem::take(&mut *ctx.flush_log.borrow_mut());
		for (entity, name, generated) in log.inserted.into_iter().rev() {
			let Ok(meta) = ctx.metadata().get(&name) else {
				continue;
			};
			if let Ok(Some(key)) = primary_key_key(&*entity.borrow(), &meta) {
				ctx.identity.borrow_mut().remove(&name, &key);
			}
			if generated
				&& let Ok(pk) = meta.primary_key_column()
			{
				let _ = set_primary_key_value(
					&mut *entity.borrow_mut(),
					&meta,
					pk.column_type.null_value(),
				);
			}
			ctx.registry.borrow_mut().forget(instance_id(&entity));
			let mut ids = std::collections::HashSet::new();
			ids.insert(instance_id(&entity));
			ctx.state.borrow_mut().forget(&ids);
		}
		for (entity, name, key) in log.deleted {
			ctx.identity.borrow_mut().add(&name, &key, entity.clone());
			// Re-queue so a retried flush repeats the delete.
			ctx.state
				.borrow_mut()
				.set_lifecycle(&entity, LifecycleState::Managed);
			let _ = ctx.state.borrow_mut().remove(&entity, &name);
		}
	}

	/// Successful top-level flush: deleted instances become detached.
	fn finalize(ctx: &PersistenceContext) {
		let log = std::mem::take(&mut *ctx.flush_log.borrow_mut());
		for (entity, _, _) in log.deleted {
			ctx.state
				.borrow_mut()
				.set_lifecycle(&entity, LifecycleState::Detached);
		}
	}
}

fn tag(source: OrmError, entity: &str, operation: FlushOperation) -> OrmError {
	OrmError::Flush {
		entity: entity.to_string(),
		operation,
		source: Box::new(source),
	}
}
