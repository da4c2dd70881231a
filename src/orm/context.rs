//! The persistence context: public entry point of the unit of work.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use sea_query::{Alias, Expr, MysqlQueryBuilder, Query};

use crate::backends::{DatabaseInterface, Row};
use crate::error::OrmError;
use crate::metadata::{EntityMetadata, MetadataRegistry};
use crate::orm::flush::FlushOrchestrator;
use crate::orm::{
	EntityRef, EntityRegistry, EventDispatcher, EventHandler, IdentityMap, LifecycleEvent,
	LifecycleState, Repository, StateManager, hydrate, instance_id, primary_key_key,
};
use crate::value::{self, Value};

/// Undo bookkeeping for one top-level flush.
#[derive(Default)]
pub(crate) struct FlushLog {
	/// Inserted this flush: instance, entity name, whether the id was
	/// generated by the database.
	pub inserted: Vec<(EntityRef, String, bool)>,
	/// Deleted this flush: instance, entity name, identity key.
	pub deleted: Vec<(EntityRef, String, String)>,
}

/// An isolated unit of work: identity map, entity registry, state
/// manager, and event dispatcher over one database connection.
///
/// Single-threaded by contract; create one context per logical task.
pub struct PersistenceContext {
	metadata: Arc<MetadataRegistry>,
	db: Rc<dyn DatabaseInterface>,
	pub(crate) identity: RefCell<IdentityMap>,
	pub(crate) registry: RefCell<EntityRegistry>,
	pub(crate) state: RefCell<StateManager>,
	pub(crate) events: RefCell<EventDispatcher>,
	pub(crate) flush_depth: Cell<u32>,
	pub(crate) flush_log: RefCell<FlushLog>,
}

impl PersistenceContext {
	pub fn new(metadata: Arc<MetadataRegistry>, db: Rc<dyn DatabaseInterface>) -> Self {
		Self {
			metadata,
			db,
			identity: RefCell::new(IdentityMap::new()),
			registry: RefCell::new(EntityRegistry::new()),
			state: RefCell::new(StateManager::new()),
			events: RefCell::new(EventDispatcher::new()),
			flush_depth: Cell::new(0),
			flush_log: RefCell::new(FlushLog::default()),
		}
	}

	pub fn metadata(&self) -> &MetadataRegistry {
		&self.metadata
	}

	pub(crate) fn db(&self) -> &Rc<dyn DatabaseInterface> {
		&self.db
	}

	fn metadata_of(&self, entity: &EntityRef) -> Result<Arc<EntityMetadata>, OrmError> {
		let name = entity.borrow().entity_name().to_string();
		self.metadata.get(&name)
	}

	/// Schedule an instance for insertion (or restore a removed one).
	///
	/// A new instance carrying an assigned id is managed immediately: it
	/// enters the identity map and its snapshot is captured at persist
	/// time.
	pub fn persist(&self, entity: &EntityRef) -> Result<(), OrmError> {
		let meta = self.metadata_of(entity)?;
		self.state.borrow_mut().persist(entity, &meta.entity)?;
		if let Some(key) = primary_key_key(&*entity.borrow(), &meta)? {
			self.identity
				.borrow_mut()
				.add(&meta.entity, &key, entity.clone());
			self.capture(entity, &meta);
		}
		Ok(())
	}

	/// Schedule a managed instance for deletion.
	pub fn remove(&self, entity: &EntityRef) -> Result<(), OrmError> {
		let meta = self.metadata_of(entity)?;
		self.state.borrow_mut().remove(entity, &meta.entity)
	}

	/// Release the context's hold on an instance, leaving it usable as a
	/// detached value.
	pub fn detach(&self, entity: &EntityRef) -> Result<(), OrmError> {
		let meta = self.metadata_of(entity)?;
		self.state.borrow_mut().detach(entity);
		self.registry.borrow_mut().forget(instance_id(entity));
		if let Some(key) = primary_key_key(&*entity.borrow(), &meta)? {
			self.identity.borrow_mut().remove(&meta.entity, &key);
		}
		Ok(())
	}

	/// Detach everything.
	pub fn clear(&self) {
		self.identity.borrow_mut().clear();
		self.registry.borrow_mut().clear();
		self.state.borrow_mut().clear();
	}

	/// Whether the instance is tracked by this context (managed or
	/// scheduled for removal).
	pub fn contains(&self, entity: &EntityRef) -> bool {
		matches!(
			self.state.borrow().state_of(entity),
			LifecycleState::Managed | LifecycleState::Removed
		)
	}

	/// Translate all scheduled intents and detected changes into ordered
	/// SQL within a transaction.
	pub fn flush(&self) -> Result<(), OrmError> {
		FlushOrchestrator::flush(self)
	}

	/// Load one instance by primary key, going through the identity map
	/// first.
	pub fn find(&self, entity: &str, id: impl Into<Value>) -> Result<Option<EntityRef>, OrmError> {
		let meta = self.metadata.get(entity)?;
		let id = id.into();
		let Some(key) = value::key_string(&id) else {
			return Ok(None);
		};
		if let Some(existing) = self.identity.borrow().get(entity, &key) {
			return Ok(Some(existing));
		}
		let pk = meta.primary_key_column()?;
		let mut statement = Query::select();
		statement.from(Alias::new(meta.table.as_str()));
		for column in &meta.columns {
			statement.column(Alias::new(column.column.as_str()));
		}
		statement.and_where(Expr::col(Alias::new(pk.column.as_str())).eq(id));
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		let rows = self.db.query(&sql, &params)?;
		match rows.first() {
			Some(row) => Ok(Some(self.manage_row(&meta, row)?)),
			None => Ok(None),
		}
	}

	/// Re-read an instance's row and reset its original snapshot.
	pub fn refresh(&self, entity: &EntityRef) -> Result<(), OrmError> {
		let meta = self.metadata_of(entity)?;
		let pk = meta.primary_key_column()?;
		let pk_value = crate::orm::primary_key_value(&*entity.borrow(), &meta)?.ok_or_else(
			|| OrmError::CannotUpdate {
				entity: meta.entity.clone(),
			},
		)?;
		let mut statement = Query::select();
		statement.from(Alias::new(meta.table.as_str()));
		for column in &meta.columns {
			statement.column(Alias::new(column.column.as_str()));
		}
		statement.and_where(Expr::col(Alias::new(pk.column.as_str())).eq(pk_value));
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		let rows = self.db.query(&sql, &params)?;
		let row = rows.first().ok_or_else(|| {
			OrmError::Hydration(crate::error::HydrationError::InvalidEntity {
				entity: meta.entity.clone(),
				reason: "row no longer exists".into(),
			})
		})?;
		{
			let mut borrowed = entity.borrow_mut();
			for column in &meta.columns {
				if let Some(value) = row.get(&column.column) {
					borrowed.set_property(&column.property, value.clone())?;
				}
			}
		}
		self.capture(entity, &meta);
		Ok(())
	}

	/// A repository value over this context and one entity's metadata.
	pub fn get_repository(&self, entity: &str) -> Result<Repository<'_>, OrmError> {
		let meta = self.metadata.get(entity)?;
		Ok(Repository::new(self, meta))
	}

	/// Subscribe a lifecycle event handler.
	pub fn on<F>(&self, event: LifecycleEvent, handler: F)
	where
		F: Fn(&PersistenceContext, &EntityRef) -> Result<(), OrmError> + 'static,
	{
		self.events
			.borrow_mut()
			.on(event, Rc::new(handler) as EventHandler);
	}

	// Internals shared with the orchestrator and repositories.

	/// Capture (or refresh) the original snapshot of an instance.
	pub(crate) fn capture(&self, entity: &EntityRef, metadata: &EntityMetadata) {
		let resolve = |name: &str| self.metadata.get(name).ok();
		self.registry
			.borrow_mut()
			.capture(entity, metadata, &resolve);
	}

	/// Attach a result row: identity-map hit wins, otherwise hydrate,
	/// manage, snapshot, and dispatch postLoad.
	pub(crate) fn manage_row(
		&self,
		metadata: &Arc<EntityMetadata>,
		row: &Row,
	) -> Result<EntityRef, OrmError> {
		let pk = metadata.primary_key_column()?;
		if let Some(value) = row.get(&pk.column)
			&& let Some(key) = value::key_string(value)
			&& let Some(existing) = self.identity.borrow().get(&metadata.entity, &key)
		{
			return Ok(existing);
		}
		let instance = hydrate(metadata, row)?;
		if let Some(key) = primary_key_key(&*instance.borrow(), metadata)? {
			self.identity
				.borrow_mut()
				.add(&metadata.entity, &key, instance.clone());
		}
		self.state.borrow_mut().mark_managed(&instance);
		self.capture(&instance, metadata);
		FlushOrchestrator::dispatch(self, LifecycleEvent::PostLoad, &instance)?;
		Ok(instance)
	}
}
