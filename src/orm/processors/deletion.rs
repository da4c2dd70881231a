//! DELETE processing for scheduled removals.

use std::collections::HashSet;
use std::rc::Rc;

use sea_query::{Alias, Expr, Query};

use crate::backends::DatabaseInterface;
use crate::error::OrmError;
use crate::metadata::{EntityMetadata, RelationMetadata};
use crate::orm::{EntityRef, IdentityMap, ReferenceKey, instance_id, primary_key_value};
use crate::value;

/// Builds and executes DELETEs; owning join rows go first, and the
/// instance leaves the identity map on success.
pub struct DeletionProcessor {
	db: Rc<dyn DatabaseInterface>,
	processed: HashSet<usize>,
}

impl DeletionProcessor {
	pub fn new(db: Rc<dyn DatabaseInterface>) -> Self {
		Self {
			db,
			processed: HashSet::new(),
		}
	}

	/// Delete one managed instance's row. Requires an assigned primary
	/// key; re-processing within one flush emits nothing.
	pub fn process(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		identity: &mut IdentityMap,
	) -> Result<bool, OrmError> {
		if !self.processed.insert(instance_id(entity)) {
			return Ok(false);
		}
		let pk_column = metadata.primary_key_column()?;
		let pk_value =
			primary_key_value(&*entity.borrow(), metadata)?.ok_or_else(|| {
				OrmError::CannotDelete {
					entity: metadata.entity.clone(),
				}
			})?;

		// Join rows die before their owning end.
		for relation in metadata.owning_many_to_many_relations() {
			let join = relation.join_table.as_ref().expect("owning m2m has join table");
			let mut statement = Query::delete();
			statement
				.from_table(Alias::new(join.table.as_str()))
				.and_where(Expr::col(Alias::new(join.local_column.as_str())).eq(pk_value.clone()));
			super::execute_statement(&*self.db, &statement)?;
		}

		let mut statement = Query::delete();
		statement
			.from_table(Alias::new(metadata.table.as_str()))
			.and_where(Expr::col(Alias::new(pk_column.column.as_str())).eq(pk_value.clone()));
		super::execute_statement(&*self.db, &statement)?;

		if let Some(key) = value::key_string(&pk_value) {
			identity.remove(&metadata.entity, &key);
		}
		Ok(true)
	}

	/// Delete one join row for an owning many-to-many relation.
	pub fn delete_join_row(
		&mut self,
		owner: &EntityRef,
		owner_metadata: &EntityMetadata,
		relation: &RelationMetadata,
		removed: &ReferenceKey,
	) -> Result<(), OrmError> {
		let join = relation
			.join_table
			.as_ref()
			.expect("owning many-to-many has join table");
		let ReferenceKey::Persisted { key, .. } = removed else {
			// A never-saved member has no join row to delete.
			return Ok(());
		};
		let owner_pk = primary_key_value(&*owner.borrow(), owner_metadata)?.ok_or_else(|| {
			OrmError::UnresolvedReference {
				entity: owner_metadata.entity.clone(),
				property: relation.property.clone(),
			}
		})?;
		let mut statement = Query::delete();
		statement
			.from_table(Alias::new(join.table.as_str()))
			.and_where(Expr::col(Alias::new(join.local_column.as_str())).eq(owner_pk))
			.and_where(
				Expr::col(Alias::new(join.target_column.as_str()))
					.eq(value::from_key_string(key)),
			);
		super::execute_statement(&*self.db, &statement)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::test_utils::MockDatabase;
	use crate::metadata::{ColumnMetadata, ColumnType, EntityMetadata};
	use crate::orm::{Entity, entity_ref};
	use crate::value::Value;

	#[derive(Default)]
	struct Unit {
		id: Option<u32>,
	}

	impl Entity for Unit {
		fn entity_name(&self) -> &'static str {
			"Unit"
		}

		fn get_property(&self, property: &str) -> Option<Value> {
			match property {
				"id" => Some(match self.id {
					Some(v) => Value::Unsigned(Some(v)),
					None => Value::Unsigned(None),
				}),
				_ => None,
			}
		}

		fn set_property(&mut self, property: &str, value: Value) -> Result<(), OrmError> {
			match property {
				"id" => {
					self.id = crate::value::to_u64(&value).map(|v| v as u32);
					Ok(())
				}
				_ => Err(OrmError::UnknownProperty {
					entity: "Unit".into(),
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

	fn metadata() -> EntityMetadata {
		EntityMetadata::new("Unit", "units_").column(
			ColumnMetadata::new("id", "id", ColumnType::Int)
				.unsigned()
				.primary_key()
				.auto_increment(),
		)
	}

	#[test]
	fn test_delete_removes_from_identity_map() {
		let db = Rc::new(MockDatabase::new());
		let mut processor = DeletionProcessor::new(db.clone());
		let meta = metadata();
		let unit = entity_ref(Unit { id: Some(3) });
		let mut identity = IdentityMap::new();
		identity.add("Unit", "3", unit.clone());
		assert!(processor.process(&unit, &meta, &mut identity).unwrap());
		assert!(!identity.contains("Unit", "3"));
		let sql = db.executed_sql();
		assert_eq!(sql.len(), 1);
		assert!(sql[0].starts_with("DELETE FROM `units_` WHERE `id` = ?"));
	}

	#[test]
	fn test_delete_without_id_fails() {
		let db = Rc::new(MockDatabase::new());
		let mut processor = DeletionProcessor::new(db);
		let meta = metadata();
		let unit = entity_ref(Unit { id: None });
		let mut identity = IdentityMap::new();
		assert!(matches!(
			processor.process(&unit, &meta, &mut identity),
			Err(OrmError::CannotDelete { .. })
		));
	}

	#[test]
	fn test_double_process_emits_once() {
		let db = Rc::new(MockDatabase::new());
		let mut processor = DeletionProcessor::new(db.clone());
		let meta = metadata();
		let unit = entity_ref(Unit { id: Some(3) });
		let mut identity = IdentityMap::new();
		processor.process(&unit, &meta, &mut identity).unwrap();
		processor.process(&unit, &meta, &mut identity).unwrap();
		assert_eq!(db.statement_count(), 1);
	}
}
