//! INSERT processing for scheduled-new instances.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use sea_query::{Alias, Query};

use crate::backends::DatabaseInterface;
use crate::error::OrmError;
use crate::metadata::{EntityMetadata, MetadataRegistry, RelationMetadata};
use crate::orm::{EntityRef, instance_id, primary_key_value, set_primary_key_value};
use crate::value::Value;

/// Builds and executes INSERTs; assigns generated ids back onto the
/// instance.
pub struct InsertionProcessor {
	db: Rc<dyn DatabaseInterface>,
	processed: HashSet<usize>,
}

impl InsertionProcessor {
	pub fn new(db: Rc<dyn DatabaseInterface>) -> Self {
		Self {
			db,
			processed: HashSet::new(),
		}
	}

	/// Insert one transient instance. Returns `true` when a row was
	/// written; an instance with an id already present is skipped, and
	/// re-processing within one flush emits nothing.
	pub fn process(
		&mut self,
		entity: &EntityRef,
		metadata: &EntityMetadata,
		registry: &MetadataRegistry,
	) -> Result<bool, OrmError> {
		let id = instance_id(entity);
		if !self.processed.insert(id) {
			return Ok(false);
		}
		// Primary-key accessor must exist even when the id is generated.
		let pk_column = metadata.primary_key_column()?.clone();
		let existing_pk = primary_key_value(&*entity.borrow(), metadata)?;
		if existing_pk.is_some() {
			// Insert only if transient.
			return Ok(false);
		}

		let mut columns: IndexMap<String, Value> = IndexMap::new();
		{
			let borrowed = entity.borrow();
			for column in &metadata.columns {
				if column.auto_increment && column.property == pk_column.property {
					continue;
				}
				let value = borrowed
					.get_property(&column.property)
					.unwrap_or_else(|| column.column_type.null_value());
				columns.insert(column.column.clone(), value);
			}
			for relation in metadata.owning_to_one_relations() {
				let fk_value = foreign_key_value(&borrowed, relation, metadata, registry)?;
				let fk_column = relation.column.clone().expect("owning to-one has column");
				// The relation is authoritative for its FK column.
				columns.insert(fk_column, fk_value);
			}
		}

		let mut statement = Query::insert();
		statement
			.into_table(Alias::new(metadata.table.as_str()))
			.columns(columns.keys().map(|c| Alias::new(c.as_str())))
			.values_panic(columns.values().cloned().map(sea_query::SimpleExpr::from));
		super::execute_statement(&*self.db, &statement)?;

		if pk_column.auto_increment {
			let generated = self.db.last_insert_id()?;
			set_primary_key_value(
				&mut *entity.borrow_mut(),
				metadata,
				pk_column.value_from_insert_id(generated),
			)?;
		}
		Ok(true)
	}

	/// Insert one join row for an owning many-to-many relation.
	pub fn insert_join_row(
		&mut self,
		owner: &EntityRef,
		owner_metadata: &EntityMetadata,
		relation: &RelationMetadata,
		member: &EntityRef,
		registry: &MetadataRegistry,
	) -> Result<(), OrmError> {
		let join = relation
			.join_table
			.as_ref()
			.expect("owning many-to-many has join table");
		let owner_pk = primary_key_value(&*owner.borrow(), owner_metadata)?.ok_or_else(|| {
			OrmError::UnresolvedReference {
				entity: owner_metadata.entity.clone(),
				property: relation.property.clone(),
			}
		})?;
		let member_meta = registry.get(&relation.target)?;
		let member_pk =
			primary_key_value(&*member.borrow(), &member_meta)?.ok_or_else(|| {
				OrmError::UnresolvedReference {
					entity: owner_metadata.entity.clone(),
					property: relation.property.clone(),
				}
			})?;
		let mut statement = Query::insert();
		statement
			.into_table(Alias::new(join.table.as_str()))
			.columns([
				Alias::new(join.local_column.as_str()),
				Alias::new(join.target_column.as_str()),
			])
			.values_panic([
				sea_query::SimpleExpr::from(owner_pk),
				sea_query::SimpleExpr::from(member_pk),
			]);
		super::execute_statement(&*self.db, &statement)?;
		Ok(())
	}
}

/// The FK scalar an owning *-to-one relation serialises to: the target's
/// primary key, or NULL when the reference is unset.
fn foreign_key_value(
	owner: &std::cell::Ref<'_, dyn crate::orm::Entity>,
	relation: &RelationMetadata,
	owner_metadata: &EntityMetadata,
	registry: &MetadataRegistry,
) -> Result<Value, OrmError> {
	let target_meta = registry.get(&relation.target)?;
	let target_pk_column = target_meta.primary_key_column()?;
	match owner.get_reference(&relation.property) {
		Some(Some(target)) => {
			let pk = primary_key_value(&*target.borrow(), &target_meta)?;
			pk.ok_or_else(|| OrmError::UnresolvedReference {
				entity: owner_metadata.entity.clone(),
				property: relation.property.clone(),
			})
		}
		Some(None) | None => Ok(target_pk_column.column_type.null_value()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::test_utils::MockDatabase;
	use crate::metadata::{ColumnMetadata, ColumnType, EntityMetadata};
	use crate::orm::{Entity, entity_ref};
	use crate::value;

	#[derive(Default)]
	struct Unit {
		id: Option<u32>,
		name: String,
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
				"name" => Some(Value::from(self.name.clone())),
				_ => None,
			}
		}

		fn set_property(&mut self, property: &str, value: Value) -> Result<(), OrmError> {
			match property {
				"id" => {
					self.id = value::to_u64(&value).map(|v| v as u32);
					Ok(())
				}
				"name" => {
					self.name = value::to_string(&value).unwrap_or_default();
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

	fn registry() -> MetadataRegistry {
		let registry = MetadataRegistry::new();
		registry
			.register(
				EntityMetadata::new("Unit", "units_")
					.column(
						ColumnMetadata::new("id", "id", ColumnType::Int)
							.unsigned()
							.primary_key()
							.auto_increment(),
					)
					.column(ColumnMetadata::new("name", "name", ColumnType::Varchar(50))),
			)
			.unwrap();
		registry
	}

	#[test]
	fn test_insert_assigns_generated_id() {
		let registry = registry();
		let db = Rc::new(MockDatabase::new());
		db.set_next_insert_id(41);
		let mut processor = InsertionProcessor::new(db.clone());
		let unit = entity_ref(Unit {
			id: None,
			name: "ops".into(),
		});
		let meta = registry.get("Unit").unwrap();
		assert!(processor.process(&unit, &meta, &registry).unwrap());
		let sql = db.executed_sql();
		assert_eq!(sql.len(), 1);
		assert!(sql[0].starts_with("INSERT INTO `units_`"));
		let borrowed = unit.borrow();
		let unit_struct = borrowed.as_any().downcast_ref::<Unit>().unwrap();
		assert_eq!(unit_struct.id, Some(41));
	}

	#[test]
	fn test_double_process_emits_once() {
		let registry = registry();
		let db = Rc::new(MockDatabase::new());
		let mut processor = InsertionProcessor::new(db.clone());
		let unit = entity_ref(Unit::default());
		let meta = registry.get("Unit").unwrap();
		processor.process(&unit, &meta, &registry).unwrap();
		assert!(!processor.process(&unit, &meta, &registry).unwrap());
		assert_eq!(db.statement_count(), 1);
	}

	#[test]
	fn test_instance_with_id_is_skipped() {
		let registry = registry();
		let db = Rc::new(MockDatabase::new());
		let mut processor = InsertionProcessor::new(db.clone());
		let unit = entity_ref(Unit {
			id: Some(7),
			name: "ops".into(),
		});
		let meta = registry.get("Unit").unwrap();
		assert!(!processor.process(&unit, &meta, &registry).unwrap());
		assert_eq!(db.statement_count(), 0);
	}
}
