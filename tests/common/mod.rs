//! Shared fixtures: a small User/Unit/Group model wired over the mock
//! database.

#![allow(dead_code)]

use std::rc::Rc;
use std::sync::Arc;

use grappelli::backends::test_utils::MockDatabase;
use grappelli::error::OrmError;
use grappelli::metadata::{
	ColumnMetadata, ColumnType, EntityMetadata, JoinTableMetadata, MetadataRegistry,
	ReferenceOption, RelationMetadata,
};
use grappelli::orm::{Entity, EntityRef, PersistenceContext};
use grappelli::value::{self, Value};

#[derive(Default)]
pub struct Unit {
	pub id: Option<u32>,
	pub name: String,
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

#[derive(Default)]
pub struct Group {
	pub id: Option<u32>,
	pub name: String,
}

impl Entity for Group {
	fn entity_name(&self) -> &'static str {
		"Group"
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
				entity: "Group".into(),
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

#[derive(Default)]
pub struct User {
	pub id: Option<u32>,
	pub username: String,
	pub email: Option<String>,
	pub unit: Option<EntityRef>,
	pub groups: Vec<EntityRef>,
}

impl Entity for User {
	fn entity_name(&self) -> &'static str {
		"User"
	}

	fn get_property(&self, property: &str) -> Option<Value> {
		match property {
			"id" => Some(match self.id {
				Some(v) => Value::Unsigned(Some(v)),
				None => Value::Unsigned(None),
			}),
			"username" => Some(Value::from(self.username.clone())),
			"email" => Some(match &self.email {
				Some(v) => Value::from(v.clone()),
				None => Value::String(None),
			}),
			_ => None,
		}
	}

	fn set_property(&mut self, property: &str, value: Value) -> Result<(), OrmError> {
		match property {
			"id" => {
				self.id = value::to_u64(&value).map(|v| v as u32);
				Ok(())
			}
			"username" => {
				self.username = value::to_string(&value).unwrap_or_default();
				Ok(())
			}
			"email" => {
				self.email = value::to_string(&value);
				Ok(())
			}
			_ => Err(OrmError::UnknownProperty {
				entity: "User".into(),
				property: property.into(),
			}),
		}
	}

	fn get_reference(&self, property: &str) -> Option<Option<EntityRef>> {
		match property {
			"unit" => Some(self.unit.clone()),
			_ => None,
		}
	}

	fn set_reference(&mut self, property: &str, target: Option<EntityRef>) -> Result<(), OrmError> {
		match property {
			"unit" => {
				self.unit = target;
				Ok(())
			}
			_ => Err(OrmError::UnknownProperty {
				entity: "User".into(),
				property: property.into(),
			}),
		}
	}

	fn get_collection(&self, property: &str) -> Option<Vec<EntityRef>> {
		match property {
			"groups" => Some(self.groups.clone()),
			_ => None,
		}
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
		self
	}
}

/// The registry every test context shares: User -> Unit (many-to-one,
/// cascade delete) and User <-> Group through `users_groups`.
pub fn registry() -> Arc<MetadataRegistry> {
	let registry = MetadataRegistry::new();
	registry
		.register_entity::<Unit>(
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
		.register_entity::<Group>(
			EntityMetadata::new("Group", "groups_")
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
		.register_entity::<User>(
			EntityMetadata::new("User", "users_")
				.column(
					ColumnMetadata::new("id", "id", ColumnType::Int)
						.unsigned()
						.primary_key()
						.auto_increment(),
				)
				.column(ColumnMetadata::new(
					"username",
					"username",
					ColumnType::Varchar(100),
				))
				.column(
					ColumnMetadata::new("email", "email", ColumnType::Varchar(255))
						.nullable()
						.unique(),
				)
				.relation(
					RelationMetadata::many_to_one("unit", "Unit", "unit_id")
						.on_delete(ReferenceOption::Cascade),
				)
				.relation(RelationMetadata::many_to_many(
					"groups",
					"Group",
					JoinTableMetadata {
						table: "users_groups".into(),
						local_column: "user_id".into(),
						target_column: "group_id".into(),
					},
				)),
		)
		.unwrap();
	Arc::new(registry)
}

/// A fresh context over a fresh mock connection.
pub fn context() -> (Rc<MockDatabase>, PersistenceContext) {
	let db = Rc::new(MockDatabase::new());
	let context = PersistenceContext::new(registry(), db.clone());
	(db, context)
}

/// A scripted `users_` row.
pub fn user_row(id: u32, username: &str, email: Option<&str>) -> grappelli::backends::Row {
	grappelli::backends::Row::new()
		.with("id", Value::Unsigned(Some(id)))
		.with("username", username)
		.with(
			"email",
			match email {
				Some(e) => Value::from(e),
				None => Value::String(None),
			},
		)
}
