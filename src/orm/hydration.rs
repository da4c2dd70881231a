//! Row-to-entity conversion.

use crate::backends::Row;
use crate::error::HydrationError;
use crate::metadata::EntityMetadata;
use crate::orm::EntityRef;
use crate::value;

/// Build a fresh instance from one result row.
///
/// Requires a hydration factory on the metadata; every declared column
/// must be present in the row, NULL is rejected for non-nullable columns,
/// and property writes that reject the value surface as type mismatches.
pub fn hydrate(metadata: &EntityMetadata, row: &Row) -> Result<EntityRef, HydrationError> {
	let factory = metadata
		.factory
		.ok_or_else(|| HydrationError::InvalidEntity {
			entity: metadata.entity.clone(),
			reason: "no hydration factory registered".into(),
		})?;
	let instance = factory();
	{
		let mut borrowed = instance.borrow_mut();
		for column in &metadata.columns {
			let value = row
				.get(&column.column)
				.ok_or_else(|| HydrationError::MissingColumn {
					entity: metadata.entity.clone(),
					property: column.property.clone(),
				})?;
			if value::is_null(value) && !column.nullable {
				return Err(HydrationError::NullForNonNullable {
					entity: metadata.entity.clone(),
					property: column.property.clone(),
				});
			}
			borrowed
				.set_property(&column.property, value.clone())
				.map_err(|e| HydrationError::TypeMismatch {
					entity: metadata.entity.clone(),
					property: column.property.clone(),
					detail: e.to_string(),
				})?;
		}
	}
	Ok(instance)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::OrmError;
	use crate::metadata::{ColumnMetadata, ColumnType};
	use crate::orm::{Entity, entity_ref};
	use crate::value::Value;

	#[derive(Default)]
	struct User {
		id: Option<u32>,
		username: String,
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
				_ => None,
			}
		}

		fn set_property(&mut self, property: &str, value: Value) -> Result<(), OrmError> {
			match property {
				"id" => {
					self.id = crate::value::to_u64(&value).map(|v| v as u32);
					Ok(())
				}
				"username" => match crate::value::to_string(&value) {
					Some(s) => {
						self.username = s;
						Ok(())
					}
					None => Err(OrmError::InvalidValue {
						entity: "User".into(),
						property: property.into(),
						detail: format!("expected string, got {value:?}"),
					}),
				},
				_ => Err(OrmError::UnknownProperty {
					entity: "User".into(),
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
		EntityMetadata::new("User", "users_")
			.column(
				ColumnMetadata::new("id", "id", ColumnType::Int)
					.unsigned()
					.primary_key()
					.auto_increment(),
			)
			.column(ColumnMetadata::new("username", "username", ColumnType::Varchar(100)))
			.factory(|| entity_ref(User::default()))
	}

	#[test]
	fn test_hydrates_all_columns() {
		let row = Row::new()
			.with("id", Value::Unsigned(Some(1)))
			.with("username", "alice");
		let instance = hydrate(&metadata(), &row).unwrap();
		let borrowed = instance.borrow();
		let user = borrowed.as_any().downcast_ref::<User>().unwrap();
		assert_eq!(user.id, Some(1));
		assert_eq!(user.username, "alice");
	}

	#[test]
	fn test_missing_column_is_reported_with_property() {
		let row = Row::new().with("id", Value::Unsigned(Some(1)));
		let err = hydrate(&metadata(), &row).unwrap_err();
		match err {
			HydrationError::MissingColumn { entity, property } => {
				assert_eq!(entity, "User");
				assert_eq!(property, "username");
			}
			other => panic!("expected MissingColumn, got {other:?}"),
		}
	}

	#[test]
	fn test_null_for_non_nullable_is_rejected() {
		let row = Row::new()
			.with("id", Value::Unsigned(Some(1)))
			.with("username", Value::String(None));
		let err = hydrate(&metadata(), &row).unwrap_err();
		assert!(matches!(err, HydrationError::NullForNonNullable { .. }));
	}

	#[test]
	fn test_type_mismatch_is_reported() {
		let row = Row::new()
			.with("id", Value::Unsigned(Some(1)))
			.with("username", Value::Bool(Some(true)));
		let err = hydrate(&metadata(), &row).unwrap_err();
		assert!(matches!(err, HydrationError::TypeMismatch { .. }));
	}

	#[test]
	fn test_missing_factory_is_invalid_entity() {
		let mut meta = metadata();
		meta.factory = None;
		let row = Row::new().with("id", Value::Unsigned(Some(1)));
		assert!(matches!(
			hydrate(&meta, &row),
			Err(HydrationError::InvalidEntity { .. })
		));
	}
}
