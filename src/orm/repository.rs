//! Repositories: query values constructed from `(metadata, context)`.
//!
//! There is no repository base class to subclass; a custom repository is
//! a plain type that wraps this value.

use std::sync::Arc;

use sea_query::{Alias, Expr, MysqlQueryBuilder, Order, Query, SelectStatement};

use crate::error::OrmError;
use crate::metadata::EntityMetadata;
use crate::orm::{EntityRef, PersistenceContext};
use crate::value::Value;

/// Default read operations over one entity.
pub struct Repository<'a> {
	context: &'a PersistenceContext,
	metadata: Arc<EntityMetadata>,
}

impl<'a> Repository<'a> {
	pub(crate) fn new(context: &'a PersistenceContext, metadata: Arc<EntityMetadata>) -> Self {
		Self { context, metadata }
	}

	pub fn entity_name(&self) -> &str {
		&self.metadata.entity
	}

	/// Load by primary key (identity map first).
	pub fn find(&self, id: impl Into<Value>) -> Result<Option<EntityRef>, OrmError> {
		self.context.find(&self.metadata.entity, id)
	}

	/// Load every row, ordered by primary key.
	pub fn find_all(&self) -> Result<Vec<EntityRef>, OrmError> {
		let statement = self.select(&[])?;
		self.fetch(&statement)
	}

	/// Load rows matching all criteria (property = value, AND-combined).
	pub fn find_by(&self, criteria: &[(&str, Value)]) -> Result<Vec<EntityRef>, OrmError> {
		let statement = self.select(criteria)?;
		self.fetch(&statement)
	}

	/// Like [`Repository::find_by`] but returns the first match.
	pub fn find_one_by(&self, criteria: &[(&str, Value)]) -> Result<Option<EntityRef>, OrmError> {
		let mut statement = self.select(criteria)?;
		statement.limit(1);
		Ok(self.fetch(&statement)?.into_iter().next())
	}

	fn select(&self, criteria: &[(&str, Value)]) -> Result<SelectStatement, OrmError> {
		let pk = self.metadata.primary_key_column()?;
		let mut statement = Query::select();
		statement.from(Alias::new(self.metadata.table.as_str()));
		for column in &self.metadata.columns {
			statement.column(Alias::new(column.column.as_str()));
		}
		for (property, value) in criteria {
			let column = self.metadata.update_column_for(property).ok_or_else(|| {
				OrmError::UnknownProperty {
					entity: self.metadata.entity.clone(),
					property: property.to_string(),
				}
			})?;
			statement.and_where(Expr::col(Alias::new(column)).eq(value.clone()));
		}
		statement.order_by(Alias::new(pk.column.as_str()), Order::Asc);
		Ok(statement)
	}

	fn fetch(&self, statement: &SelectStatement) -> Result<Vec<EntityRef>, OrmError> {
		let (sql, values) = statement.build(MysqlQueryBuilder);
		let params: Vec<Value> = values.into_iter().collect();
		let rows = self.context.db().query(&sql, &params)?;
		rows.iter()
			.map(|row| self.context.manage_row(&self.metadata, row))
			.collect()
	}
}
