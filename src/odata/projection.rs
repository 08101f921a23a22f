//! Projection of persisted entities into their OData representation.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::odata::edm::EntityType;
use crate::odata::error::{ODataError, Result};

/// Maps a persisted entity to its exposed properties.
pub trait ODataMapper<T>: Send + Sync {
    /// Entity type the mapper produces.
    fn entity_type(&self) -> &'static EntityType;

    /// Every property of `entity`, keyed by OData name.
    fn to_properties(&self, entity: &T) -> Map<String, Value>;
}

/// Builds projections of `T` from its mapper, once per processor.
pub struct ProjectionBuilder<T> {
    mapper: Arc<dyn ODataMapper<T>>,
}

impl<T> Clone for ProjectionBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<T> ProjectionBuilder<T> {
    pub fn new(mapper: impl ODataMapper<T> + 'static) -> Self {
        Self {
            mapper: Arc::new(mapper),
        }
    }

    pub fn entity_type(&self) -> &'static EntityType {
        self.mapper.entity_type()
    }

    /// Project `entity`, keeping the key and the `select`ed properties in
    /// declaration order. `None` selects everything.
    pub fn project(&self, entity: &T, select: Option<&[String]>) -> Map<String, Value> {
        let mut properties = self.mapper.to_properties(entity);
        let ty = self.entity_type();

        let mut projected = Map::with_capacity(properties.len());
        for property in ty.properties {
            let keep = property.name == ty.key.name
                || select.is_none_or(|names| names.iter().any(|n| n == property.name));
            if keep {
                let value = properties.remove(property.name).unwrap_or(Value::Null);
                projected.insert(property.name.to_owned(), value);
            }
        }
        projected
    }

    /// Single primitive value of `entity`.
    pub fn primitive(&self, entity: &T, property: &str) -> Result<Value> {
        let ty = self.entity_type();
        if ty.property(property).is_none() {
            return Err(ODataError::NotFound(format!(
                "property '{property}' on {}",
                ty.name
            )));
        }

        Ok(self
            .mapper
            .to_properties(entity)
            .remove(property)
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopfloor::order::{ORDER_TYPE, Order, OrderODataMapper};

    fn order() -> Order {
        Order {
            id: 7,
            order_number: "ORD-7".into(),
            name: "Gearbox".into(),
            title: "Assemble gearbox".into(),
            description: None,
            created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_full_projection_in_declaration_order() {
        let builder = ProjectionBuilder::new(OrderODataMapper);
        let projected = builder.project(&order(), None);

        let names: Vec<_> = projected.keys().cloned().collect();
        let declared: Vec<_> = ORDER_TYPE.properties.iter().map(|p| p.name.to_owned()).collect();
        assert_eq!(names, declared);
        assert_eq!(projected["Id"], 7);
        assert_eq!(projected["Description"], Value::Null);
        assert_eq!(projected["CreatedAt"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_select_keeps_key() {
        let builder = ProjectionBuilder::new(OrderODataMapper);
        let select = vec!["Title".to_owned()];
        let projected = builder.project(&order(), Some(select.as_slice()));

        assert_eq!(projected.len(), 2);
        assert_eq!(projected["Id"], 7);
        assert_eq!(projected["Title"], "Assemble gearbox");
    }

    #[test]
    fn test_primitive() {
        let builder = ProjectionBuilder::new(OrderODataMapper);
        assert_eq!(builder.primitive(&order(), "Name").unwrap(), "Gearbox");
        assert_eq!(builder.primitive(&order(), "UpdatedAt").unwrap(), Value::Null);
        assert!(matches!(
            builder.primitive(&order(), "Password"),
            Err(ODataError::NotFound(_))
        ));
    }
}
