//! Production orders.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::{Pool, Postgres};

use crate::odata::edm::{EdmType, EntityType, Property};
use crate::odata::{
    Entity, EntityProcessor, ODataMapper, PgRepository, PrimitiveProcessor, ProjectionBuilder,
    SpecificationRepository,
};

static ORDER_PROPERTIES: [Property; 7] = [
    Property::new("Id", "id", EdmType::Int64),
    Property::new("OrderNumber", "order_number", EdmType::String),
    Property::new("Name", "name", EdmType::String),
    Property::new("Title", "title", EdmType::String),
    Property::new("Description", "description", EdmType::String).nullable(),
    Property::new("CreatedAt", "created_at", EdmType::DateTimeOffset),
    Property::new("UpdatedAt", "updated_at", EdmType::DateTimeOffset).nullable(),
];

/// `Orders` entity set.
pub static ORDER_TYPE: EntityType = EntityType {
    name: "Order",
    set_name: "Orders",
    table: "orders",
    key: &ORDER_PROPERTIES[0],
    properties: &ORDER_PROPERTIES,
};

/// Order as saved on database.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Order {
    fn entity_type() -> &'static EntityType {
        &ORDER_TYPE
    }
}

pub(crate) fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Maps [`Order`] rows to `Shopfloor.Order`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderODataMapper;

impl ODataMapper<Order> for OrderODataMapper {
    fn entity_type(&self) -> &'static EntityType {
        &ORDER_TYPE
    }

    fn to_properties(&self, order: &Order) -> Map<String, Value> {
        let mut properties = Map::with_capacity(ORDER_PROPERTIES.len());
        properties.insert("Id".into(), order.id.into());
        properties.insert("OrderNumber".into(), order.order_number.clone().into());
        properties.insert("Name".into(), order.name.clone().into());
        properties.insert("Title".into(), order.title.clone().into());
        properties.insert("Description".into(), order.description.clone().into());
        properties.insert("CreatedAt".into(), timestamp(&order.created_at));
        properties.insert(
            "UpdatedAt".into(),
            order.updated_at.as_ref().map_or(Value::Null, timestamp),
        );
        properties
    }
}

pub type OrderEntityProcessor = EntityProcessor<Order>;
pub type OrderPrimitiveProcessor = PrimitiveProcessor<Order>;

/// Entity processor of `Orders`.
pub fn entity_processor(repository: Arc<dyn SpecificationRepository<Order>>) -> OrderEntityProcessor {
    EntityProcessor::new(repository, ProjectionBuilder::new(OrderODataMapper))
}

/// Primitive processor of `Orders`.
pub fn primitive_processor(
    repository: Arc<dyn SpecificationRepository<Order>>,
) -> OrderPrimitiveProcessor {
    PrimitiveProcessor::new(repository, ProjectionBuilder::new(OrderODataMapper))
}

/// Repository of orders backed by PostgreSQL.
pub fn repository(pool: Pool<Postgres>) -> Arc<dyn SpecificationRepository<Order>> {
    Arc::new(PgRepository::<Order>::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapper_covers_every_property() {
        let order = Order {
            id: 1,
            order_number: "ORD-1".into(),
            name: "Gearbox".into(),
            title: "Assemble gearbox".into(),
            description: Some("Line 3".into()),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            updated_at: DateTime::from_timestamp(1_700_000_060, 500_000_000),
        };
        let properties = OrderODataMapper.to_properties(&order);

        for property in ORDER_TYPE.properties {
            assert!(properties.contains_key(property.name), "{}", property.name);
        }
        assert_eq!(properties["UpdatedAt"], "2023-11-14T22:14:20.500Z");
        assert_eq!(properties["Description"], "Line 3");
    }

    #[test]
    fn test_key_is_first_property() {
        assert_eq!(ORDER_TYPE.key.name, "Id");
        assert_eq!(ORDER_TYPE.key.kind, EdmType::Int64);
        assert_eq!(Order::entity_type(), &ORDER_TYPE);
    }
}
