//! Products worked on the floor.

use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::{Pool, Postgres};

use crate::odata::edm::{EdmType, EntityType, Property};
use crate::odata::{
    Entity, EntityProcessor, ODataMapper, PgRepository, PrimitiveProcessor, ProjectionBuilder,
    SpecificationRepository,
};

static PRODUCT_PROPERTIES: [Property; 8] = [
    Property::new("Id", "id", EdmType::Int64),
    Property::new("ProductNumber", "product_number", EdmType::String),
    Property::new("Name", "name", EdmType::String),
    Property::new("Type", "type", EdmType::String),
    Property::new("Country", "country", EdmType::String),
    Property::new("PackagingSize", "packaging_size", EdmType::String),
    Property::new("Language", "language", EdmType::String),
    Property::new("Description", "description", EdmType::String).nullable(),
];

/// `Products` entity set.
pub static PRODUCT_TYPE: EntityType = EntityType {
    name: "Product",
    set_name: "Products",
    table: "products",
    key: &PRODUCT_PROPERTIES[0],
    properties: &PRODUCT_PROPERTIES,
};

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub product_number: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub country: String,
    pub packaging_size: String,
    pub language: String,
    pub description: Option<String>,
}

impl Entity for Product {
    fn entity_type() -> &'static EntityType {
        &PRODUCT_TYPE
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProductODataMapper;

impl ODataMapper<Product> for ProductODataMapper {
    fn entity_type(&self) -> &'static EntityType {
        &PRODUCT_TYPE
    }

    fn to_properties(&self, product: &Product) -> Map<String, Value> {
        let mut properties = Map::with_capacity(PRODUCT_PROPERTIES.len());
        properties.insert("Id".into(), product.id.into());
        properties.insert("ProductNumber".into(), product.product_number.clone().into());
        properties.insert("Name".into(), product.name.clone().into());
        properties.insert("Type".into(), product.kind.clone().into());
        properties.insert("Country".into(), product.country.clone().into());
        properties.insert("PackagingSize".into(), product.packaging_size.clone().into());
        properties.insert("Language".into(), product.language.clone().into());
        properties.insert("Description".into(), product.description.clone().into());
        properties
    }
}

pub type ProductEntityProcessor = EntityProcessor<Product>;
pub type ProductPrimitiveProcessor = PrimitiveProcessor<Product>;

pub fn entity_processor(
    repository: Arc<dyn SpecificationRepository<Product>>,
) -> ProductEntityProcessor {
    EntityProcessor::new(repository, ProjectionBuilder::new(ProductODataMapper))
}

pub fn primitive_processor(
    repository: Arc<dyn SpecificationRepository<Product>>,
) -> ProductPrimitiveProcessor {
    PrimitiveProcessor::new(repository, ProjectionBuilder::new(ProductODataMapper))
}

pub fn repository(pool: Pool<Postgres>) -> Arc<dyn SpecificationRepository<Product>> {
    Arc::new(PgRepository::<Product>::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odata::filter::Expr;
    use crate::odata::processor::PrimitivePropertyProcessor;
    use crate::odata::ODataResponse;
    use crate::test_utils::{RecordingRepository, sample_products};

    #[test]
    fn test_type_is_exposed_under_its_odata_name() {
        assert_eq!(PRODUCT_TYPE.property("Type").unwrap().column, "type");
        assert!(Expr::parse("Type eq 'Bolt' and PackagingSize ne null", &PRODUCT_TYPE).is_ok());
    }

    #[tokio::test]
    async fn test_primitive_processor_reads_through_repository() {
        let repo = Arc::new(RecordingRepository::new(sample_products()));
        let processor = primitive_processor(repo.clone());

        let value = processor.read_primitive_value(2, "Type").await.unwrap();
        assert_eq!(value, ODataResponse::Text("Nut".into()));
        assert_eq!(repo.find_by_key_calls(), vec![2]);
    }
}
