//! Orders and products exposed through the OData service.
pub mod order;
pub mod product;

use sqlx::{Pool, Postgres};

use crate::config::Configuration;
use crate::odata::ODataService;

/// Build the OData service over `pool`.
pub fn service(config: &Configuration, pool: Pool<Postgres>) -> ODataService {
    let max_page_size = config.odata.max_page_size;
    let orders = order::repository(pool.clone());
    let products = product::repository(pool);

    ODataService::builder(config.service_root())
        .entity(order::entity_processor(orders.clone()).with_max_page_size(max_page_size))
        .primitive(order::primitive_processor(orders))
        .entity(product::entity_processor(products.clone()).with_max_page_size(max_page_size))
        .primitive(product::primitive_processor(products))
        .build()
}
