//! Generic entity and primitive-property processors.
//!
//! A processor is built once from a [`SpecificationRepository`] and a
//! [`ProjectionBuilder`] and serves every read of its entity set; writes are
//! answered with `501 Not Implemented`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

use crate::odata::edm::EntityType;
use crate::odata::error::{ODataError, Result};
use crate::odata::projection::ProjectionBuilder;
use crate::odata::query::QueryOptions;
use crate::odata::repository::SpecificationRepository;

/// Page size used when none is configured.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

const JSON_CONTENT_TYPE: &str = "application/json;odata.metadata=minimal";
const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml";

/// Successful OData response.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataResponse {
    Json(Value),
    Text(String),
    Xml(String),
    NoContent,
}

impl IntoResponse for ODataResponse {
    fn into_response(self) -> Response {
        let mut response = match self {
            ODataResponse::Json(body) => (
                [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
                body.to_string(),
            )
                .into_response(),
            ODataResponse::Text(body) => {
                ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
            },
            ODataResponse::Xml(body) => {
                ([(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
            },
            ODataResponse::NoContent => StatusCode::NO_CONTENT.into_response(),
        };

        response.headers_mut().insert(
            super::ODATA_VERSION_HEADER,
            HeaderValue::from_static(super::ODATA_VERSION),
        );
        response
    }
}

/// Entity-set operations of one entity type, without its Rust type.
#[async_trait]
pub trait EntityCollectionProcessor: Send + Sync {
    fn entity_type(&self) -> &'static EntityType;

    /// `GET /Set`.
    async fn read_collection(&self, root: &str, options: &QueryOptions) -> Result<ODataResponse>;

    /// `GET /Set/$count`.
    async fn read_count(&self, options: &QueryOptions) -> Result<ODataResponse>;

    /// `GET /Set(key)`.
    async fn read_entity(&self, root: &str, key: i64, options: &QueryOptions) -> Result<ODataResponse>;

    /// `POST /Set`.
    async fn create_entity(&self) -> Result<ODataResponse> {
        Err(not_implemented("create", self.entity_type()))
    }

    /// `PUT`/`PATCH /Set(key)`.
    async fn update_entity(&self, _key: i64) -> Result<ODataResponse> {
        Err(not_implemented("update", self.entity_type()))
    }

    /// `DELETE /Set(key)`.
    async fn delete_entity(&self, _key: i64) -> Result<ODataResponse> {
        Err(not_implemented("delete", self.entity_type()))
    }
}

/// Primitive-property operations of one entity type, without its Rust type.
#[async_trait]
pub trait PrimitivePropertyProcessor: Send + Sync {
    fn entity_type(&self) -> &'static EntityType;

    /// `GET /Set(key)/Property`.
    async fn read_primitive(&self, root: &str, key: i64, property: &str) -> Result<ODataResponse>;

    /// `GET /Set(key)/Property/$value`.
    async fn read_primitive_value(&self, key: i64, property: &str) -> Result<ODataResponse>;

    /// `PUT`/`PATCH /Set(key)/Property`.
    async fn update_primitive(&self, _key: i64, _property: &str) -> Result<ODataResponse> {
        Err(not_implemented("property update", self.entity_type()))
    }

    /// `DELETE /Set(key)/Property`.
    async fn delete_primitive(&self, _key: i64, _property: &str) -> Result<ODataResponse> {
        Err(not_implemented("property delete", self.entity_type()))
    }
}

fn not_implemented(operation: &str, ty: &EntityType) -> ODataError {
    ODataError::NotImplemented(format!("{operation} on {}", ty.set_name))
}

/// Serves collections, counts and single entities of `T`.
pub struct EntityProcessor<T> {
    repository: Arc<dyn SpecificationRepository<T>>,
    projection: ProjectionBuilder<T>,
    max_page_size: u64,
}

impl<T> EntityProcessor<T> {
    pub fn new(
        repository: Arc<dyn SpecificationRepository<T>>,
        projection: ProjectionBuilder<T>,
    ) -> Self {
        Self {
            repository,
            projection,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Set the server-driven page size, `0` is treated as `1`.
    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    fn context(&self, root: &str, select: Option<&[String]>, suffix: &str) -> String {
        let set = self.projection.entity_type().set_name;
        match select {
            Some(names) => format!("{root}/$metadata#{set}({}){suffix}", names.join(",")),
            None => format!("{root}/$metadata#{set}{suffix}"),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> EntityCollectionProcessor for EntityProcessor<T> {
    fn entity_type(&self) -> &'static EntityType {
        self.projection.entity_type()
    }

    async fn read_collection(&self, root: &str, options: &QueryOptions) -> Result<ODataResponse> {
        let limit = options
            .top
            .map_or(self.max_page_size, |top| top.min(self.max_page_size));
        // Rows past the page remain wanted unless `$top` fits in it.
        let paged = options.top.is_none_or(|top| top > limit);
        // One extra row tells whether a next page exists.
        let fetched = if paged { limit + 1 } else { limit };

        let spec = options.specification(Some(fetched));
        let mut entities = self.repository.find_all(&spec).await?;

        let has_more = entities.len() as u64 > limit;
        entities.truncate(limit as usize);

        let mut body = Map::new();
        body.insert(
            "@odata.context".into(),
            self.context(root, options.select.as_deref(), "").into(),
        );
        if options.count {
            let count = self.repository.count(&spec.count_only()).await?;
            body.insert("@odata.count".into(), count.into());
        }

        let select = options.select.as_deref();
        let value = entities
            .iter()
            .map(|entity| Value::Object(self.projection.project(entity, select)))
            .collect::<Vec<_>>();
        body.insert("value".into(), Value::Array(value));

        if paged && has_more {
            let next_skip = spec.skip + limit;
            let remaining = options.top.map(|top| top - limit);
            body.insert(
                "@odata.nextLink".into(),
                format!(
                    "{root}/{}?{}",
                    self.entity_type().set_name,
                    options.next_page_query(next_skip, remaining)
                )
                .into(),
            );
        }

        Ok(ODataResponse::Json(Value::Object(body)))
    }

    async fn read_count(&self, options: &QueryOptions) -> Result<ODataResponse> {
        let spec = options.specification(None).count_only();
        let count = self.repository.count(&spec).await?;
        Ok(ODataResponse::Text(count.to_string()))
    }

    async fn read_entity(&self, root: &str, key: i64, options: &QueryOptions) -> Result<ODataResponse> {
        let ty = self.entity_type();
        let entity = self
            .repository
            .find_by_key(key)
            .await?
            .ok_or_else(|| ODataError::NotFound(format!("{}({key})", ty.set_name)))?;

        let select = options.select.as_deref();
        let mut body = Map::new();
        body.insert(
            "@odata.context".into(),
            self.context(root, select, "/$entity").into(),
        );
        body.extend(self.projection.project(&entity, select));

        Ok(ODataResponse::Json(Value::Object(body)))
    }
}

/// Serves single primitive properties of `T`.
pub struct PrimitiveProcessor<T> {
    repository: Arc<dyn SpecificationRepository<T>>,
    projection: ProjectionBuilder<T>,
}

impl<T> PrimitiveProcessor<T> {
    pub fn new(
        repository: Arc<dyn SpecificationRepository<T>>,
        projection: ProjectionBuilder<T>,
    ) -> Self {
        Self {
            repository,
            projection,
        }
    }

    async fn value(&self, key: i64, property: &str) -> Result<Value> {
        let ty = self.projection.entity_type();
        if ty.property(property).is_none() {
            return Err(ODataError::NotFound(format!(
                "property '{property}' on {}",
                ty.name
            )));
        }

        let entity = self
            .repository
            .find_by_key(key)
            .await?
            .ok_or_else(|| ODataError::NotFound(format!("{}({key})", ty.set_name)))?;
        self.projection.primitive(&entity, property)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> PrimitivePropertyProcessor for PrimitiveProcessor<T> {
    fn entity_type(&self) -> &'static EntityType {
        self.projection.entity_type()
    }

    async fn read_primitive(&self, root: &str, key: i64, property: &str) -> Result<ODataResponse> {
        let value = self.value(key, property).await?;
        if value.is_null() {
            return Ok(ODataResponse::NoContent);
        }

        let set = self.entity_type().set_name;
        Ok(ODataResponse::Json(serde_json::json!({
            "@odata.context": format!("{root}/$metadata#{set}({key})/{property}"),
            "value": value,
        })))
    }

    async fn read_primitive_value(&self, key: i64, property: &str) -> Result<ODataResponse> {
        Ok(match self.value(key, property).await? {
            Value::Null => ODataResponse::NoContent,
            Value::String(text) => ODataResponse::Text(text),
            other => ODataResponse::Text(other.to_string()),
        })
    }
}
