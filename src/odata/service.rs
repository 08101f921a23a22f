//! Registry of entity sets and request dispatch.

use std::sync::Arc;

use axum::http::Method;
use serde_json::json;

use crate::odata::edm::EntityType;
use crate::odata::error::{ODataError, Result};
use crate::odata::metadata;
use crate::odata::path::ResourcePath;
use crate::odata::processor::{EntityCollectionProcessor, ODataResponse, PrimitivePropertyProcessor};
use crate::odata::query::QueryOptions;

/// Processors serving one entity set.
#[derive(Clone)]
struct EntitySet {
    ty: &'static EntityType,
    entity: Option<Arc<dyn EntityCollectionProcessor>>,
    primitive: Option<Arc<dyn PrimitivePropertyProcessor>>,
}

/// OData service built once at startup.
#[derive(Clone)]
pub struct ODataService {
    root: String,
    sets: Vec<EntitySet>,
}

/// Builder for [`ODataService`].
pub struct ODataServiceBuilder {
    root: String,
    sets: Vec<EntitySet>,
}

impl ODataServiceBuilder {
    fn set_mut(&mut self, ty: &'static EntityType) -> &mut EntitySet {
        let position = match self.sets.iter().position(|s| s.ty.set_name == ty.set_name) {
            Some(position) => position,
            None => {
                self.sets.push(EntitySet {
                    ty,
                    entity: None,
                    primitive: None,
                });
                self.sets.len() - 1
            },
        };
        &mut self.sets[position]
    }

    /// Register the entity processor of its entity set.
    pub fn entity(mut self, processor: impl EntityCollectionProcessor + 'static) -> Self {
        let ty = processor.entity_type();
        self.set_mut(ty).entity = Some(Arc::new(processor));
        self
    }

    /// Register the primitive processor of its entity set.
    pub fn primitive(mut self, processor: impl PrimitivePropertyProcessor + 'static) -> Self {
        let ty = processor.entity_type();
        self.set_mut(ty).primitive = Some(Arc::new(processor));
        self
    }

    pub fn build(self) -> ODataService {
        ODataService {
            root: self.root,
            sets: self.sets,
        }
    }
}

impl ODataService {
    /// Start a service whose absolute root URL is `root`.
    pub fn builder(root: impl Into<String>) -> ODataServiceBuilder {
        ODataServiceBuilder {
            root: root.into().trim_end_matches('/').to_owned(),
            sets: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Registered entity types, in registration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &'static EntityType> + Clone + '_ {
        self.sets.iter().map(|s| s.ty)
    }

    fn set(&self, name: &str) -> Result<&EntitySet> {
        self.sets
            .iter()
            .find(|s| s.ty.set_name == name)
            .ok_or_else(|| ODataError::NotFound(format!("entity set '{name}'")))
    }

    fn service_document(&self) -> ODataResponse {
        let sets = self
            .sets
            .iter()
            .map(|s| {
                json!({
                    "name": s.ty.set_name,
                    "kind": "EntitySet",
                    "url": s.ty.set_name,
                })
            })
            .collect::<Vec<_>>();

        ODataResponse::Json(json!({
            "@odata.context": format!("{}/$metadata", self.root),
            "value": sets,
        }))
    }

    /// Dispatch a request addressed to `path` below the service root.
    pub async fn handle(&self, method: &Method, path: &str, query: Option<&str>) -> Result<ODataResponse> {
        let resource = ResourcePath::parse(path, |name| {
            self.sets
                .iter()
                .find(|s| s.ty.set_name == name)
                .map(|s| s.ty.key.name)
        })?;

        let (set, resource) = match resource {
            ResourcePath::ServiceDocument => {
                return match *method {
                    Method::GET => Ok(self.service_document()),
                    _ => Err(ODataError::MethodNotAllowed),
                };
            },
            ResourcePath::Metadata => {
                return match *method {
                    Method::GET => Ok(ODataResponse::Xml(metadata::document(self.entity_types()))),
                    _ => Err(ODataError::MethodNotAllowed),
                };
            },
            other => {
                let set = self.set(other.entity_set().unwrap_or_default())?;
                (set, other)
            },
        };

        match resource {
            ResourcePath::Collection { .. } => {
                let processor = entity_processor(set)?;
                match *method {
                    Method::GET => {
                        let options = QueryOptions::parse(query, set.ty)?;
                        processor.read_collection(&self.root, &options).await
                    },
                    Method::POST => processor.create_entity().await,
                    _ => Err(ODataError::MethodNotAllowed),
                }
            },
            ResourcePath::Count { .. } => {
                let processor = entity_processor(set)?;
                match *method {
                    Method::GET => {
                        let options = QueryOptions::parse(query, set.ty)?;
                        processor.read_count(&options).await
                    },
                    _ => Err(ODataError::MethodNotAllowed),
                }
            },
            ResourcePath::Entity { key, .. } => {
                let processor = entity_processor(set)?;
                match *method {
                    Method::GET => {
                        let options = QueryOptions::parse(query, set.ty)?;
                        processor.read_entity(&self.root, key, &options).await
                    },
                    Method::PUT | Method::PATCH => processor.update_entity(key).await,
                    Method::DELETE => processor.delete_entity(key).await,
                    _ => Err(ODataError::MethodNotAllowed),
                }
            },
            ResourcePath::Property { key, property, .. } => {
                let processor = primitive_processor(set)?;
                match *method {
                    Method::GET => processor.read_primitive(&self.root, key, &property).await,
                    Method::PUT | Method::PATCH => processor.update_primitive(key, &property).await,
                    Method::DELETE => processor.delete_primitive(key, &property).await,
                    _ => Err(ODataError::MethodNotAllowed),
                }
            },
            ResourcePath::PropertyValue { key, property, .. } => {
                let processor = primitive_processor(set)?;
                match *method {
                    Method::GET => processor.read_primitive_value(key, &property).await,
                    Method::PUT => processor.update_primitive(key, &property).await,
                    _ => Err(ODataError::MethodNotAllowed),
                }
            },
            ResourcePath::ServiceDocument | ResourcePath::Metadata => Err(ODataError::MethodNotAllowed),
        }
    }
}

fn entity_processor(set: &EntitySet) -> Result<&dyn EntityCollectionProcessor> {
    set.entity
        .as_deref()
        .ok_or_else(|| ODataError::NotImplemented(format!("entity access to {}", set.ty.set_name)))
}

fn primitive_processor(set: &EntitySet) -> Result<&dyn PrimitivePropertyProcessor> {
    set.primitive
        .as_deref()
        .ok_or_else(|| ODataError::NotImplemented(format!("property access to {}", set.ty.set_name)))
}
