//! Resource paths below the service root.

use crate::odata::error::{ODataError, Result};

const METADATA: &str = "$metadata";
const COUNT: &str = "$count";
const VALUE: &str = "$value";

/// Addressed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePath {
    ServiceDocument,
    Metadata,
    Collection {
        set: String,
    },
    Count {
        set: String,
    },
    Entity {
        set: String,
        key: i64,
    },
    Property {
        set: String,
        key: i64,
        property: String,
    },
    PropertyValue {
        set: String,
        key: i64,
        property: String,
    },
}

impl ResourcePath {
    /// Parse an already percent-decoded path, e.g. `Orders(3)/Name/$value`.
    ///
    /// `key_name` resolves the key property name of an entity set, used to
    /// accept the `Orders(Id=3)` form.
    pub fn parse(path: &str, key_name: impl Fn(&str) -> Option<&'static str>) -> Result<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match segments.as_slice() {
            [""] => Ok(Self::ServiceDocument),
            [METADATA] => Ok(Self::Metadata),
            [head, rest @ ..] => {
                let (set, key) = split_key(head, &key_name)?;
                match (key, rest) {
                    (None, []) => Ok(Self::Collection { set }),
                    (None, [COUNT]) => Ok(Self::Count { set }),
                    (Some(key), []) => Ok(Self::Entity { set, key }),
                    (Some(key), [property]) if !property.starts_with('$') => Ok(Self::Property {
                        set,
                        key,
                        property: (*property).to_owned(),
                    }),
                    (Some(key), [property, VALUE]) => Ok(Self::PropertyValue {
                        set,
                        key,
                        property: (*property).to_owned(),
                    }),
                    _ => Err(ODataError::NotFound(format!("resource '{path}'"))),
                }
            },
            [] => Ok(Self::ServiceDocument),
        }
    }

    /// Entity set addressed by this path, if any.
    pub fn entity_set(&self) -> Option<&str> {
        match self {
            Self::ServiceDocument | Self::Metadata => None,
            Self::Collection { set }
            | Self::Count { set }
            | Self::Entity { set, .. }
            | Self::Property { set, .. }
            | Self::PropertyValue { set, .. } => Some(set),
        }
    }
}

/// Split `Orders(3)` into `("Orders", Some(3))`.
fn split_key(
    segment: &str,
    key_name: &impl Fn(&str) -> Option<&'static str>,
) -> Result<(String, Option<i64>)> {
    let Some(open) = segment.find('(') else {
        return Ok((segment.to_owned(), None));
    };
    let Some(inner) = segment[open + 1..].strip_suffix(')') else {
        return Err(ODataError::bad_request(format!("malformed key in '{segment}'")));
    };

    let set = &segment[..open];
    let value = match inner.split_once('=') {
        Some((name, value)) => {
            if key_name(set) != Some(name.trim()) {
                return Err(ODataError::bad_request(format!(
                    "'{}' is not the key of '{set}'",
                    name.trim()
                )));
            }
            value
        },
        None => inner,
    };

    let key = value
        .trim()
        .parse::<i64>()
        .map_err(|_| ODataError::bad_request(format!("invalid key '{}'", value.trim())))?;

    Ok((set.to_owned(), Some(key)))
}
