//! System query options (`$filter`, `$orderby`, `$top`, ...).

use crate::odata::edm::EntityType;
use crate::odata::error::{ODataError, Result};
use crate::odata::filter::Expr;
use crate::odata::specification::{Direction, OrderBy, Specification};

/// Options recognized but not served by this implementation.
const UNSUPPORTED: &[&str] = &["$expand", "$search", "$apply", "$skiptoken", "$compute"];

/// Parsed system query options of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub select: Option<Vec<String>>,
    pub count: bool,
    /// Raw `$filter`, `$orderby` and `$select` to rebuild next links.
    forwarded: Vec<(String, String)>,
}

impl QueryOptions {
    /// Parse a raw, still encoded, query string against `ty`.
    pub fn parse(query: Option<&str>, ty: &EntityType) -> Result<Self> {
        let mut options = Self::default();
        let mut seen = Vec::new();

        for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            if !name.starts_with('$') {
                // Custom query options carry no meaning here.
                continue;
            }
            if seen.contains(&name) {
                return Err(ODataError::bad_request(format!("duplicate query option '{name}'")));
            }

            match &*name {
                "$filter" => {
                    options.filter = Some(Expr::parse(&value, ty)?);
                    options.forwarded.push((name.to_string(), value.to_string()));
                },
                "$orderby" => {
                    options.order_by = parse_order_by(&value, ty)?;
                    options.forwarded.push((name.to_string(), value.to_string()));
                },
                "$select" => {
                    options.select = parse_select(&value, ty)?;
                    options.forwarded.push((name.to_string(), value.to_string()));
                },
                "$top" => options.top = Some(parse_unsigned(&name, &value)?),
                "$skip" => options.skip = Some(parse_unsigned(&name, &value)?),
                "$count" => {
                    options.count = match &*value {
                        "true" => true,
                        "false" => false,
                        _ => {
                            return Err(ODataError::bad_request("$count must be 'true' or 'false'"));
                        },
                    }
                },
                "$format" => {
                    if !matches!(&*value, "json" | "application/json") {
                        return Err(ODataError::bad_request(format!(
                            "unsupported $format '{value}'"
                        )));
                    }
                },
                other if UNSUPPORTED.contains(&other) => {
                    return Err(ODataError::NotImplemented(other.to_owned()));
                },
                other => {
                    return Err(ODataError::bad_request(format!("unknown query option '{other}'")));
                },
            }
            seen.push(name);
        }

        Ok(options)
    }

    /// Specification fetching one page.
    pub fn specification(&self, limit: Option<u64>) -> Specification {
        Specification::all()
            .with_filter(self.filter.clone())
            .with_order_by(self.order_by.clone())
            .with_paging(self.skip.unwrap_or_default(), limit)
    }

    /// Query string of the page starting at `skip`, with the same filter,
    /// ordering and selection. `top` is what the client still expects.
    pub fn next_page_query(&self, skip: u64, top: Option<u64>) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.forwarded {
            serializer.append_pair(name, value);
        }
        if self.count {
            serializer.append_pair("$count", "true");
        }
        serializer.append_pair("$skip", &skip.to_string());
        if let Some(top) = top {
            serializer.append_pair("$top", &top.to_string());
        }
        serializer.finish()
    }
}

fn parse_unsigned(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ODataError::bad_request(format!("{name} must be a non-negative integer")))
}

/// `Name desc, Id` into ordered properties.
fn parse_order_by(value: &str, ty: &EntityType) -> Result<Vec<OrderBy>> {
    value
        .split(',')
        .map(|item| {
            let mut parts = item.split_whitespace();
            let property = parts
                .next()
                .ok_or_else(|| ODataError::bad_request("empty $orderby item"))?;
            let direction = match parts.next() {
                None | Some("asc") => Direction::Asc,
                Some("desc") => Direction::Desc,
                Some(other) => {
                    return Err(ODataError::bad_request(format!(
                        "invalid $orderby direction '{other}'"
                    )));
                },
            };
            if parts.next().is_some() {
                return Err(ODataError::bad_request(format!("invalid $orderby item '{item}'")));
            }
            if ty.property(property).is_none() {
                return Err(ODataError::bad_request(format!(
                    "unknown property '{property}' in $orderby"
                )));
            }

            Ok(OrderBy {
                property: property.to_owned(),
                direction,
            })
        })
        .collect()
}

/// `$select`, `None` meaning every property.
fn parse_select(value: &str, ty: &EntityType) -> Result<Option<Vec<String>>> {
    let mut selected = Vec::new();
    for item in value.split(',').map(str::trim) {
        if item == "*" {
            return Ok(None);
        }
        if ty.property(item).is_none() {
            return Err(ODataError::bad_request(format!(
                "unknown property '{item}' in $select"
            )));
        }
        if !selected.iter().any(|s| s == item) {
            selected.push(item.to_owned());
        }
    }
    Ok(Some(selected))
}
