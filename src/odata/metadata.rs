//! CSDL `$metadata` document.

use crate::odata::edm::EntityType;

pub const NAMESPACE: &str = "Shopfloor";
pub const CONTAINER: &str = "Container";

/// Render the CSDL XML describing `types`.
pub fn document<'a>(types: impl IntoIterator<Item = &'a EntityType> + Clone) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?><edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0"><edmx:DataServices>"#,
    );
    xml.push_str(&format!(
        r#"<Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="{NAMESPACE}">"#
    ));

    for ty in types.clone() {
        xml.push_str(&format!(
            r#"<EntityType Name="{}"><Key><PropertyRef Name="{}"/></Key>"#,
            ty.name, ty.key.name
        ));
        for property in ty.properties {
            xml.push_str(&format!(
                r#"<Property Name="{}" Type="{}" Nullable="{}"/>"#,
                property.name,
                property.kind.name(),
                property.nullable
            ));
        }
        xml.push_str("</EntityType>");
    }

    xml.push_str(&format!(r#"<EntityContainer Name="{CONTAINER}">"#));
    for ty in types {
        xml.push_str(&format!(
            r#"<EntitySet Name="{}" EntityType="{NAMESPACE}.{}"/>"#,
            ty.set_name, ty.name
        ));
    }
    xml.push_str("</EntityContainer></Schema></edmx:DataServices></edmx:Edmx>");
    xml
}
