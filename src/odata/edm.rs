//! Entity data model: the static description of every exposed entity type.

/// Primitive types a property may have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdmType {
    Int32,
    Int64,
    Double,
    Boolean,
    String,
    DateTimeOffset,
}

impl EdmType {
    /// Qualified CSDL name.
    pub fn name(&self) -> &'static str {
        match self {
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::Double => "Edm.Double",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::String => "Edm.String",
            EdmType::DateTimeOffset => "Edm.DateTimeOffset",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, EdmType::Int32 | EdmType::Int64 | EdmType::Double)
    }

    /// Whether values of both types can be compared with each other.
    pub fn is_comparable_with(&self, other: EdmType) -> bool {
        *self == other || (self.is_numeric() && other.is_numeric())
    }
}

/// Structural property of an entity type.
#[derive(Debug, PartialEq, Eq)]
pub struct Property {
    /// Name exposed through OData.
    pub name: &'static str,
    /// Backing column.
    pub column: &'static str,
    pub kind: EdmType,
    pub nullable: bool,
}

impl Property {
    pub const fn new(name: &'static str, column: &'static str, kind: EdmType) -> Self {
        Self {
            name,
            column,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Entity type bound to its entity set and table.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityType {
    pub name: &'static str,
    pub set_name: &'static str,
    pub table: &'static str,
    /// Single `Edm.Int64` key property, part of `properties`.
    pub key: &'static Property,
    pub properties: &'static [Property],
}

impl EntityType {
    /// Lookup a property by its OData name.
    pub fn property(&self, name: &str) -> Option<&'static Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}
