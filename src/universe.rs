//! The structural type universe.
//!
//! There is no runtime reflection to lean on, so the shapes the engine can
//! synthesize code for are declared up front: an ordered map from type name to
//! `TypeDescriptor`. Declaration order of fields and properties is load-bearing
//! downstream (emitted member order is exactly declaration order).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ————————————————————————————————————————————————————————————————————————————
// TYPE REFERENCES
// ————————————————————————————————————————————————————————————————————————————

/// A reference to a type as it appears in a member declaration.
///
/// `Named.args` carries generic arguments for name rendering only; universe
/// lookups always go through the base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Bool,
    Int,
    Float,
    Str,
    Array(Box<TypeRef>),
    Named {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<TypeRef>,
    },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named { name: name.into(), args: Vec::new() }
    }

    pub fn array(elem: TypeRef) -> Self {
        TypeRef::Array(Box::new(elem))
    }

    /// Primitive here means "copied by direct assignment": bool/int/float/string.
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Bool | TypeRef::Int | TypeRef::Float | TypeRef::Str)
    }

    /// Base name for universe lookup, if this is a named type.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named { name, .. } => Some(name),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DESCRIPTORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Reference semantics: instances are shared handles, eligible for deep clone.
    Class,
    /// Value semantics: copied whole on assignment, never recursed into.
    Struct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default = "default_true")]
    pub has_getter: bool,
    #[serde(default = "default_true")]
    pub has_setter: bool,
    #[serde(default = "default_true")]
    pub getter_public: bool,
    #[serde(default = "default_true")]
    pub setter_public: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: TypeKind,
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// Enumerable/collection capability. Members of such a type are copied by
    /// reference, never traversed (deliberate shallow policy).
    #[serde(default)]
    pub is_enumerable: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

fn default_kind() -> TypeKind {
    TypeKind::Class
}

// ————————————————————————————————————————————————————————————————————————————
// UNIVERSE
// ————————————————————————————————————————————————————————————————————————————

/// Ordered name → descriptor map. Order matters for deterministic output when
/// iterating (e.g. the CLI listing every type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeUniverse {
    pub types: IndexMap<String, TypeDescriptor>,
}

impl TypeUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Parse a universe from JSON with path-qualified error messages.
    pub fn from_json_str(source: &str) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
        let de = &mut serde_json::Deserializer::from_str(source);
        serde_path_to_error::deserialize(de)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_round_trips_through_json() {
        let src = r#"{
            "types": {
                "Node": {
                    "name": "Node",
                    "fields": [
                        { "name": "value", "ty": "int" },
                        { "name": "next", "ty": { "named": { "name": "Node" } } }
                    ]
                }
            }
        }"#;
        let universe = TypeUniverse::from_json_str(src).unwrap();
        let node = universe.get("Node").unwrap();
        assert_eq!(node.kind, TypeKind::Class);
        assert!(node.is_public);
        assert_eq!(node.fields.len(), 2);
        assert_eq!(node.fields[0].ty, TypeRef::Int);
        assert_eq!(node.fields[1].ty, TypeRef::named("Node"));
    }

    #[test]
    fn field_declaration_order_is_preserved() {
        let src = r#"{
            "types": {
                "T": {
                    "name": "T",
                    "fields": [
                        { "name": "z", "ty": "int" },
                        { "name": "a", "ty": "str" },
                        { "name": "m", "ty": "bool" }
                    ]
                }
            }
        }"#;
        let universe = TypeUniverse::from_json_str(src).unwrap();
        let names: Vec<&str> = universe.get("T").unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn bad_universe_reports_the_json_path() {
        let src = r#"{ "types": { "T": { "name": "T", "fields": [ { "name": "x", "ty": "no_such" } ] } } }"#;
        let err = TypeUniverse::from_json_str(src).unwrap_err();
        assert!(err.path().to_string().contains("fields[0]"));
    }
}
