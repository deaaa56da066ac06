//! Dynamic runtime values.
//!
//! Synthesized callables run over this model. The split mirrors the copy
//! semantics the clone generator relies on:
//!
//! - `Object` and `Collection` are shared handles (`Arc`): assigning one
//!   copies the reference, and identity is observable via [`Value::ptr_eq`].
//! - `Struct` and `Array` are inline: a plain `clone` duplicates them.
//!
//! Interiors are guarded with `parking_lot` locks so callables stay `Send +
//! Sync` without poisoning concerns.

use std::sync::Arc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;

use crate::universe::{TypeKind, TypeRef, TypeUniverse};

// ————————————————————————————————————————————————————————————————————————————
// VALUE MODEL
// ————————————————————————————————————————————————————————————————————————————

/// Mutable state of one class instance. Fields and properties share this
/// storage; both are addressed by name.
#[derive(Debug, Clone)]
pub struct Instance {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
}

/// Inline value-semantics aggregate (a `struct` kind in the universe).
/// Compared through [`Value::structurally_eq`], not `PartialEq`.
#[derive(Debug, Clone)]
pub struct StructVal {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    /// Inline array; element-wise copies are what the emitted loops perform.
    Array(Vec<Value>),
    /// Inline value-type aggregate.
    Struct(Box<StructVal>),
    /// Reference-type instance; identity-bearing.
    Object(Arc<RwLock<Instance>>),
    /// Enumerable collection; identity-bearing, shallow-copied by policy.
    Collection(Arc<RwLock<Vec<Value>>>),
}

impl Value {
    pub fn object(instance: Instance) -> Self {
        Value::Object(Arc::new(RwLock::new(instance)))
    }

    pub fn collection(items: Vec<Value>) -> Self {
        Value::Collection(Arc::new(RwLock::new(items)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reference identity for the identity-bearing variants. Inline variants
    /// never alias, so they are never `ptr_eq`.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Collection(a), Value::Collection(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality. Objects and collections compare by content here
    /// (identity checks go through [`Value::ptr_eq`]).
    pub fn structurally_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structurally_eq(y))
            }
            (Value::Struct(a), Value::Struct(b)) => {
                a.type_name == b.type_name
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.structurally_eq(vb)
                    })
            }
            (Value::Object(a), Value::Object(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.type_name == b.type_name
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.structurally_eq(vb)
                    })
            }
            (Value::Collection(a), Value::Collection(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structurally_eq(y))
            }
            _ => false,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFAULTS & CONSTRUCTION
// ————————————————————————————————————————————————————————————————————————————

/// Default value for a declared type, as produced by `new T()` for the
/// members of `T` and by `new E[n]` for array slots.
pub fn default_for(ty: &TypeRef, universe: &TypeUniverse) -> Value {
    match ty {
        TypeRef::Bool => Value::Bool(false),
        TypeRef::Int => Value::Int(0),
        TypeRef::Float => Value::Float(OrderedFloat(0.0)),
        TypeRef::Str => Value::Str(String::new()),
        // Arrays, classes and collections default to null, like any reference.
        TypeRef::Array(_) => Value::Null,
        TypeRef::Named { name, .. } => match universe.get(name).map(|d| d.kind) {
            Some(TypeKind::Struct) => Value::Struct(Box::new(StructVal {
                type_name: name.clone(),
                fields: struct_defaults(name, universe),
            })),
            _ => Value::Null,
        },
    }
}

fn struct_defaults(name: &str, universe: &TypeUniverse) -> IndexMap<String, Value> {
    let mut fields = IndexMap::new();
    if let Some(descriptor) = universe.get(name) {
        for f in &descriptor.fields {
            fields.insert(f.name.clone(), default_for(&f.ty, universe));
        }
        for p in &descriptor.properties {
            fields.insert(p.name.clone(), default_for(&p.ty, universe));
        }
    }
    fields
}

/// Fresh instance of a class type with every declared member defaulted.
pub fn blank_instance(name: &str, universe: &TypeUniverse) -> Instance {
    Instance {
        type_name: name.to_string(),
        fields: struct_defaults(name, universe),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// JSON CONVERSION (CLI sample files)
// ————————————————————————————————————————————————————————————————————————————

/// Build a typed `Value` from untyped JSON, guided by the declared type.
/// Used by the CLI to load sample instances; unknown fields are ignored,
/// missing fields get defaults.
pub fn from_json(json: &serde_json::Value, ty: &TypeRef, universe: &TypeUniverse) -> Value {
    use serde_json::Value as J;
    match (ty, json) {
        (_, J::Null) => Value::Null,
        (TypeRef::Bool, J::Bool(b)) => Value::Bool(*b),
        (TypeRef::Int, J::Number(n)) => Value::Int(n.as_i64().unwrap_or(0)),
        (TypeRef::Float, J::Number(n)) => Value::Float(OrderedFloat(n.as_f64().unwrap_or(0.0))),
        (TypeRef::Str, J::String(s)) => Value::Str(s.clone()),
        (TypeRef::Array(elem), J::Array(items)) => {
            Value::Array(items.iter().map(|v| from_json(v, elem, universe)).collect())
        }
        (TypeRef::Named { name, args }, json) => {
            let Some(descriptor) = universe.get(name) else {
                return Value::Null;
            };
            if descriptor.is_enumerable {
                // Element type is the first generic argument when declared.
                let elem = args.first().cloned().unwrap_or(TypeRef::Str);
                let items = match json {
                    J::Array(items) => items.iter().map(|v| from_json(v, &elem, universe)).collect(),
                    _ => Vec::new(),
                };
                return Value::collection(items);
            }
            let J::Object(map) = json else {
                return Value::Null;
            };
            let mut instance = blank_instance(name, universe);
            for f in &descriptor.fields {
                if let Some(v) = map.get(&f.name) {
                    instance.fields.insert(f.name.clone(), from_json(v, &f.ty, universe));
                }
            }
            for p in &descriptor.properties {
                if let Some(v) = map.get(&p.name) {
                    instance.fields.insert(p.name.clone(), from_json(v, &p.ty, universe));
                }
            }
            match descriptor.kind {
                TypeKind::Struct => Value::Struct(Box::new(StructVal {
                    type_name: instance.type_name,
                    fields: instance.fields,
                })),
                TypeKind::Class => Value::object(instance),
            }
        }
        // Shape mismatch: fall back to null rather than failing a demo load.
        _ => Value::Null,
    }
}

/// Render a `Value` back to JSON for display.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int(i) => J::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(f.0).map(J::Number).unwrap_or(J::Null),
        Value::Str(s) => J::String(s.clone()),
        Value::Array(items) => J::Array(items.iter().map(to_json).collect()),
        Value::Struct(s) => {
            let mut map = serde_json::Map::new();
            for (k, v) in &s.fields {
                map.insert(k.clone(), to_json(v));
            }
            J::Object(map)
        }
        Value::Object(o) => {
            let o = o.read();
            let mut map = serde_json::Map::new();
            for (k, v) in &o.fields {
                map.insert(k.clone(), to_json(v));
            }
            J::Object(map)
        }
        Value::Collection(c) => J::Array(c.read().iter().map(to_json).collect()),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{FieldDescriptor, TypeDescriptor};

    fn small_universe() -> TypeUniverse {
        let mut u = TypeUniverse::new();
        u.insert(TypeDescriptor {
            name: "Point".into(),
            kind: TypeKind::Class,
            is_public: true,
            is_enumerable: false,
            fields: vec![
                FieldDescriptor { name: "x".into(), ty: TypeRef::Int, is_static: false, is_read_only: false },
                FieldDescriptor { name: "y".into(), ty: TypeRef::Int, is_static: false, is_read_only: false },
            ],
            properties: vec![],
        });
        u
    }

    #[test]
    fn object_identity_vs_structural_equality() {
        let u = small_universe();
        let a = Value::object(blank_instance("Point", &u));
        let b = Value::object(blank_instance("Point", &u));
        assert!(!a.ptr_eq(&b));
        assert!(a.structurally_eq(&b));
        let a2 = a.clone();
        assert!(a.ptr_eq(&a2));
    }

    #[test]
    fn json_round_trip_for_a_class_instance() {
        let u = small_universe();
        let json = serde_json::json!({ "x": 3, "y": 7 });
        let v = from_json(&json, &TypeRef::named("Point"), &u);
        assert_eq!(to_json(&v), json);
    }

    #[test]
    fn struct_values_compare_structurally() {
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Int(1));
        let a = Value::Struct(Box::new(StructVal { type_name: "S".into(), fields: fields.clone() }));
        let b = Value::Struct(Box::new(StructVal { type_name: "S".into(), fields }));
        assert!(a.structurally_eq(&b));
        // Inline variants never alias.
        assert!(!a.ptr_eq(&b));
        let c = Value::Struct(Box::new(StructVal {
            type_name: "S".into(),
            fields: IndexMap::new(),
        }));
        assert!(!a.structurally_eq(&c));
    }

    #[test]
    fn defaults_follow_declared_types() {
        let u = small_universe();
        match default_for(&TypeRef::named("Point"), &u) {
            Value::Null => {}
            other => panic!("class default should be null, got {other:?}"),
        }
        assert!(default_for(&TypeRef::Int, &u).structurally_eq(&Value::Int(0)));
        assert!(default_for(&TypeRef::array(TypeRef::Int), &u).is_null());
    }
}
