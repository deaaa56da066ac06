//! Member classification.
//!
//! Every instance field/property of a type collapses into one copy strategy,
//! computed once per type and cached alongside the compiled routine. Anything
//! the generator cannot handle is skipped with a reason, never a failure —
//! a routine that copies fewer members is still a valid routine.

use crate::universe::{TypeDescriptor, TypeKind, TypeRef, TypeUniverse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StaticMember,
    ReadOnlyField,
    /// Property without both a getter and a setter.
    AccessorMissing,
    NonPublicAccessor,
    /// Member type (or element type) cannot be named in generated source.
    NonPublicType,
    /// Classification could not be determined (unknown named type,
    /// array-of-array, ...).
    UnsupportedShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStrategy {
    /// Primitive, string or struct value: `new.m = old.m;`
    Direct,
    /// Array of by-value elements: allocate, element-wise assignment loop.
    PrimitiveArray { elem: TypeRef },
    /// Array of class elements: allocate, element-wise recursive clone loop.
    CloneArray { elem_type: String },
    /// Enumerable collection: reference assignment, never traversed.
    CollectionRef,
    /// Public class: null-guarded recursive clone call.
    NestedClone { type_name: String },
    Skip(SkipReason),
}

impl CopyStrategy {
    /// The nested class type this strategy depends on, if any. Drives the
    /// component walk in the generator.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            CopyStrategy::CloneArray { elem_type } => Some(elem_type),
            CopyStrategy::NestedClone { type_name } => Some(type_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedMember {
    pub name: String,
    pub ty: TypeRef,
    pub strategy: CopyStrategy,
}

/// Per-type plan: members in declaration order (fields first, then
/// properties). This order fixes the emitted method layout.
#[derive(Debug, Clone)]
pub struct ClonePlan {
    pub type_name: String,
    pub members: Vec<PlannedMember>,
}

impl ClonePlan {
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.members.iter().filter_map(|m| m.strategy.dependency())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSIFICATION
// ————————————————————————————————————————————————————————————————————————————

pub fn classify_type(descriptor: &TypeDescriptor, universe: &TypeUniverse) -> ClonePlan {
    let mut members = Vec::new();

    for field in &descriptor.fields {
        let strategy = if field.is_static {
            CopyStrategy::Skip(SkipReason::StaticMember)
        } else if field.is_read_only {
            CopyStrategy::Skip(SkipReason::ReadOnlyField)
        } else {
            classify_member_type(&field.ty, universe)
        };
        members.push(PlannedMember {
            name: field.name.clone(),
            ty: field.ty.clone(),
            strategy,
        });
    }

    for prop in &descriptor.properties {
        let strategy = if prop.is_static {
            CopyStrategy::Skip(SkipReason::StaticMember)
        } else if !prop.has_getter || !prop.has_setter {
            CopyStrategy::Skip(SkipReason::AccessorMissing)
        } else if !prop.getter_public || !prop.setter_public {
            CopyStrategy::Skip(SkipReason::NonPublicAccessor)
        } else {
            classify_member_type(&prop.ty, universe)
        };
        members.push(PlannedMember {
            name: prop.name.clone(),
            ty: prop.ty.clone(),
            strategy,
        });
    }

    ClonePlan {
        type_name: descriptor.name.clone(),
        members,
    }
}

fn classify_member_type(ty: &TypeRef, universe: &TypeUniverse) -> CopyStrategy {
    match ty {
        TypeRef::Bool | TypeRef::Int | TypeRef::Float | TypeRef::Str => CopyStrategy::Direct,

        TypeRef::Array(elem) => match elem.as_ref() {
            e if e.is_primitive() => CopyStrategy::PrimitiveArray { elem: e.clone() },
            TypeRef::Named { name, .. } => match universe.get(name) {
                Some(d) if d.kind == TypeKind::Struct => {
                    CopyStrategy::PrimitiveArray { elem: elem.as_ref().clone() }
                }
                Some(d) if !d.is_public => CopyStrategy::Skip(SkipReason::NonPublicType),
                // The shallow-collection policy applies to direct members
                // only; array elements recurse like any public class.
                Some(_) => CopyStrategy::CloneArray { elem_type: name.clone() },
                None => CopyStrategy::Skip(SkipReason::UnsupportedShape),
            },
            // Array of arrays.
            _ => CopyStrategy::Skip(SkipReason::UnsupportedShape),
        },

        TypeRef::Named { name, .. } => match universe.get(name) {
            Some(d) if d.kind == TypeKind::Struct => CopyStrategy::Direct,
            Some(d) if !d.is_public => CopyStrategy::Skip(SkipReason::NonPublicType),
            Some(d) if d.is_enumerable => CopyStrategy::CollectionRef,
            Some(_) => CopyStrategy::NestedClone { type_name: name.clone() },
            None => CopyStrategy::Skip(SkipReason::UnsupportedShape),
        },
    }
}

// ------------------------------- Tests ------------------------------------ //
