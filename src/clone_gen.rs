//! Clone routine synthesis.
//!
//! `ensure(T)` hands back a compiled `T -> T` deep-copy callable, generating
//! and compiling it on first request. Cycles (self-referential types, mutual
//! recursion) are handled by synthesizing a whole connected component at a
//! time: the member graph is walked first with a visited set, every unit in
//! the component is compiled and loaded, and only then is anything registered
//! in the cache. Cross-unit calls resolve by name at invoke time, so a unit
//! may freely reference a partner that appears later in the component.

use std::sync::Arc;

use crate::ast::{Expr, Stmt, render_block};
use crate::bridge::{
    Callable, CompileMode, CompilerBridge, ErrorReporter, noop_reporter,
};
use crate::builder::MethodBuilder;
use crate::cache::{CacheEntry, SynthesisCache};
use crate::classify::{ClonePlan, CopyStrategy, classify_type};
use crate::error::SynthesisError;
use crate::type_name;
use crate::universe::{TypeDescriptor, TypeKind, TypeRef, TypeUniverse};

/// Generated units are named `<GENERATED_PREFIX><TypeName>`.
pub const GENERATED_PREFIX: &str = "DeepClone";
pub const CLONE_MEMBER: &str = "Clone";

const OLD: &str = "oldInstance";
const NEW: &str = "newInstance";
const LOOP_VAR: &str = "i";

pub fn clone_unit_name(type_name: &str) -> String {
    format!("{GENERATED_PREFIX}{type_name}")
}

pub struct CloneSynthesizer {
    universe: Arc<TypeUniverse>,
    bridge: Arc<dyn CompilerBridge>,
    cache: Arc<SynthesisCache>,
    reporter: ErrorReporter,
    mode: CompileMode,
}

impl CloneSynthesizer {
    pub fn new(universe: Arc<TypeUniverse>, bridge: Arc<dyn CompilerBridge>) -> Self {
        CloneSynthesizer {
            universe,
            bridge,
            cache: Arc::new(SynthesisCache::new()),
            reporter: noop_reporter(),
            mode: CompileMode::InMemory,
        }
    }

    /// Share a cache across synthesizers. Synthesizers sharing a cache must
    /// also share the underlying bridge: the cached callables resolve their
    /// nested calls through that bridge's linker.
    pub fn with_cache(mut self, cache: Arc<SynthesisCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache(&self) -> &Arc<SynthesisCache> {
        &self.cache
    }

    // ————————————————————————————————————————————————————————————————————————
    // PUBLIC API
    // ————————————————————————————————————————————————————————————————————————

    /// Get or create the compiled clone routine for `type_name`.
    ///
    /// Present in the cache: returned immediately, no recompilation. Absent:
    /// the whole connected component of not-yet-cached types is generated,
    /// compiled and registered. Any sub-unit failure aborts the outer
    /// synthesis and leaves the cache untouched, so a later retry re-runs
    /// the component from scratch.
    pub fn ensure(&self, type_name: &str) -> Result<Callable, SynthesisError> {
        if let Some(entry) = self.cache.get(type_name) {
            return Ok(entry.callable);
        }

        let component = self.collect_component(type_name)?;
        let mut compiled = Vec::with_capacity(component.len());
        for (name, plan) in component {
            let callable = self.compile_unit(&name, &plan)?;
            compiled.push((name, plan, callable));
        }
        for (name, plan, callable) in compiled {
            self.cache.insert_if_absent(&name, CacheEntry { callable, plan: Arc::new(plan) });
        }

        Ok(self
            .cache
            .get(type_name)
            .expect("component synthesis registers its root")
            .callable)
    }

    /// Render the source of every unit `ensure(type_name)` would compile,
    /// without compiling anything. Cached types are pruned exactly as in
    /// `ensure`, so on a fresh cache this is the complete component.
    pub fn generated_source(&self, type_name: &str) -> Result<Vec<(String, String)>, SynthesisError> {
        let component = self.collect_component(type_name)?;
        let mut out = Vec::with_capacity(component.len());
        for (name, plan) in component {
            let builder = self.configured_builder(&name, &plan)?;
            out.push((clone_unit_name(&name), builder.render()));
        }
        Ok(out)
    }

    // ————————————————————————————————————————————————————————————————————————
    // COMPONENT WALK
    // ————————————————————————————————————————————————————————————————————————

    /// DFS preorder over the nested-class member graph, pruned at cached
    /// types. The visited set makes cycles terminate.
    fn collect_component(&self, root: &str) -> Result<Vec<(String, ClonePlan)>, SynthesisError> {
        let mut visited = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        self.visit(root, &mut visited, &mut ordered)?;
        Ok(ordered)
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut std::collections::HashSet<String>,
        ordered: &mut Vec<(String, ClonePlan)>,
    ) -> Result<(), SynthesisError> {
        if visited.contains(name) || self.cache.contains(name) {
            return Ok(());
        }
        let descriptor = self
            .universe
            .get(name)
            .ok_or_else(|| SynthesisError::UnknownType(name.to_string()))?;
        visited.insert(name.to_string());
        let plan = classify_type(descriptor, &self.universe);
        let deps: Vec<String> = plan.dependencies().map(str::to_string).collect();
        ordered.push((name.to_string(), plan));
        for dep in deps {
            self.visit(&dep, visited, ordered)?;
        }
        Ok(())
    }

    // ————————————————————————————————————————————————————————————————————————
    // EMISSION & COMPILATION
    // ————————————————————————————————————————————————————————————————————————

    fn configured_builder(&self, name: &str, plan: &ClonePlan) -> Result<MethodBuilder, SynthesisError> {
        let descriptor = self
            .universe
            .get(name)
            .ok_or_else(|| SynthesisError::UnknownType(name.to_string()))?;
        let body = emit_clone_body(descriptor, plan);

        let mut builder = MethodBuilder::new();
        builder.mode(self.mode).reporter(self.reporter.clone());
        builder.unit_name(&clone_unit_name(name))?;
        builder.member_name(CLONE_MEMBER)?;
        builder.parameter(TypeRef::named(name), OLD)?;
        for member in &plan.members {
            match &member.strategy {
                CopyStrategy::CloneArray { elem_type } => {
                    builder.reference(&TypeRef::named(elem_type.clone()));
                }
                CopyStrategy::NestedClone { type_name } => {
                    builder.reference(&TypeRef::named(type_name.clone()));
                }
                CopyStrategy::PrimitiveArray { elem } => {
                    builder.reference(elem);
                }
                CopyStrategy::CollectionRef => {
                    builder.reference(&member.ty);
                }
                _ => {}
            }
        }
        builder.returns(Some(TypeRef::named(name)));
        builder.body(&render_block(&body, 2));
        Ok(builder)
    }

    fn compile_unit(&self, name: &str, plan: &ClonePlan) -> Result<Callable, SynthesisError> {
        let mut builder = self.configured_builder(name, plan)?;
        builder.compile_and_bind(self.bridge.as_ref())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BODY EMISSION
// ————————————————————————————————————————————————————————————————————————————

/// One statement run per member, in plan (= declaration) order.
fn emit_clone_body(descriptor: &TypeDescriptor, plan: &ClonePlan) -> Vec<Stmt> {
    let type_text = type_name::render(&TypeRef::named(descriptor.name.as_str()));

    // Value-semantics root: the parameter itself is already a copy.
    if descriptor.kind == TypeKind::Struct {
        return vec![
            Stmt::DeclareLocal {
                ty: type_text,
                name: NEW.into(),
                init: Expr::local(OLD),
            },
            Stmt::Return(Some(Expr::local(NEW))),
        ];
    }

    let mut body = vec![Stmt::DeclareLocal {
        ty: type_text.clone(),
        name: NEW.into(),
        init: Expr::NewObject(type_text),
    }];

    for member in &plan.members {
        let old_member = Expr::field(Expr::local(OLD), member.name.clone());
        let new_member = Expr::field(Expr::local(NEW), member.name.clone());
        match &member.strategy {
            CopyStrategy::Direct | CopyStrategy::CollectionRef => {
                body.push(Stmt::Assign { target: new_member, value: old_member });
            }
            CopyStrategy::PrimitiveArray { elem } => {
                body.extend(emit_array_copy(
                    &old_member,
                    &new_member,
                    &type_name::render(elem),
                    |slot| slot,
                ));
            }
            CopyStrategy::CloneArray { elem_type } => {
                let unit = clone_unit_name(elem_type);
                body.extend(emit_array_copy(&old_member, &new_member, elem_type, |slot| {
                    Expr::Call {
                        unit: unit.clone(),
                        member: CLONE_MEMBER.into(),
                        args: vec![slot],
                    }
                }));
            }
            CopyStrategy::NestedClone { type_name } => {
                body.push(Stmt::If {
                    cond: Expr::not_null(old_member.clone()),
                    then: vec![Stmt::Assign {
                        target: new_member,
                        value: Expr::Call {
                            unit: clone_unit_name(type_name),
                            member: CLONE_MEMBER.into(),
                            args: vec![old_member],
                        },
                    }],
                });
            }
            CopyStrategy::Skip(_) => {}
        }
    }

    body.push(Stmt::Return(Some(Expr::local(NEW))));
    body
}

/// Allocate `new.m = new Elem[old.m.Length];` then copy element-wise, with
/// `element` deciding what lands in each slot (plain value or clone call).
fn emit_array_copy(
    old_member: &Expr,
    new_member: &Expr,
    elem_text: &str,
    element: impl Fn(Expr) -> Expr,
) -> Vec<Stmt> {
    let length = Expr::length(old_member.clone());
    vec![
        Stmt::Assign {
            target: new_member.clone(),
            value: Expr::NewArray { elem: elem_text.to_string(), len: Box::new(length.clone()) },
        },
        Stmt::ForRange {
            var: LOOP_VAR.into(),
            upper: length,
            body: vec![Stmt::Assign {
                target: Expr::index(new_member.clone(), Expr::local(LOOP_VAR)),
                value: element(Expr::index(old_member.clone(), Expr::local(LOOP_VAR))),
            }],
        },
    ]
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::bridge::{Artifact, CallableShape, CompileFailure, Diagnostic};
    use crate::error::SynthesisError;
    use crate::script::ScriptEngine;
    use crate::universe::{FieldDescriptor, PropertyDescriptor, TypeDescriptor, TypeKind};
    use crate::value::{Value, blank_instance};

    fn field(name: &str, ty: TypeRef) -> FieldDescriptor {
        FieldDescriptor { name: name.into(), ty, is_static: false, is_read_only: false }
    }

    fn class(name: &str, fields: Vec<FieldDescriptor>) -> TypeDescriptor {
        TypeDescriptor {
            name: name.into(),
            kind: TypeKind::Class,
            is_public: true,
            is_enumerable: false,
            fields,
            properties: vec![],
        }
    }

    fn universe(types: Vec<TypeDescriptor>) -> Arc<TypeUniverse> {
        let mut u = TypeUniverse::new();
        for t in types {
            u.insert(t);
        }
        Arc::new(u)
    }

    fn synthesizer(u: &Arc<TypeUniverse>) -> (Arc<ScriptEngine>, CloneSynthesizer) {
        let engine = Arc::new(ScriptEngine::new(u.clone()));
        let synth = CloneSynthesizer::new(u.clone(), engine.clone());
        (engine, synth)
    }

    fn set(obj: &Value, name: &str, v: Value) {
        let Value::Object(o) = obj else { panic!("expected object") };
        o.write().fields.insert(name.into(), v);
    }

    fn get(obj: &Value, name: &str) -> Value {
        let Value::Object(o) = obj else { panic!("expected object") };
        o.read().fields.get(name).cloned().unwrap()
    }

    #[test]
    fn golden_source_for_a_flat_type() {
        let u = universe(vec![class(
            "Point",
            vec![
                field("x", TypeRef::Int),
                field("y", TypeRef::Float),
                field("name", TypeRef::Str),
            ],
        )]);
        let (_, synth) = synthesizer(&u);
        let units = synth.generated_source("Point").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, "DeepClonePoint");
        let expected = "\
using Point;

public static class DeepClonePoint
{
    public static Point Clone(Point oldInstance)
    {
        Point newInstance = new Point();
        newInstance.x = oldInstance.x;
        newInstance.y = oldInstance.y;
        newInstance.name = oldInstance.name;
        return newInstance;
    }
}
";
        assert_eq!(units[0].1, expected);
    }

    #[test]
    fn flat_clone_is_equal_but_distinct() {
        let u = universe(vec![class(
            "Point",
            vec![field("x", TypeRef::Int), field("name", TypeRef::Str)],
        )]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Point").unwrap();

        let original = Value::object(blank_instance("Point", &u));
        set(&original, "x", Value::Int(3));
        set(&original, "name", Value::Str("p0".into()));
        let copied = clone.invoke_one(&original).unwrap();
        assert!(copied.structurally_eq(&original));
        assert!(!copied.ptr_eq(&original));
    }

    #[test]
    fn primitive_array_is_copied_element_wise() {
        let u = universe(vec![class("Buffer", vec![field("data", TypeRef::array(TypeRef::Int))])]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Buffer").unwrap();

        let original = Value::object(blank_instance("Buffer", &u));
        set(&original, "data", Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let copied = clone.invoke_one(&original).unwrap();
        assert!(copied.structurally_eq(&original));

        // Mutating the copy must not reach the original's storage.
        {
            let Value::Object(o) = &copied else { unreachable!() };
            let mut guard = o.write();
            let Some(Value::Array(items)) = guard.fields.get_mut("data") else {
                panic!("expected array member")
            };
            items[0] = Value::Int(99);
        }
        assert!(get(&original, "data")
            .structurally_eq(&Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));
    }

    #[test]
    fn nested_class_is_cloned_with_a_null_guard() {
        let u = universe(vec![
            class("Child", vec![field("n", TypeRef::Int)]),
            class("Parent", vec![field("child", TypeRef::named("Child"))]),
        ]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Parent").unwrap();

        let child = Value::object(blank_instance("Child", &u));
        set(&child, "n", Value::Int(7));
        let parent = Value::object(blank_instance("Parent", &u));
        set(&parent, "child", child.clone());
        let copied = clone.invoke_one(&parent).unwrap();
        let copied_child = get(&copied, "child");
        assert!(copied_child.structurally_eq(&child));
        assert!(!copied_child.ptr_eq(&child));

        // Null member: the guard leaves the default in place.
        let orphan = Value::object(blank_instance("Parent", &u));
        let copied = clone.invoke_one(&orphan).unwrap();
        assert!(get(&copied, "child").is_null());
    }

    #[test]
    fn class_array_elements_are_cloned_recursively() {
        let u = universe(vec![
            class("Child", vec![field("n", TypeRef::Int)]),
            class("Roster", vec![field("members", TypeRef::array(TypeRef::named("Child")))]),
        ]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Roster").unwrap();

        let a = Value::object(blank_instance("Child", &u));
        set(&a, "n", Value::Int(1));
        let b = Value::object(blank_instance("Child", &u));
        set(&b, "n", Value::Int(2));
        let roster = Value::object(blank_instance("Roster", &u));
        set(&roster, "members", Value::Array(vec![a.clone(), b.clone()]));

        let copied = clone.invoke_one(&roster).unwrap();
        let Value::Array(items) = get(&copied, "members") else { panic!("expected array") };
        assert_eq!(items.len(), 2);
        assert!(items[0].structurally_eq(&a) && !items[0].ptr_eq(&a));
        assert!(items[1].structurally_eq(&b) && !items[1].ptr_eq(&b));
    }

    #[test]
    fn collection_array_elements_are_cloned_element_wise() {
        let mut tags = class("TagList", vec![]);
        tags.is_enumerable = true;
        let u = universe(vec![
            tags,
            class("Board", vec![field("lists", TypeRef::array(TypeRef::named("TagList")))]),
        ]);
        let (_, synth) = synthesizer(&u);

        // The component carries a routine for the element type, and the
        // member gets the allocation + recursive-clone loop.
        let units = synth.generated_source("Board").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].0, "DeepCloneBoard");
        assert_eq!(units[1].0, "DeepCloneTagList");
        let board_src = &units[0].1;
        assert!(board_src.contains("newInstance.lists = new TagList[oldInstance.lists.Length];"));
        assert!(board_src.contains("newInstance.lists[i] = DeepCloneTagList.Clone(oldInstance.lists[i]);"));

        let clone = synth.ensure("Board").unwrap();
        let elem = Value::collection(vec![Value::Str("red".into())]);
        let board = Value::object(blank_instance("Board", &u));
        set(&board, "lists", Value::Array(vec![elem.clone()]));
        let copied = clone.invoke_one(&board).unwrap();
        let Value::Array(items) = get(&copied, "lists") else { panic!("expected array") };
        assert_eq!(items.len(), 1);
        // The element routine copies declared members only; identity is fresh.
        assert!(matches!(items[0], Value::Collection(_)));
        assert!(!items[0].ptr_eq(&elem));
    }

    #[test]
    fn collection_members_share_the_reference() {
        let mut tags = class("TagList", vec![]);
        tags.is_enumerable = true;
        let u = universe(vec![
            tags,
            class("Team", vec![field("tags", TypeRef::named("TagList"))]),
        ]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Team").unwrap();

        let team = Value::object(blank_instance("Team", &u));
        set(&team, "tags", Value::collection(vec![Value::Str("red".into())]));
        let copied = clone.invoke_one(&team).unwrap();
        assert!(get(&copied, "tags").ptr_eq(&get(&team, "tags")));
    }

    #[test]
    fn struct_members_copy_by_value() {
        let mut spot = class("Spot", vec![field("x", TypeRef::Int)]);
        spot.kind = TypeKind::Struct;
        let u = universe(vec![
            spot,
            class("Holder", vec![field("spot", TypeRef::named("Spot"))]),
        ]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Holder").unwrap();

        let holder = Value::object(blank_instance("Holder", &u));
        let copied = clone.invoke_one(&holder).unwrap();
        assert!(copied.structurally_eq(&holder));
        {
            let Value::Object(o) = &copied else { unreachable!() };
            let mut guard = o.write();
            let Some(Value::Struct(s)) = guard.fields.get_mut("spot") else {
                panic!("expected struct member")
            };
            s.fields.insert("x".into(), Value::Int(9));
        }
        assert!(!copied.structurally_eq(&holder));

        // A struct root is value-copied whole.
        let unit = synth.generated_source("Spot").unwrap();
        assert!(unit[0].1.contains("Spot newInstance = oldInstance;"));
        let spot_clone = synth.ensure("Spot").unwrap();
        let original = crate::value::default_for(&TypeRef::named("Spot"), &u);
        let copied = spot_clone.invoke_one(&original).unwrap();
        assert!(copied.structurally_eq(&original));
    }

    #[test]
    fn skipped_members_are_absent_from_the_source() {
        let mut t = class(
            "Mixed",
            vec![field("kept", TypeRef::Int), field("frozen", TypeRef::Int), field("global", TypeRef::Int)],
        );
        t.fields[1].is_read_only = true;
        t.fields[2].is_static = true;
        t.properties = vec![PropertyDescriptor {
            name: "view".into(),
            ty: TypeRef::Int,
            is_static: false,
            has_getter: true,
            has_setter: false,
            getter_public: true,
            setter_public: true,
        }];
        let u = universe(vec![t]);
        let (_, synth) = synthesizer(&u);
        let source = &synth.generated_source("Mixed").unwrap()[0].1;
        assert!(source.contains("newInstance.kept = oldInstance.kept;"));
        assert!(!source.contains("frozen"));
        assert!(!source.contains("global"));
        assert!(!source.contains("view"));
    }

    #[test]
    fn self_referential_chain_clones_deeply() {
        let u = universe(vec![class(
            "Node",
            vec![field("value", TypeRef::Int), field("next", TypeRef::named("Node"))],
        )]);
        let (_, synth) = synthesizer(&u);
        let clone = synth.ensure("Node").unwrap();

        let tail = Value::object(blank_instance("Node", &u));
        set(&tail, "value", Value::Int(3));
        let mid = Value::object(blank_instance("Node", &u));
        set(&mid, "value", Value::Int(2));
        set(&mid, "next", tail.clone());
        let head = Value::object(blank_instance("Node", &u));
        set(&head, "value", Value::Int(1));
        set(&head, "next", mid.clone());

        let copied = clone.invoke_one(&head).unwrap();
        let mut originals = vec![head, mid, tail];
        let mut cursor = copied;
        for (i, original) in originals.drain(..).enumerate() {
            assert!(get(&cursor, "value").structurally_eq(&Value::Int(i as i64 + 1)));
            assert!(!cursor.ptr_eq(&original));
            cursor = get(&cursor, "next");
        }
        assert!(cursor.is_null());
    }

    #[test]
    fn mutually_recursive_types_compile_as_one_component() {
        let u = universe(vec![
            class("Alpha", vec![field("partner", TypeRef::named("Beta"))]),
            class("Beta", vec![field("owner", TypeRef::named("Alpha")), field("n", TypeRef::Int)]),
        ]);
        let (engine, synth) = synthesizer(&u);
        let clone = synth.ensure("Alpha").unwrap();
        assert_eq!(synth.cache().len(), 2);
        let compiled = engine.compilations();

        let beta = Value::object(blank_instance("Beta", &u));
        set(&beta, "n", Value::Int(5));
        let alpha = Value::object(blank_instance("Alpha", &u));
        set(&alpha, "partner", beta.clone());
        let copied = clone.invoke_one(&alpha).unwrap();
        let copied_beta = get(&copied, "partner");
        assert!(copied_beta.structurally_eq(&beta));
        assert!(!copied_beta.ptr_eq(&beta));

        // The partner routine is already cached; no further compilation.
        synth.ensure("Beta").unwrap();
        assert_eq!(engine.compilations(), compiled);
    }

    #[test]
    fn ensure_is_idempotent_and_never_recompiles() {
        let u = universe(vec![class("Point", vec![field("x", TypeRef::Int)])]);
        let (engine, synth) = synthesizer(&u);
        let first = synth.ensure("Point").unwrap();
        let compiled = engine.compilations();
        let second = synth.ensure("Point").unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(engine.compilations(), compiled);
    }

    #[test]
    fn unknown_root_type_fails() {
        let u = universe(vec![]);
        let (_, synth) = synthesizer(&u);
        let err = synth.ensure("Ghost").unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownType(name) if name == "Ghost"));
    }

    #[test]
    fn concurrent_ensure_converges_on_one_callable() {
        let u = universe(vec![class(
            "Node",
            vec![field("value", TypeRef::Int), field("next", TypeRef::named("Node"))],
        )]);
        let (_, synth) = synthesizer(&u);
        let synth = Arc::new(synth);

        let results: Vec<Callable> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let synth = synth.clone();
                    scope.spawn(move || synth.ensure("Node").unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(synth.cache().len(), 1);
        let winner = synth.cache().get("Node").unwrap().callable;
        for callable in &results {
            assert!(callable.ptr_eq(&winner));
        }
    }

    /// Delegates to a real engine but rejects one poisoned unit name.
    struct FailingBridge {
        inner: Arc<ScriptEngine>,
        poison: &'static str,
    }

    impl FailingBridge {
        fn reject(&self, unit_name: &str) -> CompileFailure {
            CompileFailure {
                unit_name: unit_name.to_string(),
                diagnostics: vec![Diagnostic {
                    line: 1,
                    col: 1,
                    message: "injected failure".to_string(),
                }],
            }
        }
    }

    impl CompilerBridge for FailingBridge {
        fn compile_in_memory(
            &self,
            source: &str,
            unit_name: &str,
        ) -> Result<Artifact, CompileFailure> {
            if unit_name == self.poison {
                return Err(self.reject(unit_name));
            }
            self.inner.compile_in_memory(source, unit_name)
        }

        fn compile_via_file(
            &self,
            source: &str,
            unit_name: &str,
        ) -> Result<Artifact, CompileFailure> {
            if unit_name == self.poison {
                return Err(self.reject(unit_name));
            }
            self.inner.compile_via_file(source, unit_name)
        }

        fn load_member(
            &self,
            artifact: &Artifact,
            unit_name: &str,
            member_name: &str,
            shape: &CallableShape,
        ) -> Result<Callable, SynthesisError> {
            self.inner.load_member(artifact, unit_name, member_name, shape)
        }
    }

    #[test]
    fn nested_failure_aborts_without_poisoning_the_cache() {
        let u = universe(vec![
            class("Child", vec![field("n", TypeRef::Int)]),
            class("Parent", vec![field("child", TypeRef::named("Child"))]),
        ]);
        let engine = Arc::new(ScriptEngine::new(u.clone()));
        let cache = Arc::new(SynthesisCache::new());
        let reported = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = reported.clone();

        let failing = CloneSynthesizer::new(
            u.clone(),
            Arc::new(FailingBridge { inner: engine.clone(), poison: "DeepCloneChild" }),
        )
        .with_cache(cache.clone())
        .with_reporter(Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string());
        }));

        let err = failing.ensure("Parent").unwrap_err();
        assert!(matches!(err, SynthesisError::Compilation(_)));
        assert!(cache.is_empty());
        {
            let reported = reported.lock().unwrap();
            assert_eq!(reported.len(), 1);
            assert!(reported[0].contains("DeepCloneChild"));
        }

        // Same cache, healthy bridge: the component synthesizes from scratch.
        let healthy = CloneSynthesizer::new(u.clone(), engine).with_cache(cache.clone());
        let clone = healthy.ensure("Parent").unwrap();
        assert_eq!(cache.len(), 2);
        let parent = Value::object(blank_instance("Parent", &u));
        assert!(clone.invoke_one(&parent).unwrap().structurally_eq(&parent));
    }
}
