//! In-process reference implementation of the compilation & load bridge.
//!
//! Stands in for an external compilation service: "compiling" a unit means
//! parsing it against the engine's type universe; "loading" a member means
//! binding an interpreter closure over the parsed method. Loaded units are
//! registered in a process-lifetime linker keyed by unit name, and
//! unit-qualified calls resolve through it at invoke time — a unit may
//! therefore be compiled while the units it calls are still pending, as long
//! as everything is loaded before the first invocation.

pub mod interp;
pub mod parser;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::bridge::{
    Artifact, Callable, CallableShape, CompileFailure, CompilerBridge, Diagnostic,
};
use crate::error::SynthesisError;
use crate::type_name;
use crate::universe::TypeUniverse;
use parser::ParsedUnit;

pub struct ScriptEngine {
    universe: Arc<TypeUniverse>,
    linker: Arc<interp::Linker>,
    artifacts_dir: PathBuf,
    compile_count: AtomicUsize,
}

impl ScriptEngine {
    pub fn new(universe: Arc<TypeUniverse>) -> Self {
        ScriptEngine {
            universe,
            linker: Arc::new(interp::Linker::new()),
            artifacts_dir: std::env::temp_dir().join("codeforge-artifacts"),
            compile_count: AtomicUsize::new(0),
        }
    }

    /// Directory where `compile_via_file` materializes sources.
    pub fn with_artifacts_dir(mut self, dir: PathBuf) -> Self {
        self.artifacts_dir = dir;
        self
    }

    pub fn universe(&self) -> &Arc<TypeUniverse> {
        &self.universe
    }

    /// Number of compile calls served so far (both modes). The observable
    /// tests use to prove a cached routine is not recompiled.
    pub fn compilations(&self) -> usize {
        self.compile_count.load(Ordering::SeqCst)
    }

    /// Whether a unit of this name has been loaded into the linker.
    pub fn is_loaded(&self, unit_name: &str) -> bool {
        self.linker.contains_key(unit_name)
    }

    fn compile_source(&self, source: &str, unit_name: &str) -> Result<Artifact, CompileFailure> {
        self.compile_count.fetch_add(1, Ordering::SeqCst);
        match parser::parse_unit(source, &self.universe) {
            Ok(unit) => Ok(Artifact {
                unit_name: unit_name.to_string(),
                payload: Arc::new(Arc::new(unit)),
            }),
            Err(diagnostic) => Err(CompileFailure {
                unit_name: unit_name.to_string(),
                diagnostics: vec![diagnostic],
            }),
        }
    }
}

impl CompilerBridge for ScriptEngine {
    fn compile_in_memory(&self, source: &str, unit_name: &str) -> Result<Artifact, CompileFailure> {
        self.compile_source(source, unit_name)
    }

    /// Same result as the in-memory path, but the source is materialized
    /// under the artifacts directory first and compiled from the file.
    fn compile_via_file(&self, source: &str, unit_name: &str) -> Result<Artifact, CompileFailure> {
        let io_failure = |detail: String| CompileFailure {
            unit_name: unit_name.to_string(),
            diagnostics: vec![Diagnostic { line: 1, col: 1, message: detail }],
        };
        std::fs::create_dir_all(&self.artifacts_dir)
            .map_err(|e| io_failure(format!("cannot create artifacts dir: {e}")))?;
        let path = self.artifacts_dir.join(format!("{unit_name}.cs"));
        std::fs::write(&path, source)
            .map_err(|e| io_failure(format!("cannot write {}: {e}", path.display())))?;
        let persisted = std::fs::read_to_string(&path)
            .map_err(|e| io_failure(format!("cannot read back {}: {e}", path.display())))?;
        self.compile_source(&persisted, unit_name)
    }

    fn load_member(
        &self,
        artifact: &Artifact,
        unit_name: &str,
        member_name: &str,
        shape: &CallableShape,
    ) -> Result<Callable, SynthesisError> {
        let resolution = |detail: String| SynthesisError::MemberResolution {
            unit: unit_name.to_string(),
            member: member_name.to_string(),
            detail,
        };

        let unit = artifact
            .payload
            .downcast_ref::<Arc<ParsedUnit>>()
            .ok_or_else(|| resolution("artifact was not produced by this bridge".to_string()))?
            .clone();
        if unit.class_name != unit_name {
            return Err(resolution(format!(
                "artifact declares unit {}, not {unit_name}",
                unit.class_name
            )));
        }
        let method_index = unit
            .methods
            .iter()
            .position(|m| m.name == member_name)
            .ok_or_else(|| resolution("no such member".to_string()))?;
        {
            let method = &unit.methods[method_index];
            if !method.is_static {
                return Err(resolution("member is not static".to_string()));
            }
            let actual = CallableShape {
                params: method.params.iter().map(|(ty, _)| type_name::render(ty)).collect(),
                ret: method.return_type.as_ref().map(type_name::render),
            };
            if &actual != shape {
                return Err(resolution(format!(
                    "shape mismatch: requested ({}) -> {}, found ({}) -> {}",
                    shape.params.join(", "),
                    shape.ret.as_deref().unwrap_or("void"),
                    actual.params.join(", "),
                    actual.ret.as_deref().unwrap_or("void"),
                )));
            }
        }

        // Declare-before-compile: registration makes the unit callable by
        // name; first registration wins on races (identical source anyway).
        self.linker.entry(unit_name.to_string()).or_insert_with(|| unit.clone());

        let universe = self.universe.clone();
        let linker = self.linker.clone();
        let shape = shape.clone();
        let inner = Arc::new(move |args: &[crate::value::Value]| {
            let method = &unit.methods[method_index];
            interp::invoke(method, args, &universe, &linker)
        });
        Ok(Callable::new(shape, inner))
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::noop_reporter;
    use crate::builder::MethodBuilder;
    use crate::universe::TypeRef;
    use crate::value::Value;
    use std::sync::Mutex;

    fn engine() -> ScriptEngine {
        ScriptEngine::new(Arc::new(TypeUniverse::new()))
    }

    #[test]
    fn compiles_and_invokes_an_ad_hoc_method() {
        let engine = engine();
        let mut b = MethodBuilder::new();
        b.unit_name("Adder").unwrap();
        b.member_name("Add").unwrap();
        b.parameter(TypeRef::Int, "a").unwrap();
        b.parameter(TypeRef::Int, "b").unwrap();
        b.returns(Some(TypeRef::Int));
        b.body("        return a + b;");
        let callable = b.compile_and_bind(&engine).unwrap();
        let out = callable.invoke(&[Value::Int(40), Value::Int(2)]).unwrap();
        assert!(out.structurally_eq(&Value::Int(42)));
    }

    #[test]
    fn string_concat_method() {
        let engine = engine();
        let mut b = MethodBuilder::new();
        b.unit_name("Greeter").unwrap();
        b.member_name("Greet").unwrap();
        b.parameter(TypeRef::Str, "name").unwrap();
        b.returns(Some(TypeRef::Str));
        b.body("        return \"hello \" + name;");
        let callable = b.compile_and_bind(&engine).unwrap();
        let out = callable.invoke(&[Value::Str("world".into())]).unwrap();
        assert!(out.structurally_eq(&Value::Str("hello world".into())));
    }

    #[test]
    fn malformed_body_reports_diagnostics_and_fails() {
        let engine = engine();
        let reported = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = reported.clone();
        let mut b = MethodBuilder::new();
        b.unit_name("Broken").unwrap();
        b.member_name("M").unwrap();
        b.returns(None);
        b.body("        {{{");
        b.reporter(Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string());
        }));
        let err = b.compile_and_bind(&engine).unwrap_err();
        assert!(matches!(err, SynthesisError::Compilation(_)));
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(!reported[0].is_empty());
        assert!(reported[0].contains("Broken"));

        // Not exhausted by the failure: fix the body and retry in place.
        b.body("        return;");
        assert!(b.compile_and_bind(&engine).is_ok());
    }

    #[test]
    fn builder_is_single_use_until_reset() {
        let engine = engine();
        let mut b = MethodBuilder::new();
        b.unit_name("Once").unwrap();
        b.member_name("M").unwrap();
        b.returns(Some(TypeRef::Int));
        b.body("        return 7;");
        b.compile_and_bind(&engine).unwrap();
        assert!(matches!(
            b.compile_and_bind(&engine),
            Err(SynthesisError::BuilderExhausted)
        ));
        b.reset();
        b.unit_name("Twice").unwrap();
        b.member_name("M").unwrap();
        b.returns(Some(TypeRef::Int));
        b.body("        return 8;");
        assert!(b.compile_and_bind(&engine).is_ok());
    }

    #[test]
    fn file_mode_persists_the_source() {
        let dir = std::env::temp_dir().join("codeforge-test-artifacts");
        let _ = std::fs::remove_dir_all(&dir);
        let engine = engine().with_artifacts_dir(dir.clone());
        let mut b = MethodBuilder::new();
        b.unit_name("Persisted").unwrap();
        b.member_name("M").unwrap();
        b.returns(Some(TypeRef::Int));
        b.body("        return 1;");
        b.mode(crate::bridge::CompileMode::ViaFile);
        b.compile_and_bind(&engine).unwrap();
        let persisted = std::fs::read_to_string(dir.join("Persisted.cs")).unwrap();
        assert!(persisted.contains("public static class Persisted"));
    }

    #[test]
    fn missing_member_and_shape_mismatch_are_resolution_failures() {
        let engine = engine();
        let source = "\
public static class U
{
    public static int M(int x)
    {
        return x;
    }
}
";
        let artifact = engine.compile_in_memory(source, "U").unwrap();
        let err = engine
            .load_member(&artifact, "U", "Absent", &CallableShape::unary("int"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MemberResolution { .. }));

        let wrong = CallableShape { params: vec!["string".into()], ret: Some("int".into()) };
        let err = engine.load_member(&artifact, "U", "M", &wrong).unwrap_err();
        assert!(matches!(err, SynthesisError::MemberResolution { .. }));

        let err = engine
            .load_member(&artifact, "Other", "M", &CallableShape::unary("int"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MemberResolution { .. }));
    }

    #[test]
    fn compile_script_extracts_the_unit_name() {
        let engine = engine();
        let script = "\
public static class Scripted
{
    public static int Doubled(int x)
    {
        return x + x;
    }
}
";
        let shape = CallableShape { params: vec!["int".into()], ret: Some("int".into()) };
        let callable =
            MethodBuilder::compile_script(&engine, script, "Doubled", &shape, &noop_reporter())
                .unwrap();
        let out = callable.invoke(&[Value::Int(21)]).unwrap();
        assert!(out.structurally_eq(&Value::Int(42)));
    }

    #[test]
    fn one_unit_can_carry_multiple_members() {
        let engine = engine();
        let script = "\
public static class TextKit
{
    public static int Bump(int x)
    {
        return x + 1;
    }

    public static string Shout(string s)
    {
        return s + \"!\";
    }
}
";
        let artifact = engine.compile_in_memory(script, "TextKit").unwrap();
        let bump = engine
            .load_member(&artifact, "TextKit", "Bump", &CallableShape::unary("int"))
            .unwrap();
        let shout = engine
            .load_member(&artifact, "TextKit", "Shout", &CallableShape::unary("string"))
            .unwrap();
        assert!(bump.invoke(&[Value::Int(41)]).unwrap().structurally_eq(&Value::Int(42)));
        assert!(shout
            .invoke(&[Value::Str("hey".into())])
            .unwrap()
            .structurally_eq(&Value::Str("hey!".into())));
    }

    #[test]
    fn calls_resolve_through_the_linker_at_invoke_time() {
        let engine = engine();
        // Caller compiles and loads before its callee exists.
        let caller = "\
public static class Outer
{
    public static int Twice(int x)
    {
        return Inner.Bump(Inner.Bump(x));
    }
}
";
        let shape = CallableShape { params: vec!["int".into()], ret: Some("int".into()) };
        let artifact = engine.compile_in_memory(caller, "Outer").unwrap();
        let twice = engine.load_member(&artifact, "Outer", "Twice", &shape).unwrap();

        // Invoking now fails: Inner is not loaded yet.
        let err = twice.invoke(&[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, crate::error::InvokeError::UnresolvedUnit(u) if u == "Inner"));

        let callee = "\
public static class Inner
{
    public static int Bump(int x)
    {
        return x + 1;
    }
}
";
        let artifact = engine.compile_in_memory(callee, "Inner").unwrap();
        engine.load_member(&artifact, "Inner", "Bump", &shape).unwrap();
        let out = twice.invoke(&[Value::Int(1)]).unwrap();
        assert!(out.structurally_eq(&Value::Int(3)));
    }
}
