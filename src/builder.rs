//! Source emission builder.
//!
//! Fluent, stateful, and single-use: one builder produces one unit. After a
//! successful `compile_and_bind` the builder is exhausted; call [`MethodBuilder::reset`]
//! to start a fresh unit. A failed compilation does NOT exhaust the builder,
//! so a corrected body can be retried in place.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bridge::{
    Callable, CallableShape, CompileMode, CompilerBridge, ErrorReporter, noop_reporter,
};
use crate::error::SynthesisError;
use crate::type_name;
use crate::universe::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

impl Visibility {
    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        }
    }
}

/// Matches the class declaration in a raw script, for the static
/// compile-a-whole-script entry point.
static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"class\s+(?<result>[A-Za-z_][A-Za-z0-9_]*)").unwrap());

pub struct MethodBuilder {
    visibility: Visibility,
    is_static: bool,
    unit_name: String,
    member_name: String,
    params: Vec<(TypeRef, String)>,
    references: BTreeSet<String>,
    return_type: Option<TypeRef>,
    shape: CallableShape,
    body: String,
    mode: CompileMode,
    reporter: ErrorReporter,
    exhausted: bool,
}

impl Default for MethodBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBuilder {
    pub fn new() -> Self {
        MethodBuilder {
            visibility: Visibility::Public,
            is_static: true,
            unit_name: "DynamicUnit".to_string(),
            member_name: "DynamicMethod".to_string(),
            params: Vec::new(),
            references: BTreeSet::new(),
            return_type: None,
            shape: CallableShape::default(),
            body: String::new(),
            mode: CompileMode::InMemory,
            reporter: noop_reporter(),
            exhausted: false,
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // CONFIGURATION
    // ————————————————————————————————————————————————————————————————————————

    pub fn visibility(&mut self, visibility: Visibility) -> &mut Self {
        self.visibility = visibility;
        self
    }

    pub fn static_method(&mut self, is_static: bool) -> &mut Self {
        self.is_static = is_static;
        self
    }

    pub fn unit_name(&mut self, name: &str) -> Result<&mut Self, SynthesisError> {
        if name.is_empty() {
            return Err(SynthesisError::EmptyName("unit name"));
        }
        self.unit_name = name.to_string();
        Ok(self)
    }

    pub fn member_name(&mut self, name: &str) -> Result<&mut Self, SynthesisError> {
        if name.is_empty() {
            return Err(SynthesisError::EmptyName("member name"));
        }
        self.member_name = name.to_string();
        Ok(self)
    }

    /// Append a typed parameter. Order and names are significant; a repeated
    /// name fails fast. The parameter type is registered as a required
    /// reference for the bridge.
    pub fn parameter(&mut self, ty: TypeRef, name: &str) -> Result<&mut Self, SynthesisError> {
        if name.is_empty() {
            return Err(SynthesisError::EmptyName("parameter name"));
        }
        if self.params.iter().any(|(_, n)| n == name) {
            return Err(SynthesisError::DuplicateParameterName(name.to_string()));
        }
        collect_named(&ty, &mut self.references);
        self.params.push((ty, name.to_string()));
        Ok(self)
    }

    /// Register an extra required reference (e.g. an array element type named
    /// only inside the body).
    pub fn reference(&mut self, ty: &TypeRef) -> &mut Self {
        collect_named(ty, &mut self.references);
        self
    }

    /// Set (or clear) the return type. This derives the callable shape from
    /// the parameters registered *so far* plus the return type, so call it
    /// after the last `parameter`. Required even for void members.
    pub fn returns(&mut self, ty: Option<TypeRef>) -> &mut Self {
        if let Some(ty) = &ty {
            collect_named(ty, &mut self.references);
        }
        self.shape = CallableShape {
            params: self.params.iter().map(|(t, _)| type_name::render(t)).collect(),
            ret: ty.as_ref().map(type_name::render),
        };
        self.return_type = ty;
        self
    }

    /// Body text is opaque: nothing is parsed or validated here. A malformed
    /// body surfaces as a `CompilationFailure` downstream.
    pub fn body(&mut self, text: &str) -> &mut Self {
        self.body = text.to_string();
        self
    }

    pub fn mode(&mut self, mode: CompileMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn reporter(&mut self, reporter: ErrorReporter) -> &mut Self {
        self.reporter = reporter;
        self
    }

    pub fn shape(&self) -> &CallableShape {
        &self.shape
    }

    /// Clear all accumulated state so the builder can target a new unit.
    pub fn reset(&mut self) -> &mut Self {
        *self = MethodBuilder {
            mode: self.mode,
            reporter: self.reporter.clone(),
            ..MethodBuilder::new()
        };
        self
    }

    // ————————————————————————————————————————————————————————————————————————
    // RENDERING & COMPILATION
    // ————————————————————————————————————————————————————————————————————————

    /// Assemble the complete unit text. Pure with respect to builder state:
    /// calling twice without mutation yields identical text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for reference in &self.references {
            out.push_str(&format!("using {reference};\n"));
        }
        if !self.references.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("public static class {}\n{{\n", self.unit_name));
        out.push_str(&format!("    {} ", self.visibility.keyword()));
        if self.is_static {
            out.push_str("static ");
        }
        match &self.return_type {
            Some(ty) => out.push_str(&type_name::render(ty)),
            None => out.push_str("void"),
        }
        out.push_str(&format!(" {}(", self.member_name));
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{} {}", type_name::render(ty), name))
            .collect();
        out.push_str(&rendered.join(", "));
        out.push_str(")\n    {\n");
        out.push_str(&self.body);
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("    }\n}\n");
        out
    }

    /// Render, compile through the bridge with the configured mode, then bind
    /// the member to the derived shape. Compile failures go through the
    /// configured reporter and come back as `Err(Compilation(..))`; they do
    /// not exhaust the builder.
    pub fn compile_and_bind(
        &mut self,
        bridge: &dyn CompilerBridge,
    ) -> Result<Callable, SynthesisError> {
        if self.exhausted {
            return Err(SynthesisError::BuilderExhausted);
        }
        let source = self.render();
        let artifact = match bridge.compile(&source, &self.unit_name, self.mode) {
            Ok(artifact) => artifact,
            Err(failure) => {
                (self.reporter)(&failure.to_string());
                return Err(SynthesisError::Compilation(failure));
            }
        };
        let callable =
            bridge.load_member(&artifact, &self.unit_name, &self.member_name, &self.shape)?;
        self.exhausted = true;
        Ok(callable)
    }

    /// Compile a complete, caller-written script. The declared unit name is
    /// extracted from the class declaration.
    pub fn compile_script(
        bridge: &dyn CompilerBridge,
        script: &str,
        member_name: &str,
        shape: &CallableShape,
        reporter: &ErrorReporter,
    ) -> Result<Callable, SynthesisError> {
        let Some(captures) = CLASS_NAME.captures(script) else {
            let failure = crate::bridge::CompileFailure {
                unit_name: "<script>".to_string(),
                diagnostics: vec![crate::bridge::Diagnostic {
                    line: 1,
                    col: 1,
                    message: "no class declaration found in script".to_string(),
                }],
            };
            reporter(&failure.to_string());
            return Err(SynthesisError::Compilation(failure));
        };
        let unit_name = captures["result"].to_string();
        let artifact = match bridge.compile_in_memory(script, &unit_name) {
            Ok(artifact) => artifact,
            Err(failure) => {
                reporter(&failure.to_string());
                return Err(SynthesisError::Compilation(failure));
            }
        };
        bridge.load_member(&artifact, &unit_name, member_name, shape)
    }
}

fn collect_named(ty: &TypeRef, into: &mut BTreeSet<String>) {
    match ty {
        TypeRef::Array(elem) => collect_named(elem, into),
        TypeRef::Named { name, args } => {
            into.insert(name.clone());
            for arg in args {
                collect_named(arg, into);
            }
        }
        _ => {}
    }
}

// ------------------------------- Tests ------------------------------------ //
