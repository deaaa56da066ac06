//! Compilation & load bridge.
//!
//! The engine is agnostic to the concrete compiler: anything that turns
//! source text plus a unit name into an [`Artifact`] (or a diagnostic-bearing
//! failure) and can bind a named member to a [`Callable`] of a requested
//! shape satisfies [`CompilerBridge`]. The crate ships one implementation,
//! [`crate::script::ScriptEngine`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{InvokeError, SynthesisError};
use crate::value::Value;

// ————————————————————————————————————————————————————————————————————————————
// DIAGNOSTICS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based source position.
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

/// The emitted source failed to compile. Recoverable: the caller gets no
/// callable and may retry with corrected input.
#[derive(Debug, Clone, thiserror::Error)]
pub struct CompileFailure {
    pub unit_name: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compilation of {} failed", self.unit_name)?;
        for d in &self.diagnostics {
            write!(f, "\n  {d}")?;
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ARTIFACTS & CALLABLES
// ————————————————————————————————————————————————————————————————————————————

/// Output of a successful compilation. Opaque to the core: held only long
/// enough to extract the requested callable, never cached.
#[derive(Clone)]
pub struct Artifact {
    pub unit_name: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact").field("unit_name", &self.unit_name).finish_non_exhaustive()
    }
}

/// Parameter/return signature a callable is bound to, as rendered type names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallableShape {
    pub params: Vec<String>,
    /// `None` means the member produces no value.
    pub ret: Option<String>,
}

impl CallableShape {
    pub fn unary(ty: impl Into<String>) -> Self {
        let ty = ty.into();
        CallableShape { params: vec![ty.clone()], ret: Some(ty) }
    }
}

type CallFn = dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// An invocable handle bound to a specific shape. Cloning is cheap and
/// preserves identity ([`Callable::ptr_eq`]).
#[derive(Clone)]
pub struct Callable {
    shape: CallableShape,
    inner: Arc<CallFn>,
}

impl Callable {
    pub fn new(shape: CallableShape, inner: Arc<CallFn>) -> Self {
        Callable { shape, inner }
    }

    pub fn shape(&self) -> &CallableShape {
        &self.shape
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.inner)(args)
    }

    /// Convenience for the `T -> T` clone shape.
    pub fn invoke_one(&self, arg: &Value) -> Result<Value, InvokeError> {
        self.invoke(std::slice::from_ref(arg))
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("shape", &self.shape).finish_non_exhaustive()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BRIDGE CONTRACT
// ————————————————————————————————————————————————————————————————————————————

/// Whether the compiled artifact is materialized to durable storage first.
/// The two modes are functionally equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    #[default]
    InMemory,
    ViaFile,
}

/// Callback invoked with formatted diagnostics on compilation failure.
/// Defaults to a no-op; see [`noop_reporter`].
pub type ErrorReporter = Arc<dyn Fn(&str) + Send + Sync>;

pub fn noop_reporter() -> ErrorReporter {
    Arc::new(|_| {})
}

pub trait CompilerBridge: Send + Sync {
    fn compile_in_memory(&self, source: &str, unit_name: &str) -> Result<Artifact, CompileFailure>;

    fn compile_via_file(&self, source: &str, unit_name: &str) -> Result<Artifact, CompileFailure>;

    fn compile(&self, source: &str, unit_name: &str, mode: CompileMode) -> Result<Artifact, CompileFailure> {
        match mode {
            CompileMode::InMemory => self.compile_in_memory(source, unit_name),
            CompileMode::ViaFile => self.compile_via_file(source, unit_name),
        }
    }

    /// Resolve `unit_name.member_name` inside the artifact and bind it as a
    /// callable of exactly `shape`. Fails with
    /// [`SynthesisError::MemberResolution`] if absent or mismatched.
    fn load_member(
        &self,
        artifact: &Artifact,
        unit_name: &str,
        member_name: &str,
        shape: &CallableShape,
    ) -> Result<Callable, SynthesisError>;
}
