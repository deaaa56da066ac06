//! Error taxonomy for the synthesis engine.
//!
//! Two families: `SynthesisError` covers everything up to and including
//! binding a compiled member, `InvokeError` covers running a bound callable.
//! Compilation failures are recoverable and must never take the process down;
//! builder misuse fails fast at the offending call.

use crate::bridge::CompileFailure;

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Builder misuse: a parameter with this name is already registered.
    #[error("duplicate parameter name: {0}")]
    DuplicateParameterName(String),

    /// Builder misuse: a unit or member name must be non-empty.
    #[error("{0} must be non-empty")]
    EmptyName(&'static str),

    /// The builder already compiled its unit; call `reset` before reuse.
    #[error("builder already used; call reset() before compiling another unit")]
    BuilderExhausted,

    /// A requested type is not declared in the universe.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The emitted source failed to compile. Carries the diagnostics.
    #[error(transparent)]
    Compilation(#[from] CompileFailure),

    /// The artifact does not contain the expected unit/member/shape.
    /// Emission and binding disagree, which is a defect, not a user error.
    #[error("member resolution failed: {unit}.{member}: {detail}")]
    MemberResolution {
        unit: String,
        member: String,
        detail: String,
    },
}

/// Runtime failure while executing a bound callable.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// A unit-qualified call named a generated unit that was never loaded.
    #[error("unresolved unit: {0}")]
    UnresolvedUnit(String),

    #[error("unit {unit} has no member {member}")]
    UnknownMember { unit: String, member: String },

    #[error("{member}: expected {expected} argument(s), got {got}")]
    ArityMismatch {
        member: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("null dereference: {0}")]
    NullDereference(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("unknown local: {0}")]
    UnknownLocal(String),
}
