//! Runtime code synthesis: turn structural type descriptions into source
//! text, compile it through a pluggable bridge, and hand back invocable
//! callables. Ships a recursive deep-clone generator on top, with a
//! process-lifetime cache of synthesized routines.
//!
//! The crate is bridge-agnostic; [`script::ScriptEngine`] is the bundled
//! in-process reference bridge (parse + interpret instead of a real external
//! compiler service).

pub mod ast;
pub mod bridge;
pub mod builder;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod clone_gen;
pub mod error;
pub mod script;
pub mod type_name;
pub mod universe;
pub mod value;

pub use bridge::{Callable, CallableShape, CompileMode, CompilerBridge, ErrorReporter};
pub use builder::MethodBuilder;
pub use cache::SynthesisCache;
pub use clone_gen::CloneSynthesizer;
pub use error::{InvokeError, SynthesisError};
pub use script::ScriptEngine;
pub use universe::{TypeRef, TypeUniverse};
pub use value::Value;
