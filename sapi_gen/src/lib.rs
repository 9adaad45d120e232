//! Sandboxed API header generator.
//!
//! Takes the function declarations a header-parser front-end found, works out
//! exactly which types must cross the sandbox boundary, lowers every
//! parameter onto a marshalling primitive and renders a validated C++ proxy
//! header. Runs are deterministic: identical input gives identical output.

pub mod codegen;
pub mod collect;
pub mod decl;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod generator;
pub mod lowering;
pub mod naming;
pub mod registrar;

pub use error::{DeclError, GenError, ParamPosition};
pub use generator::{analyze, generate, Analysis, GeneratedHeader, Generator};
pub use sapi_types::{DeclFile, DuplicatePolicy, GeneratorOptions, LoweringKind, ValidatorKind};
