//! Declaration model for the sandboxed API generator.
//!
//! A header-parser front-end describes the functions it found, together
//! with every type those functions can reach, as a `DeclFile`. The generator
//! crate consumes this model; nothing here knows about rendering.

pub mod file;
pub mod options;
pub mod types;

pub use file::{DeclFile, LoadError};
pub use options::{DuplicatePolicy, GeneratorOptions, LoweringKind, ValidatorKind};
pub use types::*;
