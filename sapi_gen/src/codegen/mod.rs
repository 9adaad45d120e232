pub mod render;
pub mod spelling;
pub mod validate;

pub use render::HeaderRenderer;
pub use validate::{validator_for, BuiltinValidator, ClangFormatValidator, SyntaxValidator};
