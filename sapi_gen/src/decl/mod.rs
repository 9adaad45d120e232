pub mod builtins;
pub mod graph;

pub use builtins::{ScalarKind, StdType};
pub use graph::{Category, DeclGraph, NodeKind, TypeId, TypeNode, TypeShape};
