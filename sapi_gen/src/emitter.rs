//! Ordered records for one generation run.
//!
//! Both categories are kept in insertion-ordered sets: the set answers
//! "seen before?" in O(1) and its index order is the emission order. Handles
//! are plain indices; nothing is ever removed, so a handle stays valid for
//! the whole run.

use crate::decl::TypeId;
use crate::lowering::LoweredSignature;
use indexmap::{IndexMap, IndexSet};
use sapi_types::FunctionDecl;
use serde_derive::Serialize;
use std::hash::{Hash, Hasher};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclForm {
    Forward,
    Definition,
}

/// One accepted type declaration. Identity is the pair of enclosing
/// namespace and rendered spelling; `decl` and `form` ride along.
#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub namespace: String,
    pub spelling: String,
    pub decl: TypeId,
    pub form: DeclForm,
}

impl PartialEq for TypeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.spelling == other.spelling
    }
}

impl Eq for TypeRecord {}

impl Hash for TypeRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.spelling.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(usize);

impl TypeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionHandle(usize);

impl FunctionHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One accepted function, keyed by its fully qualified name.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub qualified_name: String,
    pub decl: FunctionDecl,
    pub signature: LoweredSignature,
    /* Definitions (or forward declarations) the signature depends on */
    pub types: Vec<TypeHandle>,
}

#[derive(Debug, Default)]
pub struct Emitter {
    types: IndexSet<TypeRecord>,
    functions: IndexMap<String, FunctionRecord>,
    includes: IndexSet<&'static str>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /* True if the record was not present before */
    pub fn record_type(&mut self, record: TypeRecord) -> bool {
        self.insert_type(record).1
    }

    pub fn insert_type(&mut self, record: TypeRecord) -> (TypeHandle, bool) {
        let (index, inserted) = self.types.insert_full(record);
        if inserted {
            debug!(index, "recorded type");
        }
        (TypeHandle(index), inserted)
    }

    /* Never replaces an existing record with the same qualified name */
    pub fn record_function(&mut self, record: FunctionRecord) -> bool {
        if self.functions.contains_key(&record.qualified_name) {
            return false;
        }
        debug!(function = %record.qualified_name, "recorded function");
        self.functions.insert(record.qualified_name.clone(), record);
        true
    }

    pub fn has_function(&self, qualified_name: &str) -> bool {
        self.functions.contains_key(qualified_name)
    }

    pub fn function_handle(&self, qualified_name: &str) -> Option<FunctionHandle> {
        self.functions.get_index_of(qualified_name).map(FunctionHandle)
    }

    pub fn type_record(&self, handle: TypeHandle) -> &TypeRecord {
        &self.types[handle.0]
    }

    pub fn function_record(&self, handle: FunctionHandle) -> &FunctionRecord {
        &self.functions[handle.0]
    }

    pub fn require_include(&mut self, include: &'static str) {
        self.includes.insert(include);
    }

    pub fn ordered_types(&self) -> impl Iterator<Item = &TypeRecord> {
        self.types.iter()
    }

    pub fn ordered_functions(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.functions.values()
    }

    pub fn includes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.includes.iter().copied()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::DeclGraph;
    use crate::lowering::{Direction, LoweredParam, LoweredReturn, Marshalling, ParamRole, ParameterSlot};
    use sapi_types::{QualType, RecordDecl, TypeDecl, TypeDeclKind};

    fn ids() -> (TypeId, TypeId) {
        let types = ["A", "B"].map(|name| TypeDecl {
            name: name.into(),
            namespace: String::new(),
            kind: TypeDeclKind::Struct(RecordDecl::default()),
            comment: None,
        });
        let graph = DeclGraph::from_parts(&types, &[]).unwrap();
        (graph.lookup("A").unwrap(), graph.lookup("B").unwrap())
    }

    fn record(namespace: &str, spelling: &str, decl: TypeId, form: DeclForm) -> TypeRecord {
        TypeRecord {
            namespace: namespace.into(),
            spelling: spelling.into(),
            decl,
            form,
        }
    }

    fn function(name: &str, params: usize) -> FunctionRecord {
        let params = (0..params)
            .map(|index| LoweredParam {
                slot: ParameterSlot {
                    index,
                    name: format!("p{}", index),
                    ty: QualType::new("int"),
                    direction: Direction::In,
                },
                role: ParamRole::Marshalled {
                    primitive: Marshalling::ScalarByValue,
                    length: None,
                },
            })
            .collect();
        FunctionRecord {
            qualified_name: name.into(),
            decl: FunctionDecl::new(name, QualType::new("int"), vec![]),
            signature: LoweredSignature {
                params,
                ret: LoweredReturn::Value,
            },
            types: Vec::new(),
        }
    }

    #[test]
    fn type_identity_is_namespace_and_spelling() {
        let (a, b) = ids();
        let mut emitter = Emitter::new();
        assert!(emitter.record_type(record("lib", "struct A;", a, DeclForm::Forward)));
        /* same identity, different payload: still a duplicate */
        assert!(!emitter.record_type(record("lib", "struct A;", b, DeclForm::Definition)));
        assert!(emitter.record_type(record("other", "struct A;", a, DeclForm::Forward)));
        assert!(emitter.record_type(record("lib", "struct A {};", a, DeclForm::Definition)));
        assert_eq!(emitter.type_count(), 3);
        assert_eq!(emitter.type_record(TypeHandle(0)).decl, a);
    }

    #[test]
    fn order_is_first_seen_order() {
        let (a, b) = ids();
        let mut emitter = Emitter::new();
        let spellings = ["struct Z;", "struct A;", "struct M;", "struct A;", "struct B;"];
        for spelling in spellings {
            emitter.record_type(record("", spelling, a, DeclForm::Forward));
        }
        emitter.record_type(record("", "struct Z;", b, DeclForm::Forward));
        let order: Vec<&str> = emitter.ordered_types().map(|r| r.spelling.as_str()).collect();
        assert_eq!(order, ["struct Z;", "struct A;", "struct M;", "struct B;"]);
    }

    #[test]
    fn handles_stay_valid_as_records_grow() {
        let (a, _) = ids();
        let mut emitter = Emitter::new();
        let (first, _) = emitter.insert_type(record("", "struct A;", a, DeclForm::Forward));
        for i in 0..256 {
            emitter.record_type(record("", &format!("struct T{};", i), a, DeclForm::Forward));
        }
        assert_eq!(emitter.type_record(first).spelling, "struct A;");
        let (again, inserted) = emitter.insert_type(record("", "struct A;", a, DeclForm::Forward));
        assert!(!inserted);
        assert_eq!(again, first);
    }

    #[test]
    fn duplicate_function_keeps_first_registration() {
        let mut emitter = Emitter::new();
        assert!(emitter.record_function(function("F", 1)));
        assert!(!emitter.record_function(function("F", 3)));
        assert!(emitter.record_function(function("G", 0)));
        let handle = emitter.function_handle("F").unwrap();
        assert_eq!(emitter.function_record(handle).signature.arity(), 1);
        let names: Vec<&str> = emitter
            .ordered_functions()
            .map(|f| f.qualified_name.as_str())
            .collect();
        assert_eq!(names, ["F", "G"]);
    }

    #[test]
    fn includes_are_deduplicated_in_order() {
        let mut emitter = Emitter::new();
        emitter.require_include("<ctime>");
        emitter.require_include("<cstdio>");
        emitter.require_include("<ctime>");
        assert_eq!(emitter.includes().collect::<Vec<_>>(), ["<ctime>", "<cstdio>"]);
    }
}
