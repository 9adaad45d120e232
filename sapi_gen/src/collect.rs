//! Type collector: pulls every type a signature can reach into the emitter.
//!
//! The traversal is an explicit work stack over the declaration arena, so
//! deeply nested headers cannot exhaust the native stack. Types are recorded
//! post-order (members before the type that contains them). A record reached
//! through a pointer while another definition is still open is only forward
//! declared, and its body is visited once nothing is open any more. That is
//! how cycles through pointers are broken, whichever side they are entered
//! from.

use crate::codegen::spelling;
use crate::decl::{Category, DeclGraph, NodeKind, TypeId};
use crate::emitter::{DeclForm, Emitter, TypeHandle, TypeRecord};
use crate::error::GenError;
use crate::filter::{Classification, DeclFilter};
use sapi_types::{FunctionDecl, QualType, TypeDeclKind};
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
    Opaque,
    Known,
}

/* How a type is used at the edge being followed */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Use {
    /* By value: the full definition must precede the user */
    Complete,
    /* Behind a pointer, reference or alias: a declaration suffices */
    Declared,
}

impl Use {
    fn of(ty: &QualType) -> Self {
        if ty.is_indirect() {
            Use::Declared
        } else {
            Use::Complete
        }
    }
}

#[derive(Debug)]
enum Frame {
    Enter { id: TypeId, usage: Use },
    Exit(TypeId),
}

/* Pending work for one root */
#[derive(Debug, Default)]
struct Worklist {
    stack: Vec<Frame>,
    /* Record bodies postponed until no definition is open */
    deferred: VecDeque<TypeId>,
    /* Nodes entered whose `Exit` frame has not run yet */
    open: usize,
}

/* Outcome of collecting one signature */
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    /* Records inserted by this call, in emission order */
    pub new_types: Vec<TypeHandle>,
    /* Records that satisfy the signature's own types, in signature order */
    pub referenced: Vec<TypeHandle>,
}

pub struct TypeCollector<'g> {
    graph: &'g DeclGraph,
    filter: DeclFilter,
    state: Vec<VisitState>,
    /* Best record for each node: its definition, or its forward declaration */
    records: Vec<Option<TypeHandle>>,
}

impl<'g> TypeCollector<'g> {
    pub fn new(graph: &'g DeclGraph, filter: DeclFilter) -> Self {
        Self {
            graph,
            filter,
            state: vec![VisitState::Unvisited; graph.len()],
            records: vec![None; graph.len()],
        }
    }

    pub fn filter(&self) -> &DeclFilter {
        &self.filter
    }

    pub fn collect(&mut self, emitter: &mut Emitter, function: &FunctionDecl) -> Result<Collected, GenError> {
        let mut collected = Collected::default();
        let roots = function
            .params
            .iter()
            .map(|param| &param.ty)
            .chain(std::iter::once(&function.return_type));

        for ty in roots {
            let id = self.graph.lookup(ty.base_name()).ok_or_else(|| {
                GenError::unsupported(ty.base_name(), format!("referenced by '{}' but never declared", function.qualified_name()))
            })?;
            self.visit(emitter, id, Use::of(ty), &mut collected.new_types)?;
            if let Some(handle) = self.records[id.index()] {
                if !collected.referenced.contains(&handle) {
                    collected.referenced.push(handle);
                }
            }
        }

        Ok(collected)
    }

    fn visit(&mut self, emitter: &mut Emitter, root: TypeId, usage: Use, new_types: &mut Vec<TypeHandle>) -> Result<(), GenError> {
        let mut work = Worklist::default();
        work.stack.push(Frame::Enter { id: root, usage });

        loop {
            while let Some(frame) = work.stack.pop() {
                trace!(?frame, "collector frame");
                match frame {
                    Frame::Exit(id) => {
                        self.define(emitter, id, new_types);
                        self.state[id.index()] = VisitState::Done;
                        work.open -= 1;
                    }
                    Frame::Enter { id, usage } => self.enter(emitter, id, usage, &mut work, new_types)?,
                }
            }
            match work.deferred.pop_front() {
                Some(id) => work.stack.push(Frame::Enter {
                    id,
                    usage: Use::Declared,
                }),
                None => return Ok(()),
            }
        }
    }

    fn enter(
        &mut self,
        emitter: &mut Emitter,
        id: TypeId,
        usage: Use,
        work: &mut Worklist,
        new_types: &mut Vec<TypeHandle>,
    ) -> Result<(), GenError> {
        let node = self.graph.node(id);
        if usage == Use::Complete {
            self.ensure_complete(id)?;
        }

        match self.state[id.index()] {
            VisitState::Done | VisitState::Known | VisitState::Opaque => return Ok(()),
            VisitState::InProgress => {
                return match usage {
                    Use::Declared => self.forward_declare(emitter, id, new_types),
                    Use::Complete => Err(GenError::unsupported(&node.name, "recursive by-value containment")),
                };
            }
            VisitState::Unvisited => {}
        }

        let decl = match self.filter.classify(node) {
            Classification::SkipKnown { include } => {
                if let Some(include) = include {
                    emitter.require_include(include);
                }
                self.state[id.index()] = VisitState::Known;
                return Ok(());
            }
            Classification::Reject(reason) => return Err(GenError::unsupported(&node.name, reason)),
            Classification::EmitOpaque => {
                self.forward_declare(emitter, id, new_types)?;
                self.state[id.index()] = VisitState::Opaque;
                return Ok(());
            }
            Classification::Emit => match node.declared() {
                Some(decl) => decl,
                None => return Err(GenError::unsupported(&node.name, "type has no declaration to emit")),
            },
        };

        match &decl.kind {
            TypeDeclKind::Struct(_) | TypeDeclKind::Class(_) | TypeDeclKind::Union(_)
                if usage == Use::Declared && work.open > 0 =>
            {
                self.forward_declare(emitter, id, new_types)?;
                work.deferred.push_back(id);
            }
            TypeDeclKind::Struct(record) | TypeDeclKind::Class(record) | TypeDeclKind::Union(record) => {
                self.open(id, work);
                /* reversed so members are visited in declaration order */
                for field in record.fields.iter().rev() {
                    let field_id = self.resolve(&field.ty, &node.name)?;
                    work.stack.push(Frame::Enter {
                        id: field_id,
                        usage: Use::of(&field.ty),
                    });
                }
            }
            TypeDeclKind::Enum(enum_decl) => {
                self.open(id, work);
                if let Some(underlying) = &enum_decl.underlying {
                    let underlying = self.resolve(&QualType::new(underlying.as_str()), &node.name)?;
                    work.stack.push(Frame::Enter {
                        id: underlying,
                        usage: Use::Complete,
                    });
                }
            }
            TypeDeclKind::Typedef(typedef) => {
                self.ensure_alias_resolves(id)?;
                let target = self.resolve(&typedef.underlying, &node.name)?;
                /* the alias inherits the use unless it adds indirection itself */
                let target_usage = if typedef.underlying.is_indirect() {
                    Use::Declared
                } else {
                    usage
                };
                let target_node = self.graph.node(target);
                let aliases_record = target_node
                    .declared()
                    .is_some_and(|decl| decl.kind.record().is_some())
                    && self.filter.classify(target_node) == Classification::Emit
                    && self.state[target.index()] != VisitState::Done;

                if aliases_record {
                    /* an alias only needs the record declared: alias first, body after */
                    if usage == Use::Complete
                        && !typedef.underlying.is_indirect()
                        && self.state[target.index()] == VisitState::InProgress
                    {
                        return Err(GenError::unsupported(&target_node.name, "recursive by-value containment"));
                    }
                    self.forward_declare(emitter, target, new_types)?;
                    self.define(emitter, id, new_types);
                    self.state[id.index()] = VisitState::Done;
                    work.stack.push(Frame::Enter {
                        id: target,
                        usage: target_usage,
                    });
                } else {
                    self.open(id, work);
                    work.stack.push(Frame::Enter {
                        id: target,
                        usage: target_usage,
                    });
                }
            }
            TypeDeclKind::FunctionProto(_) => {
                return Err(GenError::unsupported(&node.name, "function types cannot cross the boundary"));
            }
        }
        Ok(())
    }

    /* Marks `id` in progress and schedules its definition */
    fn open(&mut self, id: TypeId, work: &mut Worklist) {
        self.state[id.index()] = VisitState::InProgress;
        work.open += 1;
        work.stack.push(Frame::Exit(id));
    }

    /* A typedef chain that runs back into itself never names a type */
    fn ensure_alias_resolves(&self, id: TypeId) -> Result<(), GenError> {
        let node = self.graph.node(id);
        let Some(shape) = self.graph.shape(&QualType::new(node.name.as_str())) else {
            return Ok(());
        };
        if shape.category == Category::Unresolved && matches!(self.graph.node(shape.target).kind, NodeKind::Declared(_)) {
            return Err(GenError::unsupported(&node.name, "typedef chain loops back on itself"));
        }
        Ok(())
    }

    fn resolve(&self, ty: &QualType, owner: &str) -> Result<TypeId, GenError> {
        self.graph
            .lookup(ty.base_name())
            .ok_or_else(|| GenError::unsupported(ty.base_name(), format!("referenced by '{}' but never declared", owner)))
    }

    /* A by-value use of something that resolves to an incomplete record */
    fn ensure_complete(&self, id: TypeId) -> Result<(), GenError> {
        let node = self.graph.node(id);
        let Some(shape) = self.graph.shape(&QualType::new(node.name.as_str())) else {
            return Ok(());
        };
        if shape.is_indirect() {
            return Ok(());
        }
        let target = self.graph.node(shape.target);
        if self.filter.classify(target) == Classification::EmitOpaque {
            return Err(GenError::unsupported(&node.name, "incomplete type used by value"));
        }
        Ok(())
    }

    fn forward_declare(&mut self, emitter: &mut Emitter, id: TypeId, new_types: &mut Vec<TypeHandle>) -> Result<(), GenError> {
        let node = self.graph.node(id);
        if let Some(decl) = node.declared() {
            if decl.kind.record().is_none() && !matches!(decl.kind, TypeDeclKind::Enum(_)) {
                return Err(GenError::unsupported(
                    &node.name,
                    format!("a {} cannot be forward declared", decl.kind.keyword()),
                ));
            }
        }
        let record = TypeRecord {
            namespace: node.namespace.clone(),
            spelling: spelling::forward_declaration(node),
            decl: id,
            form: DeclForm::Forward,
        };
        let (handle, inserted) = emitter.insert_type(record);
        if inserted {
            trace!(ty = %node.name, "forward declared");
            new_types.push(handle);
        }
        self.records[id.index()].get_or_insert(handle);
        Ok(())
    }

    fn define(&mut self, emitter: &mut Emitter, id: TypeId, new_types: &mut Vec<TypeHandle>) {
        let node = self.graph.node(id);
        let record = TypeRecord {
            namespace: node.namespace.clone(),
            spelling: spelling::definition(self.graph, node),
            decl: id,
            form: DeclForm::Definition,
        };
        let (handle, inserted) = emitter.insert_type(record);
        if inserted {
            new_types.push(handle);
        }
        self.records[id.index()] = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapi_types::{FieldDecl, ParamDecl, RecordDecl, TypeDecl, TypedefDecl};

    fn record(name: &str, fields: Vec<(&str, QualType)>) -> TypeDecl {
        TypeDecl {
            name: name.into(),
            namespace: String::new(),
            kind: TypeDeclKind::Struct(RecordDecl {
                fields: fields
                    .into_iter()
                    .map(|(name, ty)| FieldDecl { name: name.into(), ty })
                    .collect(),
                ..Default::default()
            }),
            comment: None,
        }
    }

    fn typedef(name: &str, underlying: QualType) -> TypeDecl {
        TypeDecl {
            name: name.into(),
            namespace: String::new(),
            kind: TypeDeclKind::Typedef(TypedefDecl { underlying }),
            comment: None,
        }
    }

    fn function(name: &str, params: Vec<QualType>) -> FunctionDecl {
        FunctionDecl::new(
            name,
            QualType::new("int"),
            params.into_iter().map(ParamDecl::unnamed).collect(),
        )
    }

    fn spellings(emitter: &Emitter) -> Vec<String> {
        emitter.ordered_types().map(|r| r.spelling.clone()).collect()
    }

    fn run(types: Vec<TypeDecl>, functions: Vec<FunctionDecl>) -> Result<Emitter, GenError> {
        let graph = DeclGraph::from_parts(&types, &functions).unwrap();
        let mut collector = TypeCollector::new(&graph, DeclFilter::default());
        let mut emitter = Emitter::new();
        for function in &functions {
            collector.collect(&mut emitter, function)?;
        }
        Ok(emitter)
    }

    #[test]
    fn members_precede_their_containers() {
        let types = vec![
            record("Outer", vec![("inner", QualType::new("Inner")), ("count", QualType::new("int"))]),
            record("Inner", vec![("leaf", QualType::new("Leaf"))]),
            record("Leaf", vec![("value", QualType::new("uint32_t"))]),
        ];
        let emitter = run(types, vec![function("F", vec![QualType::new("Outer").constant().pointer()])]).unwrap();
        let order = spellings(&emitter);
        assert_eq!(order.len(), 3);
        assert!(order[0].starts_with("struct Leaf {"));
        assert!(order[1].starts_with("struct Inner {"));
        assert!(order[2].starts_with("struct Outer {"));
    }

    #[test]
    fn self_referential_record_gets_forward_declaration() {
        let types = vec![record("Node", vec![("next", QualType::new("Node").pointer())])];
        let emitter = run(types, vec![function("Walk", vec![QualType::new("Node").pointer()])]).unwrap();
        assert_eq!(
            spellings(&emitter),
            ["struct Node;", "struct Node {\n  Node* next;\n};"]
        );
    }

    #[test]
    fn mutually_recursive_records_terminate() {
        let types = vec![
            record("A", vec![("b", QualType::new("B").pointer())]),
            record("B", vec![("a", QualType::new("A").pointer()), ("id", QualType::new("int"))]),
        ];
        let emitter = run(types, vec![function("F", vec![QualType::new("A").pointer()])]).unwrap();
        assert_eq!(
            spellings(&emitter),
            ["struct B;", "struct A {\n  B* b;\n};", "struct B {\n  A* a;\n  int id;\n};"]
        );
    }

    #[test]
    fn pointer_then_value_cycle_is_accepted_from_either_side() {
        let types = || {
            vec![
                record("A", vec![("b", QualType::new("B").pointer())]),
                record("B", vec![("a", QualType::new("A"))]),
            ]
        };
        let expected = ["struct B;", "struct A {\n  B* b;\n};", "struct B {\n  A a;\n};"];

        let from_a = run(types(), vec![function("F", vec![QualType::new("A").pointer()])]).unwrap();
        assert_eq!(spellings(&from_a), expected);
        let from_b = run(types(), vec![function("F", vec![QualType::new("B").pointer()])]).unwrap();
        assert_eq!(spellings(&from_b), expected);
    }

    #[test]
    fn typedef_loops_are_rejected() {
        let types = |holder_field: QualType| {
            vec![
                typedef("TA", QualType::new("TB")),
                typedef("TB", QualType::new("TA")),
                record("Holder", vec![("x", holder_field)]),
            ]
        };
        for field in [QualType::new("TA"), QualType::new("TA").pointer()] {
            let err = run(types(field), vec![function("F", vec![QualType::new("Holder").pointer()])]).unwrap_err();
            assert_eq!(err, GenError::unsupported("TA", "typedef chain loops back on itself"));
        }
    }

    #[test]
    fn by_value_use_survives_typedef_hops() {
        let types = vec![
            record("Foo", vec![("s", QualType::new("S"))]),
            record("S", vec![("b", QualType::new("Bar"))]),
            typedef("Bar", QualType::new("Baz")),
            typedef("Baz", QualType::new("Foo")),
        ];
        let err = run(types, vec![function("F", vec![QualType::new("Foo").pointer()])]).unwrap_err();
        assert_eq!(err, GenError::unsupported("Foo", "recursive by-value containment"));
    }

    #[test]
    fn typedef_chains_used_by_value_define_their_target_first() {
        let types = vec![
            record("Wrapper", vec![("inner", QualType::new("Inner"))]),
            typedef("Inner", QualType::new("Alias")),
            typedef("Alias", QualType::new("C")),
            record("C", vec![("v", QualType::new("int"))]),
        ];
        let emitter = run(types, vec![function("F", vec![QualType::new("Wrapper").pointer()])]).unwrap();
        assert_eq!(
            spellings(&emitter),
            [
                "struct C;",
                "using Alias = C;",
                "struct C {\n  int v;\n};",
                "using Inner = Alias;",
                "struct Wrapper {\n  Inner inner;\n};",
            ]
        );
    }

    #[test]
    fn by_value_cycles_are_rejected() {
        let types = vec![
            record("A", vec![("b", QualType::new("B"))]),
            record("B", vec![("a", QualType::new("A"))]),
        ];
        let err = run(types, vec![function("F", vec![QualType::new("A").pointer()])]).unwrap_err();
        assert_eq!(err, GenError::unsupported("A", "recursive by-value containment"));
    }

    #[test]
    fn shared_types_are_recorded_once() {
        let types = vec![record("Header", vec![("magic", QualType::new("uint32_t"))])];
        let header = QualType::new("Header").constant().pointer();
        let functions = [function("F", vec![header.clone()]), function("G", vec![header])];
        let graph = DeclGraph::from_parts(&types, &functions).unwrap();
        let mut collector = TypeCollector::new(&graph, DeclFilter::default());
        let mut emitter = Emitter::new();

        let first = collector.collect(&mut emitter, &functions[0]).unwrap();
        let second = collector.collect(&mut emitter, &functions[1]).unwrap();
        assert_eq!(first.new_types.len(), 1);
        assert!(second.new_types.is_empty());
        assert_eq!(first.referenced, second.referenced);
        assert_eq!(emitter.type_count(), 1);
    }

    #[test]
    fn opaque_records_are_forward_declared_only() {
        let stream = TypeDecl {
            name: "Stream".into(),
            namespace: "io".into(),
            kind: TypeDeclKind::Struct(RecordDecl {
                complete: false,
                ..Default::default()
            }),
            comment: None,
        };
        let emitter = run(vec![stream.clone()], vec![function("Open", vec![QualType::new("io::Stream").pointer()])]).unwrap();
        let records: Vec<&TypeRecord> = emitter.ordered_types().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spelling, "struct Stream;");
        assert_eq!(records[0].namespace, "io");
        assert_eq!(records[0].form, DeclForm::Forward);

        let holder = record("Holder", vec![("stream", QualType::new("io::Stream"))]);
        let err = run(vec![stream, holder], vec![function("F", vec![QualType::new("Holder").pointer()])]).unwrap_err();
        assert_eq!(err, GenError::unsupported("io::Stream", "incomplete type used by value"));
    }

    #[test]
    fn typedef_of_record_aliases_before_the_body() {
        let types = vec![
            TypeDecl {
                name: "NodePtr".into(),
                namespace: String::new(),
                kind: TypeDeclKind::Typedef(TypedefDecl {
                    underlying: QualType::new("Node").pointer(),
                }),
                comment: None,
            },
            record("Node", vec![("next", QualType::new("NodePtr"))]),
        ];
        let emitter = run(types, vec![function("F", vec![QualType::new("NodePtr")])]).unwrap();
        assert_eq!(
            spellings(&emitter),
            ["struct Node;", "using NodePtr = Node*;", "struct Node {\n  NodePtr next;\n};"]
        );
    }

    #[test]
    fn rejected_member_fails_the_whole_collection() {
        let types = vec![
            record("Wrapper", vec![("out", QualType::new("Output").pointer())]),
            TypeDecl {
                name: "Output".into(),
                namespace: String::new(),
                kind: TypeDeclKind::Class(RecordDecl {
                    has_virtual: true,
                    ..Default::default()
                }),
                comment: None,
            },
        ];
        let err = run(types, vec![function("F", vec![QualType::new("Wrapper").pointer()])]).unwrap_err();
        assert_eq!(err, GenError::unsupported("Output", "type uses virtual dispatch"));
    }

    #[test]
    fn std_types_demand_their_include() {
        let emitter = run(
            vec![],
            vec![function("Dump", vec![QualType::new("FILE").pointer(), QualType::new("time_t")])],
        )
        .unwrap();
        assert_eq!(emitter.type_count(), 0);
        assert_eq!(emitter.includes().collect::<Vec<_>>(), ["<cstdio>", "<ctime>"]);
    }

    #[test]
    fn posix_scalars_demand_sys_types() {
        let emitter = run(
            vec![],
            vec![function("Seek", vec![QualType::new("off_t"), QualType::new("ssize_t"), QualType::new("size_t")])],
        )
        .unwrap();
        assert_eq!(emitter.includes().collect::<Vec<_>>(), ["<sys/types.h>"]);
    }

    #[test]
    fn deep_member_chains_do_not_recurse_natively() {
        let depth = 20_000;
        let mut types = Vec::with_capacity(depth);
        for i in 0..depth {
            let fields = if i + 1 < depth {
                vec![("next", QualType::new(format!("T{}", i + 1)))]
            } else {
                vec![("value", QualType::new("int"))]
            };
            types.push(record(&format!("T{}", i), fields));
        }
        let emitter = run(types, vec![function("F", vec![QualType::new("T0").pointer()])]).unwrap();
        assert_eq!(emitter.type_count(), depth);
        let first = emitter.ordered_types().next().unwrap();
        assert!(first.spelling.starts_with(&format!("struct T{} {{", depth - 1)));
    }
}
