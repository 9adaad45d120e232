use super::builtins::{builtin_scalar, known_std, ScalarKind, StdType};
use crate::error::DeclError;
use sapi_types::{DeclFile, FunctionDecl, QualType, TypeDecl, TypeDeclKind};
use std::collections::HashMap;
use tracing::debug;

/* Typedef chains longer than this are treated as unresolvable loops */
const MAX_TYPEDEF_DEPTH: usize = 64;

/// Stable handle of a node in the declaration arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Builtin(ScalarKind),
    KnownStd(&'static StdType),
    Declared(TypeDecl),
    /* Referenced by some declaration but never declared by the front-end */
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub id: TypeId,
    /* Fully qualified name without a leading `::` */
    pub name: String,
    pub namespace: String,
    pub kind: NodeKind,
}

impl TypeNode {
    pub fn declared(&self) -> Option<&TypeDecl> {
        match &self.kind {
            NodeKind::Declared(decl) => Some(decl),
            _ => None,
        }
    }

    /* Unqualified name, the part after the last `::` */
    pub fn short_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }
}

/// Category of a use-site type after looking through typedefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scalar(ScalarKind),
    Enum,
    Record,
    Union,
    Std { scalar: bool },
    FunctionProto,
    Unresolved,
}

/// A use-site type with typedefs peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeShape {
    /* The node the typedef chain ends at */
    pub target: TypeId,
    pub category: Category,
    pub pointers: u8,
    pub reference: bool,
    pub is_const: bool,
}

impl TypeShape {
    pub fn is_indirect(&self) -> bool {
        self.pointers > 0 || self.reference
    }

    /* Indirection levels, counting a reference as one */
    pub fn depth(&self) -> u16 {
        u16::from(self.pointers) + u16::from(self.reference)
    }
}

/// Arena of every type reachable from a declaration file, addressed by
/// `TypeId`, with a side map for name lookup. Nodes are created in
/// declaration order, so ids are deterministic for a given input.
#[derive(Debug, Default)]
pub struct DeclGraph {
    nodes: Vec<TypeNode>,
    by_name: HashMap<String, TypeId>,
}

impl DeclGraph {
    pub fn build(file: &DeclFile) -> Result<Self, DeclError> {
        Self::from_parts(&file.types, &file.functions)
    }

    pub fn from_parts(types: &[TypeDecl], functions: &[FunctionDecl]) -> Result<Self, DeclError> {
        let mut graph = DeclGraph::default();

        for decl in types {
            graph.declare(decl)?;
        }

        /* Intern every spelling a declaration refers to */
        for decl in types {
            match &decl.kind {
                TypeDeclKind::Struct(record)
                | TypeDeclKind::Class(record)
                | TypeDeclKind::Union(record) => {
                    for field in &record.fields {
                        graph.intern(field.ty.base_name());
                    }
                }
                TypeDeclKind::Enum(enum_decl) => {
                    if let Some(underlying) = &enum_decl.underlying {
                        graph.intern(underlying);
                    }
                }
                TypeDeclKind::Typedef(typedef) => {
                    graph.intern(typedef.underlying.base_name());
                }
                TypeDeclKind::FunctionProto(_) => {}
            }
        }
        for function in functions {
            graph.intern(function.return_type.base_name());
            for param in &function.params {
                graph.intern(param.ty.base_name());
            }
        }

        debug!(nodes = graph.nodes.len(), "built declaration graph");
        Ok(graph)
    }

    fn declare(&mut self, decl: &TypeDecl) -> Result<(), DeclError> {
        let name = decl.qualified_name();

        /* Front-ends routinely surface libc typedefs such as `uint8_t`;
           the builtin tables already cover those. */
        if builtin_scalar(&name).is_some() || known_std(&name).is_some() {
            debug!(%name, "ignoring declaration of builtin type");
            return Ok(());
        }

        if let Some(existing) = self.by_name.get(&name).copied() {
            let existing_kind = match &self.nodes[existing.index()].kind {
                NodeKind::Declared(prev) => &prev.kind,
                _ => unreachable!("only declared nodes exist while declaring"),
            };
            /* `typedef struct Foo Foo;` names the record it aliases */
            if let TypeDeclKind::Typedef(typedef) = &decl.kind {
                if existing_kind.record().is_some()
                    && typedef.underlying.base_name() == name
                    && !typedef.underlying.is_indirect()
                {
                    debug!(%name, "folding tag typedef into its record");
                    return Ok(());
                }
            }
            if let TypeDeclKind::Typedef(typedef) = existing_kind {
                if decl.kind.record().is_some()
                    && typedef.underlying.base_name() == name
                    && !typedef.underlying.is_indirect()
                {
                    debug!(%name, "replacing tag typedef with its record");
                    self.nodes[existing.index()].kind = NodeKind::Declared(decl.clone());
                    return Ok(());
                }
            }
            return Err(DeclError::DuplicateType {
                name,
                first: existing_kind.keyword(),
                second: decl.kind.keyword(),
            });
        }

        let namespace = decl.namespace.trim_start_matches("::").to_string();
        self.push(name, namespace, NodeKind::Declared(decl.clone()));
        Ok(())
    }

    fn intern(&mut self, name: &str) -> TypeId {
        let name = name.trim_start_matches("::");
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let kind = if let Some(scalar) = builtin_scalar(name) {
            NodeKind::Builtin(scalar)
        } else if let Some(std_type) = known_std(name) {
            NodeKind::KnownStd(std_type)
        } else {
            debug!(%name, "type referenced but never declared");
            NodeKind::Unresolved
        };
        let namespace = name
            .rsplit_once("::")
            .map(|(namespace, _)| namespace.to_string())
            .unwrap_or_default();
        self.push(name.to_string(), namespace, kind)
    }

    fn push(&mut self, name: String, namespace: String, kind: NodeKind) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.nodes.push(TypeNode {
            id,
            name,
            namespace,
            kind,
        });
        id
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name.trim_start_matches("::")).copied()
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Canonicalizes a use-site type through its typedef chain. `None` means
    /// the base spelling was never interned, which callers treat like an
    /// unresolved declaration.
    pub fn shape(&self, ty: &QualType) -> Option<TypeShape> {
        let mut id = self.lookup(ty.base_name())?;
        let mut pointers = ty.pointers;
        let mut reference = ty.reference;
        let mut is_const = ty.is_const;

        for _ in 0..MAX_TYPEDEF_DEPTH {
            let node = self.node(id);
            let category = match &node.kind {
                NodeKind::Builtin(scalar) => Category::Scalar(*scalar),
                NodeKind::KnownStd(std_type) => Category::Std {
                    scalar: std_type.scalar,
                },
                NodeKind::Unresolved => Category::Unresolved,
                NodeKind::Declared(decl) => match &decl.kind {
                    TypeDeclKind::Struct(_) | TypeDeclKind::Class(_) => Category::Record,
                    TypeDeclKind::Union(_) => Category::Union,
                    TypeDeclKind::Enum(_) => Category::Enum,
                    TypeDeclKind::FunctionProto(_) => Category::FunctionProto,
                    TypeDeclKind::Typedef(typedef) => {
                        let underlying = &typedef.underlying;
                        pointers = pointers.saturating_add(underlying.pointers);
                        reference |= underlying.reference;
                        is_const |= underlying.is_const;
                        id = self.lookup(underlying.base_name())?;
                        continue;
                    }
                },
            };
            return Some(TypeShape {
                target: id,
                category,
                pointers,
                reference,
                is_const,
            });
        }

        Some(TypeShape {
            target: id,
            category: Category::Unresolved,
            pointers,
            reference,
            is_const,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapi_types::{FieldDecl, ParamDecl, RecordDecl, TypedefDecl};

    fn record(name: &str, fields: Vec<FieldDecl>) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            namespace: String::new(),
            kind: TypeDeclKind::Struct(RecordDecl {
                fields,
                ..Default::default()
            }),
            comment: None,
        }
    }

    fn typedef(name: &str, underlying: QualType) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            namespace: String::new(),
            kind: TypeDeclKind::Typedef(TypedefDecl { underlying }),
            comment: None,
        }
    }

    #[test]
    fn interns_referenced_builtins_and_unresolved_names() {
        let types = vec![record(
            "Header",
            vec![
                FieldDecl {
                    name: "magic".into(),
                    ty: QualType::new("uint32_t"),
                },
                FieldDecl {
                    name: "stream".into(),
                    ty: QualType::new("Stream").pointer(),
                },
            ],
        )];
        let graph = DeclGraph::from_parts(&types, &[]).unwrap();

        assert_eq!(graph.len(), 3);
        let magic = graph.lookup("uint32_t").unwrap();
        assert!(matches!(graph.node(magic).kind, NodeKind::Builtin(ScalarKind::Integral)));
        let stream = graph.lookup("::Stream").unwrap();
        assert!(matches!(graph.node(stream).kind, NodeKind::Unresolved));
    }

    #[test]
    fn shape_sums_pointer_depth_through_typedefs() {
        let types = vec![
            record("Node", vec![]),
            typedef("NodePtr", QualType::new("Node").pointer()),
            typedef("NodeHandle", QualType::new("NodePtr").constant()),
        ];
        let graph = DeclGraph::from_parts(&types, &[]).unwrap();

        let shape = graph.shape(&QualType::new("NodeHandle").pointer()).unwrap();
        assert_eq!(shape.category, Category::Record);
        assert_eq!(shape.pointers, 2);
        assert!(shape.is_const);
        assert_eq!(graph.node(shape.target).name, "Node");
    }

    #[test]
    fn tag_typedef_folds_into_record() {
        let types = vec![
            typedef("Node", QualType::new("Node")),
            record("Node", vec![]),
        ];
        let graph = DeclGraph::from_parts(&types, &[]).unwrap();
        let node = graph.node(graph.lookup("Node").unwrap());
        assert!(node.declared().unwrap().kind.record().is_some());
    }

    #[test]
    fn conflicting_declarations_are_rejected() {
        let types = vec![
            record("Header", vec![]),
            typedef("Header", QualType::new("int")),
        ];
        let err = DeclGraph::from_parts(&types, &[]).unwrap_err();
        assert_eq!(
            err,
            DeclError::DuplicateType {
                name: "Header".into(),
                first: "struct",
                second: "typedef",
            }
        );
    }

    #[test]
    fn libc_typedefs_defer_to_builtins() {
        let types = vec![typedef("size_t", QualType::new("unsigned long"))];
        let functions = vec![FunctionDecl::new(
            "Size",
            QualType::new("size_t"),
            vec![ParamDecl::unnamed(QualType::new("int"))],
        )];
        let graph = DeclGraph::from_parts(&types, &functions).unwrap();
        let size = graph.lookup("size_t").unwrap();
        assert!(matches!(graph.node(size).kind, NodeKind::Builtin(_)));
    }

    #[test]
    fn looping_typedefs_shape_as_unresolved() {
        let types = vec![
            typedef("A", QualType::new("B")),
            typedef("B", QualType::new("A")),
        ];
        let graph = DeclGraph::from_parts(&types, &[]).unwrap();
        let shape = graph.shape(&QualType::new("A")).unwrap();
        assert_eq!(shape.category, Category::Unresolved);
    }
}
