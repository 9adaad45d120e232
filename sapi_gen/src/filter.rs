//! Declaration filter: decides how (and whether) a type crosses the boundary.

use crate::decl::builtins::builtin_include;
use crate::decl::{NodeKind, TypeNode};
use crate::error::GenError;
use sapi_types::{FunctionDecl, GeneratorOptions, TypeDeclKind};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /* Render the full declaration */
    Emit,
    /* Render a forward declaration only */
    EmitOpaque,
    /* Already available; `include` names the header that provides it */
    SkipKnown { include: Option<&'static str> },
    /* Cannot be represented across the boundary */
    Reject(String),
}

/// Pure classifier over declaration nodes. The answer depends only on the
/// node and the configured opaque list, never on discovery order.
#[derive(Debug, Clone, Default)]
pub struct DeclFilter {
    opaque_types: HashSet<String>,
}

impl DeclFilter {
    pub fn new(options: &GeneratorOptions) -> Self {
        Self {
            opaque_types: options
                .opaque_types
                .iter()
                .map(|name| name.trim_start_matches("::").to_string())
                .collect(),
        }
    }

    pub fn classify(&self, node: &TypeNode) -> Classification {
        let classification = self.classify_kind(node);
        debug!(ty = %node.name, ?classification, "classified");
        classification
    }

    fn classify_kind(&self, node: &TypeNode) -> Classification {
        let decl = match &node.kind {
            NodeKind::Builtin(_) => {
                return Classification::SkipKnown {
                    include: builtin_include(&node.name),
                };
            }
            NodeKind::KnownStd(std_type) => {
                return Classification::SkipKnown {
                    include: Some(std_type.include),
                };
            }
            NodeKind::Unresolved => {
                return Classification::Reject("type is referenced but never declared".into());
            }
            NodeKind::Declared(decl) => decl,
        };

        match &decl.kind {
            TypeDeclKind::Struct(record) | TypeDeclKind::Class(record) | TypeDeclKind::Union(record) => {
                let is_union = matches!(decl.kind, TypeDeclKind::Union(_));
                if !record.template_params.is_empty() {
                    return Classification::Reject(format!(
                        "template <{}> is not instantiated",
                        record.template_params.join(", ")
                    ));
                }
                if record.has_virtual {
                    return Classification::Reject("type uses virtual dispatch".into());
                }
                if is_union && !record.complete {
                    return Classification::Reject("union is never defined".into());
                }
                if !record.complete || self.opaque_types.contains(&node.name) {
                    return Classification::EmitOpaque;
                }
                Classification::Emit
            }
            TypeDeclKind::FunctionProto(proto) => Classification::Reject(format!(
                "function type '{}' cannot cross a process boundary",
                proto.spelling
            )),
            TypeDeclKind::Enum(_) | TypeDeclKind::Typedef(_) => {
                if self.opaque_types.contains(&node.name) {
                    return Classification::Reject(format!(
                        "only records can be opaque, '{}' is a {}",
                        node.name,
                        decl.kind.keyword()
                    ));
                }
                Classification::Emit
            }
        }
    }

    /* Function-level screening, before any of the signature is visited */
    pub fn screen_function(&self, decl: &FunctionDecl) -> Result<(), GenError> {
        if !decl.template_params.is_empty() {
            return Err(GenError::unsupported(
                decl.qualified_name(),
                "function templates cannot be called across the boundary",
            ));
        }
        if decl.variadic {
            return Err(GenError::unsupported(
                decl.qualified_name(),
                "variadic functions cannot be called across the boundary",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::DeclGraph;
    use sapi_types::{EnumDecl, FunctionProtoDecl, QualType, RecordDecl, TypeDecl, TypedefDecl};

    fn decl(name: &str, kind: TypeDeclKind) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            namespace: "lib".to_string(),
            kind,
            comment: None,
        }
    }

    fn classify_one(filter: &DeclFilter, decl: TypeDecl) -> Classification {
        let name = decl.qualified_name();
        let graph = DeclGraph::from_parts(&[decl], &[]).unwrap();
        filter.classify(graph.node(graph.lookup(&name).unwrap()))
    }

    #[test]
    fn records_by_completeness_and_shape() {
        let filter = DeclFilter::default();
        let complete = decl("Header", TypeDeclKind::Struct(RecordDecl::default()));
        assert_eq!(classify_one(&filter, complete), Classification::Emit);

        let forward = decl(
            "Stream",
            TypeDeclKind::Struct(RecordDecl {
                complete: false,
                ..Default::default()
            }),
        );
        assert_eq!(classify_one(&filter, forward), Classification::EmitOpaque);

        let union = decl(
            "Value",
            TypeDeclKind::Union(RecordDecl {
                complete: false,
                ..Default::default()
            }),
        );
        assert!(matches!(classify_one(&filter, union), Classification::Reject(_)));
    }

    #[test]
    fn virtual_and_template_records_are_rejected() {
        let filter = DeclFilter::default();
        let virt = decl(
            "Out",
            TypeDeclKind::Class(RecordDecl {
                has_virtual: true,
                ..Default::default()
            }),
        );
        assert_eq!(
            classify_one(&filter, virt),
            Classification::Reject("type uses virtual dispatch".into())
        );

        let template = decl(
            "Vec",
            TypeDeclKind::Class(RecordDecl {
                template_params: vec!["T".into()],
                ..Default::default()
            }),
        );
        assert_eq!(
            classify_one(&filter, template),
            Classification::Reject("template <T> is not instantiated".into())
        );
    }

    #[test]
    fn opaque_list_applies_to_records_only() {
        let options = GeneratorOptions {
            opaque_types: vec!["::lib::Header".into(), "lib::Mode".into()],
            ..Default::default()
        };
        let filter = DeclFilter::new(&options);
        let header = decl("Header", TypeDeclKind::Struct(RecordDecl::default()));
        assert_eq!(classify_one(&filter, header), Classification::EmitOpaque);

        let mode = decl("Mode", TypeDeclKind::Enum(EnumDecl::default()));
        assert!(matches!(classify_one(&filter, mode), Classification::Reject(_)));
    }

    #[test]
    fn builtins_and_std_types_are_skipped() {
        let filter = DeclFilter::default();
        let alias = decl(
            "Handle",
            TypeDeclKind::Typedef(TypedefDecl {
                underlying: QualType::new("FILE").pointer(),
            }),
        );
        let proto = decl(
            "Callback",
            TypeDeclKind::FunctionProto(FunctionProtoDecl {
                spelling: "void (int)".into(),
            }),
        );
        let graph = DeclGraph::from_parts(&[alias, proto], &[]).unwrap();

        let file = graph.node(graph.lookup("FILE").unwrap());
        assert_eq!(
            filter.classify(file),
            Classification::SkipKnown {
                include: Some("<cstdio>")
            }
        );
        let handle = graph.node(graph.lookup("lib::Handle").unwrap());
        assert_eq!(filter.classify(handle), Classification::Emit);
        let callback = graph.node(graph.lookup("lib::Callback").unwrap());
        assert!(matches!(filter.classify(callback), Classification::Reject(_)));
    }

    #[test]
    fn classification_ignores_discovery_order() {
        let filter = DeclFilter::default();
        let a = decl("A", TypeDeclKind::Struct(RecordDecl::default()));
        let b = decl(
            "B",
            TypeDeclKind::Struct(RecordDecl {
                complete: false,
                ..Default::default()
            }),
        );
        let forward = DeclGraph::from_parts(&[a.clone(), b.clone()], &[]).unwrap();
        let reverse = DeclGraph::from_parts(&[b, a], &[]).unwrap();
        for name in ["lib::A", "lib::B"] {
            assert_eq!(
                filter.classify(forward.node(forward.lookup(name).unwrap())),
                filter.classify(reverse.node(reverse.lookup(name).unwrap()))
            );
        }
    }

    #[test]
    fn variadic_functions_are_screened_out() {
        let filter = DeclFilter::default();
        let mut printf = FunctionDecl::new("printf", QualType::new("int"), vec![]);
        printf.variadic = true;
        let err = filter.screen_function(&printf).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedConstruct { ref decl, .. } if decl == "printf"));
    }
}
