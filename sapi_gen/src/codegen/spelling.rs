/* Canonical C++ spellings of types and type declarations. The spelling of a
   declaration doubles as its identity in the emitter, so everything here
   must be a pure function of the declaration. */

use crate::decl::{DeclGraph, NodeKind, TypeNode};
use sapi_types::{QualType, RecordDecl, TypeDeclKind};
use std::fmt::Write;

/* Name of a base type as seen from any namespace of the generated header */
pub fn base_spelling(graph: &DeclGraph, name: &str) -> String {
    let name = name.trim_start_matches("::");
    match graph.lookup(name).map(|id| graph.node(id)) {
        Some(node) if matches!(node.kind, NodeKind::Declared(_)) && !node.namespace.is_empty() => {
            format!("::{}", node.name)
        }
        _ => name.to_string(),
    }
}

/* `const T**&`, without a declarator name */
pub fn type_spelling(graph: &DeclGraph, ty: &QualType) -> String {
    let mut out = String::new();
    if ty.is_const {
        out.push_str("const ");
    }
    out.push_str(&base_spelling(graph, &ty.name));
    for _ in 0..ty.pointers {
        out.push('*');
    }
    if ty.reference {
        out.push('&');
    }
    out
}

/* `T name` or `T name[N]` */
pub fn declarator(graph: &DeclGraph, ty: &QualType, name: &str) -> String {
    match ty.extent {
        Some(extent) => format!("{} {}[{}]", type_spelling(graph, ty), name, extent),
        None => format!("{} {}", type_spelling(graph, ty), name),
    }
}

fn comment_lines(out: &mut String, comment: Option<&str>) {
    if let Some(comment) = comment {
        for line in comment.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                out.push_str("//\n");
            } else {
                writeln!(out, "// {}", line).unwrap();
            }
        }
    }
}

pub fn forward_declaration(node: &TypeNode) -> String {
    match node.declared().map(|decl| &decl.kind) {
        Some(TypeDeclKind::Enum(enum_decl)) => {
            let key = if enum_decl.scoped { "enum class" } else { "enum" };
            let underlying = enum_decl.underlying.as_deref().unwrap_or("int");
            format!("{} {} : {};", key, node.short_name(), underlying)
        }
        Some(kind) => format!("{} {};", kind.keyword(), node.short_name()),
        None => format!("struct {};", node.short_name()),
    }
}

fn record_definition(graph: &DeclGraph, out: &mut String, keyword: &str, name: &str, record: &RecordDecl) {
    if record.fields.is_empty() {
        writeln!(out, "{} {} {{}};", keyword, name).unwrap();
        return;
    }
    writeln!(out, "{} {} {{", keyword, name).unwrap();
    if keyword == "class" {
        out.push_str(" public:\n");
    }
    for field in &record.fields {
        writeln!(out, "  {};", declarator(graph, &field.ty, &field.name)).unwrap();
    }
    out.push_str("};\n");
}

/// Full definition of a declared type. Only declared records, enums and
/// typedefs have definitions; anything else spells as its forward declaration.
pub fn definition(graph: &DeclGraph, node: &TypeNode) -> String {
    let Some(decl) = node.declared() else {
        return forward_declaration(node);
    };
    let mut out = String::new();
    comment_lines(&mut out, decl.comment.as_deref());
    let name = node.short_name();

    match &decl.kind {
        TypeDeclKind::Struct(record) => record_definition(graph, &mut out, "struct", name, record),
        TypeDeclKind::Class(record) => record_definition(graph, &mut out, "class", name, record),
        TypeDeclKind::Union(record) => record_definition(graph, &mut out, "union", name, record),
        TypeDeclKind::Enum(enum_decl) => {
            let key = if enum_decl.scoped { "enum class" } else { "enum" };
            match &enum_decl.underlying {
                Some(underlying) => write!(out, "{} {} : {}", key, name, base_spelling(graph, underlying)).unwrap(),
                None => write!(out, "{} {}", key, name).unwrap(),
            }
            if enum_decl.enumerators.is_empty() {
                out.push_str(" {};\n");
            } else {
                out.push_str(" {\n");
                for enumerator in &enum_decl.enumerators {
                    match enumerator.value {
                        Some(value) => writeln!(out, "  {} = {},", enumerator.name, value).unwrap(),
                        None => writeln!(out, "  {},", enumerator.name).unwrap(),
                    }
                }
                out.push_str("};\n");
            }
        }
        TypeDeclKind::Typedef(typedef) => {
            let mut underlying = type_spelling(graph, &typedef.underlying);
            if let Some(extent) = typedef.underlying.extent {
                write!(underlying, "[{}]", extent).unwrap();
            }
            writeln!(out, "using {} = {};", name, underlying).unwrap();
        }
        TypeDeclKind::FunctionProto(proto) => {
            /* never emitted, the filter rejects these */
            writeln!(out, "// function type {}: {}", name, proto.spelling).unwrap();
        }
    }

    while out.ends_with('\n') {
        out.pop();
    }
    out
}
