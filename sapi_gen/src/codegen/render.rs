/* Header renderer: turns the ordered records of one run into the C++ proxy
   header consumed by the sandbox runtime. */

use super::spelling::{declarator, type_spelling};
use crate::decl::{Category, DeclGraph, ScalarKind};
use crate::emitter::{DeclForm, Emitter, FunctionRecord, TypeRecord};
use crate::lowering::{BufferLength, Direction, LoweredParam, LoweredReturn, Marshalling, ParamRole};
use crate::naming::{resolve_param_names, NameScope};
use sapi_types::{GeneratorOptions, QualType};
use std::collections::HashMap;
use std::fmt::Write;

const RUNTIME_INCLUDES: &[&str] = &[
    "absl/status/status.h",
    "absl/status/statusor.h",
    "sandboxed_api/sandbox.h",
    "sandboxed_api/util/status_macros.h",
    "sandboxed_api/vars.h",
];

const BASE_INCLUDES: &[&str] = &["<cstddef>", "<cstdint>"];

/* `woff2_sapi.h` -> `WOFF2_SAPI_H_` */
pub fn default_header_guard(filename: &str) -> String {
    let file = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let mut guard: String = file
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    if guard.starts_with(|c: char| c.is_ascii_digit()) {
        guard.insert(0, '_');
    }
    guard.push('_');
    guard
}

/* `woff2` -> `Woff2Api`, `lib_foo` -> `LibFooApi` */
pub fn default_api_name(library: &str) -> String {
    let mut name = String::new();
    for part in library.split(|c: char| !c.is_ascii_alphanumeric()).filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.push_str(chars.as_str());
        }
    }
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "Sapi");
    }
    name.push_str("Api");
    name
}

/// Method name for every registered function: the unqualified name, or the
/// mangled qualified name when two functions share an unqualified name.
/// Unique unqualified names are claimed first; a mangled name that still
/// collides gets a numeric suffix.
pub fn method_names(emitter: &Emitter) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for function in emitter.ordered_functions() {
        *counts.entry(function.decl.name.as_str()).or_default() += 1;
    }

    let mut scope = NameScope::default();
    let mut names: Vec<Option<String>> = emitter
        .ordered_functions()
        .map(|function| {
            let name = function.decl.name.as_str();
            (counts[name] == 1).then(|| scope.reserve(name))
        })
        .collect();
    for (slot, function) in names.iter_mut().zip(emitter.ordered_functions()) {
        if slot.is_none() {
            *slot = Some(scope.reserve(&function.qualified_name.replace("::", "_")));
        }
    }
    names.into_iter().flatten().collect()
}

fn include_line(include: &str) -> String {
    if include.starts_with('<') || include.starts_with('"') {
        format!("#include {}", include)
    } else {
        format!("#include \"{}\"", include)
    }
}

fn sync_flag(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "::sapi::v::Pointable::kSyncBefore",
        Direction::Out => "::sapi::v::Pointable::kSyncAfter",
        Direction::InOut => "::sapi::v::Pointable::kSyncBoth",
    }
}

pub struct HeaderRenderer<'a> {
    graph: &'a DeclGraph,
    emitter: &'a Emitter,
    options: &'a GeneratorOptions,
    library: &'a str,
    needs_type_traits: bool,
}

impl<'a> HeaderRenderer<'a> {
    pub fn new(graph: &'a DeclGraph, emitter: &'a Emitter, options: &'a GeneratorOptions, library: &'a str) -> Self {
        Self {
            graph,
            emitter,
            options,
            library,
            needs_type_traits: false,
        }
    }

    pub fn render(mut self, filename: &str) -> String {
        /* bodies first: they decide whether <type_traits> is needed */
        let types = self.render_types();
        let api = self.render_api();

        let guard = self
            .options
            .header_guard
            .clone()
            .unwrap_or_else(|| default_header_guard(filename));

        let mut out = String::new();
        writeln!(out, "// Generated by sapi-gen from the `{}` declarations. Do not edit.", self.library).unwrap();
        out.push('\n');
        writeln!(out, "#ifndef {}", guard).unwrap();
        writeln!(out, "#define {}", guard).unwrap();
        out.push('\n');

        let mut std_includes: Vec<&str> = BASE_INCLUDES.to_vec();
        for include in self.emitter.includes() {
            if !std_includes.contains(&include) {
                std_includes.push(include);
            }
        }
        if self.needs_type_traits {
            std_includes.push("<type_traits>");
        }
        for include in std_includes {
            writeln!(out, "{}", include_line(include)).unwrap();
        }
        out.push('\n');
        for include in RUNTIME_INCLUDES {
            writeln!(out, "{}", include_line(include)).unwrap();
        }
        if !self.options.includes.is_empty() {
            out.push('\n');
            for include in &self.options.includes {
                writeln!(out, "{}", include_line(include)).unwrap();
            }
        }

        if !types.is_empty() {
            out.push('\n');
            out.push_str(&types);
        }
        out.push('\n');
        out.push_str(&api);
        out.push('\n');
        writeln!(out, "#endif  // {}", guard).unwrap();
        out
    }

    /* Ordered type records, grouped into runs that share a namespace */
    fn render_types(&self) -> String {
        let mut out = String::new();
        let records: Vec<&TypeRecord> = self.emitter.ordered_types().collect();
        let mut start = 0;
        while start < records.len() {
            let namespace = &records[start].namespace;
            let end = records[start..]
                .iter()
                .position(|record| &record.namespace != namespace)
                .map_or(records.len(), |offset| start + offset);

            if !out.is_empty() {
                out.push('\n');
            }
            if !namespace.is_empty() {
                writeln!(out, "namespace {} {{", namespace).unwrap();
                out.push('\n');
            }
            for (i, record) in records[start..end].iter().enumerate() {
                let tight = i > 0
                    && record.form == DeclForm::Forward
                    && records[start + i - 1].form == DeclForm::Forward;
                if i > 0 && !tight {
                    out.push('\n');
                }
                writeln!(out, "{}", record.spelling).unwrap();
            }
            if !namespace.is_empty() {
                out.push('\n');
                writeln!(out, "}}  // namespace {}", namespace).unwrap();
            }
            start = end;
        }
        out
    }

    fn render_api(&mut self) -> String {
        let class = self
            .options
            .api_name
            .clone()
            .unwrap_or_else(|| default_api_name(self.library));
        let names = method_names(self.emitter);
        let emitter = self.emitter;

        let mut out = String::new();
        if !self.options.namespace.is_empty() {
            writeln!(out, "namespace {} {{", self.options.namespace).unwrap();
            out.push('\n');
        }
        writeln!(out, "class {} {{", class).unwrap();
        out.push_str(" public:\n");
        writeln!(out, "  explicit {}(::sapi::Sandbox* sandbox) : sandbox_(sandbox) {{}}", class).unwrap();
        out.push('\n');
        out.push_str("  ::sapi::Sandbox* sandbox() const { return sandbox_; }\n");
        for (function, method) in emitter.ordered_functions().zip(&names) {
            out.push('\n');
            self.render_method(&mut out, function, method);
        }
        out.push('\n');
        out.push_str(" private:\n");
        out.push_str("  ::sapi::Sandbox* sandbox_;\n");
        out.push_str("};\n");
        if !self.options.namespace.is_empty() {
            out.push('\n');
            writeln!(out, "}}  // namespace {}", self.options.namespace).unwrap();
        }
        out
    }

    fn render_method(&mut self, out: &mut String, function: &FunctionRecord, method: &str) {
        let graph = self.graph;
        let decl = &function.decl;
        let params: Vec<String> = function
            .signature
            .params
            .iter()
            .map(|param| declarator(graph, &param.slot.ty, &param.slot.name))
            .collect();
        let params = params.join(", ");
        let return_spelling = type_spelling(graph, &decl.return_type);

        writeln!(out, "  // {} {}({})", return_spelling, function.qualified_name, params).unwrap();
        let result = match function.signature.ret {
            LoweredReturn::Void => "absl::Status".to_string(),
            LoweredReturn::Value => format!("absl::StatusOr<{}>", return_spelling),
        };
        writeln!(out, "  {} {}({}) {{", result, method, params).unwrap();

        let (_, mut scope) = resolve_param_names(&decl.params);
        scope.reserve("sandbox_");
        let mut args = Vec::new();
        let mut write_back = Vec::new();
        for param in &function.signature.params {
            let arg = self.render_param(out, param, &function.signature.params, &mut scope, &mut write_back);
            args.push(arg);
        }

        let ret = scope.reserve("ret_");
        match function.signature.ret {
            LoweredReturn::Void => writeln!(out, "    ::sapi::v::Void {};", ret).unwrap(),
            LoweredReturn::Value => {
                let value = self.value_spelling(&decl.return_type);
                writeln!(out, "    ::sapi::v::Reg<{}> {};", value, ret).unwrap();
            }
        }
        let mut call_args = format!("\"{}\", &{}", decl.symbol(), ret);
        for arg in &args {
            call_args.push_str(", ");
            call_args.push_str(arg);
        }
        /* `this->` keeps a parameter spelled `sandbox_` from hiding the member */
        writeln!(out, "    SAPI_RETURN_IF_ERROR(this->sandbox_->Call({}));", call_args).unwrap();
        for line in write_back {
            writeln!(out, "    {}", line).unwrap();
        }
        match function.signature.ret {
            LoweredReturn::Void => out.push_str("    return ::absl::OkStatus();\n"),
            LoweredReturn::Value => writeln!(out, "    return {}.GetValue();", ret).unwrap(),
        }
        out.push_str("  }\n");
    }

    /* Declares the marshalling locals for one parameter and returns the call argument */
    fn render_param(
        &mut self,
        out: &mut String,
        param: &LoweredParam,
        all: &[LoweredParam],
        scope: &mut NameScope,
        write_back: &mut Vec<String>,
    ) -> String {
        let slot = &param.slot;
        let name = slot.name.as_str();
        let var = scope.reserve(&format!("{}_", name));

        match &param.role {
            ParamRole::Length { .. }
            | ParamRole::Marshalled {
                primitive: Marshalling::ScalarByValue,
                ..
            } => {
                let (value, init) = if slot.ty.reference {
                    let mut pointer = slot.ty.clone();
                    pointer.reference = false;
                    pointer.pointers += 1;
                    (type_spelling(self.graph, &pointer), format!("&{}", name))
                } else {
                    (self.value_spelling(&slot.ty), name.to_string())
                };
                writeln!(out, "    ::sapi::v::Reg<{}> {}({});", value, var, init).unwrap();
                format!("&{}", var)
            }
            ParamRole::Marshalled {
                primitive: Marshalling::ScalarByReference,
                ..
            } => {
                let pointee = self.pointee_spelling(&slot.ty);
                let target = if slot.ty.reference { name.to_string() } else { format!("*{}", name) };
                if slot.direction == Direction::Out {
                    writeln!(out, "    ::sapi::v::Reg<{}> {};", pointee, var).unwrap();
                } else {
                    writeln!(out, "    ::sapi::v::Reg<{}> {}({});", pointee, var, target).unwrap();
                }
                write_back.push(format!("{} = {}.GetValue();", target, var));
                self.pointer_to(out, scope, &var, slot.direction)
            }
            ParamRole::Marshalled { primitive, length } => {
                let direction = match primitive {
                    Marshalling::BufferIn => Direction::In,
                    Marshalling::BufferOut => Direction::Out,
                    _ => Direction::InOut,
                };
                match length {
                    Some(BufferLength::NulTerminated) => {
                        writeln!(out, "    ::sapi::v::ConstCStr {}({});", var, name).unwrap();
                    }
                    Some(BufferLength::Param { index, by_reference }) => {
                        let length_name = all[*index].slot.name.as_str();
                        let count = if *by_reference {
                            format!("*{}", length_name)
                        } else {
                            length_name.to_string()
                        };
                        let (element, data) = self.buffer_pointer(&slot.ty, name);
                        writeln!(out, "    ::sapi::v::Array<{}> {}({}, {});", element, var, data, count).unwrap();
                    }
                    Some(BufferLength::Element) | None => {
                        let (element, data) = self.buffer_pointer(&slot.ty, name);
                        writeln!(out, "    ::sapi::v::Array<{}> {}({}, 1);", element, var, data).unwrap();
                    }
                }
                self.pointer_to(out, scope, &var, direction)
            }
        }
    }

    fn pointer_to(&self, out: &mut String, scope: &mut NameScope, var: &str, direction: Direction) -> String {
        let ptr = scope.reserve(&format!("{}ptr", var));
        writeln!(out, "    ::sapi::v::Ptr {}(&{}, {});", ptr, var, sync_flag(direction)).unwrap();
        format!("&{}", ptr)
    }

    /* Element type of a buffer and a mutable host pointer to its first element */
    fn buffer_pointer(&mut self, ty: &QualType, name: &str) -> (String, String) {
        let address = if ty.reference { format!("&{}", name) } else { name.to_string() };
        let untyped = self
            .graph
            .shape(ty)
            .is_some_and(|shape| shape.category == Category::Scalar(ScalarKind::Void));
        if untyped {
            let source = if ty.is_const { "const void*" } else { "void*" };
            let cast = if ty.is_const {
                format!("static_cast<uint8_t*>(const_cast<void*>(static_cast<{}>({})))", source, address)
            } else {
                format!("static_cast<uint8_t*>(static_cast<{}>({}))", source, address)
            };
            return ("uint8_t".to_string(), cast);
        }
        let element = self.pointee_spelling(ty);
        let data = format!("const_cast<{}*>({})", element, address);
        (element, data)
    }

    /* What `ty` points or refers to, with top-level const dropped */
    fn pointee_spelling(&mut self, ty: &QualType) -> String {
        let mut inner = ty.clone();
        inner.extent = None;
        if inner.reference {
            inner.reference = false;
        } else if inner.pointers > 0 {
            inner.pointers -= 1;
        } else {
            /* pointer hidden behind a typedef */
            self.needs_type_traits = true;
            return format!(
                "std::remove_const_t<std::remove_pointer_t<{}>>",
                type_spelling(self.graph, ty)
            );
        }
        if inner.pointers == 0 {
            inner.is_const = false;
        }
        type_spelling(self.graph, &inner)
    }

    /* Spelling usable as a `Reg<T>` argument: no top-level const */
    fn value_spelling(&self, ty: &QualType) -> String {
        let mut value = ty.clone();
        value.extent = None;
        if value.pointers == 0 && !value.reference {
            value.is_const = false;
        }
        type_spelling(self.graph, &value)
    }
}
