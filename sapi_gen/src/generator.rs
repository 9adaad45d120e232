//! One generation run: registers every requested function, then renders and
//! validates the header. Nothing is returned unless the whole run succeeds.

use crate::codegen::render::{method_names, HeaderRenderer};
use crate::codegen::spelling::type_spelling;
use crate::codegen::validate::validator_for;
use crate::decl::DeclGraph;
use crate::emitter::{DeclForm, Emitter};
use crate::error::GenError;
use crate::filter::DeclFilter;
use crate::lowering::{lowering_for, Direction, LoweredReturn, ParamRole};
use crate::registrar::FunctionRegistrar;
use sapi_types::{DeclFile, DuplicatePolicy, FunctionDecl, GeneratorOptions};
use serde_derive::Serialize;
use tracing::{debug, info, warn};

/// A rendered and validated header, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedHeader {
    pub filename: String,
    pub text: String,
    pub type_count: usize,
    pub function_count: usize,
    /* Qualified names of duplicates dropped under `on-duplicate: skip` */
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TypeSummary {
    pub namespace: String,
    pub name: String,
    pub form: DeclForm,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParamSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub direction: Direction,
    #[serde(flatten)]
    pub role: ParamRole,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionSummary {
    pub name: String,
    pub method: String,
    pub returns: LoweredReturn,
    pub params: Vec<ParamSummary>,
    /* Types the signature reaches directly, by name */
    pub types: Vec<String>,
}

/// What a run would emit, without rendering it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Analysis {
    pub library: String,
    pub lowering: &'static str,
    pub includes: Vec<&'static str>,
    pub types: Vec<TypeSummary>,
    pub functions: Vec<FunctionSummary>,
    pub skipped: Vec<String>,
}

pub struct Generator<'g> {
    library: String,
    graph: &'g DeclGraph,
    options: GeneratorOptions,
    registrar: FunctionRegistrar<'g>,
    skipped: Vec<String>,
}

impl<'g> Generator<'g> {
    pub fn new(library: impl Into<String>, graph: &'g DeclGraph, options: GeneratorOptions) -> Self {
        let registrar = FunctionRegistrar::new(graph, DeclFilter::new(&options), lowering_for(options.lowering));
        Self {
            library: library.into(),
            graph,
            options,
            registrar,
            skipped: Vec::new(),
        }
    }

    /// Registers one function. Returns `Ok(false)` when the function is not
    /// on the allow-list, or is a duplicate and the policy is to skip.
    pub fn add(&mut self, decl: &FunctionDecl) -> Result<bool, GenError> {
        let qualified_name = decl.qualified_name();
        if !self.options.wants_function(&qualified_name, &decl.name) {
            debug!(function = %qualified_name, "not on the function allow-list");
            return Ok(false);
        }
        match self.registrar.add(decl) {
            Ok(_) => Ok(true),
            Err(GenError::DuplicateFunction { name }) if self.options.on_duplicate == DuplicatePolicy::Skip => {
                warn!(function = %name, "skipping duplicate function declaration");
                self.skipped.push(name);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn add_all<'d>(&mut self, decls: impl IntoIterator<Item = &'d FunctionDecl>) -> Result<(), GenError> {
        for decl in decls {
            self.add(decl)?;
        }
        Ok(())
    }

    pub fn emitter(&self) -> &Emitter {
        self.registrar.emitter()
    }

    pub fn analysis(&self) -> Analysis {
        let emitter = self.registrar.emitter();
        let graph = self.graph;
        let types = emitter
            .ordered_types()
            .map(|record| TypeSummary {
                namespace: record.namespace.clone(),
                name: graph.node(record.decl).name.clone(),
                form: record.form,
            })
            .collect();
        let functions = emitter
            .ordered_functions()
            .zip(method_names(emitter))
            .map(|(function, method)| FunctionSummary {
                name: function.qualified_name.clone(),
                method,
                returns: function.signature.ret,
                params: function
                    .signature
                    .params
                    .iter()
                    .map(|param| ParamSummary {
                        name: param.slot.name.clone(),
                        ty: type_spelling(graph, &param.slot.ty),
                        direction: param.slot.direction,
                        role: param.role.clone(),
                    })
                    .collect(),
                types: function
                    .types
                    .iter()
                    .map(|handle| graph.node(emitter.type_record(*handle).decl).name.clone())
                    .collect(),
            })
            .collect();

        Analysis {
            library: self.library.clone(),
            lowering: self.registrar.lowering_name(),
            includes: emitter.includes().collect(),
            types,
            functions,
            skipped: self.skipped.clone(),
        }
    }

    /// Renders and validates the header for everything registered so far.
    pub fn finish(self, filename: &str) -> Result<GeneratedHeader, GenError> {
        let emitter = self.registrar.emitter();
        let text = HeaderRenderer::new(self.graph, emitter, &self.options, &self.library).render(filename);
        let validator = validator_for(&self.options);
        let text = validator.validate(filename, &text)?;
        info!(
            filename,
            validator = validator.name(),
            types = emitter.type_count(),
            functions = emitter.function_count(),
            "generated header"
        );
        Ok(GeneratedHeader {
            filename: filename.to_string(),
            text,
            type_count: emitter.type_count(),
            function_count: emitter.function_count(),
            skipped: self.skipped,
        })
    }
}

/// Full run over a declaration file, with `options` already merged from the
/// file and the command line.
pub fn generate(
    file: &DeclFile,
    graph: &DeclGraph,
    options: &GeneratorOptions,
    filename: &str,
) -> Result<GeneratedHeader, GenError> {
    let mut generator = Generator::new(file.library.clone(), graph, options.clone());
    generator.add_all(&file.functions)?;
    generator.finish(filename)
}

/// Registration only, for inspecting a run without rendering it.
pub fn analyze(file: &DeclFile, graph: &DeclGraph, options: &GeneratorOptions) -> Result<Analysis, GenError> {
    let mut generator = Generator::new(file.library.clone(), graph, options.clone());
    generator.add_all(&file.functions)?;
    Ok(generator.analysis())
}
