use serde_derive::{Deserialize, Serialize};

/* What the driver does when a function is registered a second time */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /* Abort the run with a duplicate-function error */
    #[default]
    Error,
    /* Keep the first registration and log the duplicate */
    Skip,
}

/* Which lowering back-end maps parameters onto marshalling primitives */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoweringKind {
    /* Fold a byte pointer and its length into one bounded buffer */
    #[default]
    PairedBuffers,
    /* Keep every parameter separate; byte pointers travel as remote pointers */
    Independent,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValidatorKind {
    #[default]
    Builtin,
    ClangFormat,
}

/* Generator configuration, read from the `options:` block of a declaration file */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct GeneratorOptions {
    /* Namespace the API class is emitted into */
    pub namespace: String,
    /* API class name, `<Library>Api` when unset */
    pub api_name: Option<String>,
    /* Include guard, derived from the output file name when unset */
    pub header_guard: Option<String>,
    /* Extra headers included verbatim after the runtime headers */
    pub includes: Vec<String>,
    /* Types always emitted as forward declarations */
    pub opaque_types: Vec<String>,
    /* Functions to expose; empty exposes every declared function */
    pub functions: Vec<String>,
    pub on_duplicate: DuplicatePolicy,
    pub lowering: LoweringKind,
    pub validator: ValidatorKind,
    pub clang_format_path: String,
    pub clang_format_style: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            namespace: "sapi_generated".to_string(),
            api_name: None,
            header_guard: None,
            includes: Vec::new(),
            opaque_types: Vec::new(),
            functions: Vec::new(),
            on_duplicate: DuplicatePolicy::Error,
            lowering: LoweringKind::PairedBuffers,
            validator: ValidatorKind::Builtin,
            clang_format_path: "clang-format".to_string(),
            clang_format_style: "Google".to_string(),
        }
    }
}

impl GeneratorOptions {
    /* Whether `qualified_name` passes the function allow-list */
    pub fn wants_function(&self, qualified_name: &str, name: &str) -> bool {
        self.functions.is_empty()
            || self
                .functions
                .iter()
                .any(|f| f.trim_start_matches("::") == qualified_name || f == name)
    }
}
