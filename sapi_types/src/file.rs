use crate::options::GeneratorOptions;
use crate::types::{FunctionDecl, TypeDecl};
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read declaration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse declaration file '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
}

/* Complete declaration file: the functions a front-end found plus every
   type reachable from them */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DeclFile {
    /* Library the declarations were parsed from, e.g. "woff2" */
    pub library: String,

    #[serde(default)]
    pub options: GeneratorOptions,

    #[serde(default)]
    pub types: Vec<TypeDecl>,

    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
}

impl DeclFile {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            options: GeneratorOptions::default(),
            types: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_type(&mut self, decl: TypeDecl) {
        self.types.push(decl);
    }

    pub fn add_function(&mut self, decl: FunctionDecl) {
        self.functions.push(decl);
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}
