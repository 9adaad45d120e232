/* Common utilities shared between the generate and analyze commands */

use anyhow::Context;
use sapi_gen::decl::DeclGraph;
use sapi_gen::{DeclFile, DuplicatePolicy, GeneratorOptions, LoweringKind, ValidatorKind};
use std::path::Path;

/* Command-line settings that take precedence over the file's `options:` block */
#[derive(Debug, Default, Clone)]
pub struct Overrides {
  pub namespace: Option<String>,
  pub api_name: Option<String>,
  pub on_duplicate: Option<DuplicatePolicy>,
  pub lowering: Option<LoweringKind>,
  pub validator: Option<ValidatorKind>,
  pub functions: Vec<String>,
}

impl Overrides {
  pub fn apply(self, options: &mut GeneratorOptions) {
    if let Some(namespace) = self.namespace {
      options.namespace = namespace;
    }
    if self.api_name.is_some() {
      options.api_name = self.api_name;
    }
    if let Some(policy) = self.on_duplicate {
      options.on_duplicate = policy;
    }
    if let Some(lowering) = self.lowering {
      options.lowering = lowering;
    }
    if let Some(validator) = self.validator {
      options.validator = validator;
    }
    if !self.functions.is_empty() {
      options.functions = self.functions;
    }
  }
}

/* Load a declaration file and build its declaration graph */
pub fn load_declarations(path: &Path, verbose: bool) -> anyhow::Result<(DeclFile, DeclGraph)> {
  if verbose {
    println!("[~] Loading declarations from {}", path.display());
  }

  let file = DeclFile::load(path)?;
  let graph = DeclGraph::build(&file)
    .with_context(|| format!("invalid declarations in '{}'", path.display()))?;

  if verbose {
    println!("[✓] Loaded library '{}'", file.library);
    println!("  Types declared: {}", file.types.len());
    println!("  Functions declared: {}", file.functions.len());
    println!("  Graph nodes: {}", graph.len());
    println!();
  }

  Ok((file, graph))
}

/* Write `contents` next to `path` first and rename it into place, so a
   failed run never leaves a partial file behind */
pub fn write_atomically(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  std::fs::create_dir_all(parent)
    .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;

  let file_name = path
    .file_name()
    .with_context(|| format!("output path '{}' has no file name", path.display()))?;
  let temp = parent.join(format!(".{}.{}.tmp", file_name.to_string_lossy(), std::process::id()));

  if let Err(err) = std::fs::write(&temp, contents) {
    let _ = std::fs::remove_file(&temp);
    return Err(err).with_context(|| format!("failed to write '{}'", temp.display()));
  }
  if let Err(err) = std::fs::rename(&temp, path) {
    let _ = std::fs::remove_file(&temp);
    return Err(err).with_context(|| format!("failed to move output into '{}'", path.display()));
  }
  Ok(())
}
