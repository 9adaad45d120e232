/* Generate command - render the proxy header for a declaration file */

use super::common::{load_declarations, write_atomically, Overrides};
use sapi_gen::generate;
use std::path::PathBuf;

/* Execute the generate command */
pub fn run(file: PathBuf, output: PathBuf, overrides: Overrides, verbose: bool) -> anyhow::Result<()> {
  if verbose {
    println!("Sandboxed API Generator - Header Generation");
    println!("===========================================\n");
  }

  let (decls, graph) = load_declarations(&file, verbose)?;

  let mut options = decls.options.clone();
  overrides.apply(&mut options);

  if verbose {
    println!("[~] Configuration:");
    println!("  Output: {}", output.display());
    println!("  Namespace: {}", options.namespace);
    println!("  Lowering: {:?}", options.lowering);
    println!("  Validator: {:?}", options.validator);
    println!("  On duplicate: {:?}", options.on_duplicate);
    if !options.functions.is_empty() {
      println!("  Functions: {}", options.functions.join(", "));
    }
    println!();
  }

  let filename = output
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| output.display().to_string());

  let header = match generate(&decls, &graph, &options, &filename) {
    Ok(header) => header,
    Err(err) => {
      if verbose {
        println!("[✗] Generation failed: {}", err);
      }
      return Err(err.into());
    }
  };

  for name in &header.skipped {
    println!("[~] Skipped duplicate declaration of '{}'", name);
  }

  write_atomically(&output, &header.text)?;

  if verbose {
    println!("[✓] Wrote {}", output.display());
    println!("  Types emitted: {}", header.type_count);
    println!("  Functions emitted: {}", header.function_count);
  }

  Ok(())
}
