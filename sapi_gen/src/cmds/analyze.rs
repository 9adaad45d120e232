/* Analyze command - report what a run would expose */

use super::common::load_declarations;
use sapi_gen::lowering::{BufferLength, ParamRole};
use sapi_gen::{analyze, Analysis};
use std::path::PathBuf;

/* Execute the analyze command */
pub fn run(file: PathBuf, json: bool, verbose: bool) -> anyhow::Result<()> {
  let (decls, graph) = load_declarations(&file, verbose && !json)?;
  let analysis = analyze(&decls, &graph, &decls.options)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&analysis)?);
  } else {
    print_report(&analysis);
  }
  Ok(())
}

fn describe_role(role: &ParamRole) -> String {
  match role {
    ParamRole::Length { buffer } => format!("length of parameter #{}", buffer),
    ParamRole::Marshalled { primitive, length } => {
      let primitive = serde_json::to_value(primitive)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", primitive));
      match length {
        None => primitive,
        Some(BufferLength::Element) => format!("{} (one element)", primitive),
        Some(BufferLength::NulTerminated) => format!("{} (NUL-terminated)", primitive),
        Some(BufferLength::Param { index, by_reference }) => {
          let read_back = if *by_reference { ", read back" } else { "" };
          format!("{} (length in parameter #{}{})", primitive, index, read_back)
        }
      }
    }
  }
}

fn print_report(analysis: &Analysis) {
  println!("Sandboxed API Generator - Analysis");
  println!("==================================\n");
  println!("[~] Library: {}", analysis.library);
  println!("[~] Lowering: {}", analysis.lowering);

  if !analysis.includes.is_empty() {
    println!("\n[~] Standard includes:");
    for include in &analysis.includes {
      println!("    - {}", include);
    }
  }

  println!("\n[~] Emission order ({} type declarations):", analysis.types.len());
  for (i, ty) in analysis.types.iter().enumerate() {
    println!("  {}. {} ({:?})", i + 1, ty.name, ty.form);
  }

  println!("\n[~] Functions ({}):", analysis.functions.len());
  for function in &analysis.functions {
    println!("\n  {} -> {}", function.name, function.method);
    println!("    Returns: {:?}", function.returns);
    for param in &function.params {
      println!(
        "    {} {} [{:?}]: {}",
        param.ty,
        param.name,
        param.direction,
        describe_role(&param.role)
      );
    }
    if !function.types.is_empty() {
      println!("    Reaches: {}", function.types.join(", "));
    }
  }

  if !analysis.skipped.is_empty() {
    println!("\n[~] Skipped duplicates:");
    for name in &analysis.skipped {
      println!("    - {}", name);
    }
  }

  println!("\n[✓] Analysis complete");
}
