use clap::{Parser, Subcommand, ValueEnum};
use sapi_gen::{DuplicatePolicy, LoweringKind, ValidatorKind};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cmds;

#[derive(Parser)]
#[command(name = "sapi-gen")]
#[command(about = "Sandboxed API header generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /* Generate the proxy header for a declaration file */
    Generate {
        /* Declaration file produced by the header front-end */
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /* Header to write */
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,

        /* Namespace of the generated API class */
        #[arg(long = "namespace", value_name = "NAMESPACE")]
        namespace: Option<String>,

        /* Name of the generated API class */
        #[arg(long = "api-name", value_name = "NAME")]
        api_name: Option<String>,

        /* What to do when a function is declared twice */
        #[arg(long = "on-duplicate", value_enum)]
        on_duplicate: Option<OnDuplicate>,

        /* How parameters are lowered onto marshalling primitives */
        #[arg(long = "lowering", value_enum)]
        lowering: Option<Lowering>,

        /* Validation pass run over the rendered header */
        #[arg(long = "validator", value_enum)]
        validator: Option<Validator>,

        /* Only expose these functions (repeatable) */
        #[arg(long = "function", value_name = "NAME")]
        functions: Vec<String>,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },

    /* Show what a run would expose without rendering anything */
    Analyze {
        /* Declaration file produced by the header front-end */
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /* Print the analysis as JSON */
        #[arg(long = "json")]
        json: bool,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum OnDuplicate {
    /* Abort the run */
    Error,
    /* Keep the first declaration and warn */
    Skip,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(policy: OnDuplicate) -> Self {
        match policy {
            OnDuplicate::Error => DuplicatePolicy::Error,
            OnDuplicate::Skip => DuplicatePolicy::Skip,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Lowering {
    /* Fold byte pointers and their lengths into bounded buffers */
    PairedBuffers,
    /* Marshal every parameter on its own */
    Independent,
}

impl From<Lowering> for LoweringKind {
    fn from(lowering: Lowering) -> Self {
        match lowering {
            Lowering::PairedBuffers => LoweringKind::PairedBuffers,
            Lowering::Independent => LoweringKind::Independent,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Validator {
    /* In-process lexical checks */
    Builtin,
    /* Builtin checks followed by clang-format */
    ClangFormat,
}

impl From<Validator> for ValidatorKind {
    fn from(validator: Validator) -> Self {
        match validator {
            Validator::Builtin => ValidatorKind::Builtin,
            Validator::ClangFormat => ValidatorKind::ClangFormat,
        }
    }
}

fn init_tracing(verbose: bool) {
    /* RUST_LOG wins; --verbose only raises the default */
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            file,
            output,
            namespace,
            api_name,
            on_duplicate,
            lowering,
            validator,
            functions,
            verbose,
        } => {
            init_tracing(verbose);
            let overrides = cmds::common::Overrides {
                namespace,
                api_name,
                on_duplicate: on_duplicate.map(Into::into),
                lowering: lowering.map(Into::into),
                validator: validator.map(Into::into),
                functions,
            };
            cmds::generate::run(file, output, overrides, verbose)?;
        }

        Commands::Analyze { file, json, verbose } => {
            init_tracing(verbose);
            cmds::analyze::run(file, json, verbose)?;
        }
    }

    Ok(())
}
