//! FML command-line interface

use anyhow::Result;
use clap::{Parser, Subcommand};
use octofhir_fml::cli::output::{self, OutputFormat};
use octofhir_fml::cli::{parse, validate};
use std::path::PathBuf;

/// FML command-line tool
#[derive(Parser)]
#[command(name = "fml")]
#[command(author, version, about = "FHIR Mapping Language (FML) tools", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an FML file and print a summary or its AST
    Parse {
        /// FML file to parse
        file: PathBuf,
    },

    /// Validate FML files against StructureDefinitions
    Validate {
        /// FML files to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source-side StructureDefinitions (JSON file, Bundle or directory)
        #[arg(short, long = "source")]
        source: Vec<PathBuf>,

        /// Target-side StructureDefinitions; defaults to the source side
        #[arg(short, long = "target")]
        target: Vec<PathBuf>,

        /// Maps whose groups may be called from the validated files
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,

        /// FHIR version of the loaded StructureDefinitions
        #[arg(long = "fhir-version")]
        fhir_version: Option<String>,

        /// Print the validation transcript
        #[arg(long)]
        transcript: bool,

        /// Strict mode (warnings as errors)
        #[arg(long)]
        strict: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(&cli.color);
    init_logging(cli.verbose);

    let result: Result<bool> = match cli.command {
        Commands::Parse { file } => {
            let config = parse::ParseConfig {
                file,
                format: cli.format,
                output_file: cli.output.clone(),
            };
            parse::parse(&config).map(|()| true)
        }

        Commands::Validate {
            files,
            source,
            target,
            include,
            fhir_version,
            transcript,
            strict,
        } => {
            let config = validate::ValidateConfig {
                files,
                source_definitions: source,
                target_definitions: target,
                includes: include,
                fhir_version,
                transcript,
                strict,
                format: cli.format,
                verbose: cli.verbose,
                output_file: cli.output.clone(),
            };
            validate::validate(config).await
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", output::format_error(&e));
            std::process::exit(1);
        }
    }
}
