//! # shellblocks
//!
//! Command-line front end for the script generator and the grading sandbox.
//!
//! ## Usage
//!
//! - Print the script for a program: `shellblocks generate program.json`
//! - Grade a program against a level: `shellblocks run program.json --level intro`
//! - List levels: `shellblocks levels`
//! - Verify the container runtime and build the image: `shellblocks check`
//!
//! Use `-` as the file name to read from stdin.

use clap::{Args, Parser, Subcommand};
use log::error;
use shellblocks::{
    DefinitionRegistry, Grader, LevelRegistry, RunRequest, SandboxConfig, SandboxExecutor,
    ScriptGenerator, runtime,
};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status for a program that cannot be turned into a script.
const EXIT_REJECTED: i32 = 2;

/// CLI arguments for shellblocks.
#[derive(Parser)]
#[command(name = "shellblocks")]
#[command(version = PKG_VERSION)]
#[command(about = "Generate and grade block-built shell programs", long_about = None)]
struct Cli {
    /// Definition catalog with command, control and operator rules
    #[arg(
        long,
        global = true,
        env = "SHELLBLOCKS_DEFINITIONS",
        default_value = "data/definitions.json"
    )]
    definitions: PathBuf,

    /// Level catalog with setup and verification scripts
    #[arg(
        long,
        global = true,
        env = "SHELLBLOCKS_LEVELS",
        default_value = "data/levels.json"
    )]
    levels: PathBuf,

    #[command(flatten)]
    sandbox: SandboxArgs,

    #[command(subcommand)]
    action: Action,
}

#[derive(Args)]
struct SandboxArgs {
    /// Container runtime invocation, e.g. `docker`, `podman` or `sudo -n docker`
    #[arg(long, global = true, env = "SHELLBLOCKS_RUNTIME", default_value = "docker")]
    runtime: String,

    /// Image every run starts from
    #[arg(long, global = true, env = "SHELLBLOCKS_IMAGE", default_value = "shellblocks-env")]
    image: String,

    /// Memory ceiling per run
    #[arg(long, global = true, env = "SHELLBLOCKS_MEMORY", default_value = "128m")]
    memory: String,

    /// CPU ceiling per run
    #[arg(long, global = true, env = "SHELLBLOCKS_CPUS", default_value = "0.5")]
    cpus: String,

    /// Wall-clock limit per run, in seconds
    #[arg(long, global = true, env = "SHELLBLOCKS_TIMEOUT", default_value_t = 5)]
    timeout: u64,

    /// Bytes of stdout and of stderr kept per run
    #[arg(long, global = true, env = "SHELLBLOCKS_MAX_OUTPUT", default_value_t = 64 * 1024)]
    max_output: usize,
}

#[derive(Subcommand)]
enum Action {
    /// Print the shell script for a program
    Generate {
        /// Program AST as JSON, or `-` for stdin
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Grade a program in the sandbox and print the result as JSON
    Run {
        /// Run request (`{"ast", "levelId"}`) or bare program AST, or `-` for stdin
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Level to grade against (overrides `levelId` in the request)
        #[arg(short, long)]
        level: Option<String>,
    },
    /// List all available levels
    Levels,
    /// Check the container runtime and build the sandbox image if needed
    Check,
}

/// Entry point for the CLI tool.
fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.action {
        Action::Generate { ref file } => generate(&cli, file),
        Action::Run {
            ref file,
            ref level,
        } => run(&cli, file, level.clone()),
        Action::Levels => list_levels(&cli.levels),
        Action::Check => check(&cli.sandbox),
    }
}

/// Print the generated script for the program in `file`.
fn generate(cli: &Cli, file: &Path) {
    let generator = ScriptGenerator::new(Arc::new(load_definitions(&cli.definitions)));
    let input = read_input(file);

    let request = RunRequest::from_json(&input).unwrap_or_else(|e| reject(&e));
    let ast = request.ast.unwrap_or_else(|| reject(&shellblocks::GenerationError::MissingRoot));
    match generator.generate(&ast) {
        Ok(script) => println!("{}", script),
        Err(e) => reject(&e),
    }
}

/// Grade the program in `file` and print the execution result.
fn run(cli: &Cli, file: &Path, level: Option<String>) {
    let definitions = Arc::new(load_definitions(&cli.definitions));
    let levels = Arc::new(load_levels(&cli.levels));

    let runtime = match runtime::detect(&cli.sandbox.runtime) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let config = SandboxConfig {
        runtime,
        ..sandbox_config(&cli.sandbox)
    };
    let grader = Grader::new(
        ScriptGenerator::new(definitions),
        levels,
        SandboxExecutor::new(config),
    );

    let input = read_input(file);
    let mut request = RunRequest::from_json(&input).unwrap_or_else(|e| reject(&e));
    if level.is_some() {
        request.level_id = level;
    }

    match grader.grade(&request) {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error encoding result: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => reject(&e),
    }
}

/// List all levels in catalog order.
fn list_levels(path: &Path) {
    let levels = load_levels(path);
    if levels.is_empty() {
        println!("No levels defined in {}.", path.display());
        return;
    }

    println!("Available levels:");
    for level in levels.iter() {
        match &level.difficulty {
            Some(difficulty) => println!("  {}  {} ({})", level.id, level.title, difficulty),
            None => println!("  {}  {}", level.id, level.title),
        }
    }
}

/// Verify the runtime is usable and the sandbox image exists.
fn check(args: &SandboxArgs) {
    let runtime = match runtime::detect(&args.runtime) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    println!("✓ Container runtime: {}", runtime);

    if let Err(e) = runtime::ensure_image(&runtime, &args.image) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    println!("✓ Image ready: {}", args.image);
}

fn sandbox_config(args: &SandboxArgs) -> SandboxConfig {
    SandboxConfig {
        image: args.image.clone(),
        memory: args.memory.clone(),
        cpus: args.cpus.clone(),
        timeout: Duration::from_secs(args.timeout),
        max_output_bytes: args.max_output,
        ..SandboxConfig::default()
    }
}

fn load_definitions(path: &Path) -> DefinitionRegistry {
    DefinitionRegistry::load(path).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn load_levels(path: &Path) -> LevelRegistry {
    LevelRegistry::load(path).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

/// Read a file, or stdin when the path is `-`.
fn read_input(path: &Path) -> String {
    let result = if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).map(|_| buffer)
    } else {
        fs::read_to_string(path)
    };

    result.unwrap_or_else(|e| {
        eprintln!("Error reading '{}': {}", path.display(), e);
        std::process::exit(1);
    })
}

/// Report a malformed program and exit.
fn reject(error: &dyn std::error::Error) -> ! {
    error!("request rejected: {}", error);
    eprintln!("Error: {}", error);
    std::process::exit(EXIT_REJECTED);
}
