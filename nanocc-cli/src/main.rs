// CLI application
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "nanocc")]
#[command(about = "Small C compiler emitting x86-64 assembly in Intel syntax")]
#[command(version)]
struct Cli {
    /// Path to the C source file; assembly is written to stdout
    source: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let path = match cli.source {
        Some(path) => path,
        None => {
            println!("nanocc {}: no input files given.", env!("CARGO_PKG_VERSION"));
            println!("usage: nanocc <file.c>");
            return ExitCode::SUCCESS;
        }
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Compile diagnostics already carry their own format; everything
            // else (I/O) goes through anyhow's chain.
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &PathBuf) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open file '{}' for reading", path.display()))?;
    let file = path.display().to_string();
    log::debug!("compiling {} ({} bytes)", file, source.len());

    let asm = nanocc_core::compile(&file, &source)?;
    print!("{asm}");
    Ok(())
}
