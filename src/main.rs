use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Mx* compiler: reads source on stdin, writes RV32IM assembly on stdout.
#[derive(Parser)]
#[command(name = "mxc", version, about)]
struct Cli {
    /// Read source from a file instead of stdin.
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Write assembly to a file instead of stdout.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Dump the IR after the middle-end passes instead of assembly.
    #[arg(long)]
    emit_ir: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("MXC_LOG"))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> mxc::Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let mut out: Vec<u8> = Vec::new();
    if cli.emit_ir {
        let module = mxc::compile_to_ir(&source, true)?;
        write!(out, "{}", module).map_err(|e| mxc::MxcError::Io(e.to_string()))?;
    } else {
        mxc::compile_to_assembly(&source, &mut out)?;
    }

    match &cli.output {
        Some(path) => fs::write(path, &out)?,
        None => io::stdout().write_all(&out)?,
    }
    Ok(())
}
