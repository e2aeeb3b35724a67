use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use stackforth::{Config, Forth};

/// A small Forth-like stack language interpreter.
#[derive(Debug, Parser)]
#[clap(about, version)]
struct App {
    /// Source files to evaluate, in order, before the REPL starts.
    files: Vec<PathBuf>,

    /// How deeply word calls, branches and loop bodies may nest.
    #[clap(long, default_value_t = Config::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Evaluate the source files, print the stack and exit.
    #[clap(long)]
    no_repl: bool,

    /// Tracing filter for interpreter diagnostics.
    #[clap(
        long = "trace",
        alias = "log",
        env = "RUST_LOG",
        default_value = "warn"
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let App {
        files,
        max_depth,
        no_repl,
        trace_filter,
    } = App::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(io::stderr),
        )
        .with(trace_filter)
        .init();

    let mut forth = Forth::with_config(Config { max_depth });
    for path in &files {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        forth
            .eval(&source)
            .with_context(|| format!("failed to evaluate {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded");
    }

    if no_repl {
        show_stack(&forth);
        println!();
        return Ok(());
    }
    repl(&mut forth)
}

fn repl(forth: &mut Forth) -> anyhow::Result<()> {
    loop {
        let mut input = String::new();

        print!("> ");
        io::stdout().flush()?;

        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                break;
            }
            Ok(_) => {
                let line = input.trim();
                if matches!(line.to_lowercase().as_str(), "bye" | "quit") {
                    break;
                }
                match forth.eval(line) {
                    Ok(()) => {
                        show_stack(forth);
                        println!(" ok");
                    }
                    Err(msg) => {
                        println!("Error: {}", msg);
                    }
                }
            }
            Err(msg) => {
                return Err(msg.into());
            }
        }
    }

    Ok(())
}

fn show_stack(forth: &Forth) {
    let stack = forth.stack();
    print!("<{}>", stack.len());
    for cell in stack {
        print!(" {}", cell);
    }
}
