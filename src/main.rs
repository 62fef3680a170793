use std::io::{self, BufReader};
use std::process::ExitCode;

use clap::Parser;

use comp::Store;

/// Query semi-structured data with a single expression.
///
///   cat file.json | comp -f @json '[ i | i <- in, i.name =~ "hello" ]'
///   comp -f one.json,two.csv '[ {i, j} | i <- one, j <- two, i.id == j.id ]'
#[derive(Parser)]
#[command(name = "comp", version, verbatim_doc_comment)]
struct Args {
    /// Comma separated list of data files (@json @csv @txt @xml read stdin)
    #[arg(short = 'f', long = "files")]
    files: Option<String>,

    /// Cap the number of elements quoted from a top-level list
    #[arg(long)]
    limit: Option<usize>,

    /// Run comprehensions on a single thread
    #[arg(long)]
    serial: bool,

    /// The expression to evaluate
    expr: String,
}

fn load(store: &mut Store, files: &str) -> Result<(), String> {
    for f in files.split(',') {
        let f = f.trim();
        if f.is_empty() {
            continue;
        }

        if let Some(ext) = f.strip_prefix('@') {
            let stdin = io::stdin().lock();
            store.add(&format!("in.{}", ext), stdin).map_err(|e| e.to_string())?;
        } else {
            let file = std::fs::File::open(f).map_err(|e| format!("{}: {}", f, e))?;
            store.add(f, BufReader::new(file)).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut store = Store::new();
    if let Some(files) = &args.files {
        if let Err(msg) = load(&mut store, files) {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = comp::run(&args.expr, &store, args.limit, !args.serial, &mut out) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
