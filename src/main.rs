//! cmsdb command-line shell.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use cmsdb::db::{Database, DatabaseConfig, Outcome, Repl};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut path = PathBuf::from(".cmsdb");
    let mut verbosity: u8 = 0;
    let mut execute: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                match args.get(i) {
                    Some(p) => path = PathBuf::from(p),
                    None => return usage_error("--database needs a path"),
                }
            }
            "-e" | "--execute" => {
                i += 1;
                match args.get(i) {
                    Some(cmd) => execute.push(cmd.clone()),
                    None => return usage_error("--execute needs a command"),
                }
            }
            "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
            "-vv" => verbosity = verbosity.saturating_add(2),
            "-vvv" => verbosity = verbosity.saturating_add(3),
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("cmsdb {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if !arg.starts_with('-') => path = PathBuf::from(arg),
            arg => return usage_error(&format!("unknown option: {}", arg)),
        }
        i += 1;
    }

    setup_logging(verbosity);

    let db = match Database::open_with_config(DatabaseConfig::new(&path)) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut repl = Repl::new(db);

    if execute.is_empty() {
        return match repl.run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    for cmd in &execute {
        match repl.execute(cmd) {
            Ok(Outcome::Output(text)) => {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            Ok(Outcome::Exit) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("{}", message);
    eprintln!("Try `cmsdb --help`.");
    ExitCode::FAILURE
}

fn print_help() {
    println!("cmsdb - ordered navigation and content blocks on a Git-backed store");
    println!();
    println!("Usage: cmsdb [OPTIONS] [DATABASE]");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    Path to database directory (default: .cmsdb)");
    println!("  -e, --execute CMD      Run a shell command and exit (repeatable)");
    println!("  -v, --verbose          More log output on stderr (repeatable, -vvv max)");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("RUST_LOG overrides the level chosen with -v.");
    println!();
    println!("Examples:");
    println!("  cmsdb                                  Start the shell on .cmsdb");
    println!("  cmsdb site -e 'nav add Home --url /'   Add a root item and exit");
    println!("  cmsdb site -e 'nav tree'               Print the navigation tree");
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .init();

    tracing::debug!(?level, "logging initialised");
}
