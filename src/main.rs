use std::process::ExitCode;

use clap::Parser;

use daub::cli::{self, CliArgs};
use daub::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // -- Session logger -------------------------------------------------
    match &args.log {
        Some(path) => logger::init_at(path),
        None => logger::init(),
    }
    logger::set_echo(args.verbose);
    daub::log_info!("daub {} starting", env!("CARGO_PKG_VERSION"));
    if args.verbose
        && let Some(path) = logger::log_path()
    {
        eprintln!("log: {}", path.display());
    }

    let code = cli::run(args);
    daub::log_info!("daub finished");
    code
}
