use std::process::ExitCode;

use clap::Parser;
use sheet_import::cli::{self, Cli};
use sheet_import::logging;

fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    match cli::run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
