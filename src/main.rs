use std::process::ExitCode;

use clap::Parser;
use flagprune::cli::{Cli, cleanup};
use flagprune::log_error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    flagprune::log::set_verbose(cli.verbose);

    match cleanup::execute(&cli) {
        Ok(result) if result.files_failed == 0 => ExitCode::SUCCESS,
        Ok(result) => {
            log_error!(
                "cleanup",
                failed = result.files_failed,
                rewritten = result.files_rewritten,
                unchanged = result.files_unchanged,
            );
            ExitCode::FAILURE
        }
        Err(err) => {
            log_error!("cleanup", error = format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
