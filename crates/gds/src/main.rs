//! gds - GLM design matrix builder

use clap::Parser;
use gds::{init_logging, run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level(), cli.log_json) {
        eprintln!("gds: {:#}", e);
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("gds: {:#}", e);
            ExitCode::from(2)
        }
    }
}
