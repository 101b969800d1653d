use std::process::ExitCode;

use clap::Parser;

use st_app_adder_lib::cli::Cli;
use st_app_adder_lib::elevation::{self, Elevation};
use st_app_adder_lib::logger;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.no_elevate {
        match elevation::ensure_elevated() {
            Ok(Elevation::Elevated) => {}
            Ok(Elevation::Relaunched) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to request administrator rights: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // File logging ({data_local_dir}/st-app-adder/logs/st-app-adder.log)
    match logger::init() {
        Ok(path) => log::info!("logging to {}", path.display()),
        Err(e) => eprintln!("file logging disabled: {e}"),
    }

    match st_app_adder_lib::run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
