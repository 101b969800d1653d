pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod console;
pub mod elevation;
pub mod error;
pub mod installer;
pub mod locate;
pub mod logger;
pub mod metadata;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod similarity;
pub mod staging;
pub mod worker;
mod zip_utils;

use std::io::{BufRead, Write};

use crate::cli::Cli;
use crate::config::Settings;
use crate::console::{ConsolePresenter, QueryResult};
use crate::pipeline::Pipeline;
use crate::process::{ProcessController, SettleDelays};
use crate::worker::PipelineHandle;

/// Runs the queries from `cli` (or from stdin) to completion.
///
/// Returns `Ok(false)` when any query failed.
pub fn run(cli: Cli) -> Result<bool, String> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    for warning in settings.warnings() {
        log::warn!("{warning}");
        eprintln!("warning: {warning}");
    }

    let companion = locate::find_companion(
        settings.companion_path.as_deref(),
        &locate::conventional_companion_dirs(),
        &settings.companion_executable,
    );
    let services = ProcessController::new(
        settings.host_executable.clone(),
        companion,
        SettleDelays::from_settings(&settings),
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let pipeline = Pipeline::from_settings(&settings, services, tx)?;
    let handle = PipelineHandle::spawn(pipeline)?;
    let mut presenter = ConsolePresenter::new(&handle, &rx);

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();

    let all_ok = match cli.joined_query() {
        Some(query) => succeeded(&presenter.run_query(&query, &mut input, &mut out)?),
        None => {
            let mut all_ok = true;
            while let Some(query) = read_query(&mut input, &mut out)? {
                all_ok &= succeeded(&presenter.run_query(&query, &mut input, &mut out)?);
            }
            all_ok
        }
    };

    handle.shutdown();
    Ok(all_ok)
}

fn succeeded(result: &QueryResult) -> bool {
    !matches!(result, QueryResult::Failed(_))
}

fn read_query<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Option<String>, String> {
    write!(out, "App ID, store URL or name (empty to quit): ").map_err(|e| e.to_string())?;
    out.flush().map_err(|e| e.to_string())?;

    let mut line = String::new();
    if input.read_line(&mut line).map_err(|e| e.to_string())? == 0 {
        return Ok(None);
    }
    let query = line.trim();
    Ok((!query.is_empty()).then(|| query.to_string()))
}
