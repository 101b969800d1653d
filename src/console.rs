use std::io::{BufRead, Write};
use std::sync::mpsc::Receiver;

use crate::catalog::Candidate;
use crate::error::PipelineError;
use crate::progress::{InstallReport, PipelineEvent, TaskProgressPayload};
use crate::worker::PipelineHandle;

/// How a single query ended, from the presenter's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Completed(InstallReport),
    Cancelled,
    Failed(String),
}

/// Terminal front end: prints pipeline events and answers candidate prompts from `input`.
pub struct ConsolePresenter<'a> {
    handle: &'a PipelineHandle,
    events: &'a Receiver<PipelineEvent>,
    last_line: Option<(u32, Option<String>)>,
}

impl<'a> ConsolePresenter<'a> {
    pub fn new(handle: &'a PipelineHandle, events: &'a Receiver<PipelineEvent>) -> Self {
        Self {
            handle,
            events,
            last_line: None,
        }
    }

    /// Submits `query` and blocks until the pipeline is ready again.
    pub fn run_query<R: BufRead, W: Write>(
        &mut self,
        query: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<QueryResult, String> {
        match self.handle.start(query) {
            Ok(()) => {}
            Err(PipelineError::Busy) => {
                writeln!(out, "Already processing a request, please wait.").map_err(|e| e.to_string())?;
                return Ok(QueryResult::Failed(PipelineError::Busy.to_string()));
            }
            Err(e) => return Err(e.to_string()),
        }
        self.last_line = None;

        let mut result = QueryResult::Cancelled;
        loop {
            let event = self
                .events
                .recv()
                .map_err(|_| "pipeline worker stopped".to_string())?;
            match event {
                PipelineEvent::Stage(_) => {}
                PipelineEvent::Progress(p) => self.print_progress(&p, out)?,
                PipelineEvent::Log(line) => writeln!(out, "  {line}").map_err(|e| e.to_string())?,
                PipelineEvent::Candidates(candidates) => {
                    print_candidates(&candidates, out)?;
                    let sent = match prompt_choice(candidates.len(), input, out)? {
                        Some(index) => self.handle.select(index),
                        None => self.handle.cancel(),
                    };
                    sent.map_err(|e| e.to_string())?;
                }
                PipelineEvent::Completed(report) => {
                    print_report(&report, out)?;
                    result = QueryResult::Completed(report);
                }
                PipelineEvent::Failed(message) => {
                    writeln!(out, "Error: {message}").map_err(|e| e.to_string())?;
                    result = QueryResult::Failed(message);
                }
                PipelineEvent::Ready => return Ok(result),
            }
        }
    }

    fn print_progress<W: Write>(&mut self, p: &TaskProgressPayload, out: &mut W) -> Result<(), String> {
        // per-chunk download updates are too noisy for a terminal
        if p.downloaded_bytes.is_some() && p.total_bytes != p.downloaded_bytes {
            return Ok(());
        }
        let key = (p.step, p.detail.clone());
        if self.last_line.as_ref() == Some(&key) {
            return Ok(());
        }
        let detail = p.detail.as_deref().unwrap_or("");
        writeln!(
            out,
            "[{}/{}] {:>3.0}% {}: {detail}",
            p.step, p.steps_total, p.overall_percent, p.step_name
        )
        .map_err(|e| e.to_string())?;
        self.last_line = Some(key);
        Ok(())
    }
}

fn print_candidates<W: Write>(candidates: &[Candidate], out: &mut W) -> Result<(), String> {
    writeln!(out, "Multiple matches found:").map_err(|e| e.to_string())?;
    for (i, c) in candidates.iter().enumerate() {
        writeln!(out, "  {}. {} ({})", i + 1, c.name, c.app_id).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Reads a 1-based choice. Empty input, `c`, `q` or end of input cancels.
fn prompt_choice<R: BufRead, W: Write>(count: usize, input: &mut R, out: &mut W) -> Result<Option<usize>, String> {
    loop {
        write!(out, "Select 1-{count} (empty to cancel): ").map_err(|e| e.to_string())?;
        out.flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("c") || answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Ok(Some(n - 1)),
            _ => writeln!(out, "Please select a game from the list.").map_err(|e| e.to_string())?,
        }
    }
}

fn print_report<W: Write>(report: &InstallReport, out: &mut W) -> Result<(), String> {
    if report.installed {
        writeln!(
            out,
            "Installed {} ({}): {} plugin file(s), {} manifest file(s)",
            report.name, report.app_id, report.plugins_copied, report.manifests_copied
        )
        .map_err(|e| e.to_string())?;
    } else {
        writeln!(out, "Nothing to install for {} ({})", report.name, report.app_id).map_err(|e| e.to_string())?;
    }
    for f in &report.failures {
        writeln!(out, "  failed: {} ({})", f.file.display(), f.error).map_err(|e| e.to_string())?;
    }
    if report.services_restarted {
        writeln!(out, "Services restarted.").map_err(|e| e.to_string())?;
    }
    Ok(())
}
