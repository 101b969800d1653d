use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::catalog::{AppId, Candidate};
use crate::installer::CopyFailure;

/// Pipeline states. `Error` is transient: a failed run reports it and then returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Searching,
    AwaitingSelection,
    Resolved,
    Downloading,
    Installing,
    RestartingServices,
    Done,
    Error,
}

/// Multi-step progress for one install run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgressPayload {
    pub app_id: AppId,

    // Generic "multi-step task" progress
    pub steps_total: u32,
    pub step: u32, // 1-based
    pub step_name: String,
    pub step_progress: f64,   // 0.0..=1.0
    pub overall_percent: f64, // 0.0..=100.0

    // Optional details (used by download/unzip/install phases)
    pub detail: Option<String>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub extracted_files: Option<u64>,
    pub total_files: Option<u64>,
}

/// Result of a finished install run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub app_id: AppId,
    pub name: String,
    pub plugins_copied: u64,
    pub manifests_copied: u64,
    pub failures: Vec<CopyFailure>,
    /// `false` when the archive held nothing to install.
    pub installed: bool,
    pub services_restarted: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    Stage(Stage),
    Progress(TaskProgressPayload),
    Log(String),
    /// Ambiguous name: the presenter must answer with a selection or a cancel.
    Candidates(Vec<Candidate>),
    Completed(InstallReport),
    Failed(String),
    /// Back to idle; a new request will be accepted.
    Ready,
}

/// Receives pipeline events. The console presenter is one subscriber.
pub trait PipelineObserver: Send {
    fn notify(&self, event: PipelineEvent);
}

impl PipelineObserver for Sender<PipelineEvent> {
    fn notify(&self, event: PipelineEvent) {
        // The presenter may already be gone during shutdown.
        let _ = self.send(event);
    }
}

pub fn overall_from_step(step: u32, step_progress: f64, steps_total: u32) -> f64 {
    let s = step.max(1).min(steps_total) as f64;
    let sp = step_progress.clamp(0.0, 1.0);
    (((s - 1.0) + sp) / (steps_total as f64)) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_percent_spans_steps() {
        assert_eq!(overall_from_step(1, 0.0, 5), 0.0);
        assert_eq!(overall_from_step(2, 0.5, 5), 30.0);
        assert_eq!(overall_from_step(5, 1.0, 5), 100.0);
        // out of range values are clamped
        assert_eq!(overall_from_step(0, 2.0, 5), 20.0);
        assert_eq!(overall_from_step(9, 1.0, 5), 100.0);
    }

    #[test]
    fn channel_sender_is_an_observer() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.notify(PipelineEvent::Stage(Stage::Searching));
        tx.notify(PipelineEvent::Ready);
        assert_eq!(rx.recv().unwrap(), PipelineEvent::Stage(Stage::Searching));
        assert_eq!(rx.recv().unwrap(), PipelineEvent::Ready);

        drop(rx);
        tx.notify(PipelineEvent::Ready);
    }
}
