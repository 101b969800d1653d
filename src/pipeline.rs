use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::archive::{ArchiveFetcher, FetchOutcome, FetchProgress};
use crate::catalog::{AppId, Candidate, CatalogClient, Lookup};
use crate::config::Settings;
use crate::error::PipelineError;
use crate::installer::{self, InstallOutcome, InstallSummary};
use crate::locate::InstallRootLocator;
use crate::metadata::{MetadataClient, UNKNOWN_NAME};
use crate::process::ServiceControl;
use crate::progress::{overall_from_step, InstallReport, PipelineEvent, PipelineObserver, Stage, TaskProgressPayload};
use crate::staging::StagingArea;

const USER_AGENT: &str = "st-app-adder/1.0";

// Fetch Details -> Download -> Install Files -> Clean Up -> Restart Services
pub const STEPS_TOTAL: u32 = 5;
const STEP_NAMES: [&str; STEPS_TOTAL as usize] =
    ["Fetch Details", "Download", "Install Files", "Clean Up", "Restart Services"];

/// Download takes the first 80% of step 2, extraction the rest.
const DOWNLOAD_SHARE: f64 = 0.8;

/// Claims the single-run flag. Fails with [`PipelineError::Busy`] without touching it
/// when a run is already active.
pub fn claim(flag: &AtomicBool) -> Result<(), PipelineError> {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| ())
        .map_err(|_| PipelineError::Busy)
}

/// The clients and locators a pipeline drives.
pub struct PipelineParts {
    pub catalog: CatalogClient,
    pub metadata: MetadataClient,
    /// `None` when no archive host is configured; downloads then fail.
    pub fetcher: Option<ArchiveFetcher>,
    pub roots: InstallRootLocator,
    pub staging_root: PathBuf,
    pub restart_services: bool,
}

/// HTTP client whose `timeout` bounds connecting and each read, not the whole body,
/// so a slow but steady download is never cut off.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| e.to_string())
}

impl PipelineParts {
    pub fn from_settings(settings: &Settings) -> Result<Self, String> {
        // unset or blank is reported by `Settings::warnings` at startup
        let fetcher = match settings.archive_base_url.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => {
                Some(ArchiveFetcher::new(http_client(settings.archive_timeout())?, base.to_string()))
            }
            _ => None,
        };

        Ok(Self {
            catalog: CatalogClient::new(http_client(settings.catalog_timeout())?, settings.catalog_url.clone()),
            metadata: MetadataClient::new(http_client(settings.metadata_timeout())?, settings.metadata_url.clone()),
            fetcher,
            roots: InstallRootLocator::from_override(settings.install_root.clone()),
            staging_root: settings.staging_root(),
            restart_services: settings.restart_services,
        })
    }
}

/// Drives one request at a time through
/// `Idle -> Searching -> (AwaitingSelection) -> Resolved -> Downloading -> Installing
/// -> RestartingServices -> Done`, reporting every step to its observer.
///
/// Any failure is reported as `Error` and the pipeline returns to `Idle`.
pub struct Pipeline<S, O> {
    parts: PipelineParts,
    services: S,
    observer: O,
    stage: Stage,
    pending: Option<Vec<Candidate>>,
    processing: Arc<AtomicBool>,
}

impl<S, O> Pipeline<S, O>
where
    S: ServiceControl,
    O: PipelineObserver,
{
    pub fn new(parts: PipelineParts, services: S, observer: O) -> Self {
        Self {
            parts,
            services,
            observer,
            stage: Stage::Idle,
            pending: None,
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_settings(settings: &Settings, services: S, observer: O) -> Result<Self, String> {
        Ok(Self::new(PipelineParts::from_settings(settings)?, services, observer))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pending_candidates(&self) -> Option<&[Candidate]> {
        self.pending.as_deref()
    }

    /// Shared flag that is set while a request is in flight.
    pub fn processing_flag(&self) -> Arc<AtomicBool> {
        self.processing.clone()
    }

    /// Claims the pipeline and runs `query`. Rejected with `Busy` while another run is active.
    ///
    /// Returns `Ok(None)` when the query was ambiguous and a selection is now pending.
    pub async fn submit(&mut self, query: &str) -> Result<Option<InstallReport>, PipelineError> {
        claim(&self.processing)?;
        self.run_search(query).await
    }

    /// Runs `query` on a pipeline whose processing flag the caller already holds.
    pub(crate) async fn run_search(&mut self, query: &str) -> Result<Option<InstallReport>, PipelineError> {
        let query = query.trim();
        self.set_stage(Stage::Searching);
        self.log(format!("Searching: {query}"));

        match self.parts.catalog.lookup(query).await {
            Lookup::Resolved(app_id) => self.run_install(app_id).await.map(Some),
            Lookup::Candidates(candidates) => {
                self.log(format!("Found {} similar name(s); waiting for a selection", candidates.len()));
                self.pending = Some(candidates.clone());
                self.set_stage(Stage::AwaitingSelection);
                self.observer.notify(PipelineEvent::Candidates(candidates));
                Ok(None)
            }
            Lookup::NotFound => Err(self.fail(PipelineError::NotFound(query.to_string()))),
        }
    }

    /// Picks candidate `index` from the pending set and installs it.
    ///
    /// An out-of-range index leaves the selection pending.
    pub async fn select(&mut self, index: usize) -> Result<Option<InstallReport>, PipelineError> {
        if self.stage != Stage::AwaitingSelection {
            return Err(PipelineError::NoPendingSelection);
        }
        let Some(candidate) = self.pending.as_ref().and_then(|c| c.get(index)).cloned() else {
            self.log("Please select a game from the list.".to_string());
            return Err(PipelineError::InvalidSelection(index));
        };
        self.pending = None;
        self.run_install(candidate.app_id).await.map(Some)
    }

    /// Declines the pending selection. Returns `false` if nothing was pending.
    pub fn cancel(&mut self) -> bool {
        if self.stage != Stage::AwaitingSelection {
            return false;
        }
        self.log("Selection cancelled".to_string());
        self.finish();
        true
    }

    /// Resets after a run that ended without reporting (a panic inside a stage).
    pub fn recover(&mut self, message: &str) {
        if self.stage == Stage::Idle && !self.processing.load(Ordering::Acquire) {
            return;
        }
        self.report_failure(&PipelineError::Unhandled(message.to_string()));
    }

    async fn run_install(&mut self, app_id: AppId) -> Result<InstallReport, PipelineError> {
        self.set_stage(Stage::Resolved);
        self.log(format!("Processing App ID: {app_id}"));

        // Step 1: store details (informational only)
        self.step(app_id, 1, 0.0, Some("Fetching store details...".to_string()));
        let name = match self.parts.metadata.fetch_details(app_id).await {
            Some(details) => {
                let name = details.display_name().to_string();
                self.log(format!("Found: {name}"));
                name
            }
            None => {
                self.log("Store details not available".to_string());
                UNKNOWN_NAME.to_string()
            }
        };
        self.step(app_id, 1, 1.0, Some(name.clone()));

        // Step 2: download + extract into staging
        self.set_stage(Stage::Downloading);
        self.step(app_id, 2, 0.0, Some(format!("Downloading {app_id}.zip...")));
        let staging = StagingArea::prepare(&self.parts.staging_root, app_id)
            .map_err(|e| self.fail(PipelineError::Filesystem(e)))?;

        let fetched = match &self.parts.fetcher {
            None => Err(PipelineError::NotConfigured("archive_base_url".to_string())),
            Some(fetcher) => {
                let observer = &self.observer;
                fetcher
                    .fetch(app_id, staging.path(), |p| {
                        observer.notify(PipelineEvent::Progress(fetch_payload(app_id, p)))
                    })
                    .await
                    .map_err(PipelineError::Transport)
            }
        };
        match fetched {
            Ok(FetchOutcome::Extracted { files }) => {
                self.log(format!("Download complete ({files} file(s) extracted)"));
            }
            Ok(FetchOutcome::NotFoundRemote) => {
                staging.discard();
                return Err(self.fail(PipelineError::ArchiveMissing(app_id)));
            }
            Err(e) => {
                staging.discard();
                return Err(self.fail(e));
            }
        }

        // Step 3: distribute files
        self.set_stage(Stage::Installing);
        self.step(app_id, 3, 0.0, Some("Copying files...".to_string()));
        let root: Option<PathBuf> = self.parts.roots.locate().map(Path::to_path_buf);
        let outcome = installer::install(staging.path(), root.as_deref());
        self.step(app_id, 3, 1.0, None);

        // Step 4: staging is gone on every path from here on
        self.step(app_id, 4, 0.0, Some("Cleaning up...".to_string()));
        staging.discard();
        self.step(app_id, 4, 1.0, None);

        let mut report = InstallReport {
            app_id,
            name,
            plugins_copied: 0,
            manifests_copied: 0,
            failures: vec![],
            installed: false,
            services_restarted: false,
            warnings: vec![],
        };

        match outcome {
            Err(e) => return Err(self.fail(PipelineError::Filesystem(e))),
            Ok(InstallOutcome::RootNotFound) => return Err(self.fail(PipelineError::RootNotFound)),
            Ok(InstallOutcome::NothingToDo) => {
                self.log("No files found to copy.".to_string());
                report.warnings.push("archive contained no installable files".to_string());
            }
            Ok(InstallOutcome::Installed(summary)) => {
                self.apply_summary(&mut report, summary);
            }
            Ok(InstallOutcome::PartialFailure(summary)) => {
                for f in &summary.failures {
                    let msg = format!("Failed: {} ({})", f.file.display(), f.error);
                    self.log(msg.clone());
                    report.warnings.push(msg);
                }
                self.apply_summary(&mut report, summary);
            }
        }

        // Step 5: restart host + companion, only once something was actually copied
        if report.installed && self.parts.restart_services {
            self.set_stage(Stage::RestartingServices);
            self.step(app_id, 5, 0.0, Some("Restarting services...".to_string()));
            let warnings = self.restart_services(root.as_deref()).await;
            report.services_restarted = true;
            report.warnings.extend(warnings);
        }
        self.step(app_id, 5, 1.0, Some("Complete!".to_string()));

        self.set_stage(Stage::Done);
        self.log(format!("Complete: {} ({app_id})", report.name));
        self.observer.notify(PipelineEvent::Completed(report.clone()));
        self.finish();
        Ok(report)
    }

    fn apply_summary(&self, report: &mut InstallReport, summary: InstallSummary) {
        self.log(format!(
            "Copied {} plugin file(s) and {} manifest file(s)",
            summary.plugins_copied, summary.manifests_copied
        ));
        report.plugins_copied = summary.plugins_copied;
        report.manifests_copied = summary.manifests_copied;
        report.installed = summary.plugins_copied + summary.manifests_copied > 0;
        report.failures = summary.failures;
    }

    /// Stop host, launch companion, start host. Failures become warnings.
    async fn restart_services(&mut self, root: Option<&Path>) -> Vec<String> {
        let mut warnings = vec![];

        match self.services.stop_host().await {
            Ok(()) => self.log("Host application closed".to_string()),
            Err(e) => warnings.push(format!("Could not close host application: {e}")),
        }
        match self.services.launch_companion().await {
            Ok(()) => self.log("Companion tool launched".to_string()),
            Err(e) => warnings.push(format!("Could not launch companion tool: {e}")),
        }
        match self.services.start_host(root).await {
            Ok(()) => self.log("Host application started".to_string()),
            Err(e) => warnings.push(format!("Could not start host application: {e}")),
        }

        for w in &warnings {
            log::warn!("{w}");
            self.observer.notify(PipelineEvent::Log(w.clone()));
        }
        warnings
    }

    fn set_stage(&mut self, stage: Stage) {
        if self.stage != stage {
            log::info!("stage {:?} -> {:?}", self.stage, stage);
        }
        self.stage = stage;
        self.observer.notify(PipelineEvent::Stage(stage));
    }

    fn log(&self, message: String) {
        log::info!("{message}");
        self.observer.notify(PipelineEvent::Log(message));
    }

    fn step(&self, app_id: AppId, step: u32, step_progress: f64, detail: Option<String>) {
        self.observer.notify(PipelineEvent::Progress(step_payload(app_id, step, step_progress, detail)));
    }

    /// Reports `err`, passes through `Error` and resets to `Idle`.
    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.report_failure(&err);
        err
    }

    fn report_failure(&mut self, err: &PipelineError) {
        log::error!("{err}");
        self.set_stage(Stage::Error);
        self.observer.notify(PipelineEvent::Failed(err.to_string()));
        self.finish();
    }

    fn finish(&mut self) {
        self.pending = None;
        self.stage = Stage::Idle;
        self.processing.store(false, Ordering::Release);
        self.observer.notify(PipelineEvent::Stage(Stage::Idle));
        self.observer.notify(PipelineEvent::Ready);
    }
}

fn step_payload(app_id: AppId, step: u32, step_progress: f64, detail: Option<String>) -> TaskProgressPayload {
    TaskProgressPayload {
        app_id,
        steps_total: STEPS_TOTAL,
        step,
        step_name: STEP_NAMES[(step.clamp(1, STEPS_TOTAL) - 1) as usize].to_string(),
        step_progress,
        overall_percent: overall_from_step(step, step_progress, STEPS_TOTAL),
        detail,
        downloaded_bytes: None,
        total_bytes: None,
        extracted_files: None,
        total_files: None,
    }
}

fn fetch_payload(app_id: AppId, progress: FetchProgress) -> TaskProgressPayload {
    match progress {
        FetchProgress::Downloading { downloaded, total } => {
            let fraction = total
                .filter(|t| *t > 0)
                .map(|t| (downloaded as f64 / t as f64).clamp(0.0, 1.0))
                .unwrap_or(0.0);
            TaskProgressPayload {
                downloaded_bytes: Some(downloaded),
                total_bytes: total,
                ..step_payload(
                    app_id,
                    2,
                    fraction * DOWNLOAD_SHARE,
                    Some(format!("Downloading... {} KB", downloaded / 1024)),
                )
            }
        }
        FetchProgress::Extracting { done, total, detail } => {
            let fraction = if total == 0 { 1.0 } else { done as f64 / total as f64 };
            TaskProgressPayload {
                extracted_files: Some(done),
                total_files: Some(total),
                ..step_payload(
                    app_id,
                    2,
                    DOWNLOAD_SHARE + fraction * (1.0 - DOWNLOAD_SHARE),
                    detail,
                )
            }
        }
    }
}
