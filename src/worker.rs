use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures_util::FutureExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::PipelineError;
use crate::pipeline::{claim, Pipeline};
use crate::process::ServiceControl;
use crate::progress::{InstallReport, PipelineObserver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Select(usize),
    Cancel,
    Shutdown,
}

/// Front door to a pipeline running on its own thread.
///
/// `start` claims the processing flag before queueing, so a second request is
/// rejected immediately instead of waiting behind the first.
pub struct PipelineHandle {
    commands: UnboundedSender<Command>,
    processing: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn spawn<S, O>(pipeline: Pipeline<S, O>) -> Result<Self, String>
    where
        S: ServiceControl + Send + 'static,
        O: PipelineObserver + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to build runtime: {e}"))?;

        let processing = pipeline.processing_flag();
        let (tx, rx) = unbounded_channel();

        let worker = std::thread::Builder::new()
            .name("pipeline-worker".to_string())
            .spawn(move || runtime.block_on(run_worker(pipeline, rx)))
            .map_err(|e| format!("failed to spawn worker thread: {e}"))?;

        Ok(Self {
            commands: tx,
            processing,
            worker: Some(worker),
        })
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Queues a new request. Fails with `Busy` while a run is in flight,
    /// including while a selection is pending.
    pub fn start(&self, query: impl Into<String>) -> Result<(), PipelineError> {
        claim(&self.processing)?;
        if let Err(e) = self.send(Command::Start(query.into())) {
            self.processing.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    pub fn select(&self, index: usize) -> Result<(), PipelineError> {
        self.send(Command::Select(index))
    }

    pub fn cancel(&self) -> Result<(), PipelineError> {
        self.send(Command::Cancel)
    }

    /// Stops the worker after the current command finishes.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::Unhandled("pipeline worker has stopped".to_string()))
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker<S, O>(mut pipeline: Pipeline<S, O>, mut commands: UnboundedReceiver<Command>)
where
    S: ServiceControl,
    O: PipelineObserver,
{
    log::info!("pipeline worker started");
    while let Some(command) = commands.recv().await {
        log::debug!("worker command: {command:?}");
        match command {
            Command::Start(query) => {
                let result = AssertUnwindSafe(pipeline.run_search(&query)).catch_unwind().await;
                settle(&mut pipeline, result);
            }
            Command::Select(index) => {
                let result = AssertUnwindSafe(pipeline.select(index)).catch_unwind().await;
                settle(&mut pipeline, result);
            }
            Command::Cancel => {
                if !pipeline.cancel() {
                    log::debug!("cancel ignored: no selection pending");
                }
            }
            Command::Shutdown => break,
        }
    }
    log::info!("pipeline worker stopped");
}

fn settle<S, O>(
    pipeline: &mut Pipeline<S, O>,
    result: Result<Result<Option<InstallReport>, PipelineError>, Box<dyn Any + Send>>,
) where
    S: ServiceControl,
    O: PipelineObserver,
{
    match result {
        Ok(Ok(Some(report))) => log::info!("run finished for {}", report.app_id),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => log::info!("run ended: {e}"),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "pipeline panicked".to_string());
            pipeline.recover(&message);
        }
    }
}
