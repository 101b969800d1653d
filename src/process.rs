use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::config::Settings;

const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Stop/start hooks for the host application and its companion tool.
///
/// Every call is best-effort: the caller reports a failure and moves on.
#[allow(async_fn_in_trait)]
pub trait ServiceControl {
    /// Force-terminates the host application.
    async fn stop_host(&mut self) -> Result<(), String>;
    /// Starts the host application from `install_root`.
    async fn start_host(&mut self, install_root: Option<&Path>) -> Result<(), String>;
    /// Starts the companion tool found at startup.
    async fn launch_companion(&mut self) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_stop: Duration,
    pub after_companion: Duration,
    pub after_start: Duration,
}

impl SettleDelays {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            after_stop: Duration::from_millis(settings.stop_settle_ms),
            after_companion: Duration::from_millis(settings.companion_settle_ms),
            after_start: Duration::from_millis(settings.start_settle_ms),
        }
    }
}

/// Controls the real OS processes.
///
/// The companion path is fixed at construction; a missing companion is never re-probed.
#[derive(Debug)]
pub struct ProcessController {
    host_executable: String,
    companion: Option<PathBuf>,
    delays: SettleDelays,
}

impl ProcessController {
    pub fn new(host_executable: impl Into<String>, companion: Option<PathBuf>, delays: SettleDelays) -> Self {
        if companion.is_none() {
            log::warn!("companion tool not found; it will not be launched after installs");
        }
        Self {
            host_executable: host_executable.into(),
            companion,
            delays,
        }
    }

    pub fn companion(&self) -> Option<&Path> {
        self.companion.as_deref()
    }
}

#[cfg(windows)]
fn kill_command(image: &str) -> Command {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/F", "/IM", image]);
    cmd
}

#[cfg(not(windows))]
fn kill_command(image: &str) -> Command {
    let mut cmd = Command::new("pkill");
    cmd.args(["-x", image]);
    cmd
}

/// Runs `cmd` to completion, killing it if it is still running after `timeout`.
async fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output, String> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.kill_on_drop(true);
    tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| format!("timed out running {program}"))?
        .map_err(|e| e.to_string())
}

/// Spawns `exe` without waiting for it; the child outlives this process.
fn spawn_detached(exe: &Path) -> Result<u32, String> {
    let mut cmd = StdCommand::new(exe);
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    if let Some(dir) = exe.parent() {
        cmd.current_dir(dir);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use windows_sys::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd
        .spawn()
        .map_err(|e| format!("failed to launch {}: {e}", exe.display()))?;
    let pid = child.id();
    reap(child);
    Ok(pid)
}

/// Waits on the child in the background so an exited child does not linger as a zombie.
#[cfg(unix)]
fn reap(mut child: Child) {
    let spawned = std::thread::Builder::new()
        .name("child-reaper".to_string())
        .spawn(move || {
            if let Err(e) = child.wait() {
                log::debug!("wait on child {}: {e}", child.id());
            }
        });
    if let Err(e) = spawned {
        log::warn!("could not start reaper thread: {e}");
    }
}

#[cfg(not(unix))]
fn reap(_child: Child) {}

impl ServiceControl for ProcessController {
    async fn stop_host(&mut self) -> Result<(), String> {
        let output = run_with_timeout(kill_command(&self.host_executable), KILL_TIMEOUT).await?;

        // Non-zero usually means "not running", which is fine.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::info!("kill {}: {} {}", self.host_executable, output.status, stderr.trim());
        }
        tokio::time::sleep(self.delays.after_stop).await;
        Ok(())
    }

    async fn start_host(&mut self, install_root: Option<&Path>) -> Result<(), String> {
        let root = install_root.ok_or_else(|| "installation root unknown".to_string())?;
        let exe = root.join(&self.host_executable);
        if !exe.is_file() {
            return Err(format!("{} not found", exe.display()));
        }
        let pid = spawn_detached(&exe)?;
        log::info!("started {} (pid {pid})", exe.display());
        tokio::time::sleep(self.delays.after_start).await;
        Ok(())
    }

    async fn launch_companion(&mut self) -> Result<(), String> {
        let Some(exe) = self.companion.as_deref() else {
            return Err("companion tool not found; skipping launch".to_string());
        };
        if !exe.is_file() {
            return Err(format!("{} no longer exists; skipping launch", exe.display()));
        }
        let pid = spawn_detached(exe)?;
        log::info!("launched {} (pid {pid})", exe.display());
        tokio::time::sleep(self.delays.after_companion).await;
        Ok(())
    }
}
