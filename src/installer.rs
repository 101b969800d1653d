use std::path::{Path, PathBuf};

use serde::Serialize;

/// Extensions copied into `config/stplug-in`.
pub const PLUGIN_EXTENSIONS: &[&str] = &["lua", "st"];
/// Extensions copied into `depotcache`.
pub const MANIFEST_EXTENSIONS: &[&str] = &["manifest"];

pub fn plugin_dir(install_root: &Path) -> PathBuf {
    install_root.join("config").join("stplug-in")
}

pub fn depotcache_dir(install_root: &Path) -> PathBuf {
    install_root.join("depotcache")
}

/// Recognised files found in a staging directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedFiles {
    pub plugins: Vec<PathBuf>,
    pub manifests: Vec<PathBuf>,
}

impl StagedFiles {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.manifests.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub plugins_copied: u64,
    pub manifests_copied: u64,
    pub failures: Vec<CopyFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstallSummary),
    /// At least one file could not be copied; the rest were.
    PartialFailure(InstallSummary),
    /// Staging held no plugin or manifest files.
    NothingToDo,
    RootNotFound,
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn for_each_file_recursive(
    root: &Path,
    mut f: impl FnMut(&Path) -> Result<(), String>,
) -> Result<(), String> {
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for e in std::fs::read_dir(&dir).map_err(|e| e.to_string())? {
            let e = e.map_err(|e| e.to_string())?;
            let path = e.path();
            let ty = e.file_type().map_err(|e| e.to_string())?;
            if ty.is_dir() {
                stack.push(path);
            } else if ty.is_file() {
                f(&path)?;
            }
        }
    }
    Ok(())
}

/// Buckets every file under `staging` by extension. A missing directory has no files.
pub fn classify(staging: &Path) -> Result<StagedFiles, String> {
    let mut staged = StagedFiles::default();
    if !staging.exists() {
        return Ok(staged);
    }
    for_each_file_recursive(staging, |path| {
        if has_extension(path, PLUGIN_EXTENSIONS) {
            staged.plugins.push(path.to_path_buf());
        } else if has_extension(path, MANIFEST_EXTENSIONS) {
            staged.manifests.push(path.to_path_buf());
        }
        Ok(())
    })?;
    staged.plugins.sort();
    staged.manifests.sort();
    Ok(staged)
}

/// Copies each file flat into `dst_dir`, recording per-file failures instead of stopping.
fn copy_bucket(files: &[PathBuf], dst_dir: &Path, label: &str, failures: &mut Vec<CopyFailure>) -> u64 {
    if files.is_empty() {
        return 0;
    }
    log::info!("Copying {} {label} file(s) to {}", files.len(), dst_dir.display());

    if let Err(e) = std::fs::create_dir_all(dst_dir) {
        let error = format!("cannot create {}: {e}", dst_dir.display());
        log::error!("{error}");
        failures.extend(files.iter().map(|file| CopyFailure {
            file: file.clone(),
            error: error.clone(),
        }));
        return 0;
    }

    let mut copied = 0u64;
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let dest = dst_dir.join(name);
        match std::fs::copy(file, &dest) {
            Ok(_) => {
                copied += 1;
                log::info!("  copied {}", dest.display());
            }
            Err(e) => {
                log::error!("  Failed: {} -> {}: {e}", file.display(), dest.display());
                failures.push(CopyFailure {
                    file: file.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    copied
}

/// Distributes staged files into the installation root.
///
/// Order of checks: nothing recognised -> [`InstallOutcome::NothingToDo`]; no root ->
/// [`InstallOutcome::RootNotFound`]. Neither case writes anything. Otherwise every
/// file is copied independently and the staging directory is removed afterwards,
/// whatever the per-file results were.
pub fn install(staging: &Path, install_root: Option<&Path>) -> Result<InstallOutcome, String> {
    let staged = classify(staging)?;
    if staged.is_empty() {
        log::info!("No files found to copy in {}", staging.display());
        return Ok(InstallOutcome::NothingToDo);
    }

    let Some(root) = install_root else {
        log::error!("Could not find the installation root");
        return Ok(InstallOutcome::RootNotFound);
    };

    let mut failures = vec![];
    let plugins_copied = copy_bucket(&staged.plugins, &plugin_dir(root), "plugin", &mut failures);
    let manifests_copied = copy_bucket(&staged.manifests, &depotcache_dir(root), "manifest", &mut failures);
    let summary = InstallSummary {
        plugins_copied,
        manifests_copied,
        failures,
    };

    match std::fs::remove_dir_all(staging) {
        Ok(()) => log::info!("Deleted temporary files in {}", staging.display()),
        Err(e) => log::warn!("Could not delete staging dir {}: {e}", staging.display()),
    }

    if summary.failures.is_empty() {
        Ok(InstallOutcome::Installed(summary))
    } else {
        Ok(InstallOutcome::PartialFailure(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, data: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn classifies_by_extension_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let s = dir.path();
        write(&s.join("a.lua"), b"");
        write(&s.join("deep/b.ST"), b"");
        write(&s.join("deep/er/c.manifest"), b"");
        write(&s.join("readme.txt"), b"");
        write(&s.join("lua"), b"");

        let staged = classify(s).unwrap();
        assert_eq!(staged.plugins, vec![s.join("a.lua"), s.join("deep/b.ST")]);
        assert_eq!(staged.manifests, vec![s.join("deep/er/c.manifest")]);
    }

    #[test]
    fn nothing_to_do_creates_no_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let root = dir.path().join("root");
        write(&staging.join("notes.txt"), b"hi");
        std::fs::create_dir_all(&root).unwrap();

        assert_eq!(install(&staging, Some(&root)).unwrap(), InstallOutcome::NothingToDo);
        assert!(!plugin_dir(&root).exists());
        assert!(!depotcache_dir(&root).exists());
    }

    #[test]
    fn missing_root_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        write(&staging.join("220.lua"), b"x");

        assert_eq!(install(&staging, None).unwrap(), InstallOutcome::RootNotFound);
        assert!(staging.join("220.lua").is_file());
    }

    #[test]
    fn copies_flat_into_both_destinations_and_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let root = dir.path().join("root");
        write(&staging.join("220.lua"), b"addappid(220)");
        write(&staging.join("keys/220.st"), b"st");
        write(&staging.join("depots/221_99.manifest"), b"m");
        std::fs::create_dir_all(&root).unwrap();

        let outcome = install(&staging, Some(&root)).unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::Installed(InstallSummary {
                plugins_copied: 2,
                manifests_copied: 1,
                failures: vec![],
            })
        );
        assert_eq!(std::fs::read(plugin_dir(&root).join("220.lua")).unwrap(), b"addappid(220)");
        assert!(plugin_dir(&root).join("220.st").is_file());
        assert!(depotcache_dir(&root).join("221_99.manifest").is_file());
        assert!(!staging.exists());
    }

    #[test]
    fn unwritable_destination_is_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let root = dir.path().join("root");
        write(&staging.join("220.lua"), b"x");
        write(&staging.join("221.lua"), b"y");
        write(&staging.join("221_1.manifest"), b"m");
        // a plain file where the depotcache directory should be
        write(&root.join("depotcache"), b"not a dir");

        match install(&staging, Some(&root)).unwrap() {
            InstallOutcome::PartialFailure(summary) => {
                assert_eq!(summary.plugins_copied, 2);
                assert_eq!(summary.manifests_copied, 0);
                assert_eq!(summary.failures.len(), 1);
                assert_eq!(summary.failures[0].file, staging.join("221_1.manifest"));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert!(plugin_dir(&root).join("220.lua").is_file());
        assert!(plugin_dir(&root).join("221.lua").is_file());
        assert!(!staging.exists());
    }
}
