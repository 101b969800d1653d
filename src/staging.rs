use std::path::{Path, PathBuf};

use crate::catalog::AppId;

/// Transient directory holding one extracted archive.
///
/// Lifecycle: [`StagingArea::prepare`] -> populated by the archive fetcher ->
/// drained by the installer -> [`StagingArea::discard`]. Dropping the area discards it
/// as well, including during a panic unwind.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    /// `{root}/{app_id}`. Leftovers from an earlier interrupted run are removed;
    /// the directory itself is created later by the fetcher.
    pub fn prepare(root: &Path, app_id: AppId) -> Result<Self, String> {
        let path = root.join(app_id.to_string());
        if path.exists() {
            log::warn!("Removing stale staging dir {}", path.display());
            std::fs::remove_dir_all(&path).map_err(|e| e.to_string())?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory tree if it still exists. Failures are logged only.
    pub fn discard(&self) {
        if !self.path.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::info!("Deleted staging dir {}", self.path.display()),
            Err(e) => log::warn!("Could not delete staging dir {}: {e}", self.path.display()),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_clears_leftovers_and_discard_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("220");
        std::fs::create_dir_all(stale.join("nested")).unwrap();
        std::fs::write(stale.join("nested").join("old.lua"), b"x").unwrap();

        let staging = StagingArea::prepare(root.path(), 220).unwrap();
        assert_eq!(staging.path(), stale.as_path());
        assert!(!stale.exists());

        std::fs::create_dir_all(staging.path()).unwrap();
        staging.discard();
        assert!(!stale.exists());
        staging.discard();
    }

    #[test]
    fn dropping_the_area_removes_its_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let staging = StagingArea::prepare(root.path(), 620).unwrap();
            std::fs::create_dir_all(staging.path().join("nested")).unwrap();
            std::fs::write(staging.path().join("nested").join("620.lua"), b"x").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(root.path().is_dir());
    }
}
