use std::path::{Path, PathBuf};

/// How deep the companion tool search descends below each probe directory.
const COMPANION_SEARCH_DEPTH: usize = 4;

/// Conventional installation roots of the host application, most specific first.
pub fn conventional_install_roots() -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = vec![];

    #[cfg(windows)]
    {
        if let Some(p) = registry_install_root() {
            out.push(p);
        }
        for var in ["PROGRAMFILES(X86)", "PROGRAMFILES"] {
            if let Some(dir) = std::env::var_os(var) {
                out.push(PathBuf::from(dir).join("Steam"));
            }
        }
        out.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
        out.push(PathBuf::from(r"C:\Program Files\Steam"));
    }

    #[cfg(not(windows))]
    {
        if let Some(home) = dirs::home_dir() {
            out.push(home.join(".steam").join("steam"));
            out.push(home.join(".local").join("share").join("Steam"));
            out.push(home.join("Library").join("Application Support").join("Steam"));
        }
    }

    out.dedup();
    out
}

#[cfg(windows)]
fn registry_install_root() -> Option<PathBuf> {
    use winreg::enums::HKEY_CURRENT_USER;
    use winreg::RegKey;

    let key = RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey(r"Software\Valve\Steam")
        .ok()?;
    let path: String = key.get_value("SteamPath").ok()?;
    Some(PathBuf::from(path.replace('/', "\\")))
}

/// Directories searched for the companion tool executable.
pub fn conventional_companion_dirs() -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = vec![];
    if let Some(d) = dirs::data_local_dir() {
        out.push(d.join("SteamTools"));
    }
    if let Some(d) = dirs::data_dir() {
        out.push(d.join("SteamTools"));
    }
    #[cfg(windows)]
    {
        out.push(PathBuf::from(r"C:\Program Files\SteamTools"));
        out.push(PathBuf::from(r"C:\Program Files (x86)\SteamTools"));
    }
    out.dedup();
    out
}

/// Finds the installation root once and remembers the answer, found or not.
#[derive(Debug)]
pub struct InstallRootLocator {
    candidates: Vec<PathBuf>,
    resolved: Option<Option<PathBuf>>,
}

impl InstallRootLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            resolved: None,
        }
    }

    /// A configured root replaces probing entirely.
    pub fn from_override(root: Option<PathBuf>) -> Self {
        match root {
            Some(root) => Self::new(vec![root]),
            None => Self::new(conventional_install_roots()),
        }
    }

    pub fn locate(&mut self) -> Option<&Path> {
        if self.resolved.is_none() {
            let found = self.candidates.iter().find(|p| p.is_dir()).cloned();
            match &found {
                Some(p) => log::info!("installation root: {}", p.display()),
                None => log::warn!("installation root not found in {:?}", self.candidates),
            }
            self.resolved = Some(found);
        }
        self.resolved.as_ref().and_then(|p| p.as_deref())
    }
}

/// Depth-limited, case-insensitive search for a file named `target_name`.
pub fn find_file_named(root: &Path, target_name: &str, max_depth: usize) -> Option<PathBuf> {
    let target_lower = target_name.to_lowercase();
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        if depth > max_depth {
            continue;
        }
        let Ok(rd) = std::fs::read_dir(&dir) else {
            continue;
        };
        for e in rd.flatten() {
            let path = e.path();
            let Ok(ft) = e.file_type() else { continue };
            if ft.is_dir() {
                stack.push((path, depth + 1));
                continue;
            }
            if !ft.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if name.to_lowercase() == target_lower {
                return Some(path);
            }
        }
    }
    None
}

/// Companion tool path: the configured one if it exists, else the first match
/// under the conventional directories.
pub fn find_companion(configured: Option<&Path>, search_dirs: &[PathBuf], exe_name: &str) -> Option<PathBuf> {
    if let Some(p) = configured {
        if p.is_file() {
            return Some(p.to_path_buf());
        }
        log::warn!("configured companion path does not exist: {}", p.display());
    }
    search_dirs.iter()
        .filter(|d| d.is_dir())
        .find_map(|d| find_file_named(d, exe_name, COMPANION_SEARCH_DEPTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_candidate_wins_and_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&b).unwrap();

        let mut locator = InstallRootLocator::new(vec![a.clone(), b.clone()]);
        assert_eq!(locator.locate(), Some(b.as_path()));

        // later changes on disk are not re-probed
        std::fs::create_dir_all(&a).unwrap();
        assert_eq!(locator.locate(), Some(b.as_path()));
    }

    #[test]
    fn missing_root_is_cached_too() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let mut locator = InstallRootLocator::new(vec![a.clone()]);
        assert_eq!(locator.locate(), None);
        std::fs::create_dir_all(&a).unwrap();
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn companion_is_found_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("SteamTools");
        let exe = tools.join("app-1.8").join("bin").join("SteamTools.exe");
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, b"").unwrap();

        let found = find_companion(None, &[dir.path().join("missing"), tools], "steamtools.exe");
        assert_eq!(found, Some(exe));
    }

    #[test]
    fn configured_companion_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool.exe");
        assert_eq!(find_companion(Some(&exe), &[], "tool.exe"), None);
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(find_companion(Some(&exe), &[], "tool.exe"), Some(exe));
    }
}
