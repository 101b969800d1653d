use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

/// Returns `true` when the file starts with the zip local-header signature `PK`.
///
/// A non-zip body usually means an HTML error page came back with a 200.
pub fn has_zip_signature(path: &Path) -> Result<bool, String> {
    let mut f = File::open(path).map_err(|e| e.to_string())?;
    let mut header = [0u8; 4];
    let n = f.read(&mut header).map_err(|e| e.to_string())?;
    Ok(n >= 2 && header[0] == b'P' && header[1] == b'K')
}

/// Relative output path of every entry, or an error naming the first entry that
/// would land outside the destination.
fn enclosed_paths<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<PathBuf>, String> {
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| e.to_string())?;
        match entry.enclosed_name() {
            Some(p) => out.push(p.to_owned()),
            None => return Err(format!("archive entry escapes destination: {}", entry.name())),
        }
    }
    Ok(out)
}

/// Extracts a zip to `dest_dir`, emitting progress as `(done_entries, total_entries, detail)`.
///
/// Every entry is checked with `enclosed_name()` before anything is written; one
/// path-escaping entry (Zip Slip) rejects the whole archive. Returns the number of
/// files written.
pub fn extract_zip_with_progress<F>(
    zip_path: &Path,
    dest_dir: &Path,
    mut on_progress: F,
) -> Result<u64, String>
where
    F: FnMut(u64, u64, Option<String>),
{
    let file = File::open(zip_path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;

    let rel_paths = enclosed_paths(&mut archive)?;

    let total_entries = archive.len() as u64;
    let mut processed: u64 = 0;
    let mut files_written: u64 = 0;
    on_progress(0, total_entries, Some("Starting...".to_string()));

    std::fs::create_dir_all(dest_dir).map_err(|e| e.to_string())?;

    for (i, rel) in rel_paths.into_iter().enumerate() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let entry_name = Some(entry.name().to_string());
        let out_path = dest_dir.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| e.to_string())?;
            processed = processed.saturating_add(1);
            on_progress(processed, total_entries, entry_name);
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let mut out_file = File::create(&out_path).map_err(|e| e.to_string())?;
        std::io::copy(&mut entry, &mut out_file).map_err(|e| e.to_string())?;

        files_written = files_written.saturating_add(1);
        processed = processed.saturating_add(1);
        on_progress(processed, total_entries, entry_name);
    }

    Ok(files_written)
}
