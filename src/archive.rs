use std::fs::File;
use std::io::Write;
use std::path::Path;

use futures_util::StreamExt;

use crate::catalog::AppId;
use crate::zip_utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Archive downloaded, extracted into the destination and deleted.
    Extracted { files: u64 },
    /// The host answered 404: there is no archive for this id.
    NotFoundRemote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchProgress {
    Downloading { downloaded: u64, total: Option<u64> },
    Extracting { done: u64, total: u64, detail: Option<String> },
}

/// Downloads `{base_url}/{app_id}.zip` and unpacks it.
pub struct ArchiveFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl ArchiveFetcher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn archive_url(&self, app_id: AppId) -> String {
        format!("{}/{app_id}.zip", self.base_url.trim_end_matches('/'))
    }

    /// Fetches and extracts the archive for `app_id` into `dest_dir`.
    ///
    /// `dest_dir` is only created once the host has answered with a success status,
    /// so a 404 leaves the filesystem untouched. The body is streamed into
    /// `{app_id}.zip.part` next to `dest_dir` (never inside it, so no archive entry
    /// can overwrite it) and renamed to `{app_id}.zip` only after the last chunk is
    /// written; any failure before that removes the partial file.
    pub async fn fetch<F>(&self, app_id: AppId, dest_dir: &Path, mut on_progress: F) -> Result<FetchOutcome, String>
    where
        F: FnMut(FetchProgress),
    {
        let url = self.archive_url(app_id);
        log::info!("Archive GET {url}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            log::info!("No data found for App ID {app_id}");
            return Ok(FetchOutcome::NotFoundRemote);
        }
        let response = response
            .error_for_status()
            .map_err(|e| format!("download failed: {e}"))?;

        let download_dir = dest_dir.parent().unwrap_or(dest_dir);
        std::fs::create_dir_all(download_dir).map_err(|e| e.to_string())?;
        let part_path = download_dir.join(format!("{app_id}.zip.part"));
        let zip_path = download_dir.join(format!("{app_id}.zip"));

        if let Err(e) = stream_to_file(response, &part_path, &mut on_progress).await {
            let _ = std::fs::remove_file(&part_path);
            return Err(e);
        }
        std::fs::rename(&part_path, &zip_path).map_err(|e| {
            let _ = std::fs::remove_file(&part_path);
            e.to_string()
        })?;
        log::info!("Downloaded: {}", zip_path.display());

        let result = unpack(&zip_path, dest_dir, &mut on_progress);
        if let Err(e) = std::fs::remove_file(&zip_path) {
            log::warn!("Could not delete {}: {e}", zip_path.display());
        }
        let files = result?;

        log::info!("Extracted {files} file(s) into {}", dest_dir.display());
        Ok(FetchOutcome::Extracted { files })
    }
}

async fn stream_to_file<F>(response: reqwest::Response, path: &Path, on_progress: &mut F) -> Result<u64, String>
where
    F: FnMut(FetchProgress),
{
    let total = response.content_length();
    let mut file = File::create(path).map_err(|e| e.to_string())?;

    let mut downloaded: u64 = 0;
    on_progress(FetchProgress::Downloading { downloaded, total });

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download interrupted: {e}"))?;
        file.write_all(&chunk).map_err(|e| e.to_string())?;
        downloaded = downloaded.saturating_add(chunk.len() as u64);
        on_progress(FetchProgress::Downloading { downloaded, total });
    }
    file.flush().map_err(|e| e.to_string())?;
    file.sync_all().map_err(|e| e.to_string())?;
    Ok(downloaded)
}

fn unpack<F>(zip_path: &Path, dest_dir: &Path, on_progress: &mut F) -> Result<u64, String>
where
    F: FnMut(FetchProgress),
{
    if !zip_utils::has_zip_signature(zip_path)? {
        return Err("download is not a valid zip (got non-zip response)".to_string());
    }
    log::info!("Extracting {}", zip_path.display());
    zip_utils::extract_zip_with_progress(zip_path, dest_dir, |done, total, detail| {
        on_progress(FetchProgress::Extracting { done, total, detail })
    })
    .map_err(|e| format!("extraction failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip_utils::tests::build_zip;

    fn fetcher_for(server: &mockito::ServerGuard) -> ArchiveFetcher {
        ArchiveFetcher::new(reqwest::Client::new(), format!("{}/files/", server.url()))
    }

    #[test]
    fn url_is_id_dot_zip_under_base() {
        let f = ArchiveFetcher::new(reqwest::Client::new(), "https://cdn.example.net/apps/");
        assert_eq!(f.archive_url(220), "https://cdn.example.net/apps/220.zip");
    }

    #[tokio::test]
    async fn downloads_extracts_and_deletes_archive() {
        let mut server = mockito::Server::new_async().await;
        let body = build_zip(&[("220.lua", b"addappid(220)"), ("220_1.manifest", b"depot")]);
        let _m = server
            .mock("GET", "/files/220.zip")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("staging");
        let mut last_download = None;
        let outcome = fetcher_for(&server)
            .fetch(220, &dest, |p| {
                if let FetchProgress::Downloading { downloaded, .. } = p {
                    last_download = Some(downloaded);
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Extracted { files: 2 });
        assert!(dest.join("220.lua").is_file());
        assert!(dest.join("220_1.manifest").is_file());
        assert!(!dir.path().join("220.zip").exists());
        assert!(!dir.path().join("220.zip.part").exists());
        assert!(last_download.unwrap_or(0) > 0);
    }

    #[tokio::test]
    async fn entry_named_like_the_archive_is_extracted_intact() {
        let mut server = mockito::Server::new_async().await;
        let body = build_zip(&[("5.zip", b"inner payload"), ("5.lua", b"addappid(5)")]);
        let _m = server
            .mock("GET", "/files/5.zip")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("5");
        let outcome = fetcher_for(&server).fetch(5, &dest, |_| {}).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Extracted { files: 2 });
        assert_eq!(std::fs::read(dest.join("5.zip")).unwrap(), b"inner payload");
        assert_eq!(std::fs::read(dest.join("5.lua")).unwrap(), b"addappid(5)");
        assert!(!dir.path().join("5.zip").exists());
    }

    #[tokio::test]
    async fn not_found_is_distinct_and_leaves_destination_alone() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/files/404.zip")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("staging");
        let outcome = fetcher_for(&server).fetch(404, &dest, |_| {}).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotFoundRemote);
        assert!(!dest.exists());

        // an existing destination keeps exactly what it had
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), b"x").unwrap();
        let outcome = fetcher_for(&server).fetch(404, &dest, |_| {}).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotFoundRemote);
        let names: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("keep.txt")]);
    }

    #[tokio::test]
    async fn server_error_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/files/7.zip")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher_for(&server)
            .fetch(7, &dir.path().join("s"), |_| {})
            .await
            .unwrap_err();
        assert!(err.contains("download failed"), "{err}");
    }

    #[tokio::test]
    async fn html_body_is_rejected_and_cleaned_up() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/files/8.zip")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("s");
        let err = fetcher_for(&server).fetch(8, &dest, |_| {}).await.unwrap_err();
        assert!(err.contains("not a valid zip"), "{err}");
        assert!(!dir.path().join("8.zip").exists());
        assert!(!dir.path().join("8.zip.part").exists());
    }

    #[tokio::test]
    async fn zip_slip_archive_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let body = build_zip(&[("ok.lua", b"1"), ("../../outside.lua", b"2")]);
        let _m = server
            .mock("GET", "/files/9.zip")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a").join("b");
        let err = fetcher_for(&server).fetch(9, &dest, |_| {}).await.unwrap_err();
        assert!(err.contains("escapes destination"), "{err}");
        assert!(!dest.join("ok.lua").exists());
        assert!(!dir.path().join("outside.lua").exists());
    }
}
