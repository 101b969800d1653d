use std::collections::HashMap;

use serde::Deserialize;

use crate::catalog::AppId;

pub const UNKNOWN_NAME: &str = "Unknown";

/// Store details for one app.
///
/// Endpoint: `GET {metadata_url}?appids={id}` ->
/// `{ "220": { "success": true, "data": { "name": "Half-Life 2", "type": "game" } } }`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AppDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl AppDetails {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<AppDetails>,
}

pub struct MetadataClient {
    http: reqwest::Client,
    url: String,
}

impl MetadataClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Best-effort details lookup. Any failure is logged and yields `None`.
    pub async fn fetch_details(&self, app_id: AppId) -> Option<AppDetails> {
        match self.try_fetch_details(app_id).await {
            Ok(details) => details,
            Err(e) => {
                log::warn!("Error fetching app details for {app_id}: {e}");
                None
            }
        }
    }

    async fn try_fetch_details(&self, app_id: AppId) -> Result<Option<AppDetails>, String> {
        let url = format!("{}?appids={app_id}", self.url);
        log::info!("App details GET {url}");
        let mut body = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json::<HashMap<String, DetailsEnvelope>>()
            .await
            .map_err(|e| e.to_string())?;

        Ok(body
            .remove(&app_id.to_string())
            .filter(|envelope| envelope.success)
            .and_then(|envelope| envelope.data))
    }
}
