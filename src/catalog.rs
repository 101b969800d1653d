use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::similarity;

pub type AppId = u32;

/// Hosts whose URLs carry the app id as `/app/<digits>`.
const STORE_HOSTS: &[&str] = &["store.steampowered.com", "steamcommunity.com"];

const MAX_CANDIDATES: usize = 5;
const SIMILARITY_CUTOFF: f64 = 0.7;

/// One row of the app list.
///
/// Endpoint: `GET {catalog_url}` -> `{ "applist": { "apps": [{ "appid": 220, "name": "Half-Life 2" }] } }`
#[derive(Debug, Clone, Deserialize)]
pub struct AppListing {
    pub appid: AppId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct AppListResponse {
    applist: AppList,
}

#[derive(Debug, Deserialize)]
struct AppList {
    apps: Vec<AppListing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub app_id: AppId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Resolved(AppId),
    /// Close but inexact name matches, best first. Never auto-selected.
    Candidates(Vec<Candidate>),
    NotFound,
}

fn app_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/app/(\d+)").expect("static regex"))
}

fn looks_like_url(query: &str) -> bool {
    let lower = query.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || STORE_HOSTS.iter().any(|h| lower.contains(h))
}

/// What a query is, decided without touching the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Id(AppId),
    /// Digits that do not fit an id; never looked up by name.
    OutOfRange,
    Name,
}

fn parse_id(digits: &str) -> QueryKind {
    match digits.parse::<AppId>() {
        Ok(id) => QueryKind::Id(id),
        Err(_) => QueryKind::OutOfRange,
    }
}

fn classify_query(query: &str) -> QueryKind {
    let query = query.trim();

    if looks_like_url(query) {
        if let Some(m) = app_url_regex().captures(query).and_then(|c| c.get(1)) {
            return parse_id(m.as_str());
        }
    }

    if !query.is_empty() && query.chars().all(|c| c.is_ascii_digit()) {
        return parse_id(query);
    }

    QueryKind::Name
}

/// Id from a query that is a store URL or a bare number; `None` for free text
/// and for numbers too large to be an id.
pub fn parse_direct_id(query: &str) -> Option<AppId> {
    match classify_query(query) {
        QueryKind::Id(id) => Some(id),
        QueryKind::OutOfRange | QueryKind::Name => None,
    }
}

/// Lowercased name -> id table. Later rows win on duplicate names.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, AppId>,
}

impl Catalog {
    pub fn from_listings<I: IntoIterator<Item = AppListing>>(listings: I) -> Self {
        let entries = listings
            .into_iter()
            .map(|app| (app.name.to_lowercase(), app.appid))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact (case-insensitive) match first, then up to five close matches.
    pub fn find(&self, name: &str) -> Lookup {
        if self.entries.is_empty() {
            return Lookup::NotFound;
        }

        let key = name.trim().to_lowercase();
        if let Some(id) = self.entries.get(&key) {
            return Lookup::Resolved(*id);
        }

        let matches = similarity::close_matches(
            &key,
            self.entries.keys().map(String::as_str),
            MAX_CANDIDATES,
            SIMILARITY_CUTOFF,
        );
        if matches.is_empty() {
            return Lookup::NotFound;
        }

        Lookup::Candidates(
            matches
                .into_iter()
                .filter_map(|name| {
                    self.entries.get(name).map(|id| Candidate {
                        name: name.to_string(),
                        app_id: *id,
                    })
                })
                .collect(),
        )
    }
}

/// Resolves queries to app ids, fetching the app list on first name lookup.
///
/// The list is requested at most once per client. A failed request leaves the
/// catalog empty, so every later name lookup reports [`Lookup::NotFound`].
pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    catalog: Option<Catalog>,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            catalog: None,
        }
    }

    /// Client with a pre-populated catalog; never touches the network.
    pub fn with_catalog(http: reqwest::Client, catalog: Catalog) -> Self {
        Self {
            http,
            url: String::new(),
            catalog: Some(catalog),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.is_some()
    }

    pub async fn lookup(&mut self, query: &str) -> Lookup {
        match classify_query(query) {
            QueryKind::Id(id) => Lookup::Resolved(id),
            QueryKind::OutOfRange => {
                log::warn!("App ID out of range: {}", query.trim());
                Lookup::NotFound
            }
            QueryKind::Name => self.catalog().await.find(query),
        }
    }

    async fn catalog(&mut self) -> &Catalog {
        if self.catalog.is_none() {
            let catalog = match fetch_app_list(&self.http, &self.url).await {
                Ok(apps) => {
                    let catalog = Catalog::from_listings(apps);
                    log::info!("app list cached: {} names", catalog.len());
                    catalog
                }
                Err(e) => {
                    log::error!("Error fetching app list: {e}");
                    Catalog::default()
                }
            };
            self.catalog = Some(catalog);
        }
        self.catalog.get_or_insert_with(Catalog::default)
    }
}

pub async fn fetch_app_list(client: &reqwest::Client, url: &str) -> Result<Vec<AppListing>, String> {
    log::info!("App list GET {url}");
    let body = client
        .get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?
        .json::<AppListResponse>()
        .await
        .map_err(|e| e.to_string())?;
    Ok(body.applist.apps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, appid: AppId) -> AppListing {
        AppListing {
            appid,
            name: name.to_string(),
        }
    }

    fn offline(catalog: Catalog) -> CatalogClient {
        CatalogClient::with_catalog(reqwest::Client::new(), catalog)
    }

    #[test]
    fn numeric_queries_resolve_directly() {
        for s in ["0", "7", "220", "1966720", "  440  "] {
            assert_eq!(parse_direct_id(s), Some(s.trim().parse().unwrap()));
        }
        assert_eq!(parse_direct_id("220a"), None);
        assert_eq!(parse_direct_id(""), None);
        assert_eq!(parse_direct_id("-5"), None);
        assert_eq!(parse_direct_id("4294967295"), Some(u32::MAX));
        assert_eq!(parse_direct_id("4294967296"), None);
        assert_eq!(classify_query("99999999999999999999"), QueryKind::OutOfRange);
        assert_eq!(classify_query("https://store.steampowered.com/app/4294967296/"), QueryKind::OutOfRange);
    }

    #[test]
    fn store_urls_resolve_regardless_of_shape() {
        let cases = [
            ("https://store.steampowered.com/app/220/HalfLife_2/", 220),
            ("store.steampowered.com/app/570", 570),
            ("https://steamcommunity.com/app/440/discussions/?foo=bar", 440),
            ("http://example.org/deep/path/app/1091500?x=1", 1091500),
        ];
        for (url, id) in cases {
            assert_eq!(parse_direct_id(url), Some(id), "{url}");
        }
    }

    #[test]
    fn url_without_app_segment_is_not_an_id() {
        assert_eq!(parse_direct_id("https://store.steampowered.com/search/?term=portal"), None);
    }

    #[tokio::test]
    async fn direct_ids_skip_the_catalog() {
        // No catalog and an unreachable URL: a fetch would degrade to NotFound.
        let mut client = CatalogClient::new(reqwest::Client::new(), "http://127.0.0.1:9/none");
        assert_eq!(client.lookup("220").await, Lookup::Resolved(220));
        assert_eq!(
            client.lookup("https://store.steampowered.com/app/620/Portal_2/").await,
            Lookup::Resolved(620)
        );
        assert_eq!(client.lookup("4294967296").await, Lookup::NotFound);
        assert_eq!(
            client.lookup("https://store.steampowered.com/app/99999999999/").await,
            Lookup::NotFound
        );
        assert!(!client.is_loaded());
    }

    #[tokio::test]
    async fn exact_match_beats_fuzzy() {
        let mut client = offline(Catalog::from_listings([
            listing("Half-Life", 70),
            listing("Half-Life 2", 220),
            listing("Half-Life: Source", 280),
        ]));
        assert_eq!(client.lookup("half-life").await, Lookup::Resolved(70));
        assert_eq!(client.lookup("HALF-LIFE 2").await, Lookup::Resolved(220));
    }

    #[tokio::test]
    async fn single_fuzzy_hit_is_still_a_candidate_set() {
        let mut client = offline(Catalog::from_listings([listing("Portal 2", 620)]));
        assert_eq!(
            client.lookup("portal 3").await,
            Lookup::Candidates(vec![Candidate {
                name: "portal 2".to_string(),
                app_id: 620
            }])
        );
    }

    #[tokio::test]
    async fn fuzzy_threshold_and_limit() {
        let mut apps: Vec<AppListing> = (0..100)
            .map(|i| listing(&format!("zq{i:03} unrelated title"), 10_000 + i))
            .collect();
        apps.push(listing("abcdefgxyz", 1)); // 0.70
        apps.push(listing("abcdefxyzw", 2)); // 0.60
        apps.push(listing("abcdefghxy", 3)); // 0.80
        let mut client = offline(Catalog::from_listings(apps));

        match client.lookup("abcdefghij").await {
            Lookup::Candidates(c) => {
                let ids: Vec<AppId> = c.iter().map(|c| c.app_id).collect();
                assert_eq!(ids, vec![3, 1]);
                for cand in &c {
                    assert!(similarity::ratio(&cand.name, "abcdefghij") >= SIMILARITY_CUTOFF);
                }
            }
            other => panic!("expected candidates, got {other:?}"),
        }

        let many: Vec<AppListing> = (0..30).map(|i| listing(&format!("Dota {i:02}"), i)).collect();
        let mut client = offline(Catalog::from_listings(many));
        match client.lookup("dota 0").await {
            Lookup::Candidates(c) => assert_eq!(c.len(), MAX_CANDIDATES),
            other => panic!("expected candidates, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_close_is_not_found() {
        let mut client = offline(Catalog::from_listings([listing("Portal 2", 620)]));
        assert_eq!(client.lookup("stardew valley").await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn app_list_is_fetched_once_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/applist")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"applist":{"apps":[
                    {"appid":220,"name":"Half-Life 2"},
                    {"appid":620,"name":"Portal 2"},
                    {"appid":621,"name":"Portal 2"}
                ]}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let mut client = CatalogClient::new(reqwest::Client::new(), format!("{}/applist", server.url()));
        assert_eq!(client.lookup("Half-Life 2").await, Lookup::Resolved(220));
        // duplicate name: later row wins
        assert_eq!(client.lookup("portal 2").await, Lookup::Resolved(621));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_not_found_for_good() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/applist")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let mut client = CatalogClient::new(reqwest::Client::new(), format!("{}/applist", server.url()));
        assert_eq!(client.lookup("Half-Life 2").await, Lookup::NotFound);
        assert_eq!(client.lookup("Portal").await, Lookup::NotFound);
        // ids still resolve without the catalog
        assert_eq!(client.lookup("220").await, Lookup::Resolved(220));
        m.assert_async().await;
    }
}
