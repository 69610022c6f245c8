//! Notion database client.
//!
//! Each database page is one composition. Property lookup is by name and
//! tolerant: a property that is missing or has an unexpected type is read
//! as `None`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::{ParseError, Url};

use super::{Composition, ContentError, ContentSource};
use crate::config::NotionConfig;

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;
const DEFAULT_CURRENCY: &str = "usd";

/// Client for one Notion database.
#[derive(Debug, Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    database_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Result<Self, ContentError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ContentError::InvalidApiKey)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("notion-version", HeaderValue::from_static(NOTION_VERSION));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            database_id: config.database_id.clone(),
        })
    }

    /// API URL for `segments`, each pushed as one percent-encoded segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ContentError> {
        let mut target = self.base_url.clone();
        target
            .path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(target)
    }

    async fn query_database(&self) -> Result<Vec<Value>, ContentError> {
        let url = self.endpoint(&["databases", &self.database_id, "query"])?;

        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self.http.post(url.clone()).json(&body).send().await?;
            let page: QueryResponse = check(response).await?.json().await?;
            pages.extend(page.results);

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = pages.len(), "Notion database query");
        Ok(pages)
    }
}

/// Notion ids are UUIDs, hyphenated or not.
fn is_page_id(id: &str) -> bool {
    let hex = |s: &str| s.chars().all(|c| c.is_ascii_hexdigit());
    match id.len() {
        32 => hex(id),
        36 => id.split('-').map(str::len).eq([8, 4, 4, 4, 12]) && hex(&id.replace('-', "")),
        _ => false,
    }
}

/// Turn non-2xx responses into `ContentError::Api` with Notion's message.
async fn check(response: Response) -> Result<Response, ContentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["message"]
        .as_str()
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
        .to_string();
    Err(ContentError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ContentSource for NotionClient {
    async fn list_compositions(&self) -> Result<Vec<Composition>, ContentError> {
        let pages = self.query_database().await?;
        let mut compositions: Vec<_> = pages.iter().filter_map(composition_from_page).collect();
        // newest first, undated last; sorting in Notion would require a Year column
        compositions.sort_by(|a, b| b.year.cmp(&a.year));
        Ok(compositions)
    }

    fn is_valid_id(&self, id: &str) -> bool {
        is_page_id(id)
    }

    async fn get_composition(&self, id: &str) -> Result<Option<Composition>, ContentError> {
        if !is_page_id(id) {
            debug!(id = %id, "Not a Notion page id");
            return Ok(None);
        }
        let url = self.endpoint(&["pages", id])?;
        let response = self.http.get(url).send().await?;

        // Notion answers 400 for ids that are not UUID-shaped
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            debug!(id = %id, status = %response.status(), "Notion page not found");
            return Ok(None);
        }

        let page: Value = check(response).await?.json().await?;
        Ok(composition_from_page(&page))
    }

    async fn compositions_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<Composition>, ContentError> {
        // Notion's select filter is case-sensitive, category keys are not.
        let all = self.list_compositions().await?;
        Ok(all.into_iter().filter(|c| c.in_category(category)).collect())
    }

    async fn ping(&self) -> Result<(), ContentError> {
        let url = self.endpoint(&["users", "me"])?;
        let response = self.http.get(url).send().await?;
        check(response).await?;
        Ok(())
    }
}

/// Map a Notion page object to a composition. Pages without a title, or
/// archived ones, are skipped.
pub(crate) fn composition_from_page(page: &Value) -> Option<Composition> {
    if page["archived"].as_bool().unwrap_or(false) || page["in_trash"].as_bool().unwrap_or(false)
    {
        return None;
    }

    let id = page["id"].as_str()?.to_string();
    let props = page["properties"].as_object()?;

    let title = props
        .values()
        .find(|p| p["type"] == "title")
        .and_then(text)
        .filter(|t| !t.is_empty())?;

    let prop = |name: &str| props.get(name).unwrap_or(&Value::Null);

    Some(Composition {
        id,
        title,
        category: select(prop("Category")),
        year: number(prop("Year")).map(|y| y as i32),
        instrumentation: text(prop("Instrumentation")),
        duration: text(prop("Duration")),
        description: text(prop("Description")),
        audio_url: link(prop("Audio")),
        score_url: link(prop("Score")),
        image_url: link(prop("Image")).or_else(|| cover(page)),
        price_cents: number(prop("Price")).map(|p| (p * 100.0).round() as i64),
        currency: select(prop("Currency"))
            .or_else(|| text(prop("Currency")))
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    })
}

/// Plain text of a `title` or `rich_text` property.
fn text(prop: &Value) -> Option<String> {
    let kind = prop["type"].as_str()?;
    let parts = prop[kind].as_array()?;
    let joined: String = parts
        .iter()
        .filter_map(|part| part["plain_text"].as_str())
        .collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn select(prop: &Value) -> Option<String> {
    let kind = prop["type"].as_str()?;
    let option = match kind {
        "select" | "status" => &prop[kind],
        "multi_select" => &prop[kind][0],
        _ => return None,
    };
    option["name"].as_str().map(str::to_string)
}

fn number(prop: &Value) -> Option<f64> {
    (prop["type"] == "number").then(|| prop["number"].as_f64()).flatten()
}

/// A `url` property, or the first entry of a `files` property.
fn link(prop: &Value) -> Option<String> {
    match prop["type"].as_str()? {
        "url" => prop["url"].as_str().map(str::to_string),
        "files" => file_url(&prop["files"][0]),
        _ => None,
    }
}

fn cover(page: &Value) -> Option<String> {
    file_url(&page["cover"])
}

/// Notion file objects are either hosted (`file.url`) or `external.url`.
fn file_url(file: &Value) -> Option<String> {
    file["file"]["url"]
        .as_str()
        .or_else(|| file["external"]["url"].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(id: &str, title: &str, category: &str) -> Value {
        json!({
            "object": "page",
            "id": id,
            "archived": false,
            "cover": { "type": "external", "external": { "url": "https://img.example/cover.jpg" } },
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": title }] },
                "Category": { "type": "select", "select": { "name": category } },
                "Year": { "type": "number", "number": 2019 },
                "Instrumentation": { "type": "rich_text", "rich_text": [
                    { "plain_text": "violin, " }, { "plain_text": "piano" }
                ] },
                "Audio": { "type": "files", "files": [
                    { "name": "a.mp3", "type": "file", "file": { "url": "https://s3.example/a.mp3" } }
                ] },
                "Score": { "type": "url", "url": "https://scores.example/a.pdf" },
                "Price": { "type": "number", "number": 24.5 }
            }
        })
    }

    #[test]
    fn test_page_mapping() {
        let c = composition_from_page(&page("p1", "Sonata", "Chamber")).unwrap();

        assert_eq!(c.id, "p1");
        assert_eq!(c.title, "Sonata");
        assert_eq!(c.category.as_deref(), Some("Chamber"));
        assert_eq!(c.year, Some(2019));
        assert_eq!(c.instrumentation.as_deref(), Some("violin, piano"));
        assert_eq!(c.audio_url.as_deref(), Some("https://s3.example/a.mp3"));
        assert_eq!(c.score_url.as_deref(), Some("https://scores.example/a.pdf"));
        assert_eq!(c.image_url.as_deref(), Some("https://img.example/cover.jpg"));
        assert_eq!(c.price_cents, Some(2450));
        assert_eq!(c.currency, "usd");
        assert!(c.is_purchasable());
    }

    #[test]
    fn test_page_mapping_tolerates_missing_properties() {
        let p = json!({
            "id": "p2",
            "properties": {
                "Title": { "type": "title", "title": [{ "plain_text": "Untitled Study" }] },
                "Year": { "type": "rich_text", "rich_text": [] }
            }
        });

        let c = composition_from_page(&p).unwrap();

        assert_eq!(c.title, "Untitled Study");
        assert_eq!(c.year, None);
        assert_eq!(c.category, None);
        assert_eq!(c.image_url, None);
        assert!(!c.is_purchasable());
    }

    #[test]
    fn test_untitled_and_archived_pages_are_skipped() {
        let mut archived = page("p3", "Gone", "Solo");
        archived["archived"] = json!(true);
        assert!(composition_from_page(&archived).is_none());

        let untitled = json!({
            "id": "p4",
            "properties": { "Name": { "type": "title", "title": [] } }
        });
        assert!(composition_from_page(&untitled).is_none());
    }

    fn client_for(server: &MockServer) -> NotionClient {
        NotionClient::new(&NotionConfig {
            api_key: "secret_test".to_string(),
            database_id: "db1".to_string(),
            api_url: Url::parse(&format!("{}/v1/", server.uri())).unwrap(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(header("notion-version", NOTION_VERSION))
            .and(wiremock::matchers::body_partial_json(json!({ "start_cursor": "c2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("b", "Second", "Solo")],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page("a", "First", "Chamber")],
                "has_more": true,
                "next_cursor": "c2"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let all = client.list_compositions().await.unwrap();
        let titles: Vec<_> = all.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);

        let chamber = client.compositions_by_category("chamber").await.unwrap();
        assert_eq!(chamber.len(), 1);
        assert_eq!(chamber[0].id, "a");
    }

    const PAGE_ID: &str = "59833787-2cf9-4fdf-8782-e53db20768a5";

    #[test]
    fn test_page_id_shapes() {
        assert!(is_page_id(PAGE_ID));
        assert!(is_page_id("598337872cf94fdf8782e53db20768a5"));
        assert!(!is_page_id("59833787-2cf94-fdf-8782-e53db20768a5"));
        assert!(!is_page_id("../databases/secret-db"));
        assert!(!is_page_id("598337872cf94fdf8782e53db20768a5?x=1"));
        assert!(!is_page_id(""));
    }

    #[tokio::test]
    async fn test_get_page_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/pages/{}", PAGE_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(PAGE_ID, "Elegy", "Solo")))
            .mount(&server)
            .await;

        let c = client_for(&server).get_composition(PAGE_ID).await.unwrap().unwrap();
        assert_eq!(c.title, "Elegy");
    }

    #[tokio::test]
    async fn test_non_page_ids_never_reach_notion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page("db", "Leaked", "Solo")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        for id in ["../databases/secret-db", "abc?filter=1", "abc#frag", "nope"] {
            assert_eq!(client.get_composition(id).await.unwrap(), None);
        }
        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_page_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/pages/{}", PAGE_ID)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "object": "error", "status": 404, "message": "Could not find page"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_composition(PAGE_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_api_error_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "object": "error", "status": 401, "message": "API token is invalid."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).ping().await.unwrap_err();
        match err {
            ContentError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "API token is invalid.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
