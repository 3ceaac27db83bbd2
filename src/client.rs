//! Wire client for the Feishu/Lark Open API.
//!
//! The pipeline talks to the upstream wiki service only through the
//! [`WikiApi`] trait, so tests can swap in an in-memory double. The
//! production implementation, [`FeishuClient`], speaks the JSON envelope
//! protocol (`{ "code": 0, "msg": "success", "data": { ... } }`) over
//! `reqwest`.
//!
//! # Endpoints
//!
//! | Operation | Method | Path |
//! |-----------|--------|------|
//! | Tenant token | `POST` | `/auth/v3/tenant_access_token/internal` |
//! | List nodes | `GET` | `/wiki/v2/spaces/{space_id}/nodes` |
//! | Raw content | `GET` | `/docx/v1/documents/{document_id}/raw_content` |
//! | Export sheet | `POST` | `/drive/v1/export_tasks` |
//! | Export status | `GET` | `/drive/v1/export_tasks/{ticket}` |
//! | Export download | `GET` | `/drive/v1/export_tasks/file/{file_token}/download` |

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, WikiError};
use crate::models::{AccessToken, ObjectType, WikiNode};

/// Token grant as returned by the issuance endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub tenant_access_token: String,
    pub expire: i64,
}

/// One page of a node listing.
#[derive(Debug, Clone, Default)]
pub struct NodePage {
    pub items: Vec<WikiNode>,
    pub page_token: Option<String>,
    pub has_more: bool,
}

/// Upstream wiki service operations used by the pipeline.
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// Exchange app credentials for a tenant access token.
    ///
    /// Errors are always [`WikiError::Auth`].
    async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<TokenGrant>;

    /// List one page of children of `parent` (root level when `None`).
    ///
    /// Errors are always [`WikiError::List`].
    async fn list_nodes(
        &self,
        token: &AccessToken,
        space_id: &str,
        parent: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<NodePage>;

    /// Fetch the plain-text content of a document.
    ///
    /// Errors are always [`WikiError::Fetch`].
    async fn raw_content(&self, token: &AccessToken, document_id: &str) -> Result<String>;

    /// Export a spreadsheet as xlsx bytes.
    ///
    /// Errors are always [`WikiError::Fetch`].
    async fn export_sheet(&self, token: &AccessToken, sheet_token: &str) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: i64,
}

#[derive(Deserialize)]
struct NodeListData {
    #[serde(default)]
    items: Vec<NodeItem>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct NodeItem {
    #[serde(default)]
    space_id: String,
    node_token: String,
    #[serde(default)]
    obj_token: String,
    #[serde(default)]
    obj_type: String,
    #[serde(default)]
    parent_node_token: Option<String>,
    #[serde(default)]
    has_child: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    obj_edit_time: Option<String>,
}

impl NodeItem {
    fn into_node(self) -> WikiNode {
        WikiNode {
            node_token: self.node_token,
            obj_token: self.obj_token,
            title: self.title,
            obj_type: ObjectType::parse(&self.obj_type),
            parent_node_token: self.parent_node_token.filter(|p| !p.is_empty()),
            has_child: self.has_child,
            space_id: self.space_id,
            obj_edit_time: self.obj_edit_time.as_deref().and_then(parse_unix_secs),
        }
    }
}

fn parse_unix_secs(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[derive(Deserialize)]
struct RawContentData {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ExportCreateData {
    ticket: String,
}

#[derive(Deserialize)]
struct ExportStatusData {
    result: ExportResult,
}

#[derive(Deserialize)]
struct ExportResult {
    #[serde(default)]
    file_token: Option<String>,
    job_status: i64,
    #[serde(default)]
    job_error_msg: Option<String>,
}

/// Export job states reported by the drive API.
const EXPORT_SUCCESS: i64 = 0;
const EXPORT_INITIALIZING: i64 = 1;
const EXPORT_PROCESSING: i64 = 2;

/// HTTP implementation of [`WikiApi`] against the Feishu Open API.
pub struct FeishuClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
    export_poll_interval: Duration,
    export_poll_attempts: u32,
}

impl FeishuClient {
    pub fn new(base_url: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
            export_poll_interval: Duration::from_secs(1),
            export_poll_attempts: 10,
        })
    }

    /// Override export polling (tests use a zero interval).
    pub fn with_export_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.export_poll_interval = interval;
        self.export_poll_attempts = attempts.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the `{code, msg, data}` envelope.
    ///
    /// Returns `Err(reason)` for transport failures, non-2xx statuses,
    /// non-zero codes, and missing `data`.
    async fn call<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<T, String> {
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) if status.is_success() => return Err(format!("malformed response: {}", e)),
            Err(_) => return Err(format!("HTTP {}: {}", status, truncate(&body, 200))),
        };

        if !status.is_success() || envelope.code != 0 {
            return Err(format!(
                "HTTP {} code {}: {}",
                status.as_u16(),
                envelope.code,
                envelope.msg
            ));
        }

        envelope
            .data
            .ok_or_else(|| "response has no data".to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn bearer(token: &AccessToken) -> String {
    format!("Bearer {}", token.value)
}

#[async_trait]
impl WikiApi for FeishuClient {
    async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<TokenGrant> {
        let body = serde_json::json!({
            "app_id": app_id,
            "app_secret": app_secret,
        });

        let resp = self
            .http
            .post(self.url("/auth/v3/tenant_access_token/internal"))
            .json(&body)
            .send()
            .await
            .map_err(|e| WikiError::Auth {
                code: -1,
                msg: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| WikiError::Auth {
            code: -1,
            msg: e.to_string(),
        })?;

        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| WikiError::Auth {
            code: status.as_u16() as i64,
            msg: format!("malformed token response: {}", e),
        })?;

        if !status.is_success() || parsed.code != 0 {
            return Err(WikiError::Auth {
                code: if parsed.code != 0 {
                    parsed.code
                } else {
                    status.as_u16() as i64
                },
                msg: parsed.msg,
            });
        }

        let tenant_access_token = parsed
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| WikiError::Auth {
                code: parsed.code,
                msg: "response has no tenant_access_token".to_string(),
            })?;

        Ok(TokenGrant {
            tenant_access_token,
            expire: parsed.expire,
        })
    }

    async fn list_nodes(
        &self,
        token: &AccessToken,
        space_id: &str,
        parent: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<NodePage> {
        let mut query: Vec<(&str, String)> = vec![("page_size", self.page_size.to_string())];
        if let Some(pt) = page_token {
            query.push(("page_token", pt.to_string()));
        }
        if let Some(p) = parent {
            query.push(("parent_node_token", p.to_string()));
        }

        debug!(space_id, parent = parent.unwrap_or("<root>"), "listing nodes");

        let req = self
            .http
            .get(self.url(&format!("/wiki/v2/spaces/{}/nodes", space_id)))
            .header("Authorization", bearer(token))
            .query(&query);

        let data: NodeListData = self.call(req).await.map_err(|reason| WikiError::List {
            parent: parent.unwrap_or("<root>").to_string(),
            reason,
        })?;

        Ok(NodePage {
            items: data.items.into_iter().map(NodeItem::into_node).collect(),
            page_token: data.page_token.filter(|t| !t.is_empty()),
            has_more: data.has_more,
        })
    }

    async fn raw_content(&self, token: &AccessToken, document_id: &str) -> Result<String> {
        debug!(document_id, "fetching raw content");
        let req = self
            .http
            .get(self.url(&format!("/docx/v1/documents/{}/raw_content", document_id)))
            .header("Authorization", bearer(token))
            .query(&[("lang", "0")]);

        let data: RawContentData = self
            .call(req)
            .await
            .map_err(|reason| WikiError::fetch(document_id, reason))?;
        Ok(data.content)
    }

    async fn export_sheet(&self, token: &AccessToken, sheet_token: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "file_extension": "xlsx",
            "token": sheet_token,
            "type": "sheet",
        });
        let req = self
            .http
            .post(self.url("/drive/v1/export_tasks"))
            .header("Authorization", bearer(token))
            .json(&body);
        let created: ExportCreateData = self
            .call(req)
            .await
            .map_err(|reason| WikiError::fetch(sheet_token, reason))?;

        debug!(sheet_token, ticket = %created.ticket, "export task created");

        let mut file_token = None;
        for attempt in 0..self.export_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.export_poll_interval).await;
            }
            let req = self
                .http
                .get(self.url(&format!("/drive/v1/export_tasks/{}", created.ticket)))
                .header("Authorization", bearer(token))
                .query(&[("token", sheet_token)]);
            let status: ExportStatusData = self
                .call(req)
                .await
                .map_err(|reason| WikiError::fetch(sheet_token, reason))?;

            match status.result.job_status {
                EXPORT_SUCCESS => {
                    let finished = status.result.file_token.filter(|t| !t.is_empty());
                    file_token = Some(finished.ok_or_else(|| {
                        WikiError::fetch(sheet_token, "export finished without a file token")
                    })?);
                    break;
                }
                EXPORT_INITIALIZING | EXPORT_PROCESSING => continue,
                other => {
                    return Err(WikiError::fetch(
                        sheet_token,
                        format!(
                            "export job status {}: {}",
                            other,
                            status.result.job_error_msg.unwrap_or_default()
                        ),
                    ))
                }
            }
        }

        let file_token = file_token.ok_or_else(|| {
            WikiError::fetch(sheet_token, "export did not finish before polling gave up")
        })?;

        let resp = self
            .http
            .get(self.url(&format!(
                "/drive/v1/export_tasks/file/{}/download",
                file_token
            )))
            .header("Authorization", bearer(token))
            .send()
            .await
            .map_err(|e| WikiError::fetch(sheet_token, e))?;

        if !resp.status().is_success() {
            return Err(WikiError::fetch(
                sheet_token,
                format!("download failed with HTTP {}", resp.status()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| WikiError::fetch(sheet_token, e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> AccessToken {
        AccessToken {
            value: "t-abc".into(),
            app_id: "cli_a".into(),
            expires_in: 7200,
        }
    }

    fn client(server: &MockServer) -> FeishuClient {
        FeishuClient::new(&server.uri(), 50, Duration::from_secs(5))
            .unwrap()
            .with_export_polling(Duration::from_millis(0), 3)
    }

    #[tokio::test]
    async fn token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .and(body_json(
                serde_json::json!({"app_id": "cli_a", "app_secret": "sec"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok", "tenant_access_token": "t-abc", "expire": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client(&server)
            .tenant_access_token("cli_a", "sec")
            .await
            .unwrap();
        assert_eq!(grant.tenant_access_token, "t-abc");
        assert_eq!(grant.expire, 7200);
    }

    #[tokio::test]
    async fn token_error_code_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10014, "msg": "app secret invalid"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .tenant_access_token("cli_a", "bad")
            .await
            .unwrap_err();
        match err {
            WikiError::Auth { code, msg } => {
                assert_eq!(code, 10014);
                assert_eq!(msg, "app secret invalid");
            }
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn token_malformed_body_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .tenant_access_token("cli_a", "sec")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Auth { code: 502, .. }));
    }

    #[tokio::test]
    async fn list_nodes_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/v2/spaces/sp1/nodes"))
            .and(query_param("parent_node_token", "wikcnRoot"))
            .and(query_param("page_token", "p2"))
            .and(header("Authorization", "Bearer t-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "msg": "success",
                "data": {
                    "items": [{
                        "space_id": "sp1",
                        "node_token": "wikcnA",
                        "obj_token": "doxcnA",
                        "obj_type": "docx",
                        "parent_node_token": "wikcnRoot",
                        "node_type": "origin",
                        "has_child": true,
                        "title": "Design",
                        "obj_edit_time": "1700000000"
                    }],
                    "page_token": "p3",
                    "has_more": true
                }
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .list_nodes(&token(), "sp1", Some("wikcnRoot"), Some("p2"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        let node = &page.items[0];
        assert_eq!(node.node_token, "wikcnA");
        assert_eq!(node.obj_type, ObjectType::Docx);
        assert_eq!(node.parent_node_token.as_deref(), Some("wikcnRoot"));
        assert!(node.has_child);
        assert_eq!(node.obj_edit_time.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(page.page_token.as_deref(), Some("p3"));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn list_nodes_error_code_is_list_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/v2/spaces/sp1/nodes"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "code": 131006, "msg": "permission denied"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_nodes(&token(), "sp1", None, None)
            .await
            .unwrap_err();
        match err {
            WikiError::List { parent, reason } => {
                assert_eq!(parent, "<root>");
                assert!(reason.contains("131006"));
            }
            other => panic!("expected List, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn raw_content_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docx/v1/documents/doxcnA/raw_content"))
            .and(query_param("lang", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success", "data": {"content": "Hello world\n"}
            })))
            .mount(&server)
            .await;

        let text = client(&server)
            .raw_content(&token(), "doxcnA")
            .await
            .unwrap();
        assert_eq!(text, "Hello world\n");
    }

    #[tokio::test]
    async fn export_sheet_polls_then_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v1/export_tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success", "data": {"ticket": "tk1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/export_tasks/tk1"))
            .and(query_param("token", "shtcnA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success",
                "data": {"result": {"file_token": "boxcnF", "job_status": 0}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/export_tasks/file/boxcnF/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-bytes".to_vec()))
            .mount(&server)
            .await;

        let bytes = client(&server)
            .export_sheet(&token(), "shtcnA")
            .await
            .unwrap();
        assert_eq!(bytes, b"PK-bytes");
    }

    #[tokio::test]
    async fn export_sheet_failed_job_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v1/export_tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success", "data": {"ticket": "tk1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/export_tasks/tk1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success",
                "data": {"result": {"job_status": 3, "job_error_msg": "too large"}}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .export_sheet(&token(), "shtcnA")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Fetch { .. }));
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn export_sheet_without_file_token_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v1/export_tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success", "data": {"ticket": "tk1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/export_tasks/tk1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "success",
                "data": {"result": {"job_status": 0}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .export_sheet(&token(), "shtcnA")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Fetch { .. }));
        assert!(err.to_string().contains("without a file token"));
    }
}
