//! In-memory [`WikiApi`] implementation for tests and offline runs.
//!
//! Holds a node tree, document bodies, and exported workbooks behind
//! `std::sync::RwLock`. Listings are paginated with the configured page
//! size, and the `has_child` flag is derived from the tree, so the space
//! walker sees the same shape it would from the real service.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::client::{NodePage, TokenGrant, WikiApi};
use crate::error::{Result, WikiError};
use crate::models::{AccessToken, ObjectType, WikiNode};

const ROOT: &str = "";

/// In-memory wiki space.
pub struct InMemoryWiki {
    space_id: String,
    credentials: (String, String),
    page_size: usize,
    children: RwLock<HashMap<String, Vec<WikiNode>>>,
    documents: RwLock<HashMap<String, String>>,
    failing_documents: RwLock<HashSet<String>>,
    sheets: RwLock<HashMap<String, Vec<u8>>>,
    failing_listings: RwLock<HashSet<String>>,
    calls: RwLock<Vec<String>>,
}

impl InMemoryWiki {
    pub fn new(space_id: &str) -> Self {
        Self {
            space_id: space_id.to_string(),
            credentials: ("cli_test".to_string(), "secret".to_string()),
            page_size: 50,
            children: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            failing_documents: RwLock::new(HashSet::new()),
            sheets: RwLock::new(HashMap::new()),
            failing_listings: RwLock::new(HashSet::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn with_credentials(mut self, app_id: &str, app_secret: &str) -> Self {
        self.credentials = (app_id.to_string(), app_secret.to_string());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a node under `parent` (root level when `None`).
    ///
    /// `node_token` doubles as the object token with a `obj_` prefix.
    pub fn add_node(
        &self,
        parent: Option<&str>,
        node_token: &str,
        title: &str,
        obj_type: ObjectType,
    ) -> &Self {
        let node = WikiNode {
            node_token: node_token.to_string(),
            obj_token: Self::obj_token(node_token),
            title: title.to_string(),
            obj_type,
            parent_node_token: parent.map(str::to_string),
            has_child: false,
            space_id: self.space_id.clone(),
            obj_edit_time: None,
        };
        self.children
            .write()
            .unwrap()
            .entry(parent.unwrap_or(ROOT).to_string())
            .or_default()
            .push(node);
        self
    }

    /// Object token assigned to a node added via [`add_node`](Self::add_node).
    pub fn obj_token(node_token: &str) -> String {
        format!("obj_{}", node_token)
    }

    pub fn set_document(&self, node_token: &str, content: &str) -> &Self {
        self.documents
            .write()
            .unwrap()
            .insert(Self::obj_token(node_token), content.to_string());
        self
    }

    pub fn fail_document(&self, node_token: &str) -> &Self {
        self.failing_documents
            .write()
            .unwrap()
            .insert(Self::obj_token(node_token));
        self
    }

    pub fn set_sheet(&self, node_token: &str, xlsx: Vec<u8>) -> &Self {
        self.sheets
            .write()
            .unwrap()
            .insert(Self::obj_token(node_token), xlsx);
        self
    }

    /// Make every listing of `parent`'s children fail.
    pub fn fail_listing(&self, parent: Option<&str>) -> &Self {
        self.failing_listings
            .write()
            .unwrap()
            .insert(parent.unwrap_or(ROOT).to_string());
        self
    }

    /// Names of API operations invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.write().unwrap().push(call);
    }

    fn check_token(&self, token: &AccessToken) -> std::result::Result<(), String> {
        if token.value == self.token_value() {
            Ok(())
        } else {
            Err("invalid access token".to_string())
        }
    }

    fn token_value(&self) -> String {
        format!("t-{}", self.credentials.0)
    }
}

#[async_trait]
impl WikiApi for InMemoryWiki {
    async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<TokenGrant> {
        self.record("tenant_access_token".to_string());
        if (app_id, app_secret) != (self.credentials.0.as_str(), self.credentials.1.as_str()) {
            return Err(WikiError::Auth {
                code: 10014,
                msg: "app secret invalid".to_string(),
            });
        }
        Ok(TokenGrant {
            tenant_access_token: self.token_value(),
            expire: 7200,
        })
    }

    async fn list_nodes(
        &self,
        token: &AccessToken,
        space_id: &str,
        parent: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<NodePage> {
        let key = parent.unwrap_or(ROOT).to_string();
        self.record(format!("list_nodes:{}", key));

        let list_err = |reason: String| WikiError::List {
            parent: parent.unwrap_or("<root>").to_string(),
            reason,
        };

        self.check_token(token).map_err(list_err)?;
        if space_id != self.space_id {
            return Err(list_err(format!("unknown space {}", space_id)));
        }
        if self.failing_listings.read().unwrap().contains(&key) {
            return Err(list_err("simulated listing failure".to_string()));
        }

        let offset: usize = match page_token {
            Some(pt) => pt
                .parse()
                .map_err(|_| list_err(format!("bad page token {}", pt)))?,
            None => 0,
        };

        let children = self.children.read().unwrap();
        let all = children.get(&key).cloned().unwrap_or_default();
        let end = (offset + self.page_size).min(all.len());
        let items: Vec<WikiNode> = all
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(|mut node| {
                node.has_child = children.contains_key(&node.node_token);
                node
            })
            .collect();
        let has_more = end < all.len();

        Ok(NodePage {
            items,
            page_token: has_more.then(|| end.to_string()),
            has_more,
        })
    }

    async fn raw_content(&self, token: &AccessToken, document_id: &str) -> Result<String> {
        self.record(format!("raw_content:{}", document_id));
        self.check_token(token)
            .map_err(|r| WikiError::fetch(document_id, r))?;
        if self.failing_documents.read().unwrap().contains(document_id) {
            return Err(WikiError::fetch(document_id, "simulated fetch failure"));
        }
        self.documents
            .read()
            .unwrap()
            .get(document_id)
            .cloned()
            .ok_or_else(|| WikiError::fetch(document_id, "document not found"))
    }

    async fn export_sheet(&self, token: &AccessToken, sheet_token: &str) -> Result<Vec<u8>> {
        self.record(format!("export_sheet:{}", sheet_token));
        self.check_token(token)
            .map_err(|r| WikiError::fetch(sheet_token, r))?;
        self.sheets
            .read()
            .unwrap()
            .get(sheet_token)
            .cloned()
            .ok_or_else(|| WikiError::fetch(sheet_token, "sheet not found"))
    }
}
