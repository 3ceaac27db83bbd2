//! Space walker: enumerate every node of a wiki space.
//!
//! Traversal is iterative over an explicit work stack of parent tokens.
//! Each listing is paginated until the service reports no further page.
//! Nodes with `has_child` set are pushed for expansion.
//!
//! # Failure policy
//!
//! - A failure listing the **root** level aborts the walk: there is
//!   nothing to ingest.
//! - A failure listing a **subtree** (on any page) is logged and that
//!   subtree is skipped; siblings and other subtrees continue. Nodes
//!   already collected from earlier pages of the failing subtree are kept.
//!
//! The output has no ordering guarantee beyond being deterministic for an
//! unchanged space. Every node token appears at most once.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::client::WikiApi;
use crate::error::{Result, WikiError};
use crate::models::{AccessToken, WikiNode};

/// Summary of a completed walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    pub nodes: Vec<WikiNode>,
    /// Parents whose subtree could not be (fully) listed.
    pub failed_subtrees: Vec<String>,
}

/// List every node reachable from the root of `space_id`.
///
/// # Errors
///
/// [`WikiError::List`] if the root level cannot be listed.
pub async fn list_all_nodes(
    api: &dyn WikiApi,
    space_id: &str,
    token: &AccessToken,
) -> Result<Vec<WikiNode>> {
    Ok(walk_space(api, space_id, token).await?.nodes)
}

/// Like [`list_all_nodes`], also reporting skipped subtrees.
pub async fn walk_space(
    api: &dyn WikiApi,
    space_id: &str,
    token: &AccessToken,
) -> Result<WalkReport> {
    let mut report = WalkReport::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<Option<String>> = vec![None];

    while let Some(parent) = stack.pop() {
        let children = match list_children(api, space_id, token, parent.as_deref()).await {
            Ok(children) => children,
            Err((partial, err)) => {
                let Some(parent_token) = parent else {
                    return Err(err);
                };
                warn!(parent = %parent_token, error = %err, "skipping subtree");
                report.failed_subtrees.push(parent_token);
                partial
            }
        };

        for node in children {
            if !seen.insert(node.node_token.clone()) {
                debug!(node = %node.node_token, "node already visited");
                continue;
            }
            if node.has_child {
                stack.push(Some(node.node_token.clone()));
            }
            report.nodes.push(node);
        }
    }

    info!(
        space_id,
        nodes = report.nodes.len(),
        failed_subtrees = report.failed_subtrees.len(),
        "space walk complete"
    );
    Ok(report)
}

/// Fetch all pages of one parent's children.
///
/// On failure, returns the nodes gathered from earlier pages along with
/// the error.
async fn list_children(
    api: &dyn WikiApi,
    space_id: &str,
    token: &AccessToken,
    parent: Option<&str>,
) -> std::result::Result<Vec<WikiNode>, (Vec<WikiNode>, WikiError)> {
    let mut out = Vec::new();
    let mut page_token: Option<String> = None;
    let mut seen_tokens: HashSet<String> = HashSet::new();

    loop {
        let page = match api
            .list_nodes(token, space_id, parent, page_token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => return Err((out, e)),
        };
        out.extend(page.items);

        match page.page_token {
            Some(next) if page.has_more => {
                if !seen_tokens.insert(next.clone()) {
                    let err = WikiError::List {
                        parent: parent.unwrap_or("<root>").to_string(),
                        reason: format!("page token {} repeated", next),
                    };
                    return Err((out, err));
                }
                page_token = Some(next);
            }
            _ => break,
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryWiki;
    use crate::models::ObjectType;

    fn token() -> AccessToken {
        AccessToken {
            value: "t-cli_test".into(),
            app_id: "cli_test".into(),
            expires_in: 7200,
        }
    }

    /// root: a (→ a1, a2 (→ a2x)), b, c (→ c1); paginated by 2.
    fn tree() -> InMemoryWiki {
        let wiki = InMemoryWiki::new("sp").with_page_size(2);
        wiki.add_node(None, "a", "A", ObjectType::Docx)
            .add_node(None, "b", "B", ObjectType::Sheet)
            .add_node(None, "c", "C", ObjectType::Docx)
            .add_node(Some("a"), "a1", "A1", ObjectType::Docx)
            .add_node(Some("a"), "a2", "A2", ObjectType::Docx)
            .add_node(Some("a2"), "a2x", "A2X", ObjectType::Docx)
            .add_node(Some("c"), "c1", "C1", ObjectType::Docx);
        wiki
    }

    fn sorted_tokens(nodes: &[WikiNode]) -> Vec<String> {
        let mut tokens: Vec<String> = nodes.iter().map(|n| n.node_token.clone()).collect();
        tokens.sort();
        tokens
    }

    #[tokio::test]
    async fn walks_every_node_exactly_once() {
        let wiki = tree();
        let nodes = list_all_nodes(&wiki, "sp", &token()).await.unwrap();
        assert_eq!(nodes.len(), 7);
        assert_eq!(
            sorted_tokens(&nodes),
            vec!["a", "a1", "a2", "a2x", "b", "c", "c1"]
        );
    }

    #[tokio::test]
    async fn parent_links_are_preserved() {
        let wiki = tree();
        let nodes = list_all_nodes(&wiki, "sp", &token()).await.unwrap();
        let a2x = nodes.iter().find(|n| n.node_token == "a2x").unwrap();
        assert_eq!(a2x.parent_node_token.as_deref(), Some("a2"));
        let b = nodes.iter().find(|n| n.node_token == "b").unwrap();
        assert_eq!(b.parent_node_token, None);
    }

    #[tokio::test]
    async fn rerun_yields_equivalent_set() {
        let wiki = tree();
        let first = list_all_nodes(&wiki, "sp", &token()).await.unwrap();
        let second = list_all_nodes(&wiki, "sp", &token()).await.unwrap();
        assert_eq!(sorted_tokens(&first), sorted_tokens(&second));
    }

    #[tokio::test]
    async fn failed_subtree_is_skipped_siblings_continue() {
        let wiki = tree();
        wiki.fail_listing(Some("a"));
        let report = walk_space(&wiki, "sp", &token()).await.unwrap();
        assert_eq!(sorted_tokens(&report.nodes), vec!["a", "b", "c", "c1"]);
        assert_eq!(report.failed_subtrees, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn failed_root_listing_aborts() {
        let wiki = tree();
        wiki.fail_listing(None);
        let err = list_all_nodes(&wiki, "sp", &token()).await.unwrap_err();
        assert!(matches!(err, WikiError::List { .. }));
    }

    #[tokio::test]
    async fn empty_space_yields_no_nodes() {
        let wiki = InMemoryWiki::new("sp");
        let nodes = list_all_nodes(&wiki, "sp", &token()).await.unwrap();
        assert!(nodes.is_empty());
    }

    /// Root listing whose continuation tokens loop p1 → p2 → p1.
    struct CyclingPages;

    #[async_trait::async_trait]
    impl WikiApi for CyclingPages {
        async fn tenant_access_token(
            &self,
            _app_id: &str,
            _app_secret: &str,
        ) -> Result<crate::client::TokenGrant> {
            unreachable!()
        }

        async fn list_nodes(
            &self,
            _token: &AccessToken,
            space_id: &str,
            _parent: Option<&str>,
            page_token: Option<&str>,
        ) -> Result<crate::client::NodePage> {
            let (node, next) = match page_token {
                None => ("n0", "p1"),
                Some("p1") => ("n1", "p2"),
                _ => ("n2", "p1"),
            };
            Ok(crate::client::NodePage {
                items: vec![WikiNode {
                    space_id: space_id.to_string(),
                    node_token: node.to_string(),
                    obj_token: format!("obj-{}", node),
                    obj_type: ObjectType::Docx,
                    parent_node_token: None,
                    has_child: false,
                    title: node.to_string(),
                    obj_edit_time: None,
                }],
                page_token: Some(next.to_string()),
                has_more: true,
            })
        }

        async fn raw_content(&self, _token: &AccessToken, _document_id: &str) -> Result<String> {
            unreachable!()
        }

        async fn export_sheet(&self, _token: &AccessToken, _sheet_token: &str) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn repeated_page_token_stops_listing() {
        let err = list_all_nodes(&CyclingPages, "sp", &token())
            .await
            .unwrap_err();
        match err {
            WikiError::List { reason, .. } => assert!(reason.contains("repeated")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
