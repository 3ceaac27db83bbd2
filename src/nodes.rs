//! `wctx nodes`: show the walked node tree without staging anything.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;

use crate::auth::get_tenant_access_token;
use crate::client::FeishuClient;
use crate::config::Config;
use crate::models::WikiNode;
use crate::walker::walk_space;

pub async fn list_nodes(config: &Config) -> Result<()> {
    let client = FeishuClient::new(
        &config.wiki.base_url,
        config.wiki.page_size,
        Duration::from_secs(config.wiki.timeout_secs),
    )?;
    let secret = config.wiki.resolve_secret()?;
    let token = get_tenant_access_token(&client, &config.wiki.app_id, &secret).await?;
    let report = walk_space(&client, &config.wiki.space_id, &token).await?;

    for line in render_tree(&report.nodes, config.wiki.export_sheets) {
        println!("{}", line);
    }
    println!();
    println!("{} nodes", report.nodes.len());
    for parent in &report.failed_subtrees {
        println!("warning: children of {} could not be listed", parent);
    }
    Ok(())
}

/// Nodes in depth-first order with their depth.
///
/// Children follow their parent in listing order. Nodes whose parent is
/// not in `nodes` are treated as roots.
pub fn tree_order(nodes: &[WikiNode]) -> Vec<(usize, &WikiNode)> {
    let known: HashSet<&str> = nodes.iter().map(|n| n.node_token.as_str()).collect();
    let mut children: HashMap<&str, Vec<&WikiNode>> = HashMap::new();
    let mut roots = Vec::new();
    for node in nodes {
        match node.parent_node_token.as_deref() {
            Some(parent) if known.contains(parent) => {
                children.entry(parent).or_default().push(node)
            }
            _ => roots.push(node),
        }
    }

    let mut out = Vec::with_capacity(nodes.len());
    let mut stack: Vec<(usize, &WikiNode)> = roots.into_iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, node));
        if let Some(kids) = children.get(node.node_token.as_str()) {
            stack.extend(kids.iter().rev().map(|k| (depth + 1, *k)));
        }
    }
    out
}

/// Table lines: header, rule, one row per node with the title indented by depth.
pub fn render_tree(nodes: &[WikiNode], export_sheets: bool) -> Vec<String> {
    let mut lines = vec![
        format!("{:<10} {:<8} {:<28} TITLE", "TYPE", "INGEST", "NODE"),
        "-".repeat(76),
    ];
    for (depth, node) in tree_order(nodes) {
        let ingest = if node.obj_type.is_document()
            || (node.obj_type.is_spreadsheet() && export_sheets)
        {
            "yes"
        } else {
            "no"
        };
        lines.push(format!(
            "{:<10} {:<8} {:<28} {}{}",
            node.obj_type.as_str(),
            ingest,
            node.node_token,
            "  ".repeat(depth),
            node.title
        ));
    }
    lines
}
