//! End-to-end ingest against the in-memory wiki with the hashing embedder.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use wiki_harness::auth::get_tenant_access_token;
use wiki_harness::embedding::HashingEmbedder;
use wiki_harness::error::WikiError;
use wiki_harness::fetcher::FetchOptions;
use wiki_harness::index::BuildOptions;
use wiki_harness::memory::InMemoryWiki;
use wiki_harness::models::ObjectType;
use wiki_harness::pipeline::{run_ingest, IngestOptions};
use wiki_harness::progress::NoProgress;
use wiki_harness::walker::{list_all_nodes, walk_space};

fn options(staging: &Path, export_sheets: bool) -> IngestOptions {
    IngestOptions {
        app_id: "cli_test".into(),
        app_secret: "secret".into(),
        space_id: "sp".into(),
        staging_dir: staging.to_path_buf(),
        exclude_globs: Vec::new(),
        fetch: FetchOptions {
            export_sheets,
            web_url: "https://acme.feishu.cn/wiki".into(),
        },
        build: BuildOptions::default(),
    }
}

/// Single-sheet workbook with inline strings.
fn workbook(rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet = String::from(
        "<?xml version=\"1.0\"?><worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            let col = (b'A' + c as u8) as char;
            sheet.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                col,
                r + 1,
                value
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

fn three_node_wiki() -> InMemoryWiki {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "wikA", "Hello", ObjectType::Docx)
        .add_node(None, "wikB", "Broken", ObjectType::Docx)
        .add_node(None, "wikS", "Budget", ObjectType::Sheet)
        .set_document("wikA", "Hello world")
        .fail_document("wikB")
        .set_sheet(
            "wikS",
            workbook(&[&["Region", "Total"], &["North", "42"]]),
        );
    wiki
}

#[tokio::test]
async fn three_node_space_yields_two_documents() {
    let wiki = three_node_wiki();
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("data");
    let embedder = HashingEmbedder::default();

    let out = run_ingest(&wiki, &embedder, &options(&staging, true), &NoProgress)
        .await
        .unwrap();

    assert_eq!(out.report.nodes, 3);
    assert_eq!(out.report.failed, 1);
    assert_eq!(out.index.document_count(), 2);

    let keys: Vec<&str> = out.index.documents.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["Budget.xlsx", "Hello"]);

    let table = out.index.document("Budget.xlsx").unwrap();
    let positions: Vec<usize> = ["Region", "Total", "North", "42"]
        .iter()
        .map(|v| table.text.find(v).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let hits = out.index.search(&embedder, "Hello", 2).await.unwrap();
    assert_eq!(hits[0].key, "Hello");
    assert!(hits[0].score > 0.0);
    assert_eq!(hits[0].title.as_deref(), Some("Hello"));
    assert_eq!(
        hits[0].url.as_deref(),
        Some("https://acme.feishu.cn/wiki/wikA")
    );
}

#[tokio::test]
async fn staged_document_is_byte_identical() {
    let wiki = three_node_wiki();
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("data");

    run_ingest(
        &wiki,
        &HashingEmbedder::default(),
        &options(&staging, false),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(staging.join("Hello")).unwrap(), b"Hello world");
    assert!(!staging.join("Broken").exists());
    assert!(!staging.join("Budget.xlsx").exists());
}

#[tokio::test]
async fn file_without_metadata_still_loads() {
    let wiki = three_node_wiki();
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("data");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("stray notes"), "left over from an earlier run").unwrap();

    let out = run_ingest(
        &wiki,
        &HashingEmbedder::default(),
        &options(&staging, false),
        &NoProgress,
    )
    .await
    .unwrap();

    let stray = out.index.document("stray notes").unwrap();
    assert_eq!(stray.metadata.title, None);
    assert_eq!(stray.metadata.url, None);
    assert_eq!(stray.metadata.file_name, "stray notes");
    assert!(!out.metadata.contains_key("stray notes"));
}

#[tokio::test]
async fn rebuild_keeps_top_result() {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "r", "Release process", ObjectType::Docx)
        .add_node(None, "o", "Oncall rota", ObjectType::Docx)
        .set_document("r", "Tag the release branch and publish the changelog.")
        .set_document("o", "Weekly oncall rotation and escalation contacts.");
    let embedder = HashingEmbedder::default();

    let mut tops = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let out = run_ingest(&wiki, &embedder, &options(dir.path(), false), &NoProgress)
            .await
            .unwrap();
        let hits = out.index.search(&embedder, "release changelog", 1).await.unwrap();
        tops.push((hits[0].key.clone(), hits[0].score));
    }
    assert_eq!(tops[0], tops[1]);
    assert_eq!(tops[0].0, "Release process");
}

#[tokio::test]
async fn walker_lists_deep_paginated_tree_exactly_once() {
    let wiki = InMemoryWiki::new("sp").with_page_size(2);
    let mut expected = HashSet::new();
    for i in 0..3 {
        let top = format!("t{}", i);
        wiki.add_node(None, &top, &top, ObjectType::Docx);
        expected.insert(top.clone());
        for j in 0..3 {
            let mid = format!("{}m{}", top, j);
            wiki.add_node(Some(&top), &mid, &mid, ObjectType::Docx);
            expected.insert(mid.clone());
            for k in 0..2 {
                let leaf = format!("{}l{}", mid, k);
                wiki.add_node(Some(&mid), &leaf, &leaf, ObjectType::Sheet);
                expected.insert(leaf);
            }
        }
    }

    let token = get_tenant_access_token(&wiki, "cli_test", "secret")
        .await
        .unwrap();
    let nodes = list_all_nodes(&wiki, "sp", &token).await.unwrap();

    assert_eq!(nodes.len(), expected.len());
    let seen: HashSet<String> = nodes.iter().map(|n| n.node_token.clone()).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn failed_subtree_is_skipped_but_root_failure_aborts() {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "a", "A", ObjectType::Docx)
        .add_node(Some("a"), "a1", "A1", ObjectType::Docx)
        .add_node(None, "b", "B", ObjectType::Docx)
        .fail_listing(Some("a"));
    let token = get_tenant_access_token(&wiki, "cli_test", "secret")
        .await
        .unwrap();

    let report = walk_space(&wiki, "sp", &token).await.unwrap();
    assert_eq!(report.nodes.len(), 2);
    assert_eq!(report.failed_subtrees, vec!["a".to_string()]);

    wiki.fail_listing(None);
    let err = walk_space(&wiki, "sp", &token).await.unwrap_err();
    assert!(matches!(err, WikiError::List { .. }));
}

#[tokio::test]
async fn dot_leading_title_is_indexed_and_searchable() {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "n", ".NET setup", ObjectType::Docx)
        .add_node(None, "o", "Other", ObjectType::Docx)
        .set_document("n", "Install the dotnet SDK and restore packages.")
        .set_document("o", "Unrelated cafeteria menu.");
    let dir = tempfile::tempdir().unwrap();
    let embedder = HashingEmbedder::default();

    let out = run_ingest(&wiki, &embedder, &options(dir.path(), false), &NoProgress)
        .await
        .unwrap();

    assert_eq!(out.index.document_count(), 2);
    let hits = out
        .index
        .search(&embedder, "dotnet SDK restore packages", 1)
        .await
        .unwrap();
    assert_eq!(hits[0].key, "_NET setup");
    assert_eq!(hits[0].title.as_deref(), Some(".NET setup"));
    assert_eq!(hits[0].url.as_deref(), Some("https://acme.feishu.cn/wiki/n"));
}

#[tokio::test]
async fn document_titled_like_workbook_is_loaded_as_text() {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "n", "Budget notes.xlsx", ObjectType::Docx)
        .add_node(None, "o", "Other", ObjectType::Docx)
        .set_document("n", "Travel spend is over plan this quarter.")
        .set_document("o", "Unrelated cafeteria menu.");
    let dir = tempfile::tempdir().unwrap();

    let out = run_ingest(
        &wiki,
        &HashingEmbedder::default(),
        &options(dir.path(), false),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(out.index.document_count(), 2);
    let doc = out.index.document("Budget notes.xlsx.txt").unwrap();
    assert_eq!(doc.text, "Travel spend is over plan this quarter.");
    assert_eq!(doc.metadata.title.as_deref(), Some("Budget notes.xlsx"));
}

#[tokio::test]
async fn empty_page_does_not_abort_ingest() {
    let wiki = InMemoryWiki::new("sp");
    wiki.add_node(None, "e", "Placeholder", ObjectType::Docx)
        .add_node(None, "r", "Runbook", ObjectType::Docx)
        .set_document("e", "")
        .set_document("r", "Restart the ingest worker after a deploy.");
    let dir = tempfile::tempdir().unwrap();
    let embedder = HashingEmbedder::default();

    let out = run_ingest(&wiki, &embedder, &options(dir.path(), false), &NoProgress)
        .await
        .unwrap();

    assert_eq!(out.index.document_count(), 2);
    assert_eq!(out.index.chunk_count(), 1);
    let hits = out.index.search(&embedder, "restart worker", 2).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, "Runbook");
}
