//! `wctx` binary against a mocked Feishu API with offline embeddings.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(root: &Path, base_url: &str) -> PathBuf {
    let config = format!(
        r#"[wiki]
app_id = "cli_test"
app_secret = "secret"
space_id = "sp1"
base_url = "{base_url}"
web_url = "https://acme.feishu.cn/wiki"

[staging]
dir = "{root}/data"

[index]
snapshot = "{root}/index/wiki-index.json"

[embedding]
provider = "hashing"

[retrieval]
top_k = 4
min_score = 0.1
"#,
        base_url = base_url,
        root = root.display()
    );
    let path = root.join("wctx.toml");
    fs::write(&path, config).unwrap();
    path
}

async fn mock_space() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0, "msg": "ok", "tenant_access_token": "t-cli", "expire": 7200
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/v2/spaces/sp1/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": {
                "items": [
                    {
                        "space_id": "sp1",
                        "node_token": "wikcnA",
                        "obj_token": "doxcnA",
                        "obj_type": "docx",
                        "has_child": false,
                        "title": "Deploy guide"
                    },
                    {
                        "space_id": "sp1",
                        "node_token": "wikcnM",
                        "obj_token": "bmncnM",
                        "obj_type": "mindnote",
                        "has_child": false,
                        "title": "Roadmap"
                    }
                ],
                "has_more": false
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/doxcnA/raw_content"))
        .and(query_param("lang", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": {"content": "Deploy with the blue green rollout script.\n"}
        })))
        .mount(&server)
        .await;
    server
}

async fn wctx(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_wctx"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_then_search_and_stats() {
    let server = mock_space().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.uri());

    let out = wctx(&config, &["ingest", "--progress", "off"]).await;
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "ingest failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(stdout.contains("documents:        1"));
    assert!(tmp.path().join("index/wiki-index.json").exists());
    assert!(tmp.path().join("data/Deploy guide").exists());

    let out = wctx(&config, &["search", "blue green rollout"]).await;
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success());
    assert!(stdout.contains("Deploy guide"));
    assert!(stdout.contains("https://acme.feishu.cn/wiki/wikcnA"));
    assert!(stdout.contains("retrieved 1 of 1 sources"));

    let out = wctx(&config, &["stats"]).await;
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success());
    assert!(stdout.contains("Documents:   1"));
    assert!(stdout.contains("hashing (256 dims)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn nodes_lists_tree_with_ingest_column() {
    let server = mock_space().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.uri());

    let out = wctx(&config, &["nodes"]).await;
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success());
    let deploy = stdout.lines().find(|l| l.contains("Deploy guide")).unwrap();
    assert!(deploy.starts_with("docx"));
    assert!(deploy.contains(" yes "));
    let roadmap = stdout.lines().find(|l| l.contains("Roadmap")).unwrap();
    assert!(roadmap.contains(" no "));
    assert!(stdout.contains("2 nodes"));
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_credentials_fail_ingest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 10014, "msg": "app secret invalid"
        })))
        .mount(&server)
        .await;
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.uri());

    let out = wctx(&config, &["ingest", "--progress", "off"]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("10014"));
    assert!(!tmp.path().join("index/wiki-index.json").exists());
}

#[tokio::test]
async fn search_without_snapshot_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "http://127.0.0.1:9");

    let out = wctx(&config, &["search", "anything"]).await;
    assert!(!out.status.success());
}
