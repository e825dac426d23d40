//! Integration tests for `chatz history`, `chatz apis` and `chatz models`.


use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{can_bind_localhost, models_response, text_response, write_config};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

fn write_conversation(home: &TempDir, id: &str, api: &str, messages: &[(&str, &str)]) {
    let dir = home.path().join("history");
    fs::create_dir_all(&dir).unwrap();

    let mut content = json!({
        "type": "meta",
        "schema_version": 1,
        "user": "jane@example.com",
        "ts": "2024-01-01T00:00:00.000Z"
    })
    .to_string();
    content.push('\n');
    for (role, text) in messages {
        let event = json!({
            "type": "message",
            "role": role,
            "content": text,
            "api_used": api,
            "ts": "2024-01-01T00:00:00.000Z"
        });
        content.push_str(&event.to_string());
        content.push('\n');
    }
    fs::write(dir.join(format!("{id}.jsonl")), content).unwrap();
}

#[test]
fn test_history_list_empty() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "https://api.example.com/v1", Some("jane@example.com"));

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations found."));
}

#[test]
fn test_history_list_filters_by_api_and_show() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "https://api.example.com/v1", Some("jane@example.com"));
    write_conversation(&home, "conv_1_aaa", "main", &[("user", "Where is SO-1?"), ("assistant", "Shipped.")]);
    write_conversation(&home, "conv_2_bbb", "other", &[("user", "Unrelated")]);

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["history", "list", "--api", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conv_1_aaa"))
        .stdout(predicate::str::contains("Where is SO-1?"))
        .stdout(predicate::str::contains("conv_2_bbb").not());

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["history", "show", "conv_1_aaa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("user: Where is SO-1?"))
        .stdout(predicate::str::contains("assistant: Shipped."));
}

#[test]
fn test_history_show_rejects_bad_id() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["history", "show", "../etc/passwd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid conversation id"));
}

#[tokio::test]
async fn test_exec_then_history_list() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_config(home.path(), &server.uri(), Some("jane@example.com"));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Saved reply"))
        .mount(&server)
        .await;

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .env("CHATZ_API_KEY", "test-api-key")
        .args(["exec", "-p", "Remember me"])
        .assert()
        .success();

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("conv_"))
        .stdout(predicate::str::contains("just now"))
        .stdout(predicate::str::contains("main"))
        .stdout(predicate::str::contains("Remember me"));
}

#[test]
fn test_apis_list_and_use() {
    let home = TempDir::new().unwrap();
    let config = r#"user = "jane@example.com"

[apis.alpha]
api_endpoint = "https://a.example.com/v1"
model_name = "model-a"
allow_for_all = true
widget_title = "Alpha"

[apis.beta]
api_endpoint = "https://b.example.com/v1"
model_name = "model-b"
widget_title = "Beta"

[apis.off]
api_endpoint = "https://c.example.com/v1"
model_name = "model-c"
enabled = false
"#;
    fs::write(home.path().join("config.toml"), config).unwrap();

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["apis", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* alpha  Alpha  model-a"))
        .stdout(predicate::str::contains("  beta  Beta  model-b"))
        .stdout(predicate::str::contains("off").not());

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["apis", "use", "beta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Using Beta (beta)"));

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["apis", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* beta"));

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["apis", "use", "off"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not available"));
}

#[tokio::test]
async fn test_models_fetch_and_save() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_config(home.path(), &server.uri(), Some("jane@example.com"));

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(models_response())
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .env("CHATZ_API_KEY", "test-api-key")
        .args(["models", "fetch", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gpt-4o-mini"))
        .stdout(predicate::str::contains("Saved 2 models for 'main'"));

    let saved = fs::read_to_string(home.path().join("config.toml")).unwrap();
    assert!(saved.contains("available_models"));
    assert!(saved.contains("\"gpt-4o\""));
    assert!(saved.contains("widget_title = \"Support Bot\""));
}
