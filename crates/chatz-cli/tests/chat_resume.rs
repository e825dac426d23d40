//! Integration tests for continuing conversations across `chatz chat` runs.


use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{can_bind_localhost, text_response, write_config};
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

const USER: &str = "jane@example.com";

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_chat_reopens_latest_conversation() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }

    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();
    write_config(home.path(), &server.uri(), Some(USER));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Noted."))
        .expect(2)
        .mount(&server)
        .await;

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .env("CHATZ_API_KEY", "test-api-key")
        .arg("chat")
        .write_stdin("first\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi there!"));

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .env("CHATZ_API_KEY", "test-api-key")
        .arg("chat")
        .write_stdin("second\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("user: first"))
        .stdout(predicate::str::contains("assistant: Noted."))
        .stdout(predicate::str::contains("Hi there!").not());

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);

    let messages = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "first");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[2]["content"], "Noted.");
    assert_eq!(messages[3]["content"], "second");

    // Both turns landed in a single conversation file.
    let files = fs::read_dir(home.path().join("history")).unwrap().count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn test_chat_continues_chosen_conversation_on_its_api() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }

    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();
    let config = format!(
        r#"user = "{USER}"
default_api = "alpha"

[apis.alpha]
api_endpoint = "{uri}"
model_name = "alpha-model"
allow_for_all = true
widget_title = "Alpha"

[apis.beta]
api_endpoint = "{uri}"
model_name = "beta-model"
widget_title = "Beta"
"#,
        uri = server.uri()
    );
    fs::write(home.path().join("config.toml"), config).unwrap();

    let history = home.path().join("history");
    fs::create_dir_all(&history).unwrap();
    let lines = [
        json!({"type": "meta", "schema_version": 1, "user": USER, "ts": "2024-01-01T00:00:00.000Z"}),
        json!({"type": "message", "role": "user", "content": "Where is SO-1?", "api_used": "beta", "ts": "2024-01-01T00:00:00.000Z"}),
        json!({"type": "message", "role": "assistant", "content": "Shipped.", "api_used": "beta", "ts": "2024-01-01T00:00:01.000Z"}),
    ];
    let content: String = lines.iter().map(|l| format!("{l}\n")).collect();
    fs::write(history.join("conv_1_aaa.jsonl"), content).unwrap();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Tracking attached."))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .env("CHATZ_API_KEY", "test-api-key")
        .args(["chat", "--conversation", "conv_1_aaa"])
        .write_stdin("And the tracking number?\n:q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Beta (beta)"))
        .stdout(predicate::str::contains("assistant: Shipped."));

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["model"], "beta-model");
    let messages = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1]["content"], "Where is SO-1?");
    assert_eq!(messages[3]["content"], "And the tracking number?");

    let saved = fs::read_to_string(history.join("conv_1_aaa.jsonl")).unwrap();
    assert!(saved.contains("Tracking attached."));
}

#[test]
fn test_chat_rejects_unknown_conversation() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "https://api.example.com/v1", Some(USER));

    cargo_bin_cmd!("chatz")
        .env("CHATZ_HOME", home.path())
        .args(["chat", "--conversation", "conv_9_missing"])
        .write_stdin(":q\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conversation 'conv_9_missing' not found"));
}
