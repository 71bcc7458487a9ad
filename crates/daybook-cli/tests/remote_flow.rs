use assert_cmd::Command;
use httpmock::Method::{GET, PATCH, POST};
use httpmock::MockServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn remote_like_is_remembered_across_runs() {
    let server = MockServer::start();
    mock_probe(&server);
    mock_first_page(&server, json!([row(7, 1_700_000_000_000, 3)]));
    server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/notes")
            .query_param("select", "likecount")
            .query_param("id", "eq.7");
        then.status(200).json_body(json!([{"likecount": 3}]));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/notes")
            .query_param("id", "eq.7")
            .query_param("likecount", "eq.3")
            .json_body(json!({"likecount": 4}));
        then.status(200).json_body(json!([row(7, 1_700_000_000_000, 4)]));
    });

    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let liked = run_command(&workspace.path, &["like", "7", "--json"]);
    patch.assert();
    assert_eq!(liked["result"]["note"]["likecount"], 4);
    assert_eq!(liked["result"]["note"]["liked"], true);
    assert_eq!(liked["result"]["confirmed"], 1);

    let feed = run_command(&workspace.path, &["feed", "--json"]);
    assert_eq!(feed["result"]["store"], "remote");
    assert_eq!(feed["result"]["state"]["status"], "ready");
    assert_eq!(feed["result"]["notes"][0]["liked"], true);
}

#[test]
fn rejected_favorite_exits_with_remote_error() {
    let server = MockServer::start();
    mock_probe(&server);
    mock_first_page(&server, json!([row(3, 1_700_000_000_000, 0)]));
    server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/notes")
            .query_param("id", "eq.3");
        then.status(500)
            .json_body(json!({"message": "database is read-only", "code": "25006"}));
    });

    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let err = run_command_fail_json(&workspace.path, &["favorite", "3", "--json"], 6);
    assert_eq!(err["ok"], false);
    assert_eq!(err["error"]["kind"], "remote");
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("database is read-only")
    );
}

#[test]
fn failed_upload_attaches_inline_preview() {
    let server = MockServer::start();
    mock_probe(&server);
    let upload = server.mock(|when, then| {
        when.method(POST).path_contains("/storage/v1/object/images/");
        then.status(500).body("bucket unavailable");
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/notes")
            .body_contains("data:image/jpeg;base64,");
        then.status(201).json_body(json!([{
            "id": 11,
            "text": "harbour",
            "images": ["data:image/jpeg;base64,AAAA"],
            "tags": [],
            "mood": "cloudy",
            "favorite": false,
            "likecount": 0,
            "comments": [],
            "timestamp": 1_700_000_500_000_i64
        }]));
    });

    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());
    let picture = write_png(&workspace.path, "harbour.png");

    let composed = run_command(
        &workspace.path,
        &[
            "compose",
            "--text",
            "harbour",
            "--image",
            picture.to_str().expect("image path"),
            "--json",
        ],
    );
    upload.assert();
    create.assert();
    assert_eq!(composed["result"]["note"]["id"], 11);
}

#[test]
fn rejected_compose_exits_with_remote_error() {
    let server = MockServer::start();
    mock_probe(&server);
    server.mock(|when, then| {
        when.method(POST).path("/rest/v1/notes");
        then.status(500).body("insert failed");
    });

    let workspace = temp_workspace();
    init_workspace(&workspace.path, &server.base_url());

    let err = run_command_fail_json(
        &workspace.path,
        &["compose", "--text", "lost words", "--json"],
        6,
    );
    assert_eq!(err["error"]["kind"], "remote");
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("insert failed")
    );
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("unsaved draft: \"lost words\"")
    );
}

fn mock_probe(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/notes")
            .query_param("select", "id")
            .query_param("limit", "1");
        then.status(200).json_body(json!([]));
    });
}

fn mock_first_page(server: &MockServer, rows: Value) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/notes")
            .query_param("select", "*")
            .query_param("offset", "0");
        then.status(200).json_body(rows);
    });
}

fn row(id: i64, timestamp: i64, likecount: i64) -> Value {
    json!({
        "id": id,
        "text": format!("note {id}"),
        "images": [],
        "tags": ["harbour"],
        "mood": "sunny",
        "favorite": false,
        "likecount": likecount,
        "comments": [],
        "timestamp": timestamp
    })
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let img = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 5, 120, y as u8 * 7]));
    let path = dir.join(name);
    DynamicImage::ImageRgb8(img)
        .save_with_format(&path, ImageFormat::Png)
        .expect("write png");
    path
}

fn init_workspace(workspace: &Path, server_url: &str) {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("daybook");
    cmd.env_remove("DAYBOOK_WORKSPACE").args([
        "init",
        "--workspace",
        workspace.to_str().expect("workspace path"),
        "--server",
        server_url,
        "--json",
    ]);

    cmd.assert().success();
}

fn run_command(workspace: &Path, args: &[&str]) -> Value {
    let mut cmd = base_command(workspace);
    cmd.args(args);

    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("json stdout")
}

fn run_command_fail_json(workspace: &Path, args: &[&str], code: i32) -> Value {
    let mut cmd = base_command(workspace);
    cmd.args(args);
    let assert = cmd.assert().failure().code(code);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    serde_json::from_str(&stderr).expect("json stderr")
}

fn base_command(workspace: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("daybook");
    cmd.current_dir(workspace)
        .env_remove("DAYBOOK_API_KEY")
        .env_remove("DAYBOOK_WORKSPACE")
        .env("RUST_LOG", "off")
        .args(["--workspace", workspace.to_str().expect("workspace path")]);
    cmd
}

struct TestWorkspace {
    _temp: TempDir,
    path: PathBuf,
}

fn temp_workspace() -> TestWorkspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("workspace");
    fs::create_dir_all(&path).expect("create workspace dir");
    TestWorkspace { _temp: temp, path }
}
