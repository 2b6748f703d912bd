use std::fs;
use std::path::Path;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::process::Command;

fn fetchkit() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fetchkit"))
}

async fn start_test_server() -> String {
    let app = Router::new().route("/defs/greeting.txt", get(|| async { "hello" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    url
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn test_replace_command() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    write(dir, "a.new", "alpha");
    write(dir, "b.new", "beta");
    write(dir, "a", "old");

    let output = fetchkit()
        .arg("replace")
        .args(["--src", "a.new", "--dest", "a", "--src", "b.new", "--dest", "b"])
        .current_dir(dir)
        .output()
        .await
        .expect("Failed to execute fetchkit replace");

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.join("a")).unwrap(), "alpha");
    assert_eq!(fs::read_to_string(dir.join("b")).unwrap(), "beta");
    assert!(!dir.join("a.new").exists());
    assert!(!dir.join("b.new").exists());
}

#[tokio::test]
async fn test_replace_mismatch_fails() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    write(dir, "a.new", "alpha");
    write(dir, "b.new", "beta");

    let output = fetchkit()
        .arg("replace")
        .args(["--src", "a.new", "--src", "b.new", "--dest", "a"])
        .current_dir(dir)
        .output()
        .await
        .expect("Failed to execute fetchkit replace");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Mismatched"));
    assert!(dir.join("a.new").exists());
    assert!(!dir.join("a").exists());
}

#[tokio::test]
async fn test_get_then_up_to_date() {
    let temp_dir = TempDir::new().unwrap();
    let server_url = start_test_server().await;
    let url = format!("{}/defs/greeting.txt", server_url);

    let output = fetchkit()
        .args(["get", &url, "--json"])
        .current_dir(temp_dir.path())
        .output()
        .await
        .expect("Failed to execute fetchkit get");

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "downloaded");
    assert_eq!(report["bytes"], 5);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("greeting.txt")).unwrap(),
        "hello"
    );

    // The server sends no Last-Modified, so only --force is a meaningful
    // second run; it must succeed and rewrite the same content.
    let output = fetchkit()
        .args(["get", &url, "--force"])
        .current_dir(temp_dir.path())
        .output()
        .await
        .expect("Failed to execute fetchkit get");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Downloaded"));
}

#[tokio::test]
async fn test_get_with_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let server_url = start_test_server().await;
    let out_dir = temp_dir.path().join("mirror");
    fs::create_dir(&out_dir).unwrap();

    let config_path = temp_dir.path().join("fetchkit.toml");
    fs::write(
        &config_path,
        format!(
            "output_dir = {:?}\nbase_url = \"{}/defs/\"\n",
            out_dir.display().to_string(),
            server_url
        ),
    )
    .unwrap();

    let output = fetchkit()
        .arg("--config")
        .arg(&config_path)
        .args(["get", "greeting.txt"])
        .output()
        .await
        .expect("Failed to execute fetchkit get");

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(out_dir.join("greeting.txt")).unwrap(),
        "hello"
    );
}

#[tokio::test]
async fn test_get_explicit_output() {
    let temp_dir = TempDir::new().unwrap();
    let server_url = start_test_server().await;
    let dest = temp_dir.path().join("pinned.txt");

    let output = fetchkit()
        .args(["get", &format!("{}/defs/greeting.txt", server_url), "-o"])
        .arg(&dest)
        .output()
        .await
        .expect("Failed to execute fetchkit get");

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&dest).unwrap(), "hello");
}

#[tokio::test]
async fn test_get_missing_resource_fails() {
    let temp_dir = TempDir::new().unwrap();
    let server_url = start_test_server().await;

    let output = fetchkit()
        .args(["get", &format!("{}/defs/missing.txt", server_url)])
        .current_dir(temp_dir.path())
        .output()
        .await
        .expect("Failed to execute fetchkit get");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("404"));
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}
