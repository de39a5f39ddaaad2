//! Drives the `rgrid` binary end to end against a temporary data dir.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use rendergrid_core::config::GridConfig;

struct Run {
    code: i32,
    json: Value,
}

fn rgrid(config: &Path, args: &[&str]) -> Run {
    let output = Command::new(env!("CARGO_BIN_EXE_rgrid"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    Run {
        code: output.status.code().unwrap(),
        json: serde_json::from_str(&stdout)
            .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}")),
    }
}

fn init(dir: &Path) -> PathBuf {
    let config = dir.join("rendergrid.toml");
    let run = rgrid(&config, &["init", "--account-id", "123456789012", "--renderer-version", "4.0.0"]);
    assert_eq!(run.code, 0, "{}", run.json);
    config
}

/// Rewrite the config file through `GridConfig`.
fn edit_config(config: &Path, edit: impl FnOnce(&mut GridConfig)) {
    let mut parsed = GridConfig::from_file(config).unwrap();
    edit(&mut parsed);
    std::fs::write(config, parsed.to_toml_string().unwrap()).unwrap();
}

fn bundle(dir: &Path) -> PathBuf {
    let bundle = dir.join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(bundle.join("index.html"), "<html>promo</html>").unwrap();
    std::fs::write(bundle.join("bundle.js"), "render()").unwrap();
    bundle
}

/// Answers one invocation with success, echoing the requested output key.
fn fake_worker() -> (String, std::thread::JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        let body = loop {
            let n = socket.read(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&received).to_string();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length: usize = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse().ok())?
                    })
                    .unwrap_or(0);
                if body.len() >= length {
                    break body.to_string();
                }
            }
            assert!(n > 0, "connection closed early");
        };
        let request: Value = serde_json::from_str(&body).unwrap();
        let response = serde_json::json!({
            "success": true,
            "outputRef": request["outputKey"],
            "errorDetail": null,
        })
        .to_string();
        write!(
            socket,
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            response.len(),
            response
        )
        .unwrap();
        request
    });
    (url, handle)
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let run = rgrid(&config, &["init"]);
    assert_eq!(run.code, 2);
    assert_eq!(run.json["error"]["kind"], "invalidConfig");
}

#[test]
fn name_is_stable_and_region_independent() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let first = rgrid(&config, &["name"]);
    let other_region = rgrid(&config, &["name", "--region", "eu-west-1"]);
    assert_eq!(first.code, 0);
    assert_eq!(first.json["data"]["name"], other_region.json["data"]["name"]);
    assert_eq!(first.json["data"]["memoryMb"], 2048);
}

#[test]
fn worker_deploy_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());

    let first = rgrid(&config, &["worker", "deploy"]);
    assert_eq!(first.code, 0, "{}", first.json);
    assert_eq!(first.json["data"]["alreadyExisted"], false);
    let second = rgrid(&config, &["worker", "deploy"]);
    assert_eq!(second.json["data"]["alreadyExisted"], true);

    let list = rgrid(&config, &["worker", "list"]);
    assert_eq!(list.json["data"]["workers"].as_array().unwrap().len(), 1);

    let delete = rgrid(&config, &["worker", "delete", "--all"]);
    assert_eq!(delete.code, 0, "{}", delete.json);
    let list = rgrid(&config, &["worker", "list"]);
    assert!(list.json["data"]["workers"].as_array().unwrap().is_empty());
}

#[test]
fn unsupported_region_feature_is_a_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    edit_config(&config, |c| c.worker.enhanced_monitoring = true);

    let run = rgrid(&config, &["worker", "deploy", "--region", "ap-east-1"]);
    assert_eq!(run.code, 2, "{}", run.json);
    assert_eq!(run.json["error"]["kind"], "unsupportedConfiguration");
}

#[test]
fn missing_capability_blocks_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    edit_config(&config, |c| {
        c.credentials.granted = vec!["storage:*".to_string(), "worker:List".to_string()];
    });

    let run = rgrid(&config, &["worker", "deploy"]);
    assert_eq!(run.code, 2);
    assert_eq!(run.json["error"]["kind"], "insufficientPermissions");

    let validate = rgrid(&config, &["permissions", "validate", "--operation", "list-sites"]);
    assert_eq!(validate.code, 0, "{}", validate.json);
    let validate = rgrid(&config, &["permissions", "validate"]);
    assert_eq!(validate.code, 2);
    assert!(validate.json["data"]["results"].as_array().unwrap().len() > 1);

    // Nothing was provisioned by the refused deploy.
    let list = rgrid(&config, &["worker", "list"]);
    assert!(list.json["data"]["workers"].as_array().unwrap().is_empty());
}

#[test]
fn site_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let bundle = bundle(dir.path());

    let deploy = rgrid(&config, &["site", "deploy", bundle.to_str().unwrap(), "--name", "promo"]);
    assert_eq!(deploy.code, 0, "{}", deploy.json);
    assert_eq!(deploy.json["data"]["files"], 2);
    assert!(deploy.json["data"]["serveUrl"].as_str().unwrap().starts_with("file://"));

    let list = rgrid(&config, &["site", "list"]);
    assert_eq!(list.json["data"]["sites"][0]["siteName"], "promo");

    let delete = rgrid(&config, &["site", "delete", "promo"]);
    assert_eq!(delete.code, 0, "{}", delete.json);
    let again = rgrid(&config, &["site", "delete", "promo"]);
    assert_eq!(again.code, 1);
    assert_eq!(again.json["error"]["kind"], "notFound");
}

#[test]
fn single_chunk_render_and_progress() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let (url, worker) = fake_worker();
    edit_config(&config, |c| c.platform.invoke_url = Some(url.clone()));
    let bundle = bundle(dir.path());
    let deploy = rgrid(&config, &["site", "deploy", bundle.to_str().unwrap(), "--name", "promo"]);
    assert_eq!(deploy.code, 0, "{}", deploy.json);

    let run = rgrid(
        &config,
        &["render", "promo", "--duration-ms", "5000", "--job-id", "job-cli"],
    );
    assert_eq!(run.code, 0, "{}", run.json);
    assert_eq!(run.json["data"]["phase"], "completed");
    let output = run.json["data"]["outputRef"].as_str().unwrap();
    assert!(output.starts_with("renders/job-cli/chunks/00000-"));

    let request = worker.join().unwrap();
    assert_eq!(request["jobId"], "job-cli");
    assert_eq!(request["timeRange"]["endMs"], 5000);
    assert!(request["siteRef"].as_str().unwrap().contains("sites/promo/index.html"));

    let progress = rgrid(&config, &["progress", "job-cli"]);
    assert_eq!(progress.code, 0, "{}", progress.json);
    assert_eq!(progress.json["data"]["render"]["phase"], "completed");
    assert_eq!(progress.json["data"]["render"]["progress"]["done"], 1);
}

#[test]
fn unknown_job_progress_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let run = rgrid(&config, &["progress", "job-missing"]);
    assert_eq!(run.code, 1);
    assert_eq!(run.json["error"]["kind"], "notFound");
}

#[test]
fn render_of_missing_site_fails_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = init(dir.path());
    let run = rgrid(&config, &["render", "absent", "--duration-ms", "1000"]);
    assert_eq!(run.code, 1);
    assert_eq!(run.json["error"]["kind"], "notFound");
}
