//! Coverage for the command-line runner: request loading and result lines.

use std::sync::Arc;

use cap_std::{ambient_authority, fs::Dir};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::domain::ports::{NoOpBatchMetrics, SubRequestMethod, SubResponse};
use crate::domain::{BatchRequestPorts, BatchRequestRuntime, MaxBatchSize};
use crate::test_support::ScriptedBatchTransport;
use crate::test_support::cap_fs::write_file;

struct Runner {
    transport: Arc<ScriptedBatchTransport>,
    factory: BatchRequestFactory,
}

#[fixture]
fn runner() -> Runner {
    let transport = Arc::new(ScriptedBatchTransport::new());
    let ports = BatchRequestPorts::new(transport.clone(), Arc::new(NoOpBatchMetrics));
    let factory = BatchRequestFactory::with_runtime(
        ports,
        BatchRequestRuntime::inline(),
        MaxBatchSize::new(2).expect("non-zero size"),
    );
    Runner { transport, factory }
}

fn lines(out: &[u8]) -> Vec<Value> {
    String::from_utf8(out.to_vec())
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn gets(count: usize) -> Vec<SubRequest> {
    (0..count)
        .map(|index| SubRequest::get(format!("/zones/z{index}")))
        .collect()
}

#[rstest]
fn loads_requests_from_json_array() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("requests.json");
    write_file(
        &path,
        br#"[
            {"method": "GET", "path": "/zones/a"},
            {"method": "POST", "path": "/networks", "body": {"name": "edge"}}
        ]"#,
    )
    .expect("write requests");

    let requests = load_requests(&path).expect("requests load");

    assert_eq!(
        requests,
        vec![
            SubRequest::get("/zones/a"),
            SubRequest::with_body(SubRequestMethod::Post, "/networks", json!({"name": "edge"})),
        ]
    );
}

#[rstest]
fn missing_requests_file_is_a_read_error() {
    let dir = TempDir::new().expect("temp dir");
    let error = load_requests(&dir.path().join("absent.json")).expect_err("missing file");
    assert!(matches!(error, CliError::ReadRequests { .. }));
}

#[rstest]
fn malformed_requests_file_is_a_parse_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("requests.json");
    write_file(&path, br#"{"method": "GET"}"#).expect("write requests");

    let error = load_requests(&path).expect_err("not an array");
    assert!(matches!(error, CliError::ParseRequests { .. }));
}

#[rstest]
#[tokio::test]
async fn writes_one_line_per_item_in_queue_order(runner: Runner) {
    runner.transport.push_ok(vec![
        SubResponse::json(&json!({"name": "z0"})),
        SubResponse::new(404, r#"{"error": {"code": 404, "message": "zone not found"}}"#),
    ]);
    let mut out = Vec::new();

    let summary = execute_requests(&runner.factory, "cli-test", gets(3), &mut out)
        .await
        .expect("run succeeds");

    assert_eq!(
        summary,
        RunSummary {
            delivered: 3,
            failures: 1
        }
    );
    assert_eq!(runner.transport.call_sizes(), vec![2, 1]);
    let written = lines(&out);
    assert_eq!(
        written,
        vec![
            json!({"index": 0, "status": 200, "outcome": "success", "response": {"name": "z0"}}),
            json!({
                "index": 1,
                "status": 404,
                "outcome": "failure",
                "error": {"code": 404, "message": "zone not found"}
            }),
            json!({"index": 2, "status": 200, "outcome": "success", "response": {"path": "/zones/z2"}}),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn first_chunk_failure_writes_no_lines(runner: Runner) {
    runner.transport.push_ok(Vec::new());
    runner.transport.push_err(TransportError::timeout("deadline elapsed"));
    let mut out = Vec::new();

    // An empty response for a two-item chunk is a count mismatch.
    let error = execute_requests(&runner.factory, "cli-test", gets(3), &mut out)
        .await
        .expect_err("first chunk fails");

    assert!(matches!(
        error,
        CliError::Transport(TransportError::ResponseCountMismatch {
            expected: 2,
            actual: 0
        })
    ));
    assert!(out.is_empty());
    assert_eq!(runner.transport.call_sizes(), vec![2]);
}

#[rstest]
#[tokio::test]
async fn later_chunk_failure_reports_earlier_items(runner: Runner) {
    runner.transport.push_ok(vec![
        SubResponse::json(&json!({"n": 0})),
        SubResponse::json(&json!({"n": 1})),
    ]);
    runner.transport.push_err(TransportError::http(503_u16, "backend unavailable"));
    let mut out = Vec::new();

    let error = execute_requests(&runner.factory, "cli-test", gets(3), &mut out)
        .await
        .expect_err("second chunk fails");

    assert!(matches!(
        error,
        CliError::Transport(TransportError::Http { status: 503, .. })
    ));
    let indices: Vec<_> = lines(&out)
        .iter()
        .filter_map(|line| line.get("index").and_then(Value::as_u64))
        .collect();
    assert_eq!(indices, vec![0, 1]);
}

#[rstest]
#[tokio::test]
async fn empty_request_list_writes_nothing(runner: Runner) {
    let mut out = Vec::new();

    let summary = execute_requests(&runner.factory, "cli-test", Vec::new(), &mut out)
        .await
        .expect("empty run succeeds");

    assert_eq!(summary, RunSummary::default());
    assert!(out.is_empty());
    assert!(runner.transport.calls().is_empty());
}

#[rstest]
fn http_transport_requires_endpoint() {
    let settings = BatchExecutorSettings {
        endpoint: None,
        max_batch_size: None,
        timeout_seconds: 30,
        user_agent: None,
        metric_namespace: None,
        context: None,
        requests_path: None,
        metrics_path: None,
    };
    assert!(matches!(
        http_transport(&settings),
        Err(CliError::Settings(SettingsError::MissingEndpoint))
    ));
}

#[rstest]
fn metrics_exposition_replaces_the_configured_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("batch.prom");
    write_file(&path, b"stale\n").expect("seed metrics file");
    let exposition = "# TYPE remote_api_batch_size_total counter\nremote_api_batch_size_total 3\n";

    write_metrics(&path, exposition).expect("metrics written");

    let written = Dir::open_ambient_dir(dir.path(), ambient_authority())
        .and_then(|directory| directory.read_to_string("batch.prom"))
        .expect("metrics file readable");
    assert_eq!(written, exposition);
}

#[rstest]
fn metrics_file_in_missing_directory_is_a_write_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent").join("batch.prom");

    let error = write_metrics(&path, "").expect_err("parent directory missing");

    assert!(matches!(error, CliError::WriteMetrics { path: failed, .. } if failed == path));
}
