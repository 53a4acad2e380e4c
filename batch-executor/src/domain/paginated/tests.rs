//! Tests for page-token following across batch rounds.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::domain::batch_request::{BatchRequestPorts, BatchRequestRuntime, MaxBatchSize};
use crate::domain::ports::{SubResponse, TransportError};
use crate::test_support::{RecordingBatchMetrics, ScriptedBatchTransport};

struct Harness {
    transport: Arc<ScriptedBatchTransport>,
    metrics: Arc<RecordingBatchMetrics>,
    factory: BatchRequestFactory,
}

#[fixture]
fn harness() -> Harness {
    let transport = Arc::new(ScriptedBatchTransport::new());
    let metrics = Arc::new(RecordingBatchMetrics::new());
    let factory = BatchRequestFactory::with_runtime(
        BatchRequestPorts::new(transport.clone(), metrics.clone()),
        BatchRequestRuntime::inline(),
        MaxBatchSize::new(2).expect("non-zero size"),
    );
    Harness {
        transport,
        metrics,
        factory,
    }
}

fn page(items: &[i64], next: Option<&str>) -> SubResponse {
    match next {
        Some(token) => SubResponse::json(&json!({"items": items, "nextPageToken": token})),
        None => SubResponse::json(&json!({"items": items})),
    }
}

fn paths(transport: &ScriptedBatchTransport) -> Vec<Vec<String>> {
    transport
        .calls()
        .into_iter()
        .map(|call| call.into_iter().map(|request| request.path).collect())
        .collect()
}

#[rstest]
#[tokio::test]
async fn follows_page_tokens_across_rounds(harness: Harness) {
    harness
        .transport
        .push_ok(vec![page(&[1, 2], Some("a2")), page(&[10], None)]);
    harness.transport.push_ok(vec![page(&[3], Some("a3"))]);
    harness.transport.push_ok(vec![page(&[4], None)]);
    let mut lists = harness.factory.create_paginated::<i64>();
    lists.queue(JsonListRequest::<i64>::get("/zones/a/instances"));
    lists.queue(JsonListRequest::<i64>::get("/zones/b/instances?maxResults=500"));

    let items = lists.execute("instances").await.expect("pages fetched");

    assert_eq!(items, vec![1, 2, 3, 4, 10]);
    assert_eq!(
        paths(&harness.transport),
        vec![
            vec![
                "/zones/a/instances".to_owned(),
                "/zones/b/instances?maxResults=500".to_owned(),
            ],
            vec!["/zones/a/instances?pageToken=a2".to_owned()],
            vec!["/zones/a/instances?pageToken=a3".to_owned()],
        ]
    );
    assert_eq!(harness.metrics.samples().len(), 3);
}

#[rstest]
#[tokio::test]
async fn rounds_are_chunked_like_any_batch(harness: Harness) {
    harness.transport.push_ok(vec![page(&[1], Some("next")), page(&[2], None)]);
    harness.transport.push_ok(vec![page(&[3], None)]);
    harness.transport.push_ok(vec![page(&[4], None)]);
    let mut lists = harness.factory.create_paginated::<i64>();
    for zone in ["a", "b", "c"] {
        lists.queue(JsonListRequest::<i64>::get(format!("/zones/{zone}/disks")));
    }

    let items = lists.execute("disks").await.expect("pages fetched");

    assert_eq!(items, vec![1, 4, 2, 3]);
    assert_eq!(harness.transport.call_sizes(), vec![2, 1, 1]);
}

#[rstest]
#[tokio::test]
async fn empty_queue_makes_no_calls(harness: Harness) {
    let lists = harness.factory.create_paginated::<Value>();

    let items = lists.execute("empty").await.expect("nothing to fetch");

    assert!(items.is_empty());
    assert!(harness.transport.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn item_failure_aborts_after_the_round(harness: Harness) {
    harness.transport.push_ok(vec![
        page(&[1], Some("more")),
        SubResponse::new(403, r#"{"error": {"message": "forbidden zone"}}"#),
    ]);
    let mut lists = harness.factory.create_paginated::<i64>();
    lists.queue(JsonListRequest::<i64>::get("/zones/a/instances"));
    lists.queue(JsonListRequest::<i64>::get("/zones/b/instances"));

    let error = lists.execute("instances").await.expect_err("item failure");

    assert_eq!(
        error,
        BatchQueryError::Item(ErrorDetails::new(403, "forbidden zone"))
    );
    assert_eq!(harness.transport.call_sizes(), vec![2]);
}

#[rstest]
#[tokio::test]
async fn transport_failure_aborts_immediately(harness: Harness) {
    harness.transport.push_ok(vec![page(&[1], Some("more"))]);
    harness
        .transport
        .push_err(TransportError::timeout("deadline exceeded"));
    let mut lists = harness.factory.create_paginated::<i64>();
    lists.queue(JsonListRequest::<i64>::get("/zones/a/instances"));

    let error = lists.execute("instances").await.expect_err("transport failure");

    assert_eq!(
        error,
        BatchQueryError::Transport(TransportError::timeout("deadline exceeded"))
    );
    assert_eq!(harness.transport.call_sizes(), vec![1, 1]);
}

#[rstest]
#[tokio::test]
async fn repeated_page_token_stops_the_list(harness: Harness) {
    for items in [[1], [2], [3]] {
        harness.transport.push_ok(vec![page(&items, Some("same"))]);
    }
    let mut lists = harness.factory.create_paginated::<i64>();
    lists.queue(JsonListRequest::<i64>::get("/zones/a/instances"));

    let error = lists.execute("instances").await.expect_err("token loops");

    assert_eq!(
        error,
        BatchQueryError::RepeatedPageToken {
            token: "same".to_owned()
        }
    );
    assert_eq!(
        paths(&harness.transport),
        vec![
            vec!["/zones/a/instances".to_owned()],
            vec!["/zones/a/instances?pageToken=same".to_owned()],
        ]
    );
}

#[rstest]
#[case::no_query("/zones/a/instances", "/zones/a/instances?pageToken=t%2F2")]
#[case::with_query("/zones/a/instances?filter=x", "/zones/a/instances?filter=x&pageToken=t%2F2")]
fn page_tokens_are_appended_and_encoded(#[case] path: &str, #[case] expected: &str) {
    let list = JsonListRequest::<Value>::get(path);
    assert_eq!(list.page(None).path, path);
    assert_eq!(list.page(Some("t/2")).path, expected);
}

#[rstest]
#[case::empty_body(b"".as_slice())]
#[case::no_items(br#"{"kind": "compute#instanceList"}"#.as_slice())]
#[case::blank_token(br#"{"items": [], "nextPageToken": ""}"#.as_slice())]
fn empty_pages_end_the_list(#[case] body: &[u8]) {
    let list = JsonListRequest::<Value>::get("/zones/a/instances");
    let decoded = list.decode_page(200, body).expect("page decodes");
    assert_eq!(
        decoded,
        Page {
            items: Vec::new(),
            next_page_token: None,
        }
    );
}
