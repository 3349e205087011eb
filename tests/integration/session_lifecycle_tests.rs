//! Integration tests for session lifecycle bookkeeping.

use std::time::Duration;

use serde_json::{json, Value};

use super::test_helpers::{establish_session, spawn_server, time_call_body};

#[tokio::test]
async fn delete_removes_the_session_from_the_registry() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let sid = establish_session(&client, &server.mcp_url()).await;
    assert!(server.registry.lookup(&sid).await.is_some());

    let resp = client
        .delete(server.mcp_url())
        .header("mcp-session-id", &sid)
        .send()
        .await
        .expect("DELETE session");
    assert_eq!(resp.status().as_u16(), 202);

    assert!(server.registry.lookup(&sid).await.is_none());
    assert!(server.registry.is_empty().await);
}

#[tokio::test]
async fn server_side_close_evicts_the_session_via_the_close_channel() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let sid = establish_session(&client, &server.mcp_url()).await;
    let handle = server.registry.lookup(&sid).await.expect("handle");
    handle.close();

    // The closed-session event is delivered asynchronously.
    let mut evicted = false;
    for _ in 0..40 {
        if server.registry.lookup(&sid).await.is_none() {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(evicted, "close event did not evict the session");

    // The id is now unknown to the router as well.
    let resp = client
        .post(server.mcp_url())
        .header("content-type", "application/json")
        .header("mcp-session-id", &sid)
        .json(&time_call_body(5))
        .send()
        .await
        .expect("POST after close");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn sessions_are_isolated_between_clients() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let first = establish_session(&client, &server.mcp_url()).await;
    let second = establish_session(&client, &server.mcp_url()).await;

    // Each session answers with its own id echoed back.
    for sid in [&first, &second] {
        let resp = client
            .post(server.mcp_url())
            .header("content-type", "application/json")
            .header("mcp-session-id", sid)
            .json(&time_call_body(7))
            .send()
            .await
            .expect("POST tools/call");
        let echoed = resp
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .expect("echoed session id")
            .to_owned();
        assert_eq!(&echoed, sid);
        let body: Value = resp.json().await.expect("body");
        assert!(body.pointer("/result/content/0/text").is_some());
    }

    // Deleting one session leaves the other usable.
    client
        .delete(server.mcp_url())
        .header("mcp-session-id", &first)
        .send()
        .await
        .expect("DELETE first");

    let resp = client
        .post(server.mcp_url())
        .header("content-type", "application/json")
        .header("mcp-session-id", &second)
        .json(&time_call_body(8))
        .send()
        .await
        .expect("POST on surviving session");
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn concurrent_requests_share_one_session() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let sid = establish_session(&client, &server.mcp_url()).await;

    let mut tasks = Vec::new();
    for id in 0..8 {
        let client = client.clone();
        let url = server.mcp_url();
        let sid = sid.clone();
        tasks.push(tokio::spawn(async move {
            let resp = client
                .post(url)
                .header("content-type", "application/json")
                .header("mcp-session-id", &sid)
                .json(&time_call_body(100 + id))
                .send()
                .await
                .expect("POST tools/call");
            let body: Value = resp.json().await.expect("body");
            assert_eq!(
                body.get("id").and_then(Value::as_i64),
                Some(100 + id),
                "response correlated to the wrong request: {body}"
            );
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }
}

#[tokio::test]
async fn notifications_into_a_session_return_accepted() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let sid = establish_session(&client, &server.mcp_url()).await;

    let resp = client
        .post(server.mcp_url())
        .header("content-type", "application/json")
        .header("mcp-session-id", &sid)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/cancelled", "params": {} }))
        .send()
        .await
        .expect("POST notification");
    assert_eq!(resp.status().as_u16(), 202);
}
