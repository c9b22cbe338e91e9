use std::time::Duration;
use std::sync::Arc;

use atelier::application::api::PortfolioApi;
use atelier::application::error::FetchError;
use atelier::infra::transport::ReqwestTransport;
use atelier_api_types::{DesignStatus, LikeAction};
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

fn api(server: &MockServer) -> PortfolioApi {
    let base = Url::parse(&server.base_url()).expect("mock url");
    let transport = ReqwestTransport::new(&base, Duration::from_secs(5)).expect("transport");
    PortfolioApi::new(Arc::new(transport))
}

#[tokio::test]
async fn designs_are_decoded() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/designs");
            then.status(200).json_body(json!([{
                "_id": "1",
                "title": "Poster",
                "category": "print",
                "image": "/uploads/poster.png",
                "likes": 5,
                "views": 10,
                "status": "published",
                "createdAt": "2024-03-01T10:00:00Z"
            }]));
        })
        .await;

    let designs = api(&server).designs().await.expect("designs");

    mock.assert_async().await;
    assert_eq!(designs.len(), 1);
    assert_eq!(designs[0].id, "1");
    assert_eq!(designs[0].likes, 5);
    assert_eq!(designs[0].status, DesignStatus::Published);
    assert!(designs[0].created_at.is_some());
}

#[tokio::test]
async fn like_sends_action_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/designs/1/like")
                .header("content-type", "application/json")
                .json_body(json!({"action": "unlike"}));
            then.status(200)
                .json_body(json!({"success": true, "likes": 4, "action": "unlike"}));
        })
        .await;

    let response = api(&server)
        .report_like("1", LikeAction::Unlike)
        .await
        .expect("like");

    mock.assert_async().await;
    assert_eq!(response.likes, 4);
    assert_eq!(response.action, Some(LikeAction::Unlike));
}

#[tokio::test]
async fn view_is_posted_without_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/designs/9/view");
            then.status(200).json_body(json!({"success": true, "views": 11}));
        })
        .await;

    let response = api(&server).report_view("9").await.expect("view");

    mock.assert_async().await;
    assert_eq!(response.views, 11);
}

#[tokio::test]
async fn error_status_keeps_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/designs/stats");
            then.status(500).json_body(json!({"error": "Failed to fetch stats"}));
        })
        .await;

    let err = api(&server).design_stats().await.expect_err("server error");

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("Failed to fetch stats"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_success_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/analytics");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let err = api(&server).analytics().await.expect_err("decode error");
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let base = Url::parse("http://127.0.0.1:9").expect("url");
    let transport = ReqwestTransport::new(&base, Duration::from_secs(2)).expect("transport");
    let api = PortfolioApi::new(Arc::new(transport));

    assert!(matches!(api.designs().await, Err(FetchError::Transport(_))));
}
