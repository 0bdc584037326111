//! ControlClient against a stubbed server

use discoverd::{
    actors::messages::{CollectorName, Command},
    control::{ControlClient, ResponseCode},
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scan_net_sends_networks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/scan/net"))
        .and(body_json(json!({"net": ["10.0.0.0/24"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "OK"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ControlClient::new(mock_server.uri()).unwrap();
    let response = client.scan_net(vec!["10.0.0.0/24".to_string()]).await.unwrap();

    assert_eq!(response.result, ResponseCode::Ok);
}

#[tokio::test]
async fn test_scan_host_passes_through_invalid_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/scan/host"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": "INVALID_REQUEST"})),
        )
        .mount(&mock_server)
        .await;

    // trailing slash on the base URL is tolerated
    let client = ControlClient::new(format!("{}/", mock_server.uri())).unwrap();
    let response = client.scan_host(vec![]).await.unwrap();

    assert_eq!(response.result, ResponseCode::InvalidRequest);
}

#[tokio::test]
async fn test_request_all_entries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/entries/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "ERROR"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ControlClient::new(mock_server.uri()).unwrap();
    let response = client.request_all_entries().await.unwrap();

    assert_eq!(response.result, ResponseCode::Error);
}

#[tokio::test]
async fn test_call_collectors_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/collectors/call"))
        .and(body_json(json!({
            "collectors": ["nmap"],
            "commands": [{"kind": 1, "arguments": ["10.0.0.4"]}]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": "OK", "called": 1})),
        )
        .mount(&mock_server)
        .await;

    let client = ControlClient::new(mock_server.uri()).unwrap();
    let response = client
        .call_collectors(
            vec![CollectorName::NMAP],
            vec![Command::scan_host(vec!["10.0.0.4".to_string()])],
        )
        .await
        .unwrap();

    assert_eq!(response.called, 1);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/scan/net"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = ControlClient::new(mock_server.uri()).unwrap();
    assert!(client.scan_net(vec!["10.0.0.0/8".to_string()]).await.is_err());
}

#[tokio::test]
async fn test_unreachable_server() {
    // nothing listens on port 9 of the loopback
    let client = ControlClient::new("http://127.0.0.1:9").unwrap();
    assert!(client.health().await.is_err());
}
