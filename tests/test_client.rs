use std::time::Duration;

use graylog_mcp::client::GraylogClient;
use graylog_mcp::config::GraylogConfig;
use graylog_mcp::error::GraylogMcpError;
use graylog_mcp::model::{AggregationParams, AggregationType, BackendRange, SearchParams};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// "admin:secret"
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn client_for(server: &MockServer) -> GraylogClient {
    GraylogClient::new(&GraylogConfig {
        endpoint: server.uri(),
        username: "admin".into(),
        password: "secret".into(),
        verify_ssl: true,
        timeout_secs: 1,
        require_credentials: false,
    })
    .unwrap()
}

fn search_params() -> SearchParams {
    SearchParams {
        query: "level:ERROR".into(),
        range: BackendRange::Relative { seconds: 86_400 },
        fields: vec![],
        limit: 50,
        offset: 0,
        sort: None,
        stream_id: None,
        decorate: None,
        filter: None,
        highlight: None,
    }
}

#[tokio::test]
async fn search_sends_get_with_basic_auth_and_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search/universal/relative"))
        .and(header("authorization", BASIC_AUTH))
        .and(query_param("query", "level:ERROR"))
        .and(query_param("range", "86400"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_results": 1,
            "messages": [{ "message": { "message": "boom", "level": 3 } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).search(&search_params()).await.unwrap();
    assert_eq!(result["total_results"], 1);
}

#[tokio::test]
async fn aggregation_posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search/universal/relative/terms"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_json(json!({
            "query": "*",
            "range": 3600,
            "field": "source",
            "size": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "terms": { "web-1": 10 } })))
        .expect(1)
        .mount(&server)
        .await;

    let params = AggregationParams {
        query: "*".into(),
        range: BackendRange::Relative { seconds: 3_600 },
        kind: AggregationType::Terms,
        field: "source".into(),
        size: 5,
        interval: None,
    };
    let result = client_for(&server).aggregate(&params).await.unwrap();
    assert_eq!(result["terms"]["web-1"], 10);
}

#[tokio::test]
async fn unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = client_for(&server).system_info().await.unwrap_err();
    assert!(matches!(err, GraylogMcpError::AuthenticationError(_)), "{err:?}");
    assert_eq!(err.kind(), "AuthenticationError");
}

#[tokio::test]
async fn other_4xx_is_client_error_with_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "type": "ApiError",
            "message": "Stream <missing> not found!"
        })))
        .mount(&server)
        .await;

    match client_for(&server).stream("missing").await.unwrap_err() {
        GraylogMcpError::ClientError { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Stream <missing> not found!");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system"))
        .respond_with(ResponseTemplate::new(503).set_body_string("index unavailable"))
        .mount(&server)
        .await;

    let err = client_for(&server).system_info().await.unwrap_err();
    assert!(matches!(err, GraylogMcpError::ServerError { status: 503, .. }), "{err:?}");
}

#[tokio::test]
async fn slow_backend_is_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "version": "5.2.0" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).system_info().await.unwrap_err();
    assert!(matches!(err, GraylogMcpError::TimeoutError(_)), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_connection_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = GraylogClient::new(&GraylogConfig {
        endpoint: format!("http://127.0.0.1:{port}"),
        timeout_secs: 2,
        ..GraylogConfig::default()
    })
    .unwrap();

    let err = client.system_info().await.unwrap_err();
    assert!(matches!(err, GraylogMcpError::ConnectionError(_)), "{err:?}");
}

#[tokio::test]
async fn non_json_success_body_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/system"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy login</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).system_info().await.unwrap_err();
    assert!(matches!(err, GraylogMcpError::ServerError { status: 200, .. }), "{err:?}");
}

#[tokio::test]
async fn stream_ids_are_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/a%2Fb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "a/b" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).stream("a/b").await.unwrap();
    assert_eq!(result["id"], "a/b");
}

#[tokio::test]
async fn list_streams_unwraps_streams_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "streams": [{ "id": "1", "title": "nginx" }, { "id": "2", "title": "db" }]
        })))
        .mount(&server)
        .await;

    let streams = client_for(&server).list_streams().await.unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[1]["title"], "db");
}

#[tokio::test]
async fn absolute_aggregation_posts_to_absolute_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/search/universal/absolute/cardinality"))
        .and(body_json(json!({
            "query": "*",
            "from": "2024-03-01T00:00:00Z",
            "to": "2024-03-02T00:00:00Z",
            "field": "user_id",
            "size": 10
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "cardinality": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let params = AggregationParams {
        query: "*".into(),
        range: BackendRange::Absolute {
            from: "2024-03-01T00:00:00Z".into(),
            to: Some("2024-03-02T00:00:00Z".into()),
        },
        kind: AggregationType::Cardinality,
        field: "user_id".into(),
        size: 10,
        interval: None,
    };
    let result = client_for(&server).aggregate(&params).await.unwrap();
    assert_eq!(result["cardinality"], 42);
}
