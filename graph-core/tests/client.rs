use graph_core::GraphClient;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn list_children_includes_bearer_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/root-1/children"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "item-1",
                    "name": "notes.txt",
                    "lastModifiedDateTime": "2024-01-01T00:00:00Z",
                    "size": 12,
                    "file": { "mimeType": "text/plain" }
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client.list_children("drive-1", "root-1").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "item-1");
    assert_eq!(items[0].name, "notes.txt");
    assert!(items[0].is_file());
    assert!(!items[0].is_folder());
    assert_eq!(
        items[0].file.as_ref().unwrap().mime_type.as_deref(),
        Some("text/plain")
    );
}

#[tokio::test]
async fn list_children_decodes_folder_facet() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/root-1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "folder-1",
                    "name": "Projects",
                    "lastModifiedDateTime": "2024-01-01T00:00:00Z",
                    "folder": { "childCount": 3 }
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client.list_children("drive-1", "root-1").await.unwrap();

    assert!(items[0].is_folder());
    assert_eq!(items[0].folder.as_ref().unwrap().child_count, Some(3));
}

#[tokio::test]
async fn list_children_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/root-1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "item-1", "name": "a.txt", "file": {} }
            ],
            "@odata.nextLink": format!("{}/v1.0/page-2?$skiptoken=s1", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/page-2"))
        .and(query_param("$skiptoken", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "item-2", "name": "b.txt", "file": {} }
            ]
        })))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client.list_children("drive-1", "root-1").await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "item-1");
    assert_eq!(items[1].id, "item-2");
}

#[tokio::test]
async fn list_children_surfaces_api_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/missing/children"))
        .respond_with(ResponseTemplate::new(404).set_body_string("itemNotFound"))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .list_children("drive-1", "missing")
        .await
        .expect_err("expected api error");

    match err {
        graph_core::GraphError::Api { status, body } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "itemNotFound");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn fetch_content_returns_raw_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/item-1/content"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello bytes"))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let bytes = client.fetch_content("drive-1", "item-1").await.unwrap();

    assert_eq!(bytes, b"hello bytes");
}

#[tokio::test]
async fn too_many_requests_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/drive-1/items/item-1/content"))
        .respond_with(ResponseTemplate::new(429).set_body_string("throttled"))
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .fetch_content("drive-1", "item-1")
        .await
        .expect_err("expected throttle error");

    assert!(err.is_retryable());
}
