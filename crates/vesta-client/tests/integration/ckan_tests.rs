//! Integration tests for CkanClient against a scripted portal.

use serde_json::json;
use vesta_client::{CkanClient, CkanConfig};
use vesta_core::rows::RowFetcher;
use vesta_core::traits::PortalClient;
use vesta_core::{AppError, Completeness, PageCursor};

use crate::integration::common::{Reply, ScriptedServer, fast_retry};

fn client(server: &ScriptedServer) -> CkanClient {
    let config = CkanConfig {
        retry: fast_retry(),
        ..CkanConfig::default()
    };
    CkanClient::with_config(&server.base_url, config).unwrap()
}

#[tokio::test]
async fn test_list_package_names() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![Reply::json(json!({"success": true, "result": ["weather", "students"]}))],
    )])
    .await;

    let names = client(&server).list_package_names().await.unwrap();
    assert_eq!(names, vec!["weather", "students"]);
}

#[tokio::test]
async fn test_show_package_maps_resources() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_show",
        vec![Reply::json(json!({
            "success": true,
            "result": {
                "name": "weather",
                "notes": "Daily rainfall",
                "resources": [
                    {"id": "w1", "format": "CSV"},
                    {"id": "w2", "format": "csv"},
                    {"id": "w3", "format": "XLSX"}
                ]
            }
        }))],
    )])
    .await;

    let metadata = PortalClient::show_package(&client(&server), "weather")
        .await
        .unwrap();
    let datasets = metadata.csv_datasets("en");

    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].id, "w1");
    assert_eq!(datasets[0].description, "Daily rainfall");
    assert_eq!(
        server.requests()[0].path_and_query,
        "/api/action/package_show?id=weather"
    );
}

/// Relative `_links.next` values are followed until an empty page.
#[tokio::test]
async fn test_datastore_pagination_through_row_fetcher() {
    let server = ScriptedServer::start(vec![
        (
            "/api/action/datastore_search?resource_id=r1",
            vec![Reply::json(json!({"success": true, "result": {
                "records": [{"town": "BEDOK"}, {"town": "YISHUN"}],
                "_links": {
                    "start": "/api/action/datastore_search?resource_id=r1",
                    "next": "/api/action/datastore_search?offset=2&resource_id=r1"
                }
            }}))],
        ),
        (
            "/api/action/datastore_search?offset=2&resource_id=r1",
            vec![Reply::json(json!({"success": true, "result": {
                "records": [{"town": "TAMPINES"}],
                "_links": {
                    "prev": "/api/action/datastore_search?resource_id=r1",
                    "next": "/api/action/datastore_search?offset=4&resource_id=r1"
                }
            }}))],
        ),
        (
            "/api/action/datastore_search?offset=4&resource_id=r1",
            vec![Reply::json(json!({"success": true, "result": {
                "records": [],
                "_links": {"next": "/api/action/datastore_search?offset=6&resource_id=r1"}
            }}))],
        ),
    ])
    .await;

    let fetcher = RowFetcher::new(client(&server));
    let outcome = fetcher.fetch_dataset_rows("r1").await;
    let rows = outcome.rows().unwrap();

    assert_eq!(rows.records.len(), 3);
    assert_eq!(rows.pages, 2);
    assert_eq!(rows.completeness, Completeness::Complete);
    assert_eq!(server.hits("/api/action/datastore_search"), 3);
}

#[tokio::test]
async fn test_datastore_single_page_without_links() {
    let server = ScriptedServer::start(vec![(
        "/api/action/datastore_search",
        vec![Reply::json(json!({"success": true, "result": {
            "records": [{"a": "1"}],
            "_links": {}
        }}))],
    )])
    .await;

    let outcome = RowFetcher::new(client(&server)).fetch_dataset_rows("r1").await;
    assert_eq!(outcome.rows().unwrap().records.len(), 1);
    assert_eq!(server.hits("/api/action/datastore_search"), 1);
}

#[tokio::test]
async fn test_page_limit_sent_on_first_page() {
    let server = ScriptedServer::start(vec![(
        "/api/action/datastore_search",
        vec![Reply::json(json!({"success": true, "result": {"records": []}}))],
    )])
    .await;
    let config = CkanConfig {
        page_limit: Some(100),
        retry: fast_retry(),
        ..CkanConfig::default()
    };
    let client = CkanClient::with_config(&server.base_url, config).unwrap();

    client
        .datastore_search(&PageCursor::Start {
            resource_id: "r1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        server.requests()[0].path_and_query,
        "/api/action/datastore_search?resource_id=r1&limit=100"
    );
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![
            Reply::raw(503, "unavailable"),
            Reply::raw(502, "bad gateway"),
            Reply::json(json!({"success": true, "result": ["a"]})),
        ],
    )])
    .await;

    let names = client(&server).list_package_names().await.unwrap();
    assert_eq!(names, vec!["a"]);
    assert_eq!(server.hits("/api/action/package_list"), 3);
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![
            Reply::raw(429, "slow down").with_retry_after("0"),
            Reply::json(json!({"success": true, "result": []})),
        ],
    )])
    .await;

    assert!(client(&server).list_package_names().await.unwrap().is_empty());
    assert_eq!(server.hits("/api/action/package_list"), 2);
}

#[tokio::test]
async fn test_retries_exhausted_returns_last_error() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![Reply::raw(500, "boom")],
    )])
    .await;

    let result = client(&server).list_package_names().await;
    assert!(matches!(result, Err(AppError::UpstreamError(500))));
    assert_eq!(server.hits("/api/action/package_list"), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = ScriptedServer::start(vec![]).await;

    let result = client(&server).show_package("missing").await;
    assert!(matches!(result, Err(AppError::HttpStatus { status: 404, .. })));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_success_false_is_malformed() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![Reply::json(json!({"success": false, "error": {"message": "nope"}}))],
    )])
    .await;

    let result = client(&server).list_package_names().await;
    assert!(matches!(result, Err(AppError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_invalid_json_is_not_retried() {
    let server = ScriptedServer::start(vec![(
        "/api/action/package_list",
        vec![Reply::raw(200, "<html>maintenance</html>")],
    )])
    .await;

    let result = client(&server).list_package_names().await;
    assert!(matches!(result, Err(AppError::SerializationError(_))));
    assert_eq!(server.hits("/api/action/package_list"), 1);
}
