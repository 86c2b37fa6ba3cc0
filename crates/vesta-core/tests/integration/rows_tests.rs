//! Integration tests for RowFetcher pagination.

use serde_json::json;

use crate::integration::common::{
    MockPortalClient, TEST_PORTAL_URL, first_page_url, page_link, records,
};
use vesta_core::rows::{RowFetchConfig, RowFetchOutcome, RowFetcher};
use vesta_core::{AppError, Completeness, FetchMode, PageLinks, RecordPage, TruncationReason};

fn absolute(link: &str) -> String {
    format!("{TEST_PORTAL_URL}{link}")
}

fn fetched(outcome: RowFetchOutcome) -> vesta_core::RowSet {
    match outcome {
        RowFetchOutcome::Fetched(rows) => rows,
        RowFetchOutcome::Failed { dataset_id, error } => {
            panic!("{dataset_id} failed: {error}")
        }
    }
}

/// A resource with three pages: 2 + 2 + 1 records, then an empty page.
fn three_pages(id: &str) -> MockPortalClient {
    let first = first_page_url(id);
    let second = page_link(id, 2);
    let third = page_link(id, 4);
    let fourth = page_link(id, 6);
    MockPortalClient::new()
        .with_page(&first, &[json!({"n": 1}), json!({"n": 2})], Some(&second), None)
        .with_page(
            &absolute(&second),
            &[json!({"n": 3}), json!({"n": 4})],
            Some(&third),
            Some(&page_link(id, 0)),
        )
        .with_page(&absolute(&third), &[json!({"n": 5})], Some(&fourth), Some(&second))
        .with_page(&absolute(&fourth), &[], Some(&page_link(id, 8)), Some(&third))
}

#[tokio::test]
async fn test_follows_relative_links_until_empty_page() {
    let portal = three_pages("r1");
    let fetcher = RowFetcher::new(portal.clone());

    let rows = fetched(fetcher.fetch_dataset_rows("r1").await);
    let values: Vec<_> = rows.records.iter().map(|r| r["n"].clone()).collect();
    assert_eq!(values, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert_eq!(rows.pages, 3);
    assert_eq!(rows.completeness, Completeness::Complete);
    assert_eq!(portal.requested_pages().len(), 4);
}

/// An empty `_links` object means a single request.
#[tokio::test]
async fn test_no_links_single_request() {
    let portal = MockPortalClient::new().with_page(
        &first_page_url("r1"),
        &[json!({"town": "BEDOK"})],
        None,
        None,
    );
    let rows = fetched(RowFetcher::new(portal.clone()).fetch_dataset_rows("r1").await);

    assert_eq!(rows.records.len(), 1);
    assert_eq!(rows.completeness, Completeness::Complete);
    assert_eq!(portal.requested_pages(), vec![first_page_url("r1")]);
}

#[tokio::test]
async fn test_next_equal_prev_single_request() {
    let link = page_link("r1", 100);
    let portal = MockPortalClient::new().with_page(
        &first_page_url("r1"),
        &[json!({"a": 1})],
        Some(&link),
        Some(&link),
    );
    let rows = fetched(RowFetcher::new(portal.clone()).fetch_dataset_rows("r1").await);

    assert_eq!(rows.pages, 1);
    assert_eq!(portal.requested_pages().len(), 1);
}

#[tokio::test]
async fn test_reported_total_stops_pagination() {
    let portal = MockPortalClient::new().with_record_page(RecordPage {
        url: first_page_url("r1"),
        records: records(&[json!({"a": 1}), json!({"a": 2})]),
        links: PageLinks {
            next: Some(page_link("r1", 2)),
            ..PageLinks::default()
        },
        total: Some(2),
    });
    let rows = fetched(RowFetcher::new(portal.clone()).fetch_dataset_rows("r1").await);

    assert_eq!(rows.records.len(), 2);
    assert_eq!(portal.requested_pages().len(), 1);
}

/// A later page failing keeps the rows read so far and marks truncation.
#[tokio::test]
async fn test_mid_pagination_failure_truncates() {
    let id = "r1";
    let second = page_link(id, 2);
    let third = page_link(id, 4);
    let portal = MockPortalClient::new()
        .with_page(&first_page_url(id), &[json!({"n": 1}), json!({"n": 2})], Some(&second), None)
        .with_page(&absolute(&second), &[json!({"n": 3})], Some(&third), None)
        .with_failing_page(&absolute(&third));

    let rows = fetched(RowFetcher::new(portal).fetch_dataset_rows(id).await);

    assert_eq!(rows.records.len(), 3);
    assert_eq!(rows.pages, 2);
    match rows.completeness {
        Completeness::Truncated(TruncationReason::PageFailed { page, error }) => {
            assert_eq!(page, 3);
            assert!(error.contains("connection reset"));
        }
        other => panic!("expected page failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_page_cap_truncates() {
    let config = RowFetchConfig {
        max_pages: 2,
        ..RowFetchConfig::default()
    };
    let portal = three_pages("r1");
    let rows = fetched(
        RowFetcher::with_config(portal.clone(), config)
            .fetch_dataset_rows("r1")
            .await,
    );

    assert_eq!(rows.records.len(), 4);
    assert_eq!(
        rows.completeness,
        Completeness::Truncated(TruncationReason::PageCap { max_pages: 2 })
    );
    assert_eq!(portal.requested_pages().len(), 2);
}

#[tokio::test]
async fn test_first_page_failure_fails_dataset() {
    let portal = MockPortalClient::new().with_failing_page(&first_page_url("r1"));
    let outcome = RowFetcher::new(portal).fetch_dataset_rows("r1").await;

    match outcome {
        RowFetchOutcome::Failed { dataset_id, error } => {
            assert_eq!(dataset_id, "r1");
            assert!(matches!(error, AppError::NetworkError(_)));
        }
        RowFetchOutcome::Fetched(_) => panic!("expected failure"),
    }
}

/// Outcomes come back in input order, failures included, in both modes.
#[tokio::test]
async fn test_fetch_many_keeps_order_and_failures() {
    for mode in [FetchMode::Sequential, FetchMode::Concurrent] {
        let portal = three_pages("r1")
            .with_page(&first_page_url("r2"), &[json!({"x": "y"})], None, None)
            .with_failing_page(&first_page_url("r3"));
        let fetcher = RowFetcher::with_config(
            portal,
            RowFetchConfig {
                mode,
                concurrency: 3,
                ..RowFetchConfig::default()
            },
        );

        let ids = vec!["r3".to_string(), "r1".to_string(), "r2".to_string()];
        let outcomes = fetcher.fetch_datasets_from_ids(&ids).await;

        let order: Vec<&str> = outcomes.iter().map(|o| o.dataset_id()).collect();
        assert_eq!(order, vec!["r3", "r1", "r2"], "mode {mode}");
        assert!(outcomes[0].rows().is_none());
        assert_eq!(outcomes[1].rows().map(|r| r.records.len()), Some(5));
        assert_eq!(outcomes[2].rows().map(|r| r.records.len()), Some(1));
    }
}
