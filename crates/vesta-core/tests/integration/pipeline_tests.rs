//! Integration tests for AnalystService, end to end over mocks.

use std::sync::Mutex;

use serde_json::json;

use crate::integration::common::{
    MockChatProvider, MockEmbeddingProvider, MockPortalClient, first_page_url, package,
    page_link, select_ids, tool_call,
};
use vesta_core::pipeline::{NO_MATCH_ANSWER, NO_ROWS_ANSWER};
use vesta_core::table::AGGREGATE;
use vesta_core::{
    AnalystService, AppError, ChatResponse, DatasetSource, PipelineEvent, ProgressReporter, Role,
};

/// Two packages: `weather` (resource w1) and `students` (resource s1).
fn portal() -> MockPortalClient {
    MockPortalClient::new()
        .with_package(
            "weather",
            package("Daily rainfall readings from weather stations", &[("w1", "CSV")]),
        )
        .with_package(
            "students",
            package("Student enrolment by school", &[("s1", "CSV"), ("s1-pdf", "PDF")]),
        )
        .with_page(
            &first_page_url("w1"),
            &[
                json!({"year": "2020", "month": "01", "rainfall": "120.5"}),
                json!({"year": "2020", "month": "02", "rainfall": "180"}),
            ],
            None,
            None,
        )
        .with_page(
            &first_page_url("s1"),
            &[json!({"year": "2020", "school": "Raffles", "students": "1200"})],
            None,
            None,
        )
}

#[derive(Default)]
struct CandidateRecorder {
    candidates: Mutex<Vec<String>>,
    selected: Mutex<Vec<String>>,
}

impl ProgressReporter for CandidateRecorder {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::CandidatesFound { names } => {
                self.candidates.lock().unwrap().extend(names.iter().cloned());
            }
            PipelineEvent::DatasetsSelected { names } => {
                self.selected.lock().unwrap().extend(names.iter().cloned());
            }
            _ => {}
        }
    }
}

/// The selector picks the weather dataset, the agent aggregates it and the
/// reply cites it as its source.
#[tokio::test]
async fn test_weather_question_end_to_end() {
    let chat = MockChatProvider::new(vec![
        select_ids(&["w1"]),
        ChatResponse::tool_calls(vec![tool_call(
            "c1",
            AGGREGATE,
            json!({
                "table": "weather",
                "function": "sum",
                "column": "rainfall",
                "filters": [{"column": "year", "op": "eq", "value": 2020}]
            }),
        )]),
        ChatResponse::text("300.5 mm of rain fell in 2020."),
    ]);
    let portal = portal();
    let service = AnalystService::new(portal.clone(), MockEmbeddingProvider::new(), chat.clone());
    let reporter = CandidateRecorder::default();

    let reply = service
        .answer_with_progress("How much rain fell in 2020?", &reporter)
        .await
        .unwrap();

    assert_eq!(reply.answer, "300.5 mm of rain fell in 2020.");
    assert_eq!(
        reply.datasets_used,
        vec![DatasetSource {
            id: "w1".to_string(),
            name: "weather".to_string(),
            rows: 2,
            truncated: false,
            landing_page: "https://data.gov.sg/dataset/weather".to_string(),
        }]
    );

    assert_eq!(*reporter.candidates.lock().unwrap(), vec!["weather", "students"]);
    assert_eq!(*reporter.selected.lock().unwrap(), vec!["weather"]);
    assert_eq!(portal.requested_pages(), vec![first_page_url("w1")]);

    let requests = chat.requests();
    assert_eq!(requests.len(), 3);
    let tool_result = requests[2]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .and_then(|m| m.content.clone())
        .unwrap();
    assert!(tool_result.contains("300.5"), "{tool_result}");
}

#[tokio::test]
async fn test_no_relevant_dataset_skips_agent() {
    let chat = MockChatProvider::new(vec![select_ids(&[])]);
    let portal = portal();
    let service = AnalystService::new(portal.clone(), MockEmbeddingProvider::new(), chat.clone());

    let reply = service.answer("Who won the 2020 election?").await.unwrap();

    assert_eq!(reply.answer, NO_MATCH_ANSWER);
    assert!(reply.datasets_used.is_empty());
    assert_eq!(chat.requests().len(), 1);
    assert!(portal.requested_pages().is_empty());
}

#[tokio::test]
async fn test_hallucinated_id_only_is_no_match() {
    let chat = MockChatProvider::new(vec![select_ids(&["d_does_not_exist"])]);
    let portal = portal();
    let service = AnalystService::new(portal.clone(), MockEmbeddingProvider::new(), chat);

    let reply = service.answer("rain").await.unwrap();
    assert_eq!(reply.answer, NO_MATCH_ANSWER);
    assert!(portal.requested_pages().is_empty());
}

#[tokio::test]
async fn test_all_row_fetches_failed() {
    let portal = portal().with_failing_page(&first_page_url("w1"));
    let chat = MockChatProvider::new(vec![select_ids(&["w1"])]);
    let service = AnalystService::new(portal, MockEmbeddingProvider::new(), chat.clone());

    let reply = service.answer("rain in 2020").await.unwrap();
    assert_eq!(reply.answer, NO_ROWS_ANSWER);
    assert_eq!(chat.requests().len(), 1);
}

/// A dataset that failed mid-pagination is still answered from, and both
/// the agent and the reply are told the table is incomplete.
#[tokio::test]
async fn test_truncated_table_is_flagged() {
    let next = page_link("w1", 2);
    let portal = MockPortalClient::new()
        .with_package("weather", package("rainfall", &[("w1", "CSV")]))
        .with_page(&first_page_url("w1"), &[json!({"rainfall": "1"})], Some(&next), None)
        .with_failing_page(&format!("https://portal.test{next}"));
    let chat = MockChatProvider::new(vec![
        select_ids(&["w1"]),
        ChatResponse::text("Based on partial data, 1 mm."),
    ]);
    let service = AnalystService::new(portal, MockEmbeddingProvider::new(), chat.clone());

    let reply = service.answer("rain").await.unwrap();

    assert!(reply.datasets_used[0].truncated);
    let opening = chat.requests()[1].messages[1].content.clone().unwrap();
    assert!(opening.contains("INCOMPLETE"));
}

#[tokio::test]
async fn test_discovery_failure_propagates() {
    let portal = portal().with_failing_package("broken");
    let chat = MockChatProvider::new(vec![]);
    let service = AnalystService::new(portal, MockEmbeddingProvider::new(), chat.clone());

    let result = service.answer("rain").await;
    assert!(matches!(result, Err(AppError::NetworkError(_))));
    assert!(chat.requests().is_empty());
}

#[tokio::test]
async fn test_list_datasets_runs_discovery_only() {
    let embedding = MockEmbeddingProvider::new();
    let service = AnalystService::new(portal(), embedding.clone(), MockChatProvider::new(vec![]));

    let datasets = service.list_datasets().await.unwrap();
    let ids: Vec<&str> = datasets.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "s1"]);
    assert_eq!(embedding.calls(), 0);
}
