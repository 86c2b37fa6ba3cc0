//! Integration tests for RelevanceSelector.

use vesta_core::selector::SELECT_FUNCTION;
use vesta_core::{ChatResponse, Dataset, Document, RelevanceSelector, ToolChoice};

use crate::integration::common::{MockChatProvider, select_ids, tool_call};

fn candidates() -> Vec<Document> {
    vec![
        Dataset::new("w1", "weather", "Daily rainfall and temperature").to_document(),
        Dataset::new("s1", "students", "Student enrolment by school").to_document(),
    ]
}

#[tokio::test]
async fn test_selects_returned_candidate_ids() {
    let chat = MockChatProvider::new(vec![select_ids(&["w1"])]);
    let selection = RelevanceSelector::new(chat.clone())
        .choose_ids(&candidates(), "How much did it rain in 2020?")
        .await;

    assert_eq!(selection.ids, vec!["w1"]);
    assert!(selection.rejected.is_empty());

    let requests = chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].tool_choice,
        Some(ToolChoice::Function(SELECT_FUNCTION.to_string()))
    );
    let prompt = requests[0].messages[0].content.as_deref().unwrap();
    assert!(prompt.contains("Student enrolment by school"));
    assert!(prompt.contains("How much did it rain in 2020?"));
}

#[tokio::test]
async fn test_unknown_and_duplicate_ids_filtered() {
    let chat = MockChatProvider::new(vec![select_ids(&["s1", "x9", "s1", "w1"])]);
    let selection = RelevanceSelector::new(chat)
        .choose_ids(&candidates(), "enrolment and rain")
        .await;

    assert_eq!(selection.ids, vec!["s1", "w1"]);
    assert_eq!(selection.rejected, vec!["x9"]);
}

#[tokio::test]
async fn test_malformed_output_gives_empty_selection() {
    let responses = vec![
        ChatResponse::text("w1"),
        ChatResponse::tool_calls(vec![tool_call(
            "c1",
            SELECT_FUNCTION,
            serde_json::json!({"names": ["w1"]}),
        )]),
    ];
    let selector = RelevanceSelector::new(MockChatProvider::new(responses));

    assert!(selector.choose_ids(&candidates(), "q").await.is_empty());
    assert!(selector.choose_ids(&candidates(), "q").await.is_empty());
}

#[tokio::test]
async fn test_provider_error_gives_empty_selection() {
    let selector = RelevanceSelector::new(MockChatProvider::failing("quota exceeded"));
    assert!(selector.choose_ids(&candidates(), "q").await.is_empty());
}
