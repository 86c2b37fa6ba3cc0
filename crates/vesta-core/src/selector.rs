//! Relevance selection: which candidate datasets answer the query.
//!
//! The selector shows the shortlisted dataset documents to the chat model
//! and forces a call to a single function, `get_datasets_from_ids`, whose
//! only argument is `ids: string[]`. Whatever goes wrong past this point
//! (provider errors, a missing call, unparsable arguments) is logged and
//! turns into an empty selection. Returned ids are checked against the
//! candidates; anything else is dropped.

use std::collections::HashSet;

use serde_json::{Value, json};

use crate::chat::{ChatMessage, ChatRequest, ChatResponse, ToolChoice, ToolDefinition};
use crate::models::{Dataset, Document};
use crate::traits::ChatProvider;

/// Name of the function the model is forced to call.
pub const SELECT_FUNCTION: &str = "get_datasets_from_ids";

/// Prompt that embeds the candidate documents and the user query.
pub fn selection_prompt(candidates: &[Document], query: &str) -> String {
    let docs = candidates
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given that you know the following datasets with information given in triple backticks: \
         ```{docs}``` Retrieve the relevant datasets that can answer the following query given in \
         triple backticks. If there are no relevant datasets, return an empty list.: ```{query}```"
    )
}

pub fn selection_tool() -> ToolDefinition {
    ToolDefinition {
        name: SELECT_FUNCTION.to_string(),
        description: "Get the datasets from the ids".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "description": "The ids of the datasets",
                    "items": { "type": "string" }
                }
            },
            "required": ["ids"]
        }),
    }
}

/// Outcome of one selection call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Chosen candidate ids, model order, no duplicates.
    pub ids: Vec<String>,
    /// Ids the model returned that were not among the candidates.
    pub rejected: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Extracts `ids` from the forced function call.
///
/// Uses the call named [`SELECT_FUNCTION`], or the first call if none has
/// that name. Non-string array items are skipped.
pub fn parse_selection(response: &ChatResponse) -> Result<Vec<String>, String> {
    let call = response
        .tool_calls
        .iter()
        .find(|c| c.name == SELECT_FUNCTION)
        .or_else(|| response.tool_calls.first())
        .ok_or_else(|| "response has no function call".to_string())?;

    let arguments: Value = serde_json::from_str(&call.arguments)
        .map_err(|e| format!("function arguments are not JSON: {}", e))?;

    let ids = arguments
        .get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| "function arguments have no `ids` array".to_string())?;

    Ok(ids
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

#[derive(Clone)]
pub struct RelevanceSelector<C> {
    chat: C,
}

impl<C: ChatProvider> RelevanceSelector<C> {
    pub fn new(chat: C) -> Self {
        Self { chat }
    }

    pub fn request(candidates: &[Document], query: &str) -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user(selection_prompt(candidates, query))])
            .with_tools(vec![selection_tool()])
            .with_tool_choice(ToolChoice::Function(SELECT_FUNCTION.to_string()))
            .with_temperature(0.0)
    }

    /// Asks the model which candidates answer `query`. Never fails.
    pub async fn choose_ids(&self, candidates: &[Document], query: &str) -> Selection {
        if candidates.is_empty() {
            return Selection::default();
        }

        let request = Self::request(candidates, query);
        let response = match self.chat.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(provider = self.chat.name(), error = %e, "Could not retrieve ids");
                return Selection::default();
            }
        };

        let returned = match parse_selection(&response) {
            Ok(ids) => ids,
            Err(reason) => {
                tracing::warn!(reason, "Could not retrieve ids");
                return Selection::default();
            }
        };

        let allowed: HashSet<String> = candidates
            .iter()
            .filter_map(|d| Dataset::from_document(d).ok())
            .map(|d| d.id)
            .collect();

        let mut seen = HashSet::new();
        let mut selection = Selection::default();
        for id in returned {
            if !seen.insert(id.clone()) {
                continue;
            }
            if allowed.contains(&id) {
                selection.ids.push(id);
            } else {
                selection.rejected.push(id);
            }
        }
        selection
    }
}
