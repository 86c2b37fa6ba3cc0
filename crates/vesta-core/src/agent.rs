//! Tabular reasoning agent.
//!
//! [`TableAgent`] hands the fetched tables and the user's query to a chat
//! model together with the table tools from [`crate::table`], executes the
//! calls the model makes and feeds the results back until the model answers
//! in plain text. The loop runs at temperature 0 and is bounded by
//! `max_iterations`; when the bound is hit the model is asked once more,
//! with tools disabled, to answer from what it has seen.

use serde_json::json;

use crate::chat::{ChatMessage, ChatRequest, ToolChoice};
use crate::config::AgentSettings;
use crate::table::{TableSet, table_tools};
use crate::traits::ChatProvider;
use crate::AppError;

const SYSTEM_PROMPT: &str = "You are a data analyst working with tables of open government \
data from Singapore. Answer the user's question using only the tables provided. Use the tools \
to inspect, filter and aggregate rows instead of guessing values. Cell values are often \
strings; numeric comparisons and aggregations parse them as numbers. If a table is marked \
INCOMPLETE, say that the answer is based on partial data. If the tables cannot answer the \
question, say so plainly.";

const FINAL_PROMPT: &str =
    "Stop calling tools now and give your final answer based on what you have found so far.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAnswer {
    pub answer: String,
    /// Number of chat completions made, including the final forced one.
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub preview_rows: usize,
    pub max_tool_rows: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            preview_rows: settings.preview_rows,
            max_tool_rows: settings.max_tool_rows,
        }
    }
}

#[derive(Clone)]
pub struct TableAgent<C> {
    chat: C,
    config: AgentConfig,
}

impl<C: ChatProvider> TableAgent<C> {
    pub fn new(chat: C) -> Self {
        Self::with_config(chat, AgentConfig::default())
    }

    pub fn with_config(chat: C, config: AgentConfig) -> Self {
        Self { chat, config }
    }

    /// Opening messages: system prompt, then the table overview and query.
    pub fn opening_messages(&self, tables: &TableSet, query: &str) -> Vec<ChatMessage> {
        let user = format!(
            "Tables:\n\n{}Question: {}",
            tables.overview(self.config.preview_rows),
            query
        );
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
    }

    /// Runs the tool-calling loop over `tables` until the model answers.
    ///
    /// Tool failures are reported back to the model as `{"error": ...}`
    /// rather than aborting; only chat provider errors are returned.
    pub async fn answer(&self, tables: &TableSet, query: &str) -> Result<AgentAnswer, AppError> {
        let mut messages = self.opening_messages(tables, query);
        let tools = table_tools();
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let request = ChatRequest::new(messages.clone())
                .with_tools(tools.clone())
                .with_tool_choice(ToolChoice::Auto)
                .with_temperature(0.0);
            let response = self.chat.complete(&request).await?;

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default();
                return Ok(AgentAnswer { answer, iterations });
            }

            tracing::debug!(
                iteration = iterations,
                calls = response.tool_calls.len(),
                "Agent requested tools"
            );

            messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));
            for call in &response.tool_calls {
                let result =
                    tables.call_tool(&call.name, &call.arguments, self.config.max_tool_rows);
                let output = match result {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!(tool = %call.name, error = %e, "Tool call failed");
                        json!({ "error": e.to_string() })
                    }
                };
                messages.push(ChatMessage::tool(call.id.clone(), output.to_string()));
            }
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Agent hit iteration limit, forcing a final answer"
        );
        messages.push(ChatMessage::user(FINAL_PROMPT));
        let request = ChatRequest::new(messages)
            .with_tools(tools)
            .with_tool_choice(ToolChoice::None)
            .with_temperature(0.0);
        let response = self.chat.complete(&request).await?;
        Ok(AgentAnswer {
            answer: response.content.unwrap_or_default(),
            iterations: iterations + 1,
        })
    }
}
