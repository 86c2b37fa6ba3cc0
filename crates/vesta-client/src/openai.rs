//! OpenAI embeddings and chat-completions client.
//!
//! One client serves both APIs: [`EmbeddingProvider`] through
//! `POST {base}/embeddings` and [`ChatProvider`] through
//! `POST {base}/chat/completions` with tool calling. Any OpenAI-compatible
//! endpoint works by changing the base URL.
//!
//! # Examples
//!
//! ```no_run
//! use vesta_client::OpenAIClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAIClient::new("sk-your-api-key")?;
//! let embedding = client.get_embeddings("Hello, world!").await?;
//! println!("Embedding dimension: {}", embedding.len()); // 1536
//! # Ok(())
//! # }
//! ```

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use vesta_core::chat::{ChatMessage, ChatRequest, ChatResponse, ToolCall, ToolChoice};
use vesta_core::error::{AppError, LlmErrorDetails, LlmErrorKind};
use vesta_core::traits::{ChatProvider, EmbeddingProvider};
use vesta_core::{HttpConfig, OpenAISettings, RetryPolicy};

/// Request body for OpenAI embedding API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Response from OpenAI embedding API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Error response from OpenAI API
#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    /// Absent, `null` or a list depending on the server.
    tool_calls: Option<Vec<WireToolCall>>,
    /// Legacy single function call, still returned by some compatible servers.
    function_call: Option<WireFunction>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Maps an HTTP status and error text to an [`LlmErrorKind`].
fn classify_openai_error(status_code: u16, error_type: &str, message: &str) -> LlmErrorKind {
    let quota = error_type.contains("insufficient_quota") || message.contains("quota");
    match status_code {
        401 | 403 => LlmErrorKind::Authentication,
        429 if quota => LlmErrorKind::QuotaExceeded,
        429 => LlmErrorKind::RateLimit,
        500..=599 => LlmErrorKind::ServerError,
        _ if error_type.contains("invalid_api_key") => LlmErrorKind::Authentication,
        _ if quota => LlmErrorKind::QuotaExceeded,
        _ => LlmErrorKind::Unknown,
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let mut wire = json!({ "role": message.role.as_str() });
    wire["content"] = match &message.content {
        Some(content) => Value::String(content.clone()),
        None => Value::Null,
    };
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = Value::String(id.clone());
    }
    wire
}

/// HTTP client for OpenAI's embeddings and chat-completions APIs.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    retry: RetryPolicy,
    timeout_secs: u64,
}

impl OpenAIClient {
    /// Creates a client with the default models and endpoint.
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_config(
            api_key,
            &OpenAISettings::default(),
            RetryPolicy::llm(),
            &HttpConfig::default(),
        )
    }

    /// Creates a client with full configuration.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `settings` - Base URL and model names
    /// * `retry` - Backoff applied to every request
    /// * `http` - Timeout and user agent
    pub fn with_config(
        api_key: &str,
        settings: &OpenAISettings,
        retry: RetryPolicy,
        http: &HttpConfig,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError("OpenAI API key is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            retry,
            timeout_secs: http.timeout.as_secs(),
        })
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Generates text embeddings for a single text.
    pub async fn get_embeddings(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let embeddings = self.get_embeddings_batch(&[text]).await?;
        embeddings.into_iter().next().ok_or(AppError::EmptyResponse)
    }

    /// Generates text embeddings for multiple texts in a single API call.
    ///
    /// Returns one vector per input text, in input order.
    pub async fn get_embeddings_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request_body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts.to_vec(),
        };
        let body = serde_json::to_value(&request_body)?;
        let response: EmbeddingResponse = self.post_json("embeddings", &body).await?;

        // Sort by index to ensure correct order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        if data.len() != texts.len() {
            return Err(AppError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    /// Request body for `chat/completions`.
    pub fn completion_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages.iter().map(message_to_wire).collect::<Vec<_>>(),
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
        }

        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = match choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
                ToolChoice::Function(name) => {
                    json!({ "type": "function", "function": { "name": name } })
                }
            };
        }
        body
    }

    /// Runs one chat completion and returns its first choice.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let body = self.completion_body(request);
        let response: CompletionResponse = self.post_json("chat/completions", &body).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(AppError::EmptyResponse)?;

        let mut tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        if tool_calls.is_empty() {
            if let Some(function) = choice.message.function_call {
                tool_calls.push(ToolCall {
                    id: String::new(),
                    name: function.name,
                    arguments: function.arguments,
                });
            }
        }

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        let text = self.retry.run(path, || self.post_once(&url, body)).await?;
        serde_json::from_str(&text).map_err(|e| {
            AppError::MalformedResponse(format!("Failed to parse OpenAI response: {}", e))
        })
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<String, AppError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return response.text().await.map_err(|e| self.transport_error(e));
        }

        let status_code = status.as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let error_text = response.text().await.unwrap_or_default();

        // Try to parse as structured OpenAI error
        let (message, error_type) = match serde_json::from_str::<OpenAIError>(&error_text) {
            Ok(parsed) => {
                let error_type = parsed
                    .error
                    .code
                    .or(parsed.error.error_type)
                    .unwrap_or_default();
                (parsed.error.message, error_type)
            }
            Err(_) => (format!("HTTP {}: {}", status_code, error_text), String::new()),
        };

        let kind = classify_openai_error(status_code, &error_type, &message);
        if kind == LlmErrorKind::RateLimit && retry_after.is_some() {
            return Err(AppError::RateLimitExceeded { retry_after });
        }
        Err(AppError::LlmError(LlmErrorDetails::new(kind, message, status_code)))
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            return AppError::Timeout(self.timeout_secs);
        }
        let kind = if e.is_connect() {
            LlmErrorKind::NetworkError
        } else {
            LlmErrorKind::Unknown
        };
        AppError::LlmError(LlmErrorDetails::new(
            kind,
            format!("Cannot reach OpenAI: {}", e),
            0,
        ))
    }
}

// =============================================================================
// Trait Implementations: EmbeddingProvider and ChatProvider
// =============================================================================

impl EmbeddingProvider for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.get_embeddings(text).await
    }

    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.get_embeddings_batch(&text_refs).await
    }
}

impl ChatProvider for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.chat_completion(request).await
    }
}
