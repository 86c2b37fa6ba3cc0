//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of [`PortalClient`],
//! [`EmbeddingProvider`] and [`ChatProvider`] that record what they were
//! asked for, so tests can assert on call counts as well as results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use vesta_core::traits::{ChatProvider, EmbeddingProvider, PortalClient};
use vesta_core::{
    AppError, ChatRequest, ChatResponse, LocalizedField, PackageMetadata, PageCursor, PageLinks,
    Record, RecordPage, ResourceSummary, ToolCall,
};

pub const TEST_PORTAL_URL: &str = "https://portal.test";

/// URL of the first datastore page for a resource.
pub fn first_page_url(resource_id: &str) -> String {
    format!("{TEST_PORTAL_URL}/api/action/datastore_search?resource_id={resource_id}")
}

/// URL of a later page, as the relative link a portal would return.
pub fn page_link(resource_id: &str, offset: usize) -> String {
    format!("/api/action/datastore_search?offset={offset}&resource_id={resource_id}")
}

pub fn records(rows: &[Value]) -> Vec<Record> {
    rows.iter()
        .filter_map(|r| r.as_object().cloned())
        .collect()
}

pub fn package(description: &str, resources: &[(&str, &str)]) -> PackageMetadata {
    PackageMetadata {
        name: String::new(),
        description: Some(LocalizedField::from(description)),
        resources: resources
            .iter()
            .map(|(id, format)| ResourceSummary {
                id: id.to_string(),
                format: format.to_string(),
            })
            .collect(),
    }
}

// =============================================================================
// MockPortalClient
// =============================================================================

#[derive(Clone)]
enum Scripted<T> {
    Ok(T),
    Fail(String),
}

impl<T: Clone> Scripted<T> {
    fn get(&self) -> Result<T, AppError> {
        match self {
            Scripted::Ok(value) => Ok(value.clone()),
            Scripted::Fail(msg) => Err(AppError::NetworkError(msg.clone())),
        }
    }
}

#[derive(Default)]
struct PortalState {
    packages: Vec<(String, Scripted<PackageMetadata>)>,
    pages: HashMap<String, Scripted<RecordPage>>,
    requested_pages: Vec<String>,
    requested_packages: Vec<String>,
}

/// Mock CKAN portal. Pages are keyed by absolute URL; a `Start` cursor for
/// resource `r` maps to [`first_page_url`]`(r)`.
#[derive(Clone, Default)]
pub struct MockPortalClient {
    state: Arc<Mutex<PortalState>>,
}

impl MockPortalClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, name: &str, metadata: PackageMetadata) -> Self {
        self.state
            .lock()
            .unwrap()
            .packages
            .push((name.to_string(), Scripted::Ok(metadata)));
        self
    }

    pub fn with_failing_package(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .packages
            .push((name.to_string(), Scripted::Fail(format!("package {name} unavailable"))));
        self
    }

    /// Registers a page served at `url`, linking to `next`/`prev` as given.
    pub fn with_page(
        self,
        url: &str,
        rows: &[Value],
        next: Option<&str>,
        prev: Option<&str>,
    ) -> Self {
        let page = RecordPage {
            url: url.to_string(),
            records: records(rows),
            links: PageLinks {
                next: next.map(str::to_string),
                prev: prev.map(str::to_string),
                start: None,
            },
            total: None,
        };
        self.with_record_page(page)
    }

    pub fn with_record_page(self, page: RecordPage) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(page.url.clone(), Scripted::Ok(page));
        self
    }

    pub fn with_failing_page(self, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), Scripted::Fail("connection reset".to_string()));
        self
    }

    /// Absolute URLs of every datastore page requested, in order.
    pub fn requested_pages(&self) -> Vec<String> {
        self.state.lock().unwrap().requested_pages.clone()
    }

    pub fn requested_packages(&self) -> Vec<String> {
        self.state.lock().unwrap().requested_packages.clone()
    }
}

impl PortalClient for MockPortalClient {
    fn base_url(&self) -> &str {
        TEST_PORTAL_URL
    }

    async fn list_package_names(&self) -> Result<Vec<String>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.packages.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn show_package(&self, name: &str) -> Result<PackageMetadata, AppError> {
        let mut state = self.state.lock().unwrap();
        state.requested_packages.push(name.to_string());
        state
            .packages
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.get())
            .unwrap_or_else(|| {
                Err(AppError::HttpStatus {
                    status: 404,
                    url: format!("{TEST_PORTAL_URL}/api/action/package_show?id={name}"),
                })
            })
    }

    async fn datastore_page(&self, cursor: &PageCursor) -> Result<RecordPage, AppError> {
        let url = match cursor {
            PageCursor::Start { resource_id } => first_page_url(resource_id),
            PageCursor::Link(url) => url.clone(),
        };
        let mut state = self.state.lock().unwrap();
        state.requested_pages.push(url.clone());
        state
            .pages
            .get(&url)
            .map(Scripted::get)
            .unwrap_or_else(|| Err(AppError::HttpStatus { status: 404, url }))
    }
}

// =============================================================================
// MockEmbeddingProvider
// =============================================================================

const VOCABULARY: &[&str] = &["rain", "weather", "student", "school", "flat", "resale"];

/// Bag-of-keywords embeddings: one dimension per vocabulary word, counting
/// occurrences in the lowercased text. Texts sharing keywords score high.
#[derive(Clone, Default)]
pub struct MockEmbeddingProvider {
    calls: Arc<Mutex<usize>>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, text: &str) -> Result<Vec<f32>, AppError> {
        *self.calls.lock().unwrap() += 1;
        let text = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect())
    }
}

// =============================================================================
// MockChatProvider
// =============================================================================

/// Replays scripted responses in order and records every request.
#[derive(Clone, Default)]
pub struct MockChatProvider {
    responses: Arc<Mutex<VecDeque<Result<ChatResponse, String>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockChatProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            requests: Arc::default(),
        }
    }

    /// A provider whose every call fails with a non-retryable error.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from([Err(message.to_string())]))),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatProvider for MockChatProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AppError::Generic(message)),
            None => Err(AppError::Generic("no scripted response left".to_string())),
        }
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// Selector response choosing `ids`.
pub fn select_ids(ids: &[&str]) -> ChatResponse {
    ChatResponse::tool_calls(vec![tool_call(
        "call_select",
        vesta_core::selector::SELECT_FUNCTION,
        json!({ "ids": ids }),
    )])
}
