//! Vesta Core - Domain types, retrieval pipeline and table agent.
//!
//! This crate provides the core functionality for Vesta, a data-analyst
//! assistant over a CKAN open-data portal:
//!
//! - **Domain models**: [`Dataset`], [`Document`], [`RowSet`], [`PackageMetadata`]
//! - **Services**: [`DiscoveryService`] lists CSV datasets, [`SemanticIndexer`] ranks them
//!   against a query, [`RelevanceSelector`] lets the model pick ids, [`RowFetcher`] pages
//!   through datastore rows and [`TableAgent`] answers from the resulting tables
//! - **Pipeline**: [`AnalystService`] wires the stages together for one query
//! - **Traits**: [`PortalClient`], [`EmbeddingProvider`], [`ChatProvider`] for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! Services are generic over the traits, so this crate performs no I/O of its
//! own. `vesta-client` provides the CKAN and OpenAI implementations.
//!
//! # Example
//!
//! ```ignore
//! use vesta_core::{AnalystService, TracingReporter};
//!
//! let service = AnalystService::new(portal, embedding, chat);
//! let reply = service
//!     .answer_with_progress("Which town had the most resale flats in 2020?", &TracingReporter)
//!     .await?;
//! println!("{}", reply.answer);
//! ```

pub mod agent;
pub mod chat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod i18n;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod repository;
pub mod retry;
pub mod rows;
pub mod selector;
pub mod table;
pub mod traits;

// Configuration
pub use config::{
    AgentSettings, AppConfig, FetchMode, HttpConfig, IndexSettings, OpenAISettings,
    PortalSettings, RetryConfig, RetrySettings, RowsSettings, default_config_path, load_config,
};

// Error handling
pub use error::{AppError, LlmErrorDetails, LlmErrorKind};
pub use retry::RetryPolicy;

// Internationalization
pub use i18n::LocalizedField;

// Domain models
pub use chat::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall, ToolChoice, ToolDefinition};
pub use models::{
    Chunk, Completeness, Dataset, Document, PackageMetadata, PageCursor, PageLinks, Record,
    RecordPage, ResourceSummary, RowSet, TruncationReason,
};

// Progress reporting
pub use progress::{PipelineEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{ChatProvider, EmbeddingProvider, PortalClient};

// Services (generic over trait implementations)
pub use agent::{AgentAnswer, TableAgent};
pub use discovery::DiscoveryService;
pub use index::{SemanticIndexer, SimilarityIndex, TextSplitter};
pub use pipeline::{AnalystConfig, AnalystReply, AnalystService, DatasetSource};
pub use repository::{DatasetRepository, Lookup};
pub use rows::{RowFetchOutcome, RowFetcher};
pub use selector::{RelevanceSelector, Selection};
pub use table::{Table, TableSet};
