//! Domain models shared by the retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::i18n::LocalizedField;

/// Resource format that makes a resource eligible as a [`Dataset`].
/// Compared exactly, including case.
pub const CSV_FORMAT: &str = "CSV";

/// One CSV resource of a portal package.
///
/// `id` is the datastore resource id used for row fetching, `name` the
/// package name it belongs to. Several datasets can share a `name` when a
/// package ships more than one CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Dataset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Serializes the record as a flat JSON object, used as index text.
    ///
    /// ```
    /// use vesta_core::Dataset;
    ///
    /// let ds = Dataset::new("d_1", "weather", "Daily rainfall");
    /// let doc = ds.to_document();
    /// assert_eq!(Dataset::from_document(&doc).unwrap(), ds);
    /// ```
    pub fn to_document(&self) -> Document {
        let value = serde_json::json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
        });
        Document::new(value.to_string())
    }

    /// Rebuilds a dataset from text produced by [`Dataset::to_document`].
    pub fn from_document(document: &Document) -> Result<Self, AppError> {
        Ok(serde_json::from_str(&document.content)?)
    }
}

/// Opaque text unit handed to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A bounded slice of one document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the source document in the indexed batch.
    pub document: usize,
    pub text: String,
}

// =============================================================================
// Catalog metadata
// =============================================================================

/// Resource entry of a package, as far as discovery needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub id: String,
    pub format: String,
}

/// Package metadata returned by the portal's `package_show`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    pub name: String,
    pub description: Option<LocalizedField>,
    pub resources: Vec<ResourceSummary>,
}

impl PackageMetadata {
    /// One [`Dataset`] per resource whose format is exactly `"CSV"`, in
    /// resource order.
    pub fn csv_datasets(&self, language: &str) -> Vec<Dataset> {
        let description = self
            .description
            .as_ref()
            .map(|d| d.resolve(language))
            .unwrap_or_default();

        self.resources
            .iter()
            .filter(|r| r.format == CSV_FORMAT)
            .map(|r| Dataset::new(r.id.clone(), self.name.clone(), description.clone()))
            .collect()
    }
}

// =============================================================================
// Datastore pages and row sets
// =============================================================================

/// One datastore record: column name to value.
pub type Record = serde_json::Map<String, Value>;

/// Pagination links as returned by `datastore_search`. Usually relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub start: Option<String>,
}

/// Where to read the next datastore page from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// First page of a resource.
    Start { resource_id: String },
    /// Absolute URL taken from a previous page's links.
    Link(String),
}

/// A single datastore response.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    /// Absolute URL the page was fetched from.
    pub url: String,
    pub records: Vec<Record>,
    pub links: PageLinks,
    /// Total record count if the portal reports it.
    pub total: Option<u64>,
}

/// Why pagination stopped before the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TruncationReason {
    /// `max_pages` pages were read and another page was announced.
    PageCap { max_pages: usize },
    /// A page after the first failed; the message is the error text.
    PageFailed { page: usize, error: String },
}

impl std::fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncationReason::PageCap { max_pages } => {
                write!(f, "stopped at the {} page cap", max_pages)
            }
            TruncationReason::PageFailed { page, error } => {
                write!(f, "page {} failed: {}", page, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    Truncated(TruncationReason),
}

/// All records fetched for one dataset id, in API order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub dataset_id: String,
    pub records: Vec<Record>,
    /// Pages read successfully.
    pub pages: usize,
    pub completeness: Completeness,
}

impl RowSet {
    pub fn is_truncated(&self) -> bool {
        matches!(self.completeness, Completeness::Truncated(_))
    }
}
