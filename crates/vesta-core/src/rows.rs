//! Datastore row fetching.
//!
//! Pagination follows the portal's `_links.next` and stops when:
//!
//! - `next` is absent or empty,
//! - `next` equals `prev` (single-page responses link to themselves),
//! - `next` resolves to the page just read,
//! - a page after the first has no records,
//! - the reported `total` has been reached,
//! - `max_pages` pages have been read (reported as truncated).
//!
//! A failure on the first page fails the dataset. A failure on a later page
//! keeps what was read and marks the [`RowSet`] as truncated.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use url::Url;

use crate::config::{FetchMode, RowsSettings};
use crate::models::{Completeness, PageCursor, PageLinks, RecordPage, RowSet, TruncationReason};
use crate::progress::{PipelineEvent, ProgressReporter, SilentReporter};
use crate::traits::PortalClient;
use crate::AppError;

/// Resolves a pagination link against the URL of the page that carried it.
pub fn resolve_link(current: &str, link: &str) -> Result<String, AppError> {
    let base = Url::parse(current).map_err(|e| AppError::InvalidUrl(format!("{current}: {e}")))?;
    base.join(link)
        .map(String::from)
        .map_err(|e| AppError::InvalidUrl(format!("{link}: {e}")))
}

/// The absolute URL of the next page, or `None` when pagination is done.
pub fn next_page_link(current_url: &str, links: &PageLinks) -> Result<Option<String>, AppError> {
    let next = match links.next.as_deref().map(str::trim) {
        Some(next) if !next.is_empty() => next,
        _ => return Ok(None),
    };
    if links.prev.as_deref().map(str::trim) == Some(next) {
        return Ok(None);
    }

    let resolved = resolve_link(current_url, next)?;
    if resolved == current_url {
        return Ok(None);
    }
    Ok(Some(resolved))
}

/// Result of fetching one dataset.
#[derive(Debug)]
pub enum RowFetchOutcome {
    /// At least the first page was read. The row set may be truncated.
    Fetched(RowSet),
    /// The first page could not be read.
    Failed { dataset_id: String, error: AppError },
}

impl RowFetchOutcome {
    pub fn dataset_id(&self) -> &str {
        match self {
            RowFetchOutcome::Fetched(rows) => &rows.dataset_id,
            RowFetchOutcome::Failed { dataset_id, .. } => dataset_id,
        }
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            RowFetchOutcome::Fetched(rows) => Some(rows),
            RowFetchOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RowFetchConfig {
    pub max_pages: usize,
    pub mode: FetchMode,
    pub concurrency: usize,
}

impl Default for RowFetchConfig {
    fn default() -> Self {
        Self::from(&RowsSettings::default())
    }
}

impl From<&RowsSettings> for RowFetchConfig {
    fn from(settings: &RowsSettings) -> Self {
        Self {
            max_pages: settings.max_pages,
            mode: settings.fetch_mode,
            concurrency: settings.concurrency,
        }
    }
}

#[derive(Clone)]
pub struct RowFetcher<P> {
    portal: P,
    config: RowFetchConfig,
}

impl<P: PortalClient> RowFetcher<P> {
    pub fn new(portal: P) -> Self {
        Self::with_config(portal, RowFetchConfig::default())
    }

    pub fn with_config(portal: P, config: RowFetchConfig) -> Self {
        Self { portal, config }
    }

    /// Reads every page of one datastore resource.
    pub async fn fetch_dataset_rows(&self, dataset_id: &str) -> RowFetchOutcome {
        let cursor = PageCursor::Start {
            resource_id: dataset_id.to_string(),
        };
        let first = match self.portal.datastore_page(&cursor).await {
            Ok(page) => page,
            Err(error) => {
                return RowFetchOutcome::Failed {
                    dataset_id: dataset_id.to_string(),
                    error,
                };
            }
        };

        let RecordPage {
            mut url,
            mut records,
            mut links,
            total,
        } = first;
        let mut pages = 1;
        let max_pages = self.config.max_pages.max(1);

        let finish = |records, pages, completeness| {
            RowFetchOutcome::Fetched(RowSet {
                dataset_id: dataset_id.to_string(),
                records,
                pages,
                completeness,
            })
        };

        loop {
            if total.is_some_and(|t| records.len() as u64 >= t) {
                return finish(records, pages, Completeness::Complete);
            }

            let next = match next_page_link(&url, &links) {
                Ok(Some(next)) => next,
                Ok(None) => return finish(records, pages, Completeness::Complete),
                Err(e) => {
                    let reason = TruncationReason::PageFailed {
                        page: pages + 1,
                        error: e.to_string(),
                    };
                    return finish(records, pages, Completeness::Truncated(reason));
                }
            };

            if pages >= max_pages {
                let reason = TruncationReason::PageCap { max_pages };
                return finish(records, pages, Completeness::Truncated(reason));
            }

            match self.portal.datastore_page(&PageCursor::Link(next)).await {
                Ok(page) if page.records.is_empty() => {
                    return finish(records, pages, Completeness::Complete);
                }
                Ok(page) => {
                    pages += 1;
                    records.extend(page.records);
                    url = page.url;
                    links = page.links;
                }
                Err(e) => {
                    let reason = TruncationReason::PageFailed {
                        page: pages + 1,
                        error: e.to_string(),
                    };
                    return finish(records, pages, Completeness::Truncated(reason));
                }
            }
        }
    }

    /// Fetches rows for every id. Outcomes are returned in input order.
    pub async fn fetch_datasets_from_ids(&self, ids: &[String]) -> Vec<RowFetchOutcome> {
        self.fetch_datasets_from_ids_with_progress(ids, &SilentReporter)
            .await
    }

    pub async fn fetch_datasets_from_ids_with_progress<R: ProgressReporter>(
        &self,
        ids: &[String],
        reporter: &R,
    ) -> Vec<RowFetchOutcome> {
        let start = Instant::now();

        let outcomes: Vec<RowFetchOutcome> = match self.config.mode {
            FetchMode::Sequential => {
                let mut outcomes = Vec::with_capacity(ids.len());
                for id in ids {
                    outcomes.push(self.fetch_dataset_rows(id).await);
                }
                outcomes
            }
            FetchMode::Concurrent => {
                stream::iter(ids)
                    .map(|id| self.fetch_dataset_rows(id))
                    .buffered(self.config.concurrency.max(1))
                    .collect()
                    .await
            }
        };

        for outcome in &outcomes {
            match outcome {
                RowFetchOutcome::Fetched(rows) => {
                    if let Completeness::Truncated(reason) = &rows.completeness {
                        tracing::warn!(
                            dataset_id = %rows.dataset_id,
                            %reason,
                            "Pagination truncated"
                        );
                    }
                    reporter.report(PipelineEvent::RowsFetched {
                        dataset_id: &rows.dataset_id,
                        records: rows.records.len(),
                        pages: rows.pages,
                        truncated: rows.is_truncated(),
                    });
                }
                RowFetchOutcome::Failed { dataset_id, error } => {
                    let error = error.to_string();
                    reporter.report(PipelineEvent::RowsFailed {
                        dataset_id,
                        error: &error,
                    });
                }
            }
        }

        reporter.report(PipelineEvent::FetchCompleted {
            tables: outcomes.iter().filter(|o| o.rows().is_some()).count(),
            elapsed: start.elapsed(),
        });
        outcomes
    }
}
