//! Progress reporting for the answer pipeline.
//!
//! Services emit [`PipelineEvent`]s through a [`ProgressReporter`] instead of
//! logging directly, so a CLI can print timings while tests stay quiet.

use std::time::Duration;

use tracing::{info, warn};

/// Events emitted while answering a query.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    /// Package names listed from the catalog.
    PackagesListed { count: usize },
    /// Discovery finished.
    DiscoveryCompleted {
        packages: usize,
        datasets: usize,
        elapsed: Duration,
    },
    /// Similarity index built.
    IndexBuilt {
        documents: usize,
        chunks: usize,
        elapsed: Duration,
    },
    /// Top candidates returned by the similarity search.
    CandidatesFound { names: &'a [String] },
    /// Ids chosen by the selector.
    DatasetsSelected { names: &'a [String] },
    /// The selector returned an id that is not a candidate or not known.
    UnknownDataset { id: &'a str },
    /// Row fetch finished for one dataset.
    RowsFetched {
        dataset_id: &'a str,
        records: usize,
        pages: usize,
        truncated: bool,
    },
    /// Row fetch failed on the first page; the dataset is skipped.
    RowsFailed { dataset_id: &'a str, error: &'a str },
    /// All row fetches joined.
    FetchCompleted { tables: usize, elapsed: Duration },
    /// Agent produced an answer.
    AnswerReady { iterations: usize, elapsed: Duration },
}

/// Trait for reporting pipeline progress.
pub trait ProgressReporter: Send + Sync {
    /// The default implementation does nothing.
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::PackagesListed { count } => {
                info!(count, "Listed packages");
            }
            PipelineEvent::DiscoveryCompleted {
                packages,
                datasets,
                elapsed,
            } => {
                info!(
                    packages,
                    datasets,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Discovered CSV datasets in {:.2}s",
                    elapsed.as_secs_f64()
                );
            }
            PipelineEvent::IndexBuilt {
                documents,
                chunks,
                elapsed,
            } => {
                info!(
                    documents,
                    chunks,
                    "Built similarity index in {:.2}s",
                    elapsed.as_secs_f64()
                );
            }
            PipelineEvent::CandidatesFound { names } => {
                let top: Vec<&str> = names.iter().take(5).map(String::as_str).collect();
                info!(candidates = ?top, "Similarity candidates");
            }
            PipelineEvent::DatasetsSelected { names } => {
                info!(selected = ?names, "Selected datasets");
            }
            PipelineEvent::UnknownDataset { id } => {
                warn!(id, "Selector returned an unknown dataset id");
            }
            PipelineEvent::RowsFetched {
                dataset_id,
                records,
                pages,
                truncated,
            } => {
                if truncated {
                    warn!(dataset_id, records, pages, "Row fetch truncated");
                } else {
                    info!(dataset_id, records, pages, "Rows fetched");
                }
            }
            PipelineEvent::RowsFailed { dataset_id, error } => {
                warn!(dataset_id, error, "Row fetch failed, skipping dataset");
            }
            PipelineEvent::FetchCompleted { tables, elapsed } => {
                info!(tables, "Fetched rows in {:.2}s", elapsed.as_secs_f64());
            }
            PipelineEvent::AnswerReady {
                iterations,
                elapsed,
            } => {
                info!(iterations, "Answer ready in {:.2}s", elapsed.as_secs_f64());
            }
        }
    }
}
