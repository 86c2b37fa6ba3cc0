//! End-to-end answer pipeline.
//!
//! [`AnalystService`] runs one query through every stage, in order:
//! discovery, index build, similarity search, relevance selection, row
//! fetching and the table agent. Nothing is cached between queries.

use std::time::Instant;

use crate::agent::{AgentConfig, TableAgent};
use crate::config::{AppConfig, PortalSettings};
use crate::discovery::{DiscoveryConfig, DiscoveryService};
use crate::index::{IndexConfig, SemanticIndexer};
use crate::models::{Dataset, RowSet};
use crate::progress::{PipelineEvent, ProgressReporter, SilentReporter};
use crate::repository::{DatasetRepository, Lookup};
use crate::rows::{RowFetchConfig, RowFetchOutcome, RowFetcher};
use crate::selector::RelevanceSelector;
use crate::table::{Table, TableSet};
use crate::traits::{ChatProvider, EmbeddingProvider, PortalClient};
use crate::AppError;

/// Answer given when the selector finds nothing relevant.
pub const NO_MATCH_ANSWER: &str =
    "I could not find any dataset on the portal that can answer this question.";

/// Answer given when every selected dataset failed to load.
pub const NO_ROWS_ANSWER: &str =
    "I found relevant datasets, but none of their rows could be retrieved. Please try again later.";

/// A dataset whose rows were handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    pub id: String,
    pub name: String,
    pub rows: usize,
    pub truncated: bool,
    pub landing_page: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalystReply {
    pub answer: String,
    pub datasets_used: Vec<DatasetSource>,
}

impl AnalystReply {
    fn without_sources(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            datasets_used: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalystConfig {
    pub portal: PortalSettings,
    pub discovery: DiscoveryConfig,
    pub index: IndexConfig,
    pub top_k: usize,
    pub rows: RowFetchConfig,
    pub agent: AgentConfig,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AnalystConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            portal: config.portal.clone(),
            discovery: DiscoveryConfig::from(&config.portal),
            index: IndexConfig::from(&config.index),
            top_k: config.index.top_k,
            rows: RowFetchConfig::from(&config.rows),
            agent: AgentConfig::from(&config.agent),
        }
    }
}

/// Answers natural-language questions from portal data.
///
/// # Type Parameters
///
/// * `P` - Portal client
/// * `E` - Embedding provider
/// * `C` - Chat provider, used by both the selector and the agent
pub struct AnalystService<P, E, C>
where
    P: PortalClient + Clone,
    E: EmbeddingProvider,
    C: ChatProvider + Clone,
{
    portal_settings: PortalSettings,
    top_k: usize,
    discovery: DiscoveryService<P>,
    indexer: SemanticIndexer<E>,
    selector: RelevanceSelector<C>,
    fetcher: RowFetcher<P>,
    agent: TableAgent<C>,
}

impl<P, E, C> AnalystService<P, E, C>
where
    P: PortalClient + Clone,
    E: EmbeddingProvider,
    C: ChatProvider + Clone,
{
    pub fn new(portal: P, embedding: E, chat: C) -> Self {
        Self::with_config(portal, embedding, chat, AnalystConfig::default())
    }

    pub fn with_config(portal: P, embedding: E, chat: C, config: AnalystConfig) -> Self {
        Self {
            portal_settings: config.portal,
            top_k: config.top_k,
            discovery: DiscoveryService::with_config(portal.clone(), config.discovery),
            indexer: SemanticIndexer::with_config(embedding, config.index),
            selector: RelevanceSelector::new(chat.clone()),
            fetcher: RowFetcher::with_config(portal, config.rows),
            agent: TableAgent::with_config(chat, config.agent),
        }
    }

    /// Runs discovery only.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, AppError> {
        self.discovery.discover().await
    }

    pub async fn answer(&self, query: &str) -> Result<AnalystReply, AppError> {
        self.answer_with_progress(query, &SilentReporter).await
    }

    /// Answers `query`.
    ///
    /// Discovery, index and agent failures are returned. Selection never
    /// fails, and row failures only drop the affected dataset.
    pub async fn answer_with_progress<R: ProgressReporter>(
        &self,
        query: &str,
        reporter: &R,
    ) -> Result<AnalystReply, AppError> {
        let start = Instant::now();

        let datasets = self.discovery.discover_with_progress(reporter).await?;
        let repository = DatasetRepository::new(datasets);

        let index = self
            .indexer
            .build_with_progress(repository.documents(), reporter)
            .await?;
        let scored = self.indexer.search(&index, query, self.top_k).await?;
        let candidates: Vec<_> = scored.iter().map(|s| s.document.clone()).collect();

        let candidate_names: Vec<String> = candidates
            .iter()
            .filter_map(|d| Dataset::from_document(d).ok())
            .map(|d| d.name)
            .collect();
        reporter.report(PipelineEvent::CandidatesFound {
            names: &candidate_names,
        });

        let selection = self.selector.choose_ids(&candidates, query).await;
        for id in &selection.rejected {
            reporter.report(PipelineEvent::UnknownDataset { id });
        }

        let mut selected: Vec<&Dataset> = Vec::new();
        for lookup in repository.lookup(&selection.ids) {
            match lookup {
                Lookup::Found(dataset) => selected.push(dataset),
                Lookup::NotFound(id) => reporter.report(PipelineEvent::UnknownDataset { id: &id }),
            }
        }

        let selected_names: Vec<String> = selected.iter().map(|d| d.name.clone()).collect();
        reporter.report(PipelineEvent::DatasetsSelected {
            names: &selected_names,
        });
        if selected.is_empty() {
            return Ok(AnalystReply::without_sources(NO_MATCH_ANSWER));
        }

        let ids: Vec<String> = selected.iter().map(|d| d.id.clone()).collect();
        let outcomes = self
            .fetcher
            .fetch_datasets_from_ids_with_progress(&ids, reporter)
            .await;

        let row_sets: Vec<RowSet> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                RowFetchOutcome::Fetched(rows) => Some(rows),
                RowFetchOutcome::Failed { .. } => None,
            })
            .collect();
        if row_sets.is_empty() {
            return Ok(AnalystReply::without_sources(NO_ROWS_ANSWER));
        }

        let mut sources = Vec::with_capacity(row_sets.len());
        let mut tables = Vec::with_capacity(row_sets.len());
        for rows in row_sets {
            let name = repository
                .get(&rows.dataset_id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| rows.dataset_id.clone());
            sources.push(DatasetSource {
                id: rows.dataset_id.clone(),
                landing_page: self.portal_settings.landing_page(&rows.dataset_id, &name),
                name: name.clone(),
                rows: rows.records.len(),
                truncated: rows.is_truncated(),
            });
            tables.push(Table::from_row_set(name, rows));
        }

        let tables = TableSet::new(tables);
        let answer = self.agent.answer(&tables, query).await?;
        reporter.report(PipelineEvent::AnswerReady {
            iterations: answer.iterations,
            elapsed: start.elapsed(),
        });

        Ok(AnalystReply {
            answer: answer.answer,
            datasets_used: sources,
        })
    }
}
