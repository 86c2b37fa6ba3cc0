//! In-memory collection of discovered datasets.

use std::collections::HashMap;

use crate::models::{Dataset, Document};

/// Result of resolving one id against the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a Dataset),
    NotFound(String),
}

/// Discovered datasets in discovery order, indexed by id.
///
/// Lives for one query. The first record wins when the portal reports the
/// same resource id twice.
#[derive(Debug, Clone, Default)]
pub struct DatasetRepository {
    datasets: Vec<Dataset>,
    by_id: HashMap<String, usize>,
}

impl DatasetRepository {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        let mut repo = Self::default();
        for dataset in datasets {
            if repo.by_id.contains_key(&dataset.id) {
                tracing::debug!(id = %dataset.id, "Duplicate resource id, keeping first");
                continue;
            }
            repo.by_id.insert(dataset.id.clone(), repo.datasets.len());
            repo.datasets.push(dataset);
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Dataset> {
        self.by_id.get(id).map(|&i| &self.datasets[i])
    }

    /// Index documents, aligned with [`iter`](Self::iter).
    pub fn documents(&self) -> Vec<Document> {
        self.datasets.iter().map(Dataset::to_document).collect()
    }

    /// Resolves every id, keeping input order. Never fails: unknown ids come
    /// back as [`Lookup::NotFound`].
    pub fn lookup(&self, ids: &[String]) -> Vec<Lookup<'_>> {
        ids.iter()
            .map(|id| match self.get(id) {
                Some(dataset) => Lookup::Found(dataset),
                None => Lookup::NotFound(id.clone()),
            })
            .collect()
    }
}
