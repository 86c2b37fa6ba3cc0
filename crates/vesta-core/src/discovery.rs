//! Catalog discovery: package list to CSV datasets.
//!
//! [`DiscoveryService`] lists every package on the portal, fetches each
//! package's metadata and keeps one [`Dataset`] per resource whose format is
//! exactly `"CSV"`. Metadata requests run either one at a time or as a
//! bounded concurrent fan-out; in both modes the first failing request
//! aborts discovery and its error is returned.

use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::config::{FetchMode, PortalSettings};
use crate::models::{Dataset, PackageMetadata};
use crate::progress::{PipelineEvent, ProgressReporter, SilentReporter};
use crate::traits::PortalClient;
use crate::AppError;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: FetchMode,
    /// Maximum in-flight metadata requests in concurrent mode.
    pub concurrency: usize,
    /// Language used to resolve multilingual descriptions.
    pub language: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&PortalSettings::default())
    }
}

impl From<&PortalSettings> for DiscoveryConfig {
    fn from(settings: &PortalSettings) -> Self {
        Self {
            mode: settings.discovery_mode,
            concurrency: settings.discovery_concurrency,
            language: settings.language().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DiscoveryService<P> {
    portal: P,
    config: DiscoveryConfig,
}

impl<P: PortalClient> DiscoveryService<P> {
    pub fn new(portal: P) -> Self {
        Self::with_config(portal, DiscoveryConfig::default())
    }

    pub fn with_config(portal: P, config: DiscoveryConfig) -> Self {
        Self { portal, config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discovers every CSV dataset on the portal.
    pub async fn discover(&self) -> Result<Vec<Dataset>, AppError> {
        self.discover_with_progress(&SilentReporter).await
    }

    pub async fn discover_with_progress<R: ProgressReporter>(
        &self,
        reporter: &R,
    ) -> Result<Vec<Dataset>, AppError> {
        let start = Instant::now();

        let names = self.portal.list_package_names().await?;
        reporter.report(PipelineEvent::PackagesListed { count: names.len() });
        tracing::debug!(
            portal = self.portal.base_url(),
            packages = names.len(),
            mode = %self.config.mode,
            "Fetching package metadata"
        );

        let datasets = self.datasets_from_packages(&names).await?;

        reporter.report(PipelineEvent::DiscoveryCompleted {
            packages: names.len(),
            datasets: datasets.len(),
            elapsed: start.elapsed(),
        });
        Ok(datasets)
    }

    /// Fetches metadata for the given packages and returns their CSV datasets
    /// in package order.
    pub async fn datasets_from_packages(&self, names: &[String]) -> Result<Vec<Dataset>, AppError> {
        let packages = match self.config.mode {
            FetchMode::Sequential => self.fetch_sequential(names).await?,
            FetchMode::Concurrent => self.fetch_concurrent(names).await?,
        };

        let language = self.config.language.as_str();
        Ok(names
            .iter()
            .zip(packages)
            .flat_map(|(name, package)| {
                PackageMetadata {
                    name: name.clone(),
                    ..package
                }
                .csv_datasets(language)
            })
            .collect())
    }

    async fn fetch_sequential(&self, names: &[String]) -> Result<Vec<PackageMetadata>, AppError> {
        let mut packages = Vec::with_capacity(names.len());
        for name in names {
            packages.push(self.portal.show_package(name).await?);
        }
        Ok(packages)
    }

    async fn fetch_concurrent(&self, names: &[String]) -> Result<Vec<PackageMetadata>, AppError> {
        stream::iter(names)
            .map(|name| self.portal.show_package(name))
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await
    }
}
