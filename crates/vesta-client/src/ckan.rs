//! CKAN client for catalog discovery and datastore paging.
//!
//! Three action endpoints are used:
//!
//! - `package_list`: every package name in the catalog
//! - `package_show?id=<name>`: description and resource list of one package
//! - `datastore_search?resource_id=<id>`: one page of records plus `_links`
//!
//! Every request goes through the client's [`RetryPolicy`]. Status codes map
//! onto [`AppError`] so the policy can tell transient failures (429, 5xx,
//! timeouts, refused connections) from permanent ones.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use vesta_core::error::AppError;
use vesta_core::models::{
    PackageMetadata, PageCursor, PageLinks, Record, RecordPage, ResourceSummary,
};
use vesta_core::{HttpConfig, LocalizedField, PortalSettings, RetryPolicy};

/// Generic wrapper for CKAN API responses.
///
/// CKAN API reference: <https://docs.ckan.org/en/2.9/api/>
///
/// CKAN always returns responses with the structure:
/// ```json
/// {
///     "success": bool,
///     "result": T
/// }
/// ```
#[derive(Deserialize, Debug)]
struct CkanResponse<T> {
    success: bool,
    result: Option<T>,
}

/// Data Transfer Object for the parts of `package_show` discovery needs.
///
/// `description` and `notes` use [`LocalizedField`] to support both plain
/// strings and multilingual objects. `description` wins when both are set
/// and non-empty.
///
/// # Examples
///
/// ```
/// use vesta_client::ckan::CkanPackage;
///
/// let json = r#"{
///     "name": "resale-flat-prices",
///     "notes": "Resale transactions by town",
///     "resources": [
///         {"id": "d_8b84", "format": "CSV"},
///         {"id": "d_pdf1", "format": "PDF"}
///     ]
/// }"#;
///
/// let package: CkanPackage = serde_json::from_str(json).unwrap();
/// let metadata = package.into_metadata();
/// assert_eq!(metadata.csv_datasets("en").len(), 1);
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct CkanPackage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<LocalizedField>,
    #[serde(default)]
    pub notes: Option<LocalizedField>,
    #[serde(default)]
    pub resources: Vec<CkanResource>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CkanResource {
    pub id: String,
    /// Missing or null formats never match `"CSV"`.
    #[serde(default)]
    pub format: Option<String>,
}

impl CkanPackage {
    pub fn into_metadata(self) -> PackageMetadata {
        let description = self
            .description
            .filter(|d| !d.is_empty())
            .or(self.notes);

        PackageMetadata {
            name: self.name,
            description,
            resources: self
                .resources
                .into_iter()
                .map(|r| ResourceSummary {
                    id: r.id,
                    format: r.format.unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct CkanLinks {
    next: Option<String>,
    prev: Option<String>,
    start: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DatastoreResult {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default, rename = "_links")]
    links: CkanLinks,
    #[serde(default)]
    total: Option<u64>,
}

/// Options for [`CkanClient::with_config`].
#[derive(Debug, Clone)]
pub struct CkanConfig {
    /// Action API path relative to the portal URL.
    pub api_path: String,
    /// `limit` sent on the first `datastore_search` request. Later pages
    /// follow the portal's links, which carry their own limit.
    pub page_limit: Option<u32>,
    pub retry: RetryPolicy,
    pub http: HttpConfig,
}

impl Default for CkanConfig {
    fn default() -> Self {
        Self {
            api_path: PortalSettings::default().api_path,
            page_limit: None,
            retry: RetryPolicy::http(),
            http: HttpConfig::default(),
        }
    }
}

/// HTTP client for CKAN open data portals.
///
/// # Examples
///
/// ```no_run
/// use vesta_client::CkanClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CkanClient::new("https://data.gov.sg")?;
/// let names = client.list_package_names().await?;
/// println!("Found {} packages", names.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CkanClient {
    client: Client,
    base_url: Url,
    api_url: Url,
    page_limit: Option<u32>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl CkanClient {
    /// Creates a client for the portal with default options.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPortalUrl` if the URL does not parse.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(base_url_str: &str) -> Result<Self, AppError> {
        Self::with_config(base_url_str, CkanConfig::default())
    }

    pub fn with_config(base_url_str: &str, config: CkanConfig) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url_str)
            .map_err(|_| AppError::InvalidPortalUrl(base_url_str.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidPortalUrl(base_url_str.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let api_path = format!("{}/", config.api_path.trim_matches('/'));
        let api_url = base_url
            .join(&api_path)
            .map_err(|e| AppError::InvalidUrl(format!("{api_path}: {e}")))?;

        let client = Client::builder()
            .user_agent(config.http.user_agent.as_str())
            .timeout(config.http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_url,
            page_limit: config.page_limit,
            retry: config.retry,
            timeout: config.http.timeout,
        })
    }

    fn action_url(&self, action: &str) -> Result<Url, AppError> {
        self.api_url
            .join(action)
            .map_err(|e| AppError::InvalidUrl(format!("{action}: {e}")))
    }

    /// Fetches every package name in the catalog via `package_list`.
    pub async fn list_package_names(&self) -> Result<Vec<String>, AppError> {
        let url = self.action_url("package_list")?;
        self.get_result(&url, "package_list").await
    }

    /// Fetches one package via `package_show`.
    pub async fn show_package(&self, name: &str) -> Result<CkanPackage, AppError> {
        let mut url = self.action_url("package_show")?;
        url.query_pairs_mut().append_pair("id", name);
        self.get_result(&url, "package_show").await
    }

    /// URL of the first `datastore_search` page for a resource.
    pub fn first_page_url(&self, resource_id: &str) -> Result<Url, AppError> {
        let mut url = self.action_url("datastore_search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("resource_id", resource_id);
            if let Some(limit) = self.page_limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    /// Fetches one page of datastore records.
    pub async fn datastore_search(&self, cursor: &PageCursor) -> Result<RecordPage, AppError> {
        let url = match cursor {
            PageCursor::Start { resource_id } => self.first_page_url(resource_id)?,
            PageCursor::Link(link) => {
                Url::parse(link).map_err(|e| AppError::InvalidUrl(format!("{link}: {e}")))?
            }
        };

        let result: DatastoreResult = self.get_result(&url, "datastore_search").await?;
        Ok(RecordPage {
            url: url.to_string(),
            records: result.records,
            links: PageLinks {
                next: result.links.next,
                prev: result.links.prev,
                start: result.links.start,
            },
            total: result.total,
        })
    }

    /// GETs a CKAN action with retries and unwraps its `result`.
    async fn get_result<T: DeserializeOwned>(
        &self,
        url: &Url,
        action: &str,
    ) -> Result<T, AppError> {
        let body = self.retry.run(action, || self.get_text(url)).await?;

        let response: CkanResponse<T> = serde_json::from_str(&body)?;
        if !response.success {
            return Err(AppError::MalformedResponse(format!(
                "CKAN {action} returned success: false"
            )));
        }
        response.result.ok_or(AppError::EmptyResponse)
    }

    /// One GET attempt. Non-success statuses become errors here so the
    /// retry policy can classify them.
    async fn get_text(&self, url: &Url) -> Result<String, AppError> {
        tracing::debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(AppError::RateLimitExceeded { retry_after });
        }
        if status.is_server_error() {
            return Err(AppError::UpstreamError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.text().await.map_err(|e| self.map_transport_error(e))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }
}

// =============================================================================
// Trait Implementation: PortalClient
// =============================================================================

impl vesta_core::traits::PortalClient for CkanClient {
    fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    async fn list_package_names(&self) -> Result<Vec<String>, AppError> {
        self.list_package_names().await
    }

    async fn show_package(&self, name: &str) -> Result<PackageMetadata, AppError> {
        Ok(self.show_package(name).await?.into_metadata())
    }

    async fn datastore_page(&self, cursor: &PageCursor) -> Result<RecordPage, AppError> {
        self.datastore_search(cursor).await
    }
}
