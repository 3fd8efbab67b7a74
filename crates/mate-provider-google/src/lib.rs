// # Google Cloud DNS Provider
//
// Zone provider for a Google Cloud DNS managed zone, speaking the Cloud DNS
// v1 REST API directly.
//
// ## Behavior
//
// - `list_current_records` pages through every record set in the zone
// - `apply_change` submits one change with all additions and deletions;
//   Cloud DNS applies it atomically
// - An empty change is never submitted
// - "alreadyExists" (HTTP 409) is reported as `Error::ProviderConflict`,
//   everything else as `ProviderQuery` / `ProviderWrite`
// - No retries and no caching; one call in, one result out
//
// ## TXT data
//
// Cloud DNS stores TXT data as quoted character strings. Values are quoted
// on the way out and unquoted on the way in, so the reconciler only ever
// sees bare marker values.
//
// ## Security
//
// - The access token never appears in logs or Debug output
// - The token is a short-lived OAuth2 bearer token with the
//   `ndev.clouddns.readwrite` scope, supplied by the caller
//
// ## API Reference
//
// - List record sets: GET `/projects/{project}/managedZones/{zone}/rrsets`
// - Create change:    POST `/projects/{project}/managedZones/{zone}/changes`

use async_trait::async_trait;
use mate_core::config::ProviderConfig;
use mate_core::traits::{ZoneProvider, ZoneProviderFactory};
use mate_core::{Change, Error, RecordSet, RecordType, Result, ZoneSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloud DNS v1 API base URL
pub const GOOGLE_DNS_API_BASE: &str = "https://dns.googleapis.com/dns/v1";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "google";

/// One resource record set as the API represents it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResourceRecordSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    rrdatas: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChangeRequest {
    additions: Vec<ResourceRecordSet>,
    deletions: Vec<ResourceRecordSet>,
}

impl From<&RecordSet> for ResourceRecordSet {
    fn from(record: &RecordSet) -> Self {
        let rrdatas = match record.record_type {
            RecordType::Txt => record.values.iter().map(|v| quote(v)).collect(),
            _ => record.values.clone(),
        };
        Self {
            name: record.name.clone(),
            record_type: record.record_type.as_str().to_string(),
            ttl: record.ttl,
            rrdatas,
        }
    }
}

impl From<ResourceRecordSet> for RecordSet {
    fn from(rrset: ResourceRecordSet) -> Self {
        let record_type = RecordType::from(rrset.record_type.as_str());
        let values = match record_type {
            RecordType::Txt => rrset.rrdatas.iter().map(|v| unquote(v).to_string()).collect(),
            _ => rrset.rrdatas,
        };
        RecordSet::new(rrset.name, record_type, values, rrset.ttl)
    }
}

fn quote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value.to_string()
    } else {
        format!("\"{}\"", value)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Google Cloud DNS zone provider
///
/// # Security
///
/// The Debug implementation does NOT expose the access token.
pub struct GoogleCloudDnsProvider {
    /// Project owning the managed zone
    project: String,

    /// Managed zone name
    zone: String,

    /// OAuth2 bearer token
    /// ⚠️ NEVER log this value
    access_token: String,

    /// API base URL
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for GoogleCloudDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCloudDnsProvider")
            .field("project", &self.project)
            .field("zone", &self.zone)
            .field("access_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoogleCloudDnsProvider {
    /// Create a new provider for one managed zone
    ///
    /// # Errors
    ///
    /// `Error::Config` if any parameter is empty or the HTTP client cannot
    /// be built.
    pub fn new(
        project: impl Into<String>,
        zone: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let project = project.into();
        let zone = zone.into();
        let access_token = access_token.into();

        if project.is_empty() {
            return Err(Error::config("Google project cannot be empty"));
        }
        if zone.is_empty() {
            return Err(Error::config("Google managed zone cannot be empty"));
        }
        if access_token.is_empty() {
            return Err(Error::config("Google access token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            project,
            zone,
            access_token,
            base_url: GOOGLE_DNS_API_BASE.to_string(),
            client,
        })
    }

    /// Point the provider at another API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn zone_url(&self) -> String {
        format!(
            "{}/projects/{}/managedZones/{}",
            self.base_url, self.project, self.zone
        )
    }

    /// Fetch one page of record sets
    ///
    /// ```http
    /// GET /projects/:project/managedZones/:zone/rrsets?pageToken=...
    /// Authorization: Bearer <token>
    /// ```
    async fn list_page(&self, page_token: Option<&str>) -> Result<ListResponse> {
        let url = format!("{}/rrsets", self.zone_url());
        let mut request = self.client.get(&url).bearer_auth(&self.access_token);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::query(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::query(
                    PROVIDER_NAME,
                    format!(
                        "Authentication failed: Invalid access token or insufficient permissions. Status: {}",
                        status
                    ),
                ),
                404 => Error::query(
                    PROVIDER_NAME,
                    format!("Managed zone not found: {}/{}", self.project, self.zone),
                ),
                429 => Error::query(
                    PROVIDER_NAME,
                    format!("Rate limit exceeded. Status: {}", status),
                ),
                _ => Error::query(
                    PROVIDER_NAME,
                    format!("Listing record sets failed: {} - {}", status, error_text),
                ),
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::query(PROVIDER_NAME, format!("Failed to parse response: {}", e)))
    }
}

/// Map a failed change submission to an error
fn change_error(status: reqwest::StatusCode, error_text: &str) -> Error {
    if status.as_u16() == 409 || error_text.contains("alreadyExists") {
        return Error::conflict(
            PROVIDER_NAME,
            format!("Record already exists: {}", error_text),
        );
    }

    match status.as_u16() {
        401 | 403 => Error::write(
            PROVIDER_NAME,
            format!(
                "Authentication failed: Invalid access token or insufficient permissions. Status: {}",
                status
            ),
        ),
        412 => Error::write(
            PROVIDER_NAME,
            format!("Change rejected, zone does not match: {}", error_text),
        ),
        429 => Error::write(
            PROVIDER_NAME,
            format!("Rate limit exceeded. Status: {}", status),
        ),
        500..=599 => Error::write(
            PROVIDER_NAME,
            format!("Cloud DNS server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::write(
            PROVIDER_NAME,
            format!("Change failed: {} - {}", status, error_text),
        ),
    }
}

#[async_trait]
impl ZoneProvider for GoogleCloudDnsProvider {
    async fn list_current_records(&self) -> Result<ZoneSnapshot> {
        let mut snapshot = ZoneSnapshot::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            tracing::debug!("Fetched {} record set(s) from {}", page.rrsets.len(), self.zone);

            for rrset in page.rrsets {
                snapshot.insert(rrset.into());
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    if page_token.as_deref() == Some(next.as_str()) {
                        return Err(Error::query(
                            PROVIDER_NAME,
                            "Pagination did not advance",
                        ));
                    }
                    page_token = Some(next);
                }
                _ => break,
            }
        }

        Ok(snapshot)
    }

    /// Submit one change
    ///
    /// ```http
    /// POST /projects/:project/managedZones/:zone/changes
    /// {
    ///   "additions": [{"name": ..., "type": ..., "ttl": ..., "rrdatas": [...]}],
    ///   "deletions": [...]
    /// }
    /// ```
    async fn apply_change(&self, change: &Change) -> Result<()> {
        if change.is_empty() {
            tracing::debug!("Empty change for {}, not submitting", self.zone);
            return Ok(());
        }

        let body = ChangeRequest {
            additions: change.additions.iter().map(ResourceRecordSet::from).collect(),
            deletions: change.deletions.iter().map(ResourceRecordSet::from).collect(),
        };

        tracing::info!(
            "Submitting change to {}: {} addition(s), {} deletion(s)",
            self.zone,
            body.additions.len(),
            body.deletions.len()
        );

        let url = format!("{}/changes", self.zone_url());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::write(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(change_error(status, &error_text));
        }

        tracing::debug!("Change for {} accepted", self.zone);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Google Cloud DNS providers
pub struct GoogleFactory;

impl ZoneProviderFactory for GoogleFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ZoneProvider>> {
        match config {
            ProviderConfig::Google {
                project,
                zone,
                access_token,
                base_url,
            } => {
                let provider = GoogleCloudDnsProvider::new(
                    project.clone(),
                    zone.clone(),
                    access_token.clone(),
                )?;
                let provider = match base_url {
                    Some(url) => provider.with_base_url(url.clone()),
                    None => provider,
                };
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for Google provider")),
        }
    }
}

/// Register the Google provider with a registry
///
/// # Example
///
/// ```rust
/// use mate_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// mate_provider_google::register(&registry);
/// assert!(registry.has_provider("google"));
/// ```
pub fn register(registry: &mate_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(GoogleFactory));
}
