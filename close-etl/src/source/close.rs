//! Close REST API client.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{ApiSource, PageFilter, PageResponse};

/// A client for the Close REST API.
///
/// Holds one [`reqwest::Client`] whose connection pool is shared by every
/// page request of a run, including the concurrent fan-out phase.
#[derive(Clone)]
pub struct CloseApiClient {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl CloseApiClient {
    /// Creates a new client for the given base URL and API key.
    ///
    /// The key is used as the basic-auth username with an empty password,
    /// which is the API's authentication convention.
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

impl ApiSource for CloseApiClient {
    async fn fetch_page(
        &self,
        endpoint: &str,
        filter: Option<PageFilter<'_>>,
        limit: u64,
        skip: u64,
    ) -> EtlResult<PageResponse> {
        let url = format!("{}/{}/", self.base_url, endpoint);

        let mut request = self
            .client
            .get(&url)
            .basic_auth(self.api_key.expose_secret(), Some(""))
            .query(&[("_limit", limit), ("_skip", skip)]);

        if let Some(filter) = filter {
            request = request.query(&[(
                "query",
                filter.window.filter_expression(filter.increment_key),
            )]);
        }

        debug!(endpoint, limit, skip, "fetching page");

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(etl_error!(
                ErrorKind::FetchFailed,
                "API returned an error status",
                format!("{status} from `{url}` at offset {skip}")
            ));
        }

        Ok(response.json::<PageResponse>().await?)
    }
}

impl fmt::Debug for CloseApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
