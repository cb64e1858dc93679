use serde::Deserialize;

use crate::SerializableSecretString;

/// Default base URL of the Close REST API.
const DEFAULT_BASE_URL: &str = "https://api.close.com/api/v1";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

/// Connection settings for the Close REST API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CloseApiConfig {
    /// Base URL of the API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key used as the basic-auth username; the password is empty.
    /// Sensitive and redacted in debug output.
    pub api_key: SerializableSecretString,
}
