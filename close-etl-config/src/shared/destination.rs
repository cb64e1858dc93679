use serde::Deserialize;

use crate::SerializableSecretString;

/// Configuration for supported table-store destinations.
///
/// Each variant corresponds to a table store the pipeline can load into. This
/// intentionally does not implement `Serialize` to avoid leaking the service
/// account key into serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// In-memory destination, for tests and local development.
    Memory,
    /// Google BigQuery destination.
    BigQuery {
        /// Google Cloud project identifier.
        project_id: String,
        /// BigQuery dataset holding the staging and canonical tables.
        dataset_id: String,
        /// Service account key for authenticating with BigQuery.
        service_account_key: SerializableSecretString,
    },
}
