mod destination;
mod pipeline;
mod source;

pub use destination::*;
pub use pipeline::*;
pub use source::*;

use serde::Deserialize;

/// Top-level configuration for a close-etl service.
///
/// This is the shape deserialized by [`crate::load::load_config`] for the
/// runner binary: where to fetch from, where to load into, and how the
/// pipeline pages through the source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Source API connection settings.
    pub api: CloseApiConfig,
    /// Destination table store settings.
    pub destination: DestinationConfig,
    /// Pipeline behavior settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}
