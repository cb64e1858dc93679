use serde::Deserialize;

/// Default number of rows requested per API page.
const DEFAULT_PAGE_SIZE: u64 = 100;

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Pipeline behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of rows requested per page, for both fetch strategies.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Ceiling on concurrently in-flight page requests during windowed
    /// fetches. `None` launches every page at once.
    #[serde(default)]
    pub max_concurrent_pages: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrent_pages: None,
        }
    }
}
