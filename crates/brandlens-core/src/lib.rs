pub mod api;
pub mod constants;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod store;

pub use session::{LoginProfile, Session};
pub use store::{AnalysisState, AnalysisStore};

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub api_base_url: String,
    /// Shared secret keying the credential cipher and the physical key hash.
    pub storage_secret: String,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P, storage_secret: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            api_base_url: constants::DEFAULT_API_BASE_URL.to_string(),
            storage_secret: storage_secret.into(),
        }
    }

    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new("brandlens_data", "brandlens-local")
    }
}
