//! Application-wide constants
//!
//! Centralized location for storage key names and timing values that are
//! used across multiple modules.

use std::time::Duration;

/// Default backend API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.brandlens.io/v1";

/// File name of the persistent key-value map inside the data dir
pub const LOCAL_STORE_FILE: &str = "local_store.json";

// Per-user storage base keys (scoped with `_{userId}` by UserScope)
pub const ANALYSIS_STATE_KEY: &str = "analysis_state";
pub const FIRST_ANALYSIS_KEY: &str = "first_analysis";
pub const ANALYSIS_TOAST_KEY: &str = "analysis_toast";

/// Legacy plaintext storage keys, consumed once by the migration-on-read
/// path and deleted afterwards.
pub mod legacy {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const SESSION_ID: &str = "session_id";
    pub const USER_ID: &str = "user_id";
    pub const APPLICATION_ID: &str = "application_id";
    pub const FIRST_NAME: &str = "first_name";
    pub const APPLICATIONS: &str = "applications";
    pub const PRODUCTS: &str = "products";
}

// Pipeline timing

/// Fixed dwell of the first pipeline step, regardless of backend state
pub const FIRST_STEP_DWELL: Duration = Duration::from_secs(10);

/// Dwell applied to steps 2-5 before each completes
pub const STEP_DWELL: Duration = Duration::from_secs(4);

/// Interval at which step 2 re-checks the backend readiness signal
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// How long a transient trigger-failure message stays visible
pub const ERROR_AUTOCLEAR: Duration = Duration::from_secs(5);

/// Default interval for the backend status poller
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(3);
