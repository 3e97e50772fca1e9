// Global configuration constants - single source of truth

pub struct Config;

impl Config {
    // Classifier
    pub const CLASSIFIER_URL: &'static str = "http://127.0.0.1:5000";
    pub const CLASSIFIER_TIMEOUT_SECS: u64 = 30;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB
    pub const USER_AGENT: &'static str = "RustMoodmap/0.1";

    // Pipelines
    pub const MAX_IN_FLIGHT: usize = 16;

    // Store
    pub const STORE_FILE_NAME: &'static str = "moodmap.redb";
    pub const WRITER_QUEUE_CAPACITY: usize = 1024;
}

/// Runtime settings for a tracking session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub classifier_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub data_dir: String,
    pub max_in_flight: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            classifier_url: Config::CLASSIFIER_URL.to_string(),
            timeout_secs: Config::CLASSIFIER_TIMEOUT_SECS,
            user_agent: Config::USER_AGENT.to_string(),
            data_dir: "./data".to_string(),
            max_in_flight: Config::MAX_IN_FLIGHT,
        }
    }
}
