use std::time::Duration;

pub const DEFAULT_AUTO_STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub const MIN_RECORD_SECONDS: u64 = 1;
pub const MAX_RECORD_SECONDS: u64 = 30;
pub const DEFAULT_RECORD_SECONDS: u64 = 4;

pub const DEFAULT_LOG_CAPACITY: usize = 150_000;

pub const MIN_RESULTS_LIMIT: usize = 100;
pub const MAX_RESULTS_LIMIT: usize = 10_000;
pub const DEFAULT_RESULTS_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    pub auto_step_timeout: Duration,
    pub record_time_limit: Duration,
    pub log_capacity: usize,
    pub results_limit: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            auto_step_timeout: DEFAULT_AUTO_STEP_TIMEOUT,
            record_time_limit: Duration::from_secs(DEFAULT_RECORD_SECONDS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            results_limit: DEFAULT_RESULTS_LIMIT,
        }
    }
}

impl TraceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_step_timeout(mut self, timeout: Duration) -> Self {
        self.auto_step_timeout = timeout;
        self
    }

    pub fn with_record_seconds(mut self, seconds: u64) -> Self {
        self.record_time_limit = Duration::from_secs(clamp_record_seconds(seconds));
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    pub fn with_results_limit(mut self, limit: usize) -> Self {
        self.results_limit = clamp_results_limit(limit);
        self
    }
}

pub fn clamp_record_seconds(seconds: u64) -> u64 {
    seconds.clamp(MIN_RECORD_SECONDS, MAX_RECORD_SECONDS)
}

pub fn clamp_results_limit(limit: usize) -> usize {
    limit.clamp(MIN_RESULTS_LIMIT, MAX_RESULTS_LIMIT)
}
