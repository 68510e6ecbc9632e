use serde::{Deserialize, Serialize};

pub const MAX_CONCURRENCY_ENV: &str = "DAGEXEC_MAX_CONCURRENCY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on task bodies running at the same time. Tasks waiting on
    /// their parents do not count against it. `None` runs every ready task
    /// at once.
    pub max_concurrency: Option<usize>,
}

impl ExecutorConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Defaults, capped by `DAGEXEC_MAX_CONCURRENCY` when it holds a positive
    /// integer.
    pub fn from_env() -> Self {
        Self {
            max_concurrency: std::env::var(MAX_CONCURRENCY_ENV)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok()),
        }
        .normalized()
    }

    /// A cap of zero would stall every run, so it is treated as no cap.
    pub fn normalized(mut self) -> Self {
        if self.max_concurrency == Some(0) {
            self.max_concurrency = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cap_by_default() {
        assert_eq!(ExecutorConfig::default().max_concurrency, None);
    }

    #[test]
    fn test_zero_concurrency_means_unbounded() {
        let config = ExecutorConfig::default().with_max_concurrency(0).normalized();
        assert_eq!(config.max_concurrency, None);

        let config = ExecutorConfig::default().with_max_concurrency(3).normalized();
        assert_eq!(config.max_concurrency, Some(3));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ExecutorConfig::default());

        let config: ExecutorConfig = serde_json::from_str(r#"{"max_concurrency": 2}"#).unwrap();
        assert_eq!(config.max_concurrency, Some(2));
    }
}
