//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{
    CleanupMode, EvaluationStrategy, QuotaStore, RateLimit, RequestKey, SlidingWindow,
    DEFAULT_LIMIT_NAMESPACE, DEFAULT_REQUEST_NAMESPACE,
};

/// Prefix of environment variables overriding file configuration,
/// e.g. `TURNSTILE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Longest supported window.
const MAX_WINDOW_SECS: u64 = 86_400;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Limits loaded into the quota store at startup
    #[serde(default)]
    pub quotas: Vec<QuotaSeed>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Simulated processing time of the demo endpoint, in milliseconds
    #[serde(default = "default_simulate_delay_ms")]
    pub simulate_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            simulate_delay_ms: default_simulate_delay_ms(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_simulate_delay_ms() -> u64 {
    1000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Trailing window size in seconds, shared by every key
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How decisions are evaluated
    #[serde(default)]
    pub strategy: EvaluationStrategy,

    /// When stale log entries are pruned
    #[serde(default)]
    pub cleanup: CleanupMode,

    /// Background sweep interval in seconds, 0 disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Namespace prefix of quota keys
    #[serde(default = "default_limit_namespace")]
    pub limit_namespace: String,

    /// Namespace prefix of request log keys
    #[serde(default = "default_request_namespace")]
    pub request_namespace: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            strategy: EvaluationStrategy::default(),
            cleanup: CleanupMode::default(),
            sweep_interval_secs: default_sweep_interval(),
            limit_namespace: default_limit_namespace(),
            request_namespace: default_request_namespace(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_limit_namespace() -> String {
    DEFAULT_LIMIT_NAMESPACE.to_string()
}

fn default_request_namespace() -> String {
    DEFAULT_REQUEST_NAMESPACE.to_string()
}

impl RateLimitingConfig {
    pub fn window(&self) -> SlidingWindow {
        SlidingWindow::new(Duration::from_secs(self.window_secs))
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// A limit to seed into the quota store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSeed {
    /// Endpoint path, normalized before use
    pub endpoint: String,
    /// Identity token the limit applies to
    pub identity: String,
    /// Requests allowed per window; zero or negative is rejected on load
    pub limit: RateLimit,
}

impl QuotaSeed {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.endpoint, &self.identity)
    }
}

impl TurnstileConfig {
    /// Load configuration from a file, layered with `TURNSTILE__*`
    /// environment variables.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let config: TurnstileConfig = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configured quotas into `store`. Returns how many were written.
    pub async fn seed_quotas(&self, store: &dyn QuotaStore) -> Result<usize> {
        for seed in &self.quotas {
            let key = seed.key();
            store.set(&key, seed.limit).await?;
            info!(key = %key, limit = %seed.limit, "Seeded rate limit");
        }
        Ok(self.quotas.len())
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        let window = self.rate_limiting.window_secs;
        if window == 0 || window > MAX_WINDOW_SECS {
            return Err(TurnstileError::Config(format!(
                "window_secs must be between 1 and {}, got {}",
                MAX_WINDOW_SECS, window
            )));
        }

        for namespace in [
            &self.rate_limiting.limit_namespace,
            &self.rate_limiting.request_namespace,
        ] {
            if namespace.is_empty() {
                return Err(TurnstileError::Config("key namespaces must not be empty".into()));
            }
        }

        if self.rate_limiting.limit_namespace == self.rate_limiting.request_namespace {
            return Err(TurnstileError::Config(
                "limit_namespace and request_namespace must differ".into(),
            ));
        }

        if let Some(seed) = self.quotas.iter().find(|seed| seed.identity.is_empty()) {
            return Err(TurnstileError::Config(format!(
                "quota for {} has an empty identity",
                seed.endpoint
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.http_addr.port(), 3000);
        assert_eq!(config.server.simulate_delay_ms, 1000);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.strategy, EvaluationStrategy::RetryDelay);
        assert_eq!(config.rate_limiting.cleanup, CleanupMode::Eager);
        assert_eq!(config.rate_limiting.limit_namespace, "user-limit");
        assert_eq!(config.rate_limiting.request_namespace, "user-request");
        assert_eq!(config.rate_limiting.sweep_interval(), Some(Duration::from_secs(60)));
        assert!(config.quotas.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:8080"
  simulate_delay_ms: 0
rate_limiting:
  window_secs: 30
  strategy: count_only
  cleanup: lazy
  sweep_interval_secs: 0
quotas:
  - endpoint: /api/simulate/
    identity: sample.bearer.token.123
    limit: 3
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.rate_limiting.window().size(), Duration::from_secs(30));
        assert_eq!(config.rate_limiting.strategy, EvaluationStrategy::CountOnly);
        assert_eq!(config.rate_limiting.cleanup, CleanupMode::Lazy);
        assert_eq!(config.rate_limiting.sweep_interval(), None);
        assert_eq!(config.quotas.len(), 1);
        assert_eq!(config.quotas[0].limit.get(), 3);
    }

    #[test]
    fn test_non_positive_seed_limit_rejected() {
        for limit in ["0", "-1"] {
            let yaml = format!(
                "quotas:\n  - endpoint: /api/simulate\n    identity: token\n    limit: {}\n",
                limit
            );
            let result = TurnstileConfig::from_yaml(&yaml);
            assert!(
                matches!(result, Err(TurnstileError::Config(_))),
                "limit {} should be rejected",
                limit
            );
        }
    }

    #[test]
    fn test_invalid_window_rejected() {
        let result = TurnstileConfig::from_yaml("rate_limiting:\n  window_secs: 0\n");
        assert!(matches!(result, Err(TurnstileError::Config(_))));

        let result = TurnstileConfig::from_yaml("rate_limiting:\n  window_secs: 90000\n");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_clashing_namespaces_rejected() {
        let yaml = "rate_limiting:\n  limit_namespace: same\n  request_namespace: same\n";
        assert!(TurnstileConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let yaml = "rate_limiting:\n  strategy: token_bucket\n";
        assert!(TurnstileConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-{}.yaml", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "rate_limiting:\n  window_secs: 15\nquotas:\n  - endpoint: /a\n    identity: t\n    limit: 2").unwrap();
        }

        let config = TurnstileConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rate_limiting.window_secs, 15);
        assert_eq!(config.quotas[0].limit.get(), 2);
    }

    #[tokio::test]
    async fn test_seed_quotas() {
        let yaml = r#"
quotas:
  - endpoint: /api/simulate/
    identity: alice
    limit: 3
  - endpoint: /api/other?debug=1
    identity: bob
    limit: 10
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        let store = crate::ratelimit::InMemoryQuotaStore::new();

        assert_eq!(config.seed_quotas(&store).await.unwrap(), 2);

        let alice = store.get(&RequestKey::new("/api/simulate", "alice")).await.unwrap();
        assert_eq!(alice.map(RateLimit::get), Some(3));
        let bob = store.get(&RequestKey::new("/api/other", "bob")).await.unwrap();
        assert_eq!(bob.map(RateLimit::get), Some(10));
    }

    #[test]
    fn test_from_missing_file() {
        let result = TurnstileConfig::from_file("/nonexistent/turnstile.yaml");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }
}
