//! Quota configuration store.
//!
//! Limits are looked up per (endpoint, identity). A missing limit means the
//! identity has no permission for that endpoint, it never means "unlimited".

use std::collections::HashMap;
use std::num::NonZeroU32;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::RequestKey;
use crate::error::{Result, StoreError, TurnstileError};

/// Default namespace for quota keys.
pub const DEFAULT_LIMIT_NAMESPACE: &str = "user-limit";

/// Maximum number of requests admitted per key within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct RateLimit(NonZeroU32);

impl RateLimit {
    /// Validate a configured limit. Zero, negative and out-of-range values
    /// are rejected.
    pub fn new(limit: i64) -> Result<Self> {
        u32::try_from(limit)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(TurnstileError::InvalidLimit(limit))
    }

    /// Parse a stored limit value.
    ///
    /// Returns `None` for anything that is not a positive integer.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|limit| Self::new(limit).ok())
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<i64> for RateLimit {
    type Error = TurnstileError;

    fn try_from(limit: i64) -> Result<Self> {
        Self::new(limit)
    }
}

impl From<RateLimit> for u32 {
    fn from(limit: RateLimit) -> Self {
        limit.get()
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup of configured limits.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Fetch the limit for a key.
    ///
    /// Absent and malformed values both yield `Ok(None)`. Only backend
    /// failures are errors.
    async fn get(&self, key: &RequestKey) -> std::result::Result<Option<RateLimit>, StoreError>;

    /// Store the limit for a key, replacing any previous value.
    async fn set(&self, key: &RequestKey, limit: RateLimit) -> std::result::Result<(), StoreError>;
}

/// In-process quota store.
///
/// Values are kept as strings under `"<namespace>-<endpoint>-<identity>"`, the
/// same shape a shared key-value backend holds them in, so malformed values
/// written by other tools are handled on read.
pub struct InMemoryQuotaStore {
    namespace: String,
    limits: RwLock<HashMap<String, String>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_LIMIT_NAMESPACE)
    }

    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            limits: RwLock::new(HashMap::new()),
        }
    }

    /// Store an unvalidated value, as an external admin tool might.
    pub fn insert_raw(&self, key: &RequestKey, raw: &str) {
        self.limits
            .write()
            .insert(key.namespaced(&self.namespace), raw.to_string());
    }

    /// Number of stored limits.
    pub fn len(&self) -> usize {
        self.limits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.read().is_empty()
    }
}

impl Default for InMemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, key: &RequestKey) -> std::result::Result<Option<RateLimit>, StoreError> {
        let storage_key = key.namespaced(&self.namespace);
        let raw = match self.limits.read().get(&storage_key) {
            Some(raw) => raw.clone(),
            None => return Ok(None),
        };

        let limit = RateLimit::parse(&raw);
        if limit.is_none() {
            warn!(
                key = %storage_key,
                value = %raw,
                "Ignoring malformed rate limit"
            );
        }
        Ok(limit)
    }

    async fn set(&self, key: &RequestKey, limit: RateLimit) -> std::result::Result<(), StoreError> {
        let storage_key = key.namespaced(&self.namespace);
        debug!(key = %storage_key, limit = %limit, "Setting rate limit");
        self.limits.write().insert(storage_key, limit.to_string());
        Ok(())
    }
}
