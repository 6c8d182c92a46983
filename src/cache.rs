use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Cache the host hands to every hook invocation.
#[async_trait]
pub trait HookCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);
}

/// For hosts without a shared cache. Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHookCache;

#[async_trait]
impl HookCache for NullHookCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) {}
}
