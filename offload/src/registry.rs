//! Pools cached by a stable key, so callers that agree on a key share one
//! pool instead of each starting their own.

use std::collections::HashMap;
use std::sync::Arc;

use offload_api::TaskExecutor;
use tokio::sync::Mutex;

use crate::config::{PoolConfig, PoolOptions};
use crate::error::PoolError;
use crate::isolate::{IsolateFactory, ThreadIsolateFactory};
use crate::pool::{Pool, PoolExitResult};

pub struct PoolRegistry {
    defaults: PoolConfig,
    factory: Arc<dyn IsolateFactory>,
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl PoolRegistry {
    /// Every pool runs `executor` on thread isolates.
    pub fn new(defaults: PoolConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        Self::with_factory(defaults, Arc::new(ThreadIsolateFactory::new(executor)))
    }

    pub fn with_factory(defaults: PoolConfig, factory: Arc<dyn IsolateFactory>) -> Self {
        Self {
            defaults,
            factory,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &PoolConfig {
        &self.defaults
    }

    /// Returns the pool cached under `key`, creating it from the defaults
    /// merged with `options` if there is none. A disposed pool is replaced.
    ///
    /// `options` only apply when the pool is created.
    pub async fn get_or_create(&self, key: &str, options: &PoolOptions) -> Result<Arc<Pool>, PoolError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(key) {
            if !pool.is_disposed() {
                return Ok(Arc::clone(pool));
            }
            tracing::debug!(key, "replacing disposed pool");
        }

        let config = self.defaults.merge(options);
        let pool = Arc::new(Pool::with_factory(config, Arc::clone(&self.factory))?);
        tracing::debug!(key, pool = %pool.id(), "registered pool");
        pools.insert(key.to_string(), Arc::clone(&pool));
        Ok(pool)
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Pool>> {
        self.pools.lock().await.get(key).cloned()
    }

    /// Forgets the pool under `key` without disposing it.
    pub async fn remove(&self, key: &str) -> Option<Arc<Pool>> {
        self.pools.lock().await.remove(key)
    }

    /// Disposes and forgets every pool.
    pub async fn dispose_all(&self) -> PoolExitResult {
        let pools = {
            let mut pools = self.pools.lock().await;
            pools.drain().collect::<Vec<_>>()
        };

        let mut result = PoolExitResult::default();
        for (key, pool) in pools {
            let exit = pool.dispose().await;
            if exit.force_exited {
                tracing::warn!(key = %key, "pool needed a forced exit");
            }
            result.force_exited |= exit.force_exited;
        }
        result
    }

    pub async fn len(&self) -> usize {
        self.pools.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.lock().await.is_empty()
    }
}
