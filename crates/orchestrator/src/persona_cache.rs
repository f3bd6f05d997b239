//! Agent persona resolver with a short-TTL cache
//!
//! Read-mostly: sessions resolve concurrently against the cached value;
//! refreshes swap the whole `Arc` so no partially published persona is ever
//! observable. When no persona is configured the built-in default keeps the
//! engine running.

use call_agent_core::AgentPersona;
use call_agent_persistence::PersonaStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CachedPersona {
    persona: Arc<AgentPersona>,
    fetched: Instant,
}

pub struct PersonaCache {
    store: Arc<dyn PersonaStore>,
    ttl: Duration,
    cached: RwLock<Option<CachedPersona>>,
}

impl PersonaCache {
    pub fn new(store: Arc<dyn PersonaStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// The active persona, from cache when fresh. Falls back to the stale
    /// cached value on store errors and to the built-in default when nothing
    /// is configured.
    pub async fn resolve(&self) -> Arc<AgentPersona> {
        if let Some(cached) = self.cached.read().as_ref() {
            if cached.fetched.elapsed() < self.ttl {
                return cached.persona.clone();
            }
        }

        match self.store.active().await {
            Ok(found) => {
                let persona = Arc::new(found.unwrap_or_else(|| {
                    tracing::debug!("No active persona configured; using built-in default");
                    AgentPersona::default()
                }));
                *self.cached.write() = Some(CachedPersona {
                    persona: persona.clone(),
                    fetched: Instant::now(),
                });
                persona
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persona lookup failed");
                match self.cached.read().as_ref() {
                    Some(stale) => stale.persona.clone(),
                    None => Arc::new(AgentPersona::default()),
                }
            }
        }
    }

    /// Drop the cached value so the next resolve hits the store.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_agent_persistence::PersistenceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        calls: AtomicUsize,
        persona: Option<AgentPersona>,
    }

    #[async_trait]
    impl PersonaStore for CountingStore {
        async fn active(&self) -> Result<Option<AgentPersona>, PersistenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.persona.clone())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl PersonaStore for FailingStore {
        async fn active(&self) -> Result<Option<AgentPersona>, PersistenceError> {
            Err(PersistenceError::Query("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_lookups_within_ttl() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
            persona: Some(AgentPersona::default()),
        });
        let cache = PersonaCache::new(store.clone(), Duration::from_secs(60));

        cache.resolve().await;
        cache.resolve().await;
        cache.resolve().await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_store_falls_back_to_default() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
            persona: None,
        });
        let cache = PersonaCache::new(store, Duration::from_secs(60));

        let persona = cache.resolve().await;
        assert_eq!(persona.agent_name, "AI Assistant");
        assert_eq!(persona.max_turns, 10);
    }

    #[tokio::test]
    async fn test_store_error_still_yields_a_persona() {
        let cache = PersonaCache::new(Arc::new(FailingStore), Duration::from_secs(60));
        let persona = cache.resolve().await;
        assert_eq!(persona.agent_name, "AI Assistant");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
            persona: Some(AgentPersona::default()),
        });
        let cache = PersonaCache::new(store.clone(), Duration::from_secs(60));

        cache.resolve().await;
        cache.invalidate();
        cache.resolve().await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
