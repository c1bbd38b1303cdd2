//! Shared filesystem state
//!
//! One context object owns every piece of mutable state the filesystem needs:
//! the namespace's name tables and the stream cache's tables. It is cheap to
//! clone and is handed to the mount adapter and the lifecycle controller.

use std::sync::Arc;

use catalog::Catalog;

use crate::namespace::Namespace;
use crate::stream_cache::{CacheConfig, StreamCache};

#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

struct StateInner {
    catalog: Arc<dyn Catalog>,
    namespace: Namespace,
    cache: StreamCache,
}

impl State {
    pub fn new(catalog: Arc<dyn Catalog>, cache_config: CacheConfig) -> Self {
        let namespace = Namespace::new(Arc::clone(&catalog));
        let cache = StreamCache::new(Arc::clone(&catalog), cache_config);
        Self {
            inner: Arc::new(StateInner {
                catalog,
                namespace,
                cache,
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn cache(&self) -> &StreamCache {
        &self.inner.cache
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("cache", &self.inner.cache)
            .finish()
    }
}
