use std::sync::Arc;

use crate::cache::EntityCache;
use crate::invalidation::{InvalidationGraph, MutationDescriptor};

/// Runs writes and keeps the cache honest afterwards.
pub struct MutationCoordinator {
    cache: Arc<EntityCache>,
    graph: InvalidationGraph,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self {
            cache,
            graph: InvalidationGraph,
        }
    }

    /// Awaits `call` (a request through the gateway). On success every key the
    /// graph names for `descriptor` is `Invalid` by the time this returns.
    /// Errors come back untouched and invalidate nothing.
    pub async fn perform<R, E, Fut>(
        &self,
        descriptor: &MutationDescriptor,
        call: Fut,
    ) -> Result<R, E>
    where
        Fut: Future<Output = Result<R, E>>,
    {
        let result = call.await;
        match &result {
            Ok(_) => {
                self.invalidate(descriptor);
            }
            Err(_) => log::debug!("{:?} failed, cache left as is", descriptor.kind),
        }
        result
    }

    /// Applies the graph without performing anything. Useful after a write
    /// that timed out and may or may not have reached the server.
    pub fn invalidate(&self, descriptor: &MutationDescriptor) -> usize {
        let keys = self.graph.resolve(descriptor);
        let changed: usize = keys.iter().map(|key| self.cache.invalidate(key)).sum();
        log::debug!(
            "{:?} invalidated {changed} entries under {} keys",
            descriptor.kind,
            keys.len()
        );
        changed
    }
}
