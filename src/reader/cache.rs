use crate::archive::Cluster;
use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Default number of decoded clusters kept in memory
pub const DEFAULT_CLUSTER_CACHE_SIZE: usize = 16;

/// Decoded clusters shared between readers of one archive
///
/// Blobs handed out by a cluster keep its buffer alive, so evicting a
/// cluster never invalidates content already returned to callers.
pub struct ClusterCache {
    clusters: Mutex<LruCache<u32, Arc<Cluster>>>,
    max_size: Mutex<usize>,
}

impl ClusterCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            clusters: Mutex::new(LruCache::new(capacity(max_size))),
            max_size: Mutex::new(max_size),
        }
    }

    pub fn max_size(&self) -> usize {
        *self.max_size.lock()
    }

    /// Change the capacity; a size of 0 disables caching
    pub fn set_max_size(&self, max_size: usize) {
        let mut clusters = self.clusters.lock();
        if max_size == 0 {
            clusters.clear();
        }
        clusters.resize(capacity(max_size));
        *self.max_size.lock() = max_size;
    }

    pub fn len(&self) -> usize {
        self.clusters.lock().len()
    }

    /// Return cluster `number`, decoding it with `load` on a miss
    ///
    /// The lock is not held while decoding; two threads missing on the same
    /// cluster both decode it and the later insert wins.
    pub fn get_or_load<F>(&self, number: u32, load: F) -> Result<Arc<Cluster>>
    where
        F: FnOnce() -> Result<Cluster>,
    {
        if let Some(cluster) = self.clusters.lock().get(&number) {
            return Ok(Arc::clone(cluster));
        }
        trace!(cluster = number, "Cluster cache miss");
        let cluster = Arc::new(load()?);
        if self.max_size() > 0 {
            self.clusters.lock().put(number, Arc::clone(&cluster));
        }
        Ok(cluster)
    }
}

fn capacity(max_size: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN)
}
