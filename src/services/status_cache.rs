//! Cached per-bucket booking counts for the dashboard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::AppResult;
use crate::model::booking::{StatusBucket, StatusCount};
use crate::store::BookingStore;

#[derive(Default)]
struct Entries {
    counts: HashMap<StatusBucket, (i64, Instant)>,
    /// Bumped on every invalidation so a count computed before it is never stored after it.
    generation: u64,
}

pub struct StatusCountCache {
    store: Arc<dyn BookingStore>,
    ttl: Duration,
    entries: Mutex<Entries>,
}

impl StatusCountCache {
    pub fn new(store: Arc<dyn BookingStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub async fn get_counts(&self) -> AppResult<Vec<StatusCount>> {
        let mut result = Vec::with_capacity(StatusBucket::ALL.len());

        for bucket in StatusBucket::ALL {
            let (cached, generation) = {
                let entries = self.entries.lock();
                let fresh = entries
                    .counts
                    .get(&bucket)
                    .filter(|(_, at)| at.elapsed() < self.ttl)
                    .map(|(count, _)| *count);
                (fresh, entries.generation)
            };

            let count = match cached {
                Some(count) => count,
                None => {
                    let count = self.store.count_bucket(bucket).await?;
                    let mut entries = self.entries.lock();
                    if entries.generation == generation {
                        entries.counts.insert(bucket, (count, Instant::now()));
                    }
                    count
                }
            };

            result.push(StatusCount { status: bucket, count });
        }

        Ok(result)
    }

    /// Drops every bucket in one step.
    pub fn invalidate(&self) {
        let mut entries = self.entries.lock();
        entries.counts.clear();
        entries.generation = entries.generation.wrapping_add(1);
        debug!("status counts invalidated");
    }
}
