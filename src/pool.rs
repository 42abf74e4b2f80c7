//! Per-generation interning of instances.
//!
//! Entries are weak: the pool never keeps an instance alive. Dead entries are
//! pruned whenever their bucket is visited, and empty buckets are swept once
//! the table has doubled since the last sweep.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::instance::{Instance, InstanceData};
use crate::value::Value;
use crate::variant::Variant;

/// Bucket count below which the table is never swept.
const SWEEP_FLOOR: usize = 64;

#[derive(Default)]
pub(crate) struct Pool {
    buckets: DashMap<u64, SmallVec<[Weak<InstanceData>; 1]>>,
    /// Buckets left by the last sweep.
    baseline: AtomicUsize,
    /// Buckets created since the last sweep.
    grown: AtomicUsize,
}

impl Pool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the live instance of `variant` with exactly `values`, or build one
    /// with `create` and remember it.
    pub(crate) fn intern(
        &self,
        variant: &Variant,
        values: Vec<Value>,
        create: impl FnOnce(Vec<Value>) -> Instance,
    ) -> Instance {
        let key = Self::key(variant, &values);
        let mut fresh = false;
        let mut bucket = self.buckets.entry(key).or_insert_with(|| {
            fresh = true;
            SmallVec::new()
        });
        bucket.retain(|weak| weak.strong_count() > 0);
        for weak in bucket.iter() {
            let Some(existing) = Instance::upgrade(weak) else {
                continue;
            };
            if existing.variant() == variant && existing.values() == values.as_slice() {
                tracing::trace!(variant = %variant.name(), "Pool hit");
                return existing;
            }
        }
        let instance = create(values);
        bucket.push(instance.downgrade());
        // The shard lock must be released before sweeping.
        drop(bucket);
        if fresh {
            self.grew();
        }
        instance
    }

    fn grew(&self) {
        let grown = self.grown.fetch_add(1, Ordering::Relaxed) + 1;
        if grown >= self.baseline.load(Ordering::Relaxed).max(SWEEP_FLOOR) {
            self.sweep();
        }
    }

    /// Drop dead entries and the buckets they leave empty.
    fn sweep(&self) {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.retain(|weak| weak.strong_count() > 0);
            !bucket.is_empty()
        });
        let after = self.buckets.len();
        self.baseline.store(after, Ordering::Relaxed);
        self.grown.store(0, Ordering::Relaxed);
        tracing::trace!(before, after, "Swept instance pool");
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of live pooled instances.
    pub(crate) fn live(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.iter().filter(|weak| weak.strong_count() > 0).count())
            .sum()
    }

    fn key(variant: &Variant, values: &[Value]) -> u64 {
        let mut hasher = DefaultHasher::new();
        variant.addr().hash(&mut hasher);
        values.hash(&mut hasher);
        hasher.finish()
    }
}
