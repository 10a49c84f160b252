//! Grouping records by their routed shard
//!
//! [`ShardPartitioner::partition`] is the single-pass form. Producers running
//! in parallel share a [`ConcurrentPartitioner`] instead and call
//! [`ConcurrentPartitioner::finish`] once every producer is done.

use shardline_common::Result;
use std::sync::Mutex;

use crate::executor::BatchJob;
use crate::hasher::CompositeKey;
use crate::router::{ShardRouter, ShardTarget};

/// Records grouped per shard, one bucket per target in ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardBuckets<R> {
    buckets: Vec<Vec<R>>,
}

impl<R> ShardBuckets<R> {
    fn with_shards(shard_count: u32) -> Self {
        Self {
            buckets: (0..shard_count).map(|_| Vec::new()).collect(),
        }
    }

    /// Number of buckets, always the router's shard count
    pub fn shard_count(&self) -> usize {
        self.buckets.len()
    }

    /// Records bucketed for `target`, empty for unknown targets
    pub fn get(&self, target: ShardTarget) -> &[R] {
        self.buckets
            .get(target.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShardTarget, &[R])> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, bucket)| (ShardTarget::new(i as u32), bucket.as_slice()))
    }

    /// Total records across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Vec::len).collect()
    }

    pub fn into_buckets(self) -> Vec<(ShardTarget, Vec<R>)> {
        self.buckets
            .into_iter()
            .enumerate()
            .map(|(i, bucket)| (ShardTarget::new(i as u32), bucket))
            .collect()
    }

    /// One job per shard, including shards that received no records
    pub fn into_jobs(self, chunk_size: usize) -> Result<Vec<BatchJob<R>>> {
        self.into_buckets()
            .into_iter()
            .map(|(target, records)| BatchJob::new(target, records, chunk_size))
            .collect()
    }
}

/// Groups records by the shard their key routes to
#[derive(Debug, Clone, Copy)]
pub struct ShardPartitioner {
    router: ShardRouter,
}

impl ShardPartitioner {
    pub fn new(router: ShardRouter) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Route every record once and append it to its shard's bucket
    ///
    /// Order inside a bucket is the order records were presented. Fails on
    /// the first record whose key cannot be hashed.
    pub fn partition<R, I, F>(&self, records: I, key_of: F) -> Result<ShardBuckets<R>>
    where
        I: IntoIterator<Item = R>,
        F: Fn(&R) -> CompositeKey,
    {
        let mut buckets = ShardBuckets::with_shards(self.router.shard_count().get());
        for record in records {
            let target = self.router.route_key(&key_of(&record))?;
            buckets.buckets[target.index()].push(record);
        }
        Ok(buckets)
    }

    /// Shared builder for producers running in parallel
    pub fn concurrent<R>(&self) -> ConcurrentPartitioner<R> {
        ConcurrentPartitioner::new(self.router)
    }
}

/// Single-pass partitioning with a throwaway partitioner
pub fn partition<R, I, F>(records: I, key_of: F, router: &ShardRouter) -> Result<ShardBuckets<R>>
where
    I: IntoIterator<Item = R>,
    F: Fn(&R) -> CompositeKey,
{
    ShardPartitioner::new(*router).partition(records, key_of)
}

/// Partitioner that many producers can append to through a shared reference
///
/// Each bucket has its own lock, so producers only contend when they hit the
/// same shard. Records from one producer keep their relative order; order
/// between producers is whatever order they won the lock in.
#[derive(Debug)]
pub struct ConcurrentPartitioner<R> {
    router: ShardRouter,
    buckets: Vec<Mutex<Vec<R>>>,
}

impl<R> ConcurrentPartitioner<R> {
    pub fn new(router: ShardRouter) -> Self {
        let buckets = (0..router.shard_count().get())
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        Self { router, buckets }
    }

    /// Route and append one record
    pub fn push(&self, key: &CompositeKey, record: R) -> Result<ShardTarget> {
        let target = self.router.route_key(key)?;
        self.bucket(target).push(record);
        Ok(target)
    }

    /// Route a producer's whole batch, then append it with one lock per shard
    ///
    /// Nothing is appended when any key in the batch fails to hash.
    pub fn extend<I, F>(&self, records: I, key_of: F) -> Result<usize>
    where
        I: IntoIterator<Item = R>,
        F: Fn(&R) -> CompositeKey,
    {
        let local = ShardPartitioner::new(self.router).partition(records, key_of)?;
        let added = local.len();
        for (target, records) in local.into_buckets() {
            if !records.is_empty() {
                self.bucket(target).extend(records);
            }
        }
        Ok(added)
    }

    /// Consume the builder once every producer has finished
    pub fn finish(self) -> ShardBuckets<R> {
        ShardBuckets {
            buckets: self
                .buckets
                .into_iter()
                .map(|bucket| bucket.into_inner().unwrap_or_else(|e| e.into_inner()))
                .collect(),
        }
    }

    fn bucket(&self, target: ShardTarget) -> std::sync::MutexGuard<'_, Vec<R>> {
        // A producer that panicked mid-append leaves a valid Vec behind.
        self.buckets[target.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardline_common::ShardlineError;
    use std::sync::Arc;

    fn key(id: &u32) -> CompositeKey {
        CompositeKey::single(id.to_string())
    }

    #[test]
    fn test_known_keys_split_across_two_shards() {
        let router = ShardRouter::hash_modulo(2).unwrap();
        let buckets = partition(vec![3u32, 7728, 1024], key, &router).unwrap();

        assert_eq!(buckets.get(ShardTarget::new(0)), &[7728]);
        assert_eq!(buckets.get(ShardTarget::new(1)), &[3, 1024]);
    }

    #[test]
    fn test_always_produces_every_bucket() {
        let router = ShardRouter::hash_modulo(5).unwrap();
        let buckets = partition(vec![1u32], key, &router).unwrap();

        assert_eq!(buckets.shard_count(), 5);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.bucket_sizes().iter().filter(|n| **n == 0).count(), 4);

        let empty = partition(Vec::<u32>::new(), key, &router).unwrap();
        assert_eq!(empty.shard_count(), 5);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_bucket_order_follows_input_order() {
        let router = ShardRouter::hash_modulo(3).unwrap();
        let input: Vec<u32> = (0..300).collect();
        let buckets = partition(input, key, &router).unwrap();

        for (_, bucket) in buckets.iter() {
            assert!(bucket.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_empty_key_aborts_partitioning() {
        let router = ShardRouter::hash_modulo(2).unwrap();
        let result = partition(vec!["a", "", "b"], |s| CompositeKey::single(*s), &router);
        assert!(matches!(result, Err(ShardlineError::EmptyKey)));
    }

    #[test]
    fn test_into_jobs_keeps_empty_shards() {
        let router = ShardRouter::hash_modulo(4).unwrap();
        let jobs = partition(vec![3u32], key, &router)
            .unwrap()
            .into_jobs(10)
            .unwrap();

        assert_eq!(jobs.len(), 4);
        let targets: Vec<u32> = jobs.iter().map(|j| j.target().ordinal()).collect();
        assert_eq!(targets, vec![0, 1, 2, 3]);
        assert_eq!(jobs.iter().map(BatchJob::len).sum::<usize>(), 1);
    }

    #[test]
    fn test_into_jobs_rejects_zero_chunk_size() {
        let router = ShardRouter::hash_modulo(2).unwrap();
        let buckets = partition(vec![1u32], key, &router).unwrap();
        assert!(matches!(buckets.into_jobs(0), Err(ShardlineError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let router = ShardRouter::hash_modulo(3).unwrap();
        let shared = Arc::new(ShardPartitioner::new(router).concurrent::<(u32, u32)>());

        let handles: Vec<_> = (0..4u32)
            .map(|producer| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for i in 0..1_000u32 {
                        let record = (producer, i);
                        shared
                            .push(&CompositeKey::new([producer.to_string(), i.to_string()]), record)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let buckets = Arc::try_unwrap(shared).unwrap().finish();
        assert_eq!(buckets.len(), 4_000);

        // Per-producer order survives inside every bucket
        for (_, bucket) in buckets.iter() {
            for producer in 0..4u32 {
                let seen: Vec<u32> = bucket
                    .iter()
                    .filter(|(p, _)| *p == producer)
                    .map(|(_, i)| *i)
                    .collect();
                assert!(seen.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_extend_matches_single_pass() {
        let router = ShardRouter::hash_modulo(2).unwrap();
        let concurrent = ConcurrentPartitioner::new(router);
        assert_eq!(concurrent.extend(0u32..100, key).unwrap(), 100);

        let expected = partition(0u32..100, key, &router).unwrap();
        assert_eq!(concurrent.finish(), expected);
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let router = ShardRouter::hash_modulo(2).unwrap();
        let concurrent = ConcurrentPartitioner::new(router);
        let result = concurrent.extend(vec!["x", ""], |s| CompositeKey::single(*s));

        assert!(result.is_err());
        assert!(concurrent.finish().is_empty());
    }
}
