/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::golomb_rice::GolombRiceBuilder;
use super::solve::BucketSolver;
use super::split::{GolombMemo, SplitStrategy, MAX_BUCKET_SIZE};
use super::{bucket, RecSplit, RecSplitError};
use crate::dict::EliasFanoBuilder;
use crate::utils::sig_store::{shard_high_bits_for, Fingerprint, SigStore, ToSig};
use derive_setters::*;
use dsi_progress_logger::*;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use rdst::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The state of a [`RecSplitBuilder`].
#[derive(Debug)]
enum State {
    /// Keys are being added. The store is created with the first key.
    Building {
        store: Option<SigStore>,
        seen: HashSet<Fingerprint>,
    },
    /// The function has been built; no further keys can be added.
    Built(RecSplit),
}

/// A builder for [`RecSplit`].
///
/// Keys are added one at a time with [`add_key`](RecSplitBuilder::add_key);
/// their fingerprints are checked for duplicates and stored in a number of
/// shard files inside a temporary directory created in the work directory
/// provided at construction time. Then, [`build`](RecSplitBuilder::build)
/// reads back the shards in order, sorts them, and solves the buckets they
/// contain in parallel. After a successful build the function can be queried
/// with [`lookup`](RecSplitBuilder::lookup), or extracted with
/// [`into_func`](RecSplitBuilder::into_func).
///
/// A build failing because there are [not enough
/// keys](RecSplitError::NotEnoughKeys) leaves the builder in a state in which
/// keys can still be added, and the build can be retried.
///
/// # Examples
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use recsplit::mph::RecSplitBuilder;
/// use dsi_progress_logger::no_logging;
///
/// let dir = tempfile::TempDir::new()?;
/// let mut builder = RecSplitBuilder::new(100, 10, dir.path()).leaf_size(5);
/// for i in 0..100_u64 {
///     builder.add_key(&i)?;
/// }
/// builder.build(no_logging![])?;
///
/// let mut seen = vec![false; 100];
/// for i in 0..100_u64 {
///     let v = builder.lookup(&i)?;
///     assert!(!seen[v]);
///     seen[v] = true;
/// }
/// #     Ok(())
/// # }
/// ```
#[derive(Setters, Debug)]
#[setters(generate = false)]
pub struct RecSplitBuilder {
    /// The expected number of keys, which is also the minimum number of keys
    /// accepted by [`build`](RecSplitBuilder::build).
    expected_num_keys: usize,
    /// The expected size of a bucket.
    bucket_size: usize,
    /// The directory in which temporary files will be created.
    work_dir: PathBuf,

    /// The size of the leaves of the splitting trees. The default is 8.
    ///
    /// Larger leaves yield smaller functions, but the construction time grows
    /// exponentially.
    #[setters(generate = true)]
    leaf_size: usize,

    /// The seed used to compute fingerprints. It cannot be changed after the
    /// first key has been added.
    #[setters(generate = true)]
    seed: u64,

    /// The maximum number of parallel threads to use. The default is 8.
    #[setters(generate = true)]
    max_num_threads: usize,

    /// The base-2 logarithm of the number of shard files. By default, it is
    /// computed from the expected number of keys, and it is at most 8. All
    /// shard files are open during the accumulation of keys, so large values
    /// may exceed the limit on open files of the process. It cannot be
    /// changed after the first key has been added.
    #[setters(generate = true, strip_option)]
    log2_shards: Option<u32>,

    state: State,
}

impl RecSplitBuilder {
    /// Create a new builder.
    ///
    /// # Panics
    ///
    /// If `bucket_size` is zero or larger than [`MAX_BUCKET_SIZE`].
    pub fn new(expected_num_keys: usize, bucket_size: usize, work_dir: impl AsRef<Path>) -> Self {
        assert!(
            (1..=MAX_BUCKET_SIZE).contains(&bucket_size),
            "The bucket size must be between 1 and {}: {}",
            MAX_BUCKET_SIZE,
            bucket_size
        );
        Self {
            expected_num_keys,
            bucket_size,
            work_dir: work_dir.as_ref().to_owned(),
            leaf_size: 8,
            seed: 0,
            max_num_threads: 8,
            log2_shards: None,
            state: State::Building {
                store: None,
                seen: HashSet::new(),
            },
        }
    }

    /// Add a key.
    ///
    /// Fails with [`RecSplitError::DuplicateKey`] if the key was already
    /// added (in which case it is not added again), and with
    /// [`RecSplitError::AlreadyBuilt`] after a successful build. If writing
    /// the fingerprint to the scratch files fails, the key is not added and
    /// the call can be retried.
    pub fn add_key<K: ?Sized + ToSig>(&mut self, key: &K) -> Result<(), RecSplitError> {
        let State::Building { store, seen } = &mut self.state else {
            return Err(RecSplitError::AlreadyBuilt);
        };

        let store = match store {
            Some(store) => store,
            None => store.insert(SigStore::new(
                &self.work_dir,
                self.log2_shards
                    .unwrap_or_else(|| shard_high_bits_for(self.expected_num_keys)),
                self.seed,
            )?),
        };

        let sig = K::to_sig(key, store.seed());
        if seen.contains(&sig) {
            return Err(RecSplitError::DuplicateKey);
        }
        store.push(sig)?;
        seen.insert(sig);
        debug_assert_eq!(seen.len(), store.len());
        Ok(())
    }

    /// Build the function.
    ///
    /// Fails with [`RecSplitError::AlreadyBuilt`] after a successful build,
    /// and with [`RecSplitError::NotEnoughKeys`] if fewer than the expected
    /// number of keys (and in any case fewer than two keys) have been added.
    /// In the second case, and if the seed search fails, the builder is
    /// left unchanged.
    pub fn build(&mut self, pl: &mut impl ProgressLog) -> Result<(), RecSplitError> {
        let State::Building { store, .. } = &mut self.state else {
            return Err(RecSplitError::AlreadyBuilt);
        };

        let num_keys = store.as_ref().map_or(0, SigStore::len);
        let required = self.expected_num_keys.max(2);
        let store = match store {
            Some(store) if num_keys >= required => store,
            _ => return Err(RecSplitError::NotEnoughKeys { num_keys, required }),
        };

        let func = construct(
            store,
            self.bucket_size,
            self.leaf_size,
            self.max_num_threads,
            pl,
        )?;

        self.state = State::Built(func);
        Ok(())
    }

    /// Return the value associated with a key.
    ///
    /// Fails with [`RecSplitError::NotBuilt`] before a successful build.
    pub fn lookup<K: ?Sized + ToSig>(&self, key: &K) -> Result<usize, RecSplitError> {
        match &self.state {
            State::Built(func) => Ok(func.get(key)),
            State::Building { .. } => Err(RecSplitError::NotBuilt),
        }
    }

    /// Return the number of distinct keys added so far.
    pub fn num_keys(&self) -> usize {
        match &self.state {
            State::Building { store, .. } => store.as_ref().map_or(0, SigStore::len),
            State::Built(func) => func.len(),
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, State::Built(_))
    }

    /// Return the function, if it has been built.
    pub fn func(&self) -> Option<&RecSplit> {
        match &self.state {
            State::Built(func) => Some(func),
            State::Building { .. } => None,
        }
    }

    /// Consume the builder, returning the function.
    pub fn into_func(self) -> Result<RecSplit, RecSplitError> {
        match self.state {
            State::Built(func) => Ok(func),
            State::Building { .. } => Err(RecSplitError::NotBuilt),
        }
    }
}

/// Solve the buckets whose fingerprints are in `store`.
fn construct(
    store: &mut SigStore,
    bucket_size: usize,
    leaf_size: usize,
    max_num_threads: usize,
    pl: &mut impl ProgressLog,
) -> Result<RecSplit, RecSplitError> {
    let num_keys = store.len();
    let num_buckets = num_keys.div_ceil(bucket_size);
    let strategy = SplitStrategy::new(leaf_size);
    let mut memo = GolombMemo::new();
    memo.ensure(bucket_size, &strategy);

    pl.info(format_args!(
        "Keys: {} Bucket size: {} Leaf size: {} Buckets: {} Shards: {}",
        num_keys,
        bucket_size,
        leaf_size,
        num_buckets,
        store.num_shards()
    ));
    pl.info(format_args!(
        "Lower aggregation: {} Upper aggregation: {}",
        strategy.lower_aggr(),
        strategy.upper_aggr()
    ));

    #[cfg(feature = "rayon")]
    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_num_threads)
        .build()?;
    #[cfg(not(feature = "rayon"))]
    let _ = max_num_threads;

    let mut codes = GolombRiceBuilder::new();
    let mut cum_keys = Vec::with_capacity(num_buckets + 1);
    let mut bit_positions = Vec::with_capacity(num_buckets + 1);
    cum_keys.push(0);
    bit_positions.push(0);

    // Sorted fingerprints of the last bucket of the previous shard, which
    // might continue in the next shard
    let mut pending: Vec<Fingerprint> = vec![];
    let mut next_bucket = 0;
    let num_shards = store.num_shards();

    pl.item_name("bucket");
    pl.expected_updates(Some(num_buckets));
    pl.start("Solving buckets...");

    for shard in 0..num_shards {
        let mut sigs = store.read_shard(shard)?;
        sigs.radix_sort_builder().with_low_mem_tuner().sort();
        pending.extend(sigs);

        let end_bucket = if shard == num_shards - 1 {
            num_buckets
        } else {
            match pending.last() {
                Some(last) => bucket(last, num_buckets),
                None => continue,
            }
        };

        let cut = pending.partition_point(|sig| bucket(sig, num_buckets) < end_bucket);

        // Split the complete buckets, including empty ones
        let mut buckets = Vec::with_capacity(end_bucket - next_bucket);
        let mut start = 0;
        for b in next_bucket..end_bucket {
            let end = start + pending[start..cut].partition_point(|sig| bucket(sig, num_buckets) == b);
            buckets.push(pending[start..end].iter().map(|sig| sig.lo).collect::<Vec<_>>());
            start = end;
        }
        debug_assert_eq!(start, cut);

        if let Some(max_size) = buckets.iter().map(Vec::len).max() {
            memo.ensure(max_size, &strategy);
        }

        let solver = BucketSolver::new(&strategy, &memo);
        #[cfg(feature = "rayon")]
        let solved = thread_pool.install(|| {
            buckets
                .par_iter()
                .enumerate()
                .map(|(i, lo)| solver.solve(next_bucket + i, lo))
                .collect::<Result<Vec<_>, _>>()
        })?;
        #[cfg(not(feature = "rayon"))]
        let solved = buckets
            .iter()
            .enumerate()
            .map(|(i, lo)| solver.solve(next_bucket + i, lo))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cum = *cum_keys.last().unwrap_or(&0);
        for (lo, bucket_codes) in buckets.iter().zip(&solved) {
            cum += lo.len();
            cum_keys.push(cum);
            codes.push_bucket(bucket_codes);
            bit_positions.push(codes.len());
        }

        pl.update_with_count(end_bucket - next_bucket);
        pending.drain(..cut);
        next_bucket = end_bucket;
    }

    pl.done();
    debug_assert!(pending.is_empty());
    debug_assert_eq!(*cum_keys.last().unwrap_or(&0), num_keys);

    let mut cum_keys_builder = EliasFanoBuilder::new(num_buckets + 1, num_keys);
    for cum in cum_keys {
        cum_keys_builder.push(cum);
    }
    let golomb_rice = codes.build();
    let mut bit_positions_builder = EliasFanoBuilder::new(num_buckets + 1, golomb_rice.len());
    for pos in bit_positions {
        bit_positions_builder.push(pos);
    }

    let func = RecSplit {
        num_keys,
        bucket_size,
        seed: store.seed(),
        num_buckets,
        strategy,
        memo,
        cum_keys: cum_keys_builder.build(),
        bit_positions: bit_positions_builder.build(),
        golomb_rice,
    };

    pl.info(format_args!(
        "Golomb-Rice bits: {} Bits per key: {:.4}",
        func.bit_len(),
        func.bits_per_key()
    ));

    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_add_key_can_be_retried() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut builder = RecSplitBuilder::new(2, 2, dir.path());
        builder.add_key("first_key")?;

        // Writes on /dev/full fail with ENOSPC
        let State::Building {
            store: Some(store), ..
        } = &mut builder.state
        else {
            panic!("The store should have been created by the first key");
        };
        store.redirect_shards("/dev/full")?;

        for _ in 0..2 {
            // A failed write must not mark the key as seen
            assert!(matches!(
                builder.add_key("second_key"),
                Err(RecSplitError::Io(_))
            ));
            assert_eq!(builder.num_keys(), 1);
        }
        let State::Building { seen, .. } = &builder.state else {
            panic!("The builder should still be building");
        };
        assert_eq!(seen.len(), 1);

        assert!(matches!(
            builder.build(dsi_progress_logger::no_logging![]),
            Err(RecSplitError::NotEnoughKeys {
                num_keys: 1,
                required: 2
            })
        ));
        Ok(())
    }
}
