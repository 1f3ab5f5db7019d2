/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! RecSplit minimal perfect hash functions.
//!
//! Keys are hashed to 128-bit [fingerprints](Fingerprint); the high word
//! assigns each key to a *bucket* of expected size equal to the bucket size
//! provided at construction time, and the low word is used to recursively
//! split each bucket in smaller and smaller parts, using for each split a
//! seed that yields parts of predetermined sizes, until a *leaf* is
//! reached. At a leaf, a seed is found that maps bijectively the keys to the
//! positions of the leaf. The seeds are stored using Golomb–Rice codes whose
//! parameter depends on the size of the sub-problem, so the space used is
//! close to the theoretical lower bound of lg *e* ≈ 1.44 bits per key.
//!
//! Queries replay the same splits, reading the seeds instead of searching
//! them, and return the rank of the leaf position among all positions.
//!
//! # Reference
//! - [Emmanuel Esposito, Thomas Mueller Graf, and Sebastiano Vigna, RecSplit:
//!   Minimal Perfect Hashing via Recursive
//!   Splitting](https://doi.org/10.1137/1.9781611976007.14)

use crate::dict::EliasFano;
use crate::utils::sig_store::{Fingerprint, ToSig};
use epserde::prelude::*;
use mem_dbg::*;

mod builder;
pub use builder::RecSplitBuilder;

pub mod golomb_rice;
pub mod solve;
pub mod split;

use golomb_rice::GolombRiceReader;
use split::{GolombMemo, SplitStrategy};

/// Errors of the lifecycle of a [`RecSplitBuilder`].
#[derive(thiserror::Error, Debug)]
pub enum RecSplitError {
    #[error("Duplicate key")]
    /// The key (more precisely, its fingerprint) has already been added.
    DuplicateKey,
    #[error("The function has already been built")]
    /// Keys cannot be added, and the function cannot be built again, after a
    /// successful build.
    AlreadyBuilt,
    #[error("Not enough keys: {num_keys} < {required}")]
    /// Too few keys have been added; more keys can be added and the build
    /// can be retried.
    NotEnoughKeys { num_keys: usize, required: usize },
    #[error("The function has not been built yet")]
    /// Queries are possible only after a successful build.
    NotBuilt,
    #[error("Could not split a sub-problem of size {size} in bucket {bucket}")]
    /// The seed search exhausted its attempt budget.
    ConstructionFailed { bucket: usize, size: usize },
    #[error("I/O error on temporary files")]
    /// Reading or writing the scratch files in the work directory failed.
    Io(#[from] std::io::Error),
    #[cfg(feature = "rayon")]
    #[error("Could not create the thread pool")]
    /// The thread pool used to solve buckets could not be created.
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Starting seeds of each level of the splitting tree.
const START_SEEDS: [u64; 20] = [
    0x106393c187cae21a,
    0x6453cec3f7376937,
    0x643e521ddbd2be98,
    0x3740c6412f6572cb,
    0x717d47562f1ce470,
    0x4cd6eb4c63befb7c,
    0x9bfd8c5e18c8da73,
    0x082f20e10092a9a3,
    0x2ada2ce68d21defc,
    0xe33cb4f3e7c6466b,
    0x3980be458c509c59,
    0xc466fd9584828e8c,
    0x45f0aabe1a61ede6,
    0xf6e7b8b33ad9b98d,
    0x4ef95e25f4b4983d,
    0x81175195173b92d3,
    0x4e50927d8dd15978,
    0x1ea2099d1fafae7f,
    0x425c8a06fbaaa815,
    0xcd4216006c74052a,
];

/// Stafford's 13th variant of the MurmurHash3 64-bit finalizer.
#[inline(always)]
#[must_use]
pub const fn remix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Map the upper 16 bits of `x` to `[0..n)`, where `n` ≤ 2¹⁶.
#[inline(always)]
#[must_use]
pub const fn remap16(x: u64, n: usize) -> usize {
    (((x >> 48) * n as u64) >> 16) as usize
}

/// The hash of a key with low fingerprint word `lo` at a node of size `m`
/// on level `level` of the splitting tree, using seed `x`.
#[inline(always)]
#[must_use]
pub(crate) fn node_hash(lo: u64, level: usize, x: u64, m: usize) -> usize {
    remap16(
        remix(
            lo.wrapping_add(START_SEEDS[level % START_SEEDS.len()])
                .wrapping_add(x),
        ),
        m,
    )
}

/// The bucket of a fingerprint.
///
/// The map is monotone in the high word of the fingerprint.
#[inline(always)]
#[must_use]
pub fn bucket(sig: &Fingerprint, num_buckets: usize) -> usize {
    ((sig.hi as u128 * num_buckets as u128) >> 64) as usize
}

/// A RecSplit minimal perfect hash function.
///
/// Instances of this structure are immutable; they are built using a
/// [`RecSplitBuilder`] and can be serialized using [ε-serde](`epserde`).
/// On the keys used at construction time, [`get`](RecSplit::get) is a
/// bijection onto `[0..len())`; on other keys it returns an arbitrary value
/// in the same range.
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct RecSplit {
    pub(in crate::mph) num_keys: usize,
    pub(in crate::mph) bucket_size: usize,
    pub(in crate::mph) seed: u64,
    pub(in crate::mph) num_buckets: usize,
    pub(in crate::mph) strategy: SplitStrategy,
    pub(in crate::mph) memo: GolombMemo,
    /// Prefix sums of the bucket sizes.
    pub(in crate::mph) cum_keys: EliasFano,
    /// Starting bit of each bucket in the Golomb–Rice stream.
    pub(in crate::mph) bit_positions: EliasFano,
    pub(in crate::mph) golomb_rice: crate::bits::BitVec,
}

impl RecSplit {
    /// Return the value associated with the given key, that is, its rank if
    /// the key was part of the construction set, or an arbitrary value in
    /// `[0..len())` otherwise.
    #[inline]
    pub fn get<K: ?Sized + ToSig>(&self, key: &K) -> usize {
        self.get_by_sig(&K::to_sig(key, self.seed))
    }

    /// Return the value associated with a fingerprint.
    ///
    /// This method is mainly useful in the construction of compound
    /// functions.
    pub fn get_by_sig(&self, sig: &Fingerprint) -> usize {
        let bucket = bucket(sig, self.num_buckets);
        let (mut cum_keys, next) = self.cum_keys.get_pair(bucket);
        let mut m = next - cum_keys;
        if m == 0 {
            return cum_keys.min(self.num_keys - 1);
        }
        let start = self.bit_positions.get(bucket);
        let mut reader = GolombRiceReader::new(&self.golomb_rice, start, self.memo.fixed_bits(m));
        let mut level = 0;

        while m > self.strategy.leaf_size() {
            let (unit, fanout) = self.strategy.split(m);
            let x = reader.read_next(self.memo.log2_golomb(m));
            let child = node_hash(sig.lo, level, x, m) / unit;
            reader.skip_subtrees(
                child * self.memo.nodes(unit),
                child * self.memo.fixed_bits(unit),
            );
            cum_keys += child * unit;
            m = if child == fanout - 1 {
                m - unit * (fanout - 1)
            } else {
                unit
            };
            level += 1;
        }

        let x = reader.read_next(self.memo.log2_golomb(m));
        cum_keys + node_hash(sig.lo, level, x, m)
    }

    /// Return the number of keys in the function.
    pub fn len(&self) -> usize {
        self.num_keys
    }

    /// Return whether the function has no keys.
    pub fn is_empty(&self) -> bool {
        self.num_keys == 0
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn leaf_size(&self) -> usize {
        self.strategy.leaf_size()
    }

    /// The seed used to compute fingerprints.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// The length in bits of the Golomb–Rice stream.
    pub fn bit_len(&self) -> usize {
        self.golomb_rice.len()
    }

    /// The number of bits per key used by the Golomb–Rice stream and by the
    /// bucket offsets.
    pub fn bits_per_key(&self) -> f64 {
        let bits = self.golomb_rice.len()
            + 8 * (self.cum_keys.mem_size(SizeFlags::default())
                + self.bit_positions.mem_size(SizeFlags::default()));
        bits as f64 / self.num_keys as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap16() {
        assert_eq!(remap16(0, 10), 0);
        assert_eq!(remap16(u64::MAX, 10), 9);
        assert_eq!(remap16(u64::MAX, 1), 0);
        for n in 1..100 {
            for i in 0..1000_u64 {
                assert!(remap16(remix(i), n) < n);
            }
        }
    }

    #[test]
    fn test_remix() {
        assert_eq!(remix(0), 0);
        assert_ne!(remix(1), remix(2));
    }

    #[test]
    fn test_bucket_monotone() {
        let num_buckets = 17;
        let mut last = 0;
        for i in 0..1000_u64 {
            let sig = Fingerprint {
                hi: i.wrapping_mul(u64::MAX / 1000),
                lo: 0,
            };
            let b = bucket(&sig, num_buckets);
            assert!(b >= last);
            assert!(b < num_buckets);
            last = b;
        }
        assert_eq!(
            bucket(&Fingerprint { hi: u64::MAX, lo: 0 }, num_buckets),
            num_buckets - 1
        );
    }
}
