/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Recursive seed search for a single bucket.

use super::golomb_rice::Code;
use super::split::{GolombMemo, SplitStrategy};
use super::{node_hash, RecSplitError};

/// Finds the seeds of the splitting tree of a bucket.
///
/// A solver only reads shared state, so buckets can be solved in parallel
/// by different threads, each one with its own solver (or sharing one).
#[derive(Debug, Clone, Copy)]
pub struct BucketSolver<'a> {
    strategy: &'a SplitStrategy,
    memo: &'a GolombMemo,
}

impl<'a> BucketSolver<'a> {
    /// Create a solver; `memo` must cover the sizes of the buckets that will
    /// be solved.
    pub fn new(strategy: &'a SplitStrategy, memo: &'a GolombMemo) -> Self {
        Self { strategy, memo }
    }

    /// Solve a bucket, given the low words of the fingerprints of its keys,
    /// returning the seeds of its nodes in depth-first order.
    ///
    /// `bucket` is used only for error reporting.
    pub fn solve(&self, bucket: usize, lo: &[u64]) -> Result<Vec<Code>, RecSplitError> {
        debug_assert!(self.memo.max_size().is_some_and(|max| max >= lo.len()));
        let mut codes = Vec::with_capacity(self.memo.nodes(lo.len()));
        if !lo.is_empty() {
            let mut keys = lo.to_vec();
            let mut temp = vec![0; keys.len()];
            self.recurse(bucket, &mut keys, &mut temp, 0, &mut codes)?;
        }
        Ok(codes)
    }

    fn recurse(
        &self,
        bucket: usize,
        keys: &mut [u64],
        temp: &mut [u64],
        level: usize,
        codes: &mut Vec<Code>,
    ) -> Result<(), RecSplitError> {
        let m = keys.len();
        let log2_golomb = self.memo.log2_golomb(m);
        let budget = self.strategy.budget(m);

        if m <= self.strategy.leaf_size() {
            let seed = (0..budget)
                .find(|&x| is_bijection(keys, level, x))
                .ok_or(RecSplitError::ConstructionFailed { bucket, size: m })?;
            codes.push((seed, log2_golomb));
            return Ok(());
        }

        let (unit, fanout) = self.strategy.split(m);
        let mut counts = vec![0; fanout];
        let mut target = vec![unit; fanout];
        target[fanout - 1] = m - unit * (fanout - 1);

        let seed = (0..budget)
            .find(|&x| {
                counts.fill(0);
                for &lo in keys.iter() {
                    counts[node_hash(lo, level, x, m) / unit] += 1;
                }
                counts == target
            })
            .ok_or(RecSplitError::ConstructionFailed { bucket, size: m })?;
        codes.push((seed, log2_golomb));

        // Stable partition by child
        let mut offsets = vec![0; fanout];
        for i in 1..fanout {
            offsets[i] = offsets[i - 1] + target[i - 1];
        }
        for &lo in keys.iter() {
            let child = node_hash(lo, level, seed, m) / unit;
            temp[offsets[child]] = lo;
            offsets[child] += 1;
        }
        keys.copy_from_slice(&temp[..m]);

        let mut start = 0;
        for &size in &target {
            let end = start + size;
            self.recurse(
                bucket,
                &mut keys[start..end],
                &mut temp[start..end],
                level + 1,
                codes,
            )?;
            start = end;
        }
        Ok(())
    }
}

/// Whether the leaf hash with seed `x` is a bijection from the keys onto
/// `[0..keys.len())`.
#[inline(always)]
fn is_bijection(keys: &[u64], level: usize, x: u64) -> bool {
    let m = keys.len();
    let mut mask = 0_u32;
    for &lo in keys {
        let bit = 1 << node_hash(lo, level, x, m);
        if mask & bit != 0 {
            return false;
        }
        mask |= bit;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn check_tree(strategy: &SplitStrategy, keys: &[u64], codes: &mut &[Code], level: usize) {
        let m = keys.len();
        let ((seed, _), rest) = codes.split_first().unwrap();
        *codes = rest;
        if m <= strategy.leaf_size() {
            let mut hashes: Vec<_> = keys.iter().map(|&lo| node_hash(lo, level, *seed, m)).collect();
            hashes.sort();
            assert_eq!(hashes, (0..m).collect::<Vec<_>>());
            return;
        }
        let (unit, fanout) = strategy.split(m);
        let mut children = vec![vec![]; fanout];
        for &lo in keys {
            children[node_hash(lo, level, *seed, m) / unit].push(lo);
        }
        for (i, child) in children.iter().enumerate() {
            let expected = if i == fanout - 1 { m - unit * (fanout - 1) } else { unit };
            assert_eq!(child.len(), expected);
            check_tree(strategy, child, codes, level + 1);
        }
    }

    #[test]
    fn test_solve() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(0);
        for leaf_size in [2, 5, 8, 12] {
            let strategy = SplitStrategy::new(leaf_size);
            let mut memo = GolombMemo::new();
            memo.ensure(500, &strategy);
            let solver = BucketSolver::new(&strategy, &memo);
            for m in [0, 1, 2, leaf_size, leaf_size + 1, 100, 500] {
                let keys: Vec<u64> = (0..m).map(|_| rng.random()).collect();
                let codes = solver.solve(0, &keys)?;
                assert_eq!(codes.len(), memo.nodes(m));
                assert_eq!(
                    codes.iter().map(|&(_, l)| l).sum::<usize>(),
                    memo.fixed_bits(m)
                );
                if m > 0 {
                    let mut slice = codes.as_slice();
                    check_tree(&strategy, &keys, &mut slice, 0);
                    assert!(slice.is_empty());
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_deterministic() -> anyhow::Result<()> {
        let strategy = SplitStrategy::new(8);
        let mut memo = GolombMemo::new();
        memo.ensure(100, &strategy);
        let solver = BucketSolver::new(&strategy, &memo);
        let mut rng = SmallRng::seed_from_u64(1);
        let keys: Vec<u64> = (0..100).map(|_| rng.random()).collect();
        assert_eq!(solver.solve(3, &keys)?, solver.solve(3, &keys)?);
        Ok(())
    }

    #[test]
    fn test_unsolvable_leaf() {
        let strategy = SplitStrategy::new(8);
        let mut memo = GolombMemo::new();
        memo.ensure(2, &strategy);
        let solver = BucketSolver::new(&strategy, &memo);
        // Two keys with the same low word always collide
        match solver.solve(7, &[42, 42]) {
            Err(RecSplitError::ConstructionFailed { bucket, size }) => {
                assert_eq!(bucket, 7);
                assert_eq!(size, 2);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
