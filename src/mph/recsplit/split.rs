/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Split sizes, Golomb–Rice parameters and search budgets.
//!
//! A sub-problem of size *m* larger than the leaf size is split into
//! children whose sizes depend only on *m* and on the leaf size. Since sizes
//! are fixed, the success probability of a random seed is fixed, too, and
//! from it we derive both the optimal Golomb–Rice parameter used to encode
//! the seed and the number of seeds we are willing to try.

use epserde::prelude::*;
use mem_dbg::*;
use std::f64::consts::PI;

/// The maximum leaf size.
///
/// Leaves are solved using a 32-bit occupancy mask.
pub const MAX_LEAF_SIZE: usize = 24;

/// The maximum bucket size.
pub const MAX_BUCKET_SIZE: usize = 2000;

/// The expected number of successes within the attempt budget of a node.
///
/// A search fails with probability about *e*<sup>−`SEARCH_EFFORT`</sup>.
pub(crate) const SEARCH_EFFORT: f64 = 40.0;

/// The split-size table of a given leaf size.
///
/// There are three regimes: sub-problems larger than
/// [`upper_aggr`](SplitStrategy::upper_aggr) are split in two halves whose
/// size is a multiple of `upper_aggr`; sub-problems larger than
/// [`lower_aggr`](SplitStrategy::lower_aggr) are split in parts of size
/// `lower_aggr`; smaller sub-problems are split in leaves. In all cases the
/// last child gets the remainder.
#[derive(Epserde, Debug, Clone, Copy, PartialEq, Eq, Hash, MemDbg, MemSize)]
#[deep_copy]
pub struct SplitStrategy {
    leaf_size: usize,
    lower_aggr: usize,
    upper_aggr: usize,
}

impl SplitStrategy {
    pub fn new(leaf_size: usize) -> Self {
        assert!(
            (2..=MAX_LEAF_SIZE).contains(&leaf_size),
            "The leaf size must be between 2 and {}: {}",
            MAX_LEAF_SIZE,
            leaf_size
        );
        let l = leaf_size as f64;
        let lower_aggr = leaf_size * Ord::max(2, (0.35 * l + 0.5).ceil() as usize);
        let upper_aggr = lower_aggr
            * if leaf_size < 7 {
                2
            } else {
                (0.21 * l + 0.9).ceil() as usize
            };
        Self {
            leaf_size,
            lower_aggr,
            upper_aggr,
        }
    }

    #[inline(always)]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    #[inline(always)]
    pub fn lower_aggr(&self) -> usize {
        self.lower_aggr
    }

    #[inline(always)]
    pub fn upper_aggr(&self) -> usize {
        self.upper_aggr
    }

    /// Return the unit size and the fanout of a split of a sub-problem of
    /// size `m`, which must be larger than the leaf size.
    ///
    /// All children have size `unit`, except for the last one, which has
    /// size `m - unit * (fanout - 1)`.
    #[inline(always)]
    pub fn split(&self, m: usize) -> (usize, usize) {
        debug_assert!(m > self.leaf_size);
        if m > self.upper_aggr {
            let unit = self.upper_aggr * ((m + 1) / 2).div_ceil(self.upper_aggr);
            (unit, 2)
        } else if m > self.lower_aggr {
            (self.lower_aggr, m.div_ceil(self.lower_aggr))
        } else {
            (self.leaf_size, m.div_ceil(self.leaf_size))
        }
    }

    /// Return the probability that a random seed solves a sub-problem of
    /// size `m`.
    ///
    /// For leaves this is exactly *m*!/*m*<sup>*m*</sup>; for splits we use
    /// the Stirling approximation of the multinomial probability.
    pub fn success_probability(&self, m: usize) -> f64 {
        if m <= 1 {
            return 1.0;
        }
        if m <= self.leaf_size {
            return (1..=m).map(|i| i as f64 / m as f64).product();
        }
        let (unit, fanout) = self.split(m);
        let last = m - unit * (fanout - 1);
        let mut log_p = 0.5 * (m as f64).ln() - 0.5 * (fanout - 1) as f64 * (2.0 * PI).ln();
        log_p -= 0.5 * (fanout - 1) as f64 * (unit as f64).ln();
        log_p -= 0.5 * (last as f64).ln();
        log_p.exp().min(1.0)
    }

    /// Return the number of seeds to try on a sub-problem of size `m` before
    /// giving up.
    pub fn budget(&self, m: usize) -> u64 {
        (SEARCH_EFFORT / self.success_probability(m)).ceil() as u64
    }

    /// Return the optimal Golomb–Rice parameter for the seeds of
    /// sub-problems of size `m`.
    pub fn log2_golomb(&self, m: usize) -> usize {
        let p = self.success_probability(m);
        if p >= 1.0 {
            return 0;
        }
        let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let log2_golomb = (-phi.ln() / (1.0 - p).ln()).log2().ceil();
        if log2_golomb > 0.0 {
            log2_golomb as usize
        } else {
            0
        }
    }
}

const FIXED_BITS_WIDTH: usize = 28;
const FIXED_BITS_MASK: u64 = (1 << FIXED_BITS_WIDTH) - 1;
const NODES_SHIFT: usize = 28;
const NODES_MASK: u64 = (1 << 28) - 1;
const LOG2_GOLOMB_SHIFT: usize = 56;

/// Per-size Golomb–Rice parameters and subtree statistics.
///
/// Entry *m* packs in a word the Golomb–Rice parameter of a sub-problem of
/// size *m* (upper 8 bits), the number of nodes of its subtree (middle 28
/// bits) and the overall number of fixed bits of the codes of the subtree
/// (lower 28 bits). The last two values make it possible to skip a subtree
/// of the Golomb–Rice stream in constant time.
///
/// The table is extended on demand up to the largest bucket size.
#[derive(Epserde, Debug, Clone, Default, PartialEq, Eq, Hash, MemDbg, MemSize)]
pub struct GolombMemo {
    memo: Vec<u64>,
}

impl GolombMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the table so that it covers sizes up to `max_m` (inclusive).
    pub fn ensure(&mut self, max_m: usize, strategy: &SplitStrategy) {
        if self.memo.is_empty() {
            // m = 0: no node, no bits
            self.memo.push(0);
        }
        for m in self.memo.len()..=max_m {
            let log2_golomb = strategy.log2_golomb(m);
            let (mut nodes, mut fixed_bits) = (1, log2_golomb);
            if m > strategy.leaf_size() {
                let (unit, fanout) = strategy.split(m);
                let last = m - unit * (fanout - 1);
                nodes += (fanout - 1) * self.nodes(unit) + self.nodes(last);
                fixed_bits += (fanout - 1) * self.fixed_bits(unit) + self.fixed_bits(last);
            }
            debug_assert!(nodes as u64 <= NODES_MASK);
            debug_assert!(fixed_bits as u64 <= FIXED_BITS_MASK);
            self.memo.push(
                (log2_golomb as u64) << LOG2_GOLOMB_SHIFT
                    | (nodes as u64) << NODES_SHIFT
                    | fixed_bits as u64,
            );
        }
    }

    /// The largest size covered by the table, if any.
    pub fn max_size(&self) -> Option<usize> {
        self.memo.len().checked_sub(1)
    }

    #[inline(always)]
    pub fn log2_golomb(&self, m: usize) -> usize {
        (self.memo[m] >> LOG2_GOLOMB_SHIFT) as usize
    }

    #[inline(always)]
    pub fn nodes(&self, m: usize) -> usize {
        ((self.memo[m] >> NODES_SHIFT) & NODES_MASK) as usize
    }

    #[inline(always)]
    pub fn fixed_bits(&self, m: usize) -> usize {
        (self.memo[m] & FIXED_BITS_MASK) as usize
    }
}
