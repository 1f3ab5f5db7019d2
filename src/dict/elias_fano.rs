/*
 *
 * SPDX-FileCopyrightText: 2023 Tommaso Fontana
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! An implementation of the Elias–Fano representation of monotone sequences.
//!
//! Given a monotone sequence 0 ≤ *x*₀ ≤ *x*₁ ≤ ... ≤ *x*<sub>*n* – 1</sub> ≤
//! *u*, where *u* is a given upper bound, the Elias–Fano representation makes
//! it possible to store the sequence using at most 2 + lg(*u*/*n*) bits per
//! element, which is very close to the information-theoretical lower bound ≈ lg
//! *e* + lg(*u*/*n*) when *n* is much smaller than *u*.
//!
//! The elements of the sequence are recorded by storing separately the lower
//! *s* = ⌊lg(*u*/*n*)⌋ bits and the remaining upper bits. The lower bits are
//! stored contiguously, whereas the upper bits are stored in an array of *n* +
//! ⌊*u* / 2<sup>*s*</sup>⌋ bits by setting, for each 0 ≤ *i* < *n*, the bit of
//! index ⌊*x*<sub>*i*</sub> / 2<sup>*s*</sup>⌋ + *i*; the value can then be
//! recovered by selecting the *i*-th bit of the resulting bit array and
//! subtracting *i* (note that this will work because the upper bits are
//! nondecreasing).
//!
//! In this crate the representation stores the prefix sums of bucket sizes
//! and the bit offsets of buckets of a [`RecSplit`](crate::mph::RecSplit), so
//! we only need random access: selection on the upper bits is supported by a
//! simple inventory recording the position of every 2<sup>*k*</sup>-th one.

use crate::bits::*;
use epserde::prelude::*;
use mem_dbg::*;

/// The base-2 logarithm of the number of ones between inventory entries.
const LOG2_ONES_PER_INVENTORY: usize = 8;

/// A monotone sequence of integers stored using the Elias–Fano
/// representation, with constant-time random access.
///
/// Instances are built using an [`EliasFanoBuilder`].
///
/// # Examples
///
/// ```rust
/// # use recsplit::dict::EliasFanoBuilder;
/// let mut efb = EliasFanoBuilder::new(4, 10);
/// efb.push(0);
/// efb.push(2);
/// efb.push(8);
/// efb.push(10);
///
/// let ef = efb.build();
/// assert_eq!(ef.get(0), 0);
/// assert_eq!(ef.get(2), 8);
/// assert_eq!(ef.iter().collect::<Vec<_>>(), vec![0, 2, 8, 10]);
/// ```
#[derive(Epserde, Debug, Clone, PartialEq, Eq, Hash, MemDbg, MemSize)]
pub struct EliasFano {
    /// The number of values.
    n: usize,
    /// An upper bound to the values.
    u: usize,
    /// The number of lower bits.
    l: usize,
    /// The lower-bits array.
    low_bits: BitFieldVec,
    /// The higher-bits array.
    high_bits: BitVec,
    /// The position of every 2<sup>[`LOG2_ONES_PER_INVENTORY`]</sup>-th one
    /// in the higher-bits array.
    inventory: Vec<u64>,
}

impl EliasFano {
    /// Returns the number elements in the sequence.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Returns the upper bound provided at construction time.
    #[inline]
    pub fn upper_bound(&self) -> usize {
        self.u
    }

    /// Returns the element of given index.
    ///
    /// # Panics
    ///
    /// If `index` is not smaller than the length of the sequence.
    #[inline]
    pub fn get(&self, index: usize) -> usize {
        if index >= self.n {
            panic!("Index out of bounds: {} >= {}", index, self.n);
        }
        let inv = index >> LOG2_ONES_PER_INVENTORY;
        let pos = self.inventory[inv] as usize;
        let high = self
            .high_bits
            .select_hinted(index, pos, inv << LOG2_ONES_PER_INVENTORY)
            - index;
        (high << self.l) | self.low_bits.get(index) as usize
    }

    /// Returns the elements of index `index` and `index + 1`.
    ///
    /// This is the typical access pattern when the sequence stores prefix
    /// sums, and the difference of the two values is the size of an item.
    #[inline]
    pub fn get_pair(&self, index: usize) -> (usize, usize) {
        (self.get(index), self.get(index + 1))
    }

    pub fn iter(&self) -> EliasFanoIterator<'_> {
        EliasFanoIterator {
            ef: self,
            index: 0,
            word_idx: 0,
            window: self.high_bits.as_ref().first().copied().unwrap_or(0),
        }
    }
}

impl<'a> IntoIterator for &'a EliasFano {
    type Item = usize;
    type IntoIter = EliasFanoIterator<'a>;

    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator for [`EliasFano`].
#[derive(Debug, Clone, MemDbg, MemSize)]
pub struct EliasFanoIterator<'a> {
    ef: &'a EliasFano,
    /// The index of the next value it will be returned when `next` is called.
    index: usize,
    /// Index of the word loaded in the `window` field.
    word_idx: usize,
    /// Current window on the high bits.
    window: u64,
}

impl Iterator for EliasFanoIterator<'_> {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.ef.len() {
            return None;
        }
        // find the next word with ones
        while self.window == 0 {
            self.word_idx += 1;
            self.window = self.ef.high_bits.as_ref()[self.word_idx];
        }
        // find the lowest bit set index in the word
        let bit_idx = self.window.trailing_zeros() as usize;
        // compute the global bit index
        let high_bits = (self.word_idx * 64) + bit_idx - self.index;
        // clear the lowest bit set
        self.window &= self.window - 1;
        // compose the value
        let res = (high_bits << self.ef.l) | self.ef.low_bits.get(self.index) as usize;
        self.index += 1;
        Some(res)
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

impl ExactSizeIterator for EliasFanoIterator<'_> {
    #[inline(always)]
    fn len(&self) -> usize {
        self.ef.len() - self.index
    }
}

/// A sequential builder for [`EliasFano`].
///
/// After creating an instance, you can use [`EliasFanoBuilder::push`] to add
/// new values, and then call [`EliasFanoBuilder::build`] to create the
/// [`EliasFano`] instance.
#[derive(Debug, Clone, MemDbg, MemSize)]
pub struct EliasFanoBuilder {
    n: usize,
    u: usize,
    l: usize,
    low_bits: BitFieldVec,
    high_bits: BitVec,
    inventory: Vec<u64>,
    last_value: usize,
    count: usize,
}

impl EliasFanoBuilder {
    /// Creates a builder for an [`EliasFano`] containing
    /// `n` numbers smaller than or equal to `u`.
    pub fn new(n: usize, u: usize) -> Self {
        let l = if n > 0 && u >= n {
            (u as f64 / n as f64).log2().floor() as usize
        } else {
            0
        };

        Self {
            n,
            u,
            l,
            low_bits: BitFieldVec::new(l, n),
            high_bits: BitVec::new(n + (u >> l) + 1),
            inventory: Vec::with_capacity((n >> LOG2_ONES_PER_INVENTORY) + 1),
            last_value: 0,
            count: 0,
        }
    }

    /// Adds a new value to the builder.
    ///
    /// # Panic
    /// May panic if the value is smaller than the last provided
    /// value, or if too many values are provided.
    pub fn push(&mut self, value: usize) {
        if self.count == self.n {
            panic!("Too many values");
        }
        if value > self.u {
            panic!("Value too large: {} > {}", value, self.u);
        }
        if value < self.last_value {
            panic!(
                "The values provided are not monotone: {} < {}",
                value, self.last_value
            );
        }
        let low = value & ((1 << self.l) - 1);
        self.low_bits.set(self.count, low as u64);

        let high = (value >> self.l) + self.count;
        self.high_bits.set(high, true);
        if self.count & ((1 << LOG2_ONES_PER_INVENTORY) - 1) == 0 {
            self.inventory.push(high as u64);
        }

        self.count += 1;
        self.last_value = value;
    }

    pub fn build(self) -> EliasFano {
        if self.count != self.n {
            panic!("Too few values: {} < {}", self.count, self.n);
        }
        EliasFano {
            n: self.n,
            u: self.u,
            l: self.l,
            low_bits: self.low_bits,
            high_bits: self.high_bits,
            inventory: self.inventory,
        }
    }
}
