/*
 * SPDX-FileCopyrightText: 2023 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

A growable bit vector backed by a `Vec<u64>`.

Bits are stored in little-endian order inside each word: bit `i` is bit `i %
64` of word `i / 64`. Besides single-bit access, the vector supports appending
and reading fields of up to 64 bits starting at arbitrary bit positions, which
is what a Golomb–Rice stream needs, and hinted selection, which is what the
high bits of an [Elias–Fano](crate::dict::elias_fano::EliasFano) sequence
need.

*/

use common_traits::SelectInWord;
use epserde::prelude::*;
use mem_dbg::*;
use std::ops::Index;

/// A bit vector with a `Vec<u64>` as underlying storage.
#[derive(Epserde, Debug, Clone, Default, PartialEq, Eq, Hash, MemDbg, MemSize)]
pub struct BitVec {
    data: Vec<u64>,
    len: usize,
}

macro_rules! panic_if_out_of_bounds {
    ($index: expr, $len: expr) => {
        if $index >= $len {
            panic!("Bit index out of bounds: {} >= {}", $index, $len)
        }
    };
}

impl Index<usize> for BitVec {
    type Output = bool;

    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            false => &false,
            true => &true,
        }
    }
}

impl AsRef<[u64]> for BitVec {
    #[inline(always)]
    fn as_ref(&self) -> &[u64] {
        &self.data
    }
}

impl BitVec {
    /// Create a new zeroed bit vector of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Create an empty bit vector that doesn't need to reallocate for up to
    /// `capacity` bits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.div_ceil(64)),
            len: 0,
        }
    }

    #[inline(always)]
    /// Return the number of bits in this bit vector.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the number of bits set to 1 in this bit vector.
    pub fn count_ones(&self) -> usize {
        self.data.iter().map(|x| x.count_ones() as usize).sum()
    }

    pub fn get(&self, index: usize) -> bool {
        panic_if_out_of_bounds!(index, self.len);
        (self.data[index / 64] >> (index % 64)) & 1 != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        panic_if_out_of_bounds!(index, self.len);
        if value {
            self.data[index / 64] |= 1 << (index % 64);
        } else {
            self.data[index / 64] &= !(1 << (index % 64));
        }
    }

    /// Append a bit.
    #[inline]
    pub fn push(&mut self, value: bool) {
        if self.len % 64 == 0 {
            self.data.push(0);
        }
        if value {
            self.data[self.len / 64] |= 1 << (self.len % 64);
        }
        self.len += 1;
    }

    /// Append the lowest `width` bits of `value`.
    ///
    /// Bits of `value` above `width` are ignored.
    pub fn append_value(&mut self, value: u64, width: usize) {
        debug_assert!(width <= 64);
        if width == 0 {
            return;
        }
        let value = if width == 64 {
            value
        } else {
            value & ((1 << width) - 1)
        };
        let bit_index = self.len % 64;
        if bit_index == 0 {
            self.data.push(value);
        } else {
            *self.data.last_mut().unwrap() |= value << bit_index;
            if bit_index + width > 64 {
                self.data.push(value >> (64 - bit_index));
            }
        }
        self.len += width;
    }

    /// Append `count` zeros followed by a one.
    pub fn append_unary(&mut self, mut count: u64) {
        while count >= 64 {
            self.append_value(0, 64);
            count -= 64;
        }
        self.append_value(1 << count, count as usize + 1);
    }

    /// Return the `width`-bit field starting at bit `pos`.
    ///
    /// # Panics
    ///
    /// If the field extends beyond the end of the vector.
    pub fn get_value(&self, pos: usize, width: usize) -> u64 {
        debug_assert!(width <= 64);
        if width == 0 {
            return 0;
        }
        assert!(
            pos + width <= self.len,
            "Field out of bounds: {} + {} > {}",
            pos,
            width,
            self.len
        );
        get_value(&self.data, pos, width)
    }

    /// Return the position of the one of given rank, starting the search
    /// from position `pos`, where the number of ones before `pos` is
    /// `rank_at_pos`.
    ///
    /// # Panics
    ///
    /// If there are not enough ones after `pos`.
    pub fn select_hinted(&self, rank: usize, pos: usize, rank_at_pos: usize) -> usize {
        debug_assert!(rank >= rank_at_pos);
        let mut word_index = pos / 64;
        let bit_index = pos % 64;
        let mut residual = rank - rank_at_pos;
        let mut word = (self.data[word_index] >> bit_index) << bit_index;
        loop {
            let bit_count = word.count_ones() as usize;
            if residual < bit_count {
                break;
            }
            word_index += 1;
            word = self.data[word_index];
            residual -= bit_count;
        }

        word_index * 64 + word.select_in_word(residual)
    }
}

/// Read `width` bits (0 < `width` ≤ 64) at bit position `pos` of `data`.
#[inline(always)]
pub(crate) fn get_value(data: &[u64], pos: usize, width: usize) -> u64 {
    let word_index = pos / 64;
    let bit_index = pos % 64;
    let mask = if width == 64 { u64::MAX } else { (1 << width) - 1 };
    if bit_index + width <= 64 {
        (data[word_index] >> bit_index) & mask
    } else {
        (data[word_index] >> bit_index | data[word_index + 1] << (64 - bit_index)) & mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_get() {
        let mut b = BitVec::with_capacity(10);
        for i in 0..200 {
            b.push(i % 3 == 0);
        }
        assert_eq!(b.len(), 200);
        for i in 0..200 {
            assert_eq!(b[i], i % 3 == 0);
        }
        assert_eq!(b.count_ones(), 67);
        b.set(1, true);
        assert!(b.get(1));
        b.set(0, false);
        assert!(!b.get(0));
    }

    #[test]
    fn test_values_across_words() {
        let mut b = BitVec::default();
        let widths = [0, 1, 5, 13, 64, 7, 63, 2, 31, 17];
        let mut pos = Vec::new();
        for (i, &w) in widths.iter().enumerate().cycle().take(100) {
            let v = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            pos.push((b.len(), w, v));
            b.append_value(v, w);
        }
        for (p, w, v) in pos {
            let expected = if w == 64 {
                v
            } else if w == 0 {
                0
            } else {
                v & ((1 << w) - 1)
            };
            assert_eq!(b.get_value(p, w), expected);
        }
    }

    #[test]
    fn test_unary_and_select() {
        let mut b = BitVec::default();
        let counts = [0_u64, 3, 64, 130, 1, 0, 63];
        for &c in &counts {
            b.append_unary(c);
        }
        let mut expected = 0;
        for (rank, &c) in counts.iter().enumerate() {
            expected += c as usize;
            assert_eq!(b.select_hinted(rank, 0, 0), expected);
            expected += 1;
        }
        assert_eq!(b.len(), expected);
        // Hinted from the middle
        let p = b.select_hinted(3, 0, 0);
        assert_eq!(b.select_hinted(5, p, 3), b.select_hinted(5, 0, 0));
    }
}
