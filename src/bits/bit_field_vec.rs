/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Vectors of values of fixed bit width.

Elements are stored contiguously, with no padding bits (in particular,
unless the bit width is a power of two some elements will be stored
across word boundaries).

*/

use super::bit_vec::get_value;
use epserde::prelude::*;
use mem_dbg::*;

/// A vector of bit fields of fixed width.
#[derive(Epserde, Debug, Clone, PartialEq, Eq, Hash, MemDbg, MemSize)]
pub struct BitFieldVec {
    /// The underlying storage.
    data: Vec<u64>,
    /// The bit width of the values stored in the vector.
    bit_width: usize,
    /// A mask with its lowest `bit_width` bits set to one.
    mask: u64,
    /// The length of the vector.
    len: usize,
}

fn mask(bit_width: usize) -> u64 {
    if bit_width == 0 {
        0
    } else {
        u64::MAX >> (64 - bit_width)
    }
}

impl BitFieldVec {
    /// Create a new zero-initialized vector of given bit width and length.
    pub fn new(bit_width: usize, len: usize) -> Self {
        assert!(bit_width <= 64, "Bit width too large: {}", bit_width);
        // We need at least one word to handle the case of bit width zero.
        let n_of_words = Ord::max(1, (len * bit_width).div_ceil(64));
        Self {
            data: vec![0; n_of_words],
            bit_width,
            mask: mask(bit_width),
            len,
        }
    }

    #[inline(always)]
    pub fn bit_width(&self) -> usize {
        self.bit_width
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> u64 {
        if index >= self.len {
            panic!("Index out of bounds: {} >= {}", index, self.len);
        }
        if self.bit_width == 0 {
            return 0;
        }
        get_value(&self.data, index * self.bit_width, self.bit_width)
    }

    pub fn set(&mut self, index: usize, value: u64) {
        if index >= self.len {
            panic!("Index out of bounds: {} >= {}", index, self.len);
        }
        if value & !self.mask != 0 {
            panic!("Value {} does not fit in {} bits", value, self.bit_width);
        }
        if self.bit_width == 0 {
            return;
        }
        let pos = index * self.bit_width;
        let word_index = pos / 64;
        let bit_index = pos % 64;

        if bit_index + self.bit_width <= 64 {
            let mut word = self.data[word_index];
            word &= !(self.mask << bit_index);
            word |= value << bit_index;
            self.data[word_index] = word;
        } else {
            let mut word = self.data[word_index];
            word &= (1 << bit_index) - 1;
            word |= value << bit_index;
            self.data[word_index] = word;

            let mut word = self.data[word_index + 1];
            word &= !(self.mask >> (64 - bit_index));
            word |= value >> (64 - bit_index);
            self.data[word_index + 1] = word;
        }
    }
}
