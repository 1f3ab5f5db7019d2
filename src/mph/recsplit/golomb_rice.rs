/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Golomb–Rice coding of split and leaf seeds.
//!
//! The seeds of a bucket are written in depth-first order, but the code of
//! each seed is divided in two: the lowest `log2_golomb` bits (the *fixed*
//! part) and the remaining bits written in unary (the *unary* part). All
//! fixed parts of a bucket come first, followed by all unary parts. Since
//! the length of the fixed parts of a subtree depends only on its size, a
//! reader can skip a subtree by advancing the fixed cursor by a precomputed
//! amount and the unary cursor by a precomputed number of codes.

use crate::bits::BitVec;
use common_traits::SelectInWord;

/// A seed with the Golomb–Rice parameter of the node it solves.
pub type Code = (u64, usize);

/// Appends bucket encodings to a bit vector.
#[derive(Debug, Default)]
pub struct GolombRiceBuilder {
    bits: BitVec,
}

impl GolombRiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the encoding of a bucket, given its codes in depth-first
    /// order.
    pub fn push_bucket(&mut self, codes: &[Code]) {
        for &(seed, log2_golomb) in codes {
            self.bits.append_value(seed, log2_golomb);
        }
        for &(seed, log2_golomb) in codes {
            self.bits.append_unary(seed >> log2_golomb);
        }
    }

    /// The number of bits written so far.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn build(self) -> BitVec {
        self.bits
    }
}

/// Reads the codes of a bucket.
#[derive(Debug, Clone)]
pub struct GolombRiceReader<'a> {
    bits: &'a BitVec,
    fixed_pos: usize,
    unary_pos: usize,
}

impl<'a> GolombRiceReader<'a> {
    /// Create a reader for the bucket starting at bit `start` and whose
    /// fixed parts occupy `fixed_bits` bits.
    #[inline(always)]
    pub fn new(bits: &'a BitVec, start: usize, fixed_bits: usize) -> Self {
        Self {
            bits,
            fixed_pos: start,
            unary_pos: start + fixed_bits,
        }
    }

    /// Read the next seed.
    #[inline(always)]
    pub fn read_next(&mut self, log2_golomb: usize) -> u64 {
        let fixed = self.bits.get_value(self.fixed_pos, log2_golomb);
        self.fixed_pos += log2_golomb;
        (self.read_unary() << log2_golomb) | fixed
    }

    #[inline(always)]
    fn read_unary(&mut self) -> u64 {
        let data = self.bits.as_ref();
        let mut word_index = self.unary_pos / 64;
        let mut word = data[word_index] >> (self.unary_pos % 64);
        let mut zeros = 0;
        if word == 0 {
            zeros = 64 - self.unary_pos % 64;
            word_index += 1;
            while data[word_index] == 0 {
                zeros += 64;
                word_index += 1;
            }
            word = data[word_index];
        }
        zeros += word.trailing_zeros() as usize;
        self.unary_pos += zeros + 1;
        zeros as u64
    }

    /// Skip `nodes` codes whose fixed parts occupy `fixed_bits` bits.
    #[inline(always)]
    pub fn skip_subtrees(&mut self, nodes: usize, fixed_bits: usize) {
        self.fixed_pos += fixed_bits;
        if nodes == 0 {
            return;
        }
        let data = self.bits.as_ref();
        let mut word_index = self.unary_pos / 64;
        let bit_index = self.unary_pos % 64;
        let mut word = (data[word_index] >> bit_index) << bit_index;
        let mut residual = nodes - 1;
        loop {
            let ones = word.count_ones() as usize;
            if residual < ones {
                break;
            }
            residual -= ones;
            word_index += 1;
            word = data[word_index];
        }
        self.unary_pos = word_index * 64 + word.select_in_word(residual) + 1;
    }

    /// The current position of the fixed cursor.
    pub fn fixed_pos(&self) -> usize {
        self.fixed_pos
    }

    /// The current position of the unary cursor.
    pub fn unary_pos(&self) -> usize {
        self.unary_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back() {
        let buckets: Vec<Vec<Code>> = vec![
            vec![(5, 2), (0, 0), (130, 3), (1, 1)],
            vec![],
            vec![(1 << 20, 4)],
            vec![(7, 0), (65, 0), (12345, 10)],
        ];
        let mut builder = GolombRiceBuilder::new();
        let mut starts = vec![];
        for bucket in &buckets {
            starts.push(builder.len());
            builder.push_bucket(bucket);
        }
        let bits = builder.build();
        for (bucket, &start) in buckets.iter().zip(&starts) {
            let fixed_bits = bucket.iter().map(|&(_, l)| l).sum();
            let mut reader = GolombRiceReader::new(&bits, start, fixed_bits);
            for &(seed, log2_golomb) in bucket {
                assert_eq!(reader.read_next(log2_golomb), seed);
            }
        }
    }

    #[test]
    fn test_skip() {
        let codes: Vec<Code> = (0..100).map(|i| (i * 37 % 300, (i % 5) as usize)).collect();
        let mut builder = GolombRiceBuilder::new();
        builder.push_bucket(&codes);
        let bits = builder.build();
        let fixed_bits: usize = codes.iter().map(|&(_, l)| l).sum();
        for skip in 0..codes.len() {
            let mut reader = GolombRiceReader::new(&bits, 0, fixed_bits);
            let skipped_fixed = codes[..skip].iter().map(|&(_, l)| l).sum();
            reader.skip_subtrees(skip, skipped_fixed);
            for &(seed, log2_golomb) in &codes[skip..] {
                assert_eq!(reader.read_next(log2_golomb), seed);
            }
            assert_eq!(reader.fixed_pos(), fixed_bits);
            assert_eq!(reader.unary_pos(), bits.len());
        }
    }
}
