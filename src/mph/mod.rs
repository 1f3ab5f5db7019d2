/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Minimal perfect hash functions.

A minimal perfect hash function maps bijectively a given set of *n* keys onto
the interval `[0..n)`. On keys outside the set it returns arbitrary values
in the same interval, so, differently from a dictionary, it does not need to
store the keys, and can be represented in a few bits per key.

*/

pub mod recsplit;
pub use recsplit::{RecSplit, RecSplitBuilder, RecSplitError};
