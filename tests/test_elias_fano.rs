/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use epserde::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use ::recsplit::prelude::*;

#[test]
fn test_elias_fano() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0);
    for (n, u) in [
        (1, 0),
        (10, 1000),
        (100, 1000),
        (100, 100),
        (1000, 100),
        (1000, 10),
        (10_000, 1 << 40),
    ] {
        let mut values = (0..n).map(|_| rng.random_range(0..=u)).collect::<Vec<_>>();

        values.sort();

        let mut efb = EliasFanoBuilder::new(n, u);
        for value in values.iter() {
            efb.push(*value);
        }
        let ef = efb.build();

        assert_eq!(ef.len(), n);
        assert_eq!(ef.upper_bound(), u);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(ef.get(i), *v);
        }
        for i in 0..n - 1 {
            assert_eq!(ef.get_pair(i), (values[i], values[i + 1]));
        }
        assert_eq!(ef.iter().len(), n);
        assert_eq!(ef.iter().collect::<Vec<_>>(), values);
        assert_eq!((&ef).into_iter().last(), values.last().copied());
    }
    Ok(())
}

#[test]
fn test_prefix_sums() -> Result<()> {
    // Many equal values, as in the prefix sums of mostly empty buckets
    let mut efb = EliasFanoBuilder::new(2000, 10);
    for i in 0..2000 {
        efb.push(i / 200);
    }
    let ef = efb.build();
    for i in 0..2000 {
        assert_eq!(ef.get(i), i / 200);
    }
    Ok(())
}

#[test]
fn test_epserde() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0);
    let mut values = (0..1000).map(|_| rng.random_range(0..10_000)).collect::<Vec<_>>();
    values.sort();
    let mut efb = EliasFanoBuilder::new(values.len(), 10_000);
    for &value in &values {
        efb.push(value);
    }
    let ef = efb.build();

    let mut cursor = <AlignedCursor<maligned::A16>>::new();
    ef.serialize(&mut cursor)?;
    cursor.set_position(0);
    let ef2 = EliasFano::deserialize_full(&mut cursor)?;
    assert_eq!(ef, ef2);
    Ok(())
}

#[test]
#[should_panic]
fn test_not_monotone() {
    let mut efb = EliasFanoBuilder::new(2, 10);
    efb.push(5);
    efb.push(4);
}

#[test]
#[should_panic]
fn test_too_large() {
    let mut efb = EliasFanoBuilder::new(2, 10);
    efb.push(11);
}
