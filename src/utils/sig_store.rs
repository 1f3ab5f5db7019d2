/*
 *
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Disk-based accumulation of key fingerprints.
//!
//! A *fingerprint* is a pair of 64-bit integers obtained by hashing a key
//! with [`xxh3::xxh3_128_with_seed`]. The upper word is used to assign keys
//! to shards and buckets, the lower word to drive all further hashing.
//!
//! A [`SigStore`] accepts fingerprints in any order and stores them in
//! different disk files depending on their high bits. The files live in a
//! [`tempfile::TempDir`] created in a work directory of choice, and are
//! removed when the store is dropped. Shards can then be [read
//! back](SigStore::read_shard) in order of their high bits, which is also the
//! order of the buckets they contain.
//!
//! The trait [`ToSig`] provides a standard way to generate fingerprints for
//! a [`SigStore`].

use rdst::RadixKey;
use std::{
    fs::File,
    io::*,
    path::{Path, PathBuf},
};
use xxhash_rust::xxh3;

/// The fingerprint of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// Used for sharding and bucket assignment.
    pub hi: u64,
    /// Used for splitting and leaf assignment.
    pub lo: u64,
}

impl Fingerprint {
    /// Extract high bits from the fingerprint.
    ///
    /// These bits are used to shard fingerprints. Note that `high_bits` can
    /// be 0, but it is guaranteed to be less than 64.
    #[inline(always)]
    pub fn high_bits(&self, high_bits: u32, mask: u64) -> u64 {
        debug_assert!(mask == (1 << high_bits) - 1);
        self.hi.rotate_left(high_bits) & mask
    }

    #[inline(always)]
    fn to_le_bytes(self) -> [u8; 16] {
        let mut bytes = [0; 16];
        bytes[..8].copy_from_slice(&self.hi.to_le_bytes());
        bytes[8..].copy_from_slice(&self.lo.to_le_bytes());
        bytes
    }

    #[inline(always)]
    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut hi = [0; 8];
        let mut lo = [0; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..16]);
        Self {
            hi: u64::from_le_bytes(hi),
            lo: u64::from_le_bytes(lo),
        }
    }
}

impl RadixKey for Fingerprint {
    const LEVELS: usize = 16;

    #[inline(always)]
    fn get_level(&self, level: usize) -> u8 {
        if level < 8 {
            (self.lo >> (level * 8)) as u8
        } else {
            (self.hi >> ((level - 8) * 8)) as u8
        }
    }
}

/// Trait for types that must be turned into a fingerprint.
///
/// We provide implementations for byte slices and arrays, `str`, `String`,
/// `Vec<u8>`, and all primitive integer types. Integers are hashed through
/// their little-endian representation, so fingerprints, and thus the
/// serialized structures using them, do not depend on the platform.
pub trait ToSig {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint;
}

#[inline(always)]
fn hash_bytes(bytes: &[u8], seed: u64) -> Fingerprint {
    let hash128 = xxh3::xxh3_128_with_seed(bytes, seed);
    Fingerprint {
        hi: (hash128 >> 64) as u64,
        lo: hash128 as u64,
    }
}

impl ToSig for [u8] {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        hash_bytes(key, seed)
    }
}

impl<const N: usize> ToSig for [u8; N] {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        hash_bytes(key, seed)
    }
}

impl ToSig for Vec<u8> {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        hash_bytes(key, seed)
    }
}

impl ToSig for str {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        hash_bytes(key.as_bytes(), seed)
    }
}

impl ToSig for String {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        hash_bytes(key.as_bytes(), seed)
    }
}

impl<T: ToSig + ?Sized> ToSig for &T {
    fn to_sig(key: &Self, seed: u64) -> Fingerprint {
        T::to_sig(*key, seed)
    }
}

macro_rules! to_sig_prim {
    ($($ty:ty),*) => {$(
        impl ToSig for $ty {
            fn to_sig(key: &Self, seed: u64) -> Fingerprint {
                hash_bytes(&key.to_le_bytes(), seed)
            }
        }
    )*};
}

to_sig_prim!(isize, usize, i8, i16, i32, i64, i128, u8, u16, u32, u64, u128);

/// Accumulates key fingerprints, grouping them in different disk files by
/// the high bits of the hash.
///
/// The implementation exploits the fact that fingerprints are randomly
/// distributed, and thus bucket sorting is very effective: at construction
/// time you specify the number of high bits to use (say, 8), and when you
/// [push](`SigStore::push`) fingerprints they will be stored in different disk
/// files (in this case, 256) depending on their high bits.
///
/// Differently from a write-once buffer, the store can be read (one shard at
/// a time) and then extended again, which makes it possible to retry a
/// construction after adding more keys.
#[derive(Debug)]
pub struct SigStore {
    /// The seed used to compute the fingerprints.
    seed: u64,
    /// Number of fingerprints added so far.
    len: usize,
    /// The number of high bits used for sharding (i.e., the number of files).
    shard_high_bits: u32,
    /// A mask for the lowest `shard_high_bits` bits.
    shard_mask: u64,
    /// The writers associated to the shards.
    shards: Vec<BufWriter<File>>,
    /// The number of fingerprints in each shard.
    shard_sizes: Vec<usize>,
    /// The directory containing the shard files; it is deleted on drop.
    temp_dir: tempfile::TempDir,
}

impl SigStore {
    /// Create a new store with 2<sup>`shard_high_bits`</sup> files in a
    /// temporary directory inside `work_dir`, for fingerprints computed with
    /// the given seed.
    pub fn new(work_dir: impl AsRef<Path>, shard_high_bits: u32, seed: u64) -> Result<Self> {
        assert!(shard_high_bits < 64);
        let temp_dir = tempfile::Builder::new()
            .prefix("recsplit-")
            .tempdir_in(work_dir)?;
        let mut shards = Vec::with_capacity(1 << shard_high_bits);
        for i in 0..1 << shard_high_bits {
            let file = File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(temp_dir.path().join(format!("{}.tmp", i)))?;
            shards.push(BufWriter::new(file));
        }
        Ok(Self {
            seed,
            len: 0,
            shard_high_bits,
            shard_mask: (1u64 << shard_high_bits) - 1,
            shards,
            shard_sizes: vec![0; 1 << shard_high_bits],
            temp_dir,
        })
    }

    /// Add a fingerprint to the store.
    ///
    /// If an error is returned the fingerprint has not been added, and the
    /// sizes of the store are unchanged.
    pub fn push(&mut self, sig: Fingerprint) -> Result<()> {
        // high_bits can be 0
        let shard = sig.high_bits(self.shard_high_bits, self.shard_mask) as usize;
        // A failed flush leaves the unwritten bytes in the buffer, and a
        // record is buffered only after room has been made for all of it
        self.shards[shard].write_all(&sig.to_le_bytes())?;
        self.shard_sizes[shard] += 1;
        self.len += 1;
        Ok(())
    }

    /// Read the content of a shard, in insertion order.
    ///
    /// After this call the store can still be extended.
    pub fn read_shard(&mut self, shard: usize) -> Result<Vec<Fingerprint>> {
        let len = self.shard_sizes[shard];
        let writer = &mut self.shards[shard];
        writer.flush()?;
        let file = writer.get_mut();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = vec![0; len * 16];
        file.read_exact(&mut bytes)?;
        file.seek(SeekFrom::End(0))?;
        Ok(bytes.chunks_exact(16).map(Fingerprint::from_le_bytes).collect())
    }

    /// The seed used to compute fingerprints.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The number of fingerprints added to the store so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of shards.
    pub fn num_shards(&self) -> usize {
        1 << self.shard_high_bits
    }

    /// Return the shard sizes.
    pub fn shard_sizes(&self) -> &[usize] {
        &self.shard_sizes
    }

    /// The directory containing the shard files.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().to_owned()
    }

    /// Replace the shard writers with unbuffered writers on `path`.
    #[cfg(test)]
    pub(crate) fn redirect_shards(&mut self, path: impl AsRef<Path>) -> Result<()> {
        for shard in self.shards.iter_mut() {
            let file = File::options().write(true).open(path.as_ref())?;
            *shard = BufWriter::with_capacity(0, file);
        }
        Ok(())
    }
}

/// The target number of fingerprints per shard.
const LOG2_TARGET_SHARD_SIZE: u32 = 20;
/// The maximum number of high bits used for sharding.
const MAX_SHARD_HIGH_BITS: u32 = 8;

/// Return a reasonable number of high bits for sharding the given number of
/// fingerprints, so that shards contain about a million of fingerprints.
///
/// The result is at most 8, so that the open shard files stay well below the
/// usual limit of 1024 file descriptors per process.
pub fn shard_high_bits_for(expected_num_keys: usize) -> u32 {
    let n = expected_num_keys.max(1) as u64;
    (n.ilog2().saturating_sub(LOG2_TARGET_SHARD_SIZE)).min(MAX_SHARD_HIGH_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn _test_sig_store(shard_high_bits: u32) -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut sig_store = SigStore::new(dir.path(), shard_high_bits, 0)?;
        let mut rand = SmallRng::seed_from_u64(0);
        let mut sigs = vec![];

        for _ in 0..10000 {
            let sig = Fingerprint {
                hi: rand.random(),
                lo: rand.random(),
            };
            sigs.push(sig);
            sig_store.push(sig)?;
        }
        assert_eq!(sig_store.len(), 10000);

        let mut read = vec![];
        for shard_index in 0..sig_store.num_shards() {
            let shard = sig_store.read_shard(shard_index)?;
            assert_eq!(shard.len(), sig_store.shard_sizes()[shard_index]);
            for sig in &shard {
                assert_eq!(
                    shard_index as u64,
                    sig.high_bits(shard_high_bits, (1 << shard_high_bits) - 1)
                );
            }
            read.extend(shard);
        }
        read.sort();
        sigs.sort();
        assert_eq!(read, sigs);

        // The store can be extended after reading
        sig_store.push(Fingerprint { hi: 0, lo: 1 })?;
        assert_eq!(sig_store.read_shard(0)?.last(), Some(&Fingerprint { hi: 0, lo: 1 }));
        Ok(())
    }

    #[test]
    fn test_sig_store() -> anyhow::Result<()> {
        for shard_high_bits in [0, 2, 8] {
            _test_sig_store(shard_high_bits)?;
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_push() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut sig_store = SigStore::new(dir.path(), 2, 0)?;
        sig_store.push(Fingerprint { hi: 0, lo: 0 })?;
        // Writes on /dev/full fail with ENOSPC
        sig_store.redirect_shards("/dev/full")?;
        assert!(sig_store.push(Fingerprint { hi: 1, lo: 1 }).is_err());
        assert_eq!(sig_store.len(), 1);
        assert_eq!(sig_store.shard_sizes().iter().sum::<usize>(), 1);
        Ok(())
    }

    #[test]
    fn test_temp_dir_removed() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let sig_store = SigStore::new(dir.path(), 1, 0)?;
        let path = sig_store.path();
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
        drop(sig_store);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_to_sig() {
        assert_eq!(
            <str as ToSig>::to_sig("key", 0),
            <[u8] as ToSig>::to_sig(b"key", 0)
        );
        assert_eq!(
            <String as ToSig>::to_sig(&"key".to_owned(), 1),
            <[u8; 3] as ToSig>::to_sig(b"key", 1)
        );
        assert_ne!(
            <str as ToSig>::to_sig("key", 0),
            <str as ToSig>::to_sig("key", 1)
        );
        assert_eq!(
            <u64 as ToSig>::to_sig(&42, 0),
            <[u8] as ToSig>::to_sig(&42_u64.to_le_bytes(), 0)
        );
    }

    #[test]
    fn test_shard_high_bits_for() {
        assert_eq!(shard_high_bits_for(0), 0);
        assert_eq!(shard_high_bits_for(1000), 0);
        assert_eq!(shard_high_bits_for(1 << 22), 2);
        assert_eq!(shard_high_bits_for(usize::MAX), MAX_SHARD_HIGH_BITS);
        // At most 256 open shard files
        assert_eq!(shard_high_bits_for(1 << 40), 8);
    }
}
