/*
 *
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use dsi_progress_logger::*;
use epserde::ser::Serialize;
use recsplit::mph::RecSplitBuilder;

#[derive(Parser, Debug)]
#[command(about = "Generate a RecSplit minimal perfect hash function and serialize it with ε-serde", long_about = None)]
#[clap(group(
            ArgGroup::new("input")
                .required(true)
                .args(&["filename", "n"]),
))]
struct Args {
    #[arg(short, long)]
    /// A file containing UTF-8 keys, one per line.
    filename: Option<String>,
    #[arg(short)]
    /// Use the 64-bit keys [0..n). Mainly useful for testing and debugging.
    n: Option<usize>,
    /// A name for the ε-serde serialized function.
    func: String,
    /// The expected size of a bucket.
    #[arg(short, long, default_value_t = 100)]
    bucket_size: usize,
    /// The size of the leaves of the splitting trees.
    #[arg(short, long, default_value_t = 8)]
    leaf_size: usize,
    /// Use this number of threads.
    #[arg(short, long)]
    threads: Option<usize>,
    /// The directory for temporary files.
    #[arg(short, long)]
    work_dir: Option<String>,
    /// The seed used to compute fingerprints.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
    /// Check that the function is a bijection on the keys.
    #[arg(short, long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    let args = Args::parse();

    let mut pl = ProgressLogger::default();
    pl.display_memory(true);

    let work_dir = args
        .work_dir
        .map(std::path::PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);

    let keys: Vec<String> = if let Some(filename) = &args.filename {
        pl.item_name("line");
        pl.start("Reading keys...");
        let mut keys = vec![];
        for line in BufReader::new(File::open(filename)?).lines() {
            keys.push(line?);
            pl.light_update();
        }
        pl.done();
        keys
    } else {
        vec![]
    };
    let num_keys = args.n.unwrap_or(keys.len());

    let mut builder = RecSplitBuilder::new(num_keys, args.bucket_size, work_dir)
        .leaf_size(args.leaf_size)
        .seed(args.seed);
    if let Some(threads) = args.threads {
        builder = builder.max_num_threads(threads);
    }

    pl.item_name("key");
    pl.expected_updates(Some(num_keys));
    pl.start("Adding keys...");
    if args.filename.is_some() {
        for key in &keys {
            builder.add_key(key.as_str())?;
            pl.light_update();
        }
    } else {
        for key in 0..num_keys as u64 {
            builder.add_key(&key)?;
            pl.light_update();
        }
    }
    pl.done();

    builder.build(&mut pl)?;
    let func = builder.into_func()?;

    if args.check {
        let mut seen = vec![false; func.len()];
        pl.item_name("key");
        pl.start("Checking...");
        let mut check = |v: usize| -> Result<()> {
            if seen[v] {
                bail!("Duplicate value {}", v);
            }
            seen[v] = true;
            Ok(())
        };
        if args.filename.is_some() {
            for key in &keys {
                check(func.get(key.as_str()))?;
                pl.light_update();
            }
        } else {
            for key in 0..num_keys as u64 {
                check(func.get(&key))?;
                pl.light_update();
            }
        }
        pl.done();
    }

    func.store(&args.func)?;
    Ok(())
}
