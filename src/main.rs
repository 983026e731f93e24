//! Talon CLI - Command-line tool for indexing and extracting objects from
//! block-compressed game packages.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use talon::prelude::*;

/// Talon - game package indexing and extraction tool
#[derive(Parser)]
#[command(name = "talon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that loads packages.
#[derive(Args)]
struct Source {
    /// Package directory, single package file or zip container
    #[arg(short, long, env = "TALON_PATH")]
    path: PathBuf,

    /// Package format (xpak, xpak-indexed, xsub, xsub-v2, vgxsub)
    #[arg(short, long, env = "TALON_FORMAT")]
    format: PackageFormat,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load packages and print a summary
    Info {
        #[command(flatten)]
        source: Source,
    },

    /// List every indexed object
    List {
        #[command(flatten)]
        source: Source,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Extract objects to a directory
    Extract {
        #[command(flatten)]
        source: Source,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Keys to extract, in hex; all objects when omitted
        #[arg(short, long = "key", value_parser = parse_key)]
        keys: Vec<u64>,

        /// Expected decompressed size of the requested keys
        #[arg(short, long)]
        size: Option<usize>,
    },
}

/// One row of `list --json`.
#[derive(Serialize)]
struct ListEntry<'a> {
    key: String,
    package: &'a str,
    offset: u64,
    compressed_size: u64,
    size_hint: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { source } => {
            cmd_info(&source)?;
        }
        Commands::List { source, json } => {
            cmd_list(&source, json)?;
        }
        Commands::Extract {
            source,
            output,
            keys,
            size,
        } => {
            cmd_extract(&source, &output, &keys, size)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_key(value: &str) -> std::result::Result<u64, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid key '{}': {}", value, e))
}

fn open_cache(source: &Source) -> Result<PackageCache> {
    let config = CacheConfig::new(source.format).with_recursive(source.recursive);
    let mut cache = PackageCache::new(config);

    let start = Instant::now();
    cache
        .load(&source.path)
        .with_context(|| format!("Failed to load packages from {}", source.path.display()))?;
    tracing::debug!(elapsed = ?start.elapsed(), "packages loaded");

    Ok(cache)
}

fn cmd_info(source: &Source) -> Result<()> {
    println!("Loading {} packages: {}", source.format, source.path.display());

    let start = Instant::now();
    let cache = open_cache(source)?;
    let summary = cache.load_summary();

    println!("Loaded in {:?}", start.elapsed());
    println!("Packages:    {}", summary.packages);
    println!("  indexed:   {}", summary.indexed);
    println!("  metadata:  {}", summary.skipped_metadata);
    println!("  failed:    {}", summary.failed);
    println!("Objects:     {}", summary.entries);
    println!("Overwritten: {}", summary.overwritten);

    for package in cache.packages() {
        match package.kind {
            PackageKind::Data { entries } => {
                println!("{:>10} {:>14} {}", entries, package.descriptor.size, package.name());
            }
            PackageKind::Metadata { kind } => {
                let label = format!("type {}", kind);
                println!("{:>10} {:>14} {}", label, package.descriptor.size, package.name());
            }
        }
    }

    Ok(())
}

fn cmd_list(source: &Source, json: bool) -> Result<()> {
    let cache = open_cache(source)?;
    let packages = cache.packages();

    let mut rows = Vec::with_capacity(cache.entry_count());
    for key in cache.index().sorted_keys() {
        if let Some(record) = cache.lookup(key) {
            let package = packages
                .get(record.package_index as usize)
                .map(|p| p.name())
                .unwrap_or("?");
            rows.push(ListEntry {
                key: format!("{:016x}", key),
                package,
                offset: record.offset,
                compressed_size: record.compressed_size,
                size_hint: record.decompressed_size_hint,
            });
        }
    }

    if json {
        let stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(stdout, &rows).context("Failed to write JSON")?;
        println!();
    } else {
        for row in &rows {
            println!(
                "{} {:>14} {:>12} {:>12} {}",
                row.key, row.offset, row.compressed_size, row.size_hint, row.package
            );
        }
        println!("\nTotal: {} objects", rows.len());
    }

    Ok(())
}

fn cmd_extract(source: &Source, output: &Path, keys: &[u64], size: Option<usize>) -> Result<()> {
    let cache = open_cache(source)?;

    let keys = if keys.is_empty() {
        cache.index().sorted_keys()
    } else {
        keys.to_vec()
    };

    println!("Extracting {} objects to {}...", keys.len(), output.display());
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let pb = ProgressBar::new(keys.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let extracted = AtomicUsize::new(0);
    let missing = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    keys.par_iter().for_each(|&key| {
        match extract_one(&cache, output, key, size) {
            Ok(true) => {
                extracted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                pb.println(format!("{:016x}: not found", key));
                missing.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                pb.println(format!("{:016x}: {:#}", key, e));
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    });

    pb.finish_with_message("Done");
    println!(
        "Extracted {} objects in {:?} ({} missing, {} errors)",
        extracted.into_inner(),
        start.elapsed(),
        missing.into_inner(),
        errors.into_inner()
    );

    Ok(())
}

fn extract_one(cache: &PackageCache, output: &Path, key: u64, size: Option<usize>) -> Result<bool> {
    let Some(data) = cache.extract(key, size)? else {
        return Ok(false);
    };

    let output_path = output.join(format!("{:016x}.bin", key));
    fs::write(&output_path, data)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(true)
}
