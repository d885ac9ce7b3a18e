use clap::{Parser, Subcommand};
use std::path::PathBuf;

use otapatch::config::CACHE_TEMP_SOURCE;
use otapatch::mtd::FsMtdDevice;
use otapatch::space::NoEviction;
use otapatch::{self, engine, hash, PatchBlob, PatchValue, Sha1Digest, UpdateRequest, ValueTag};

#[derive(Parser)]
#[command(name = "otapatch", version = "1.0.0", about = "Crash-safe binary patch application")]
struct Cli {
    /// Base directory backing synthetic MTD partitions (no real flash
    /// driver wired up; partitions are plain files under this directory).
    #[arg(long, global = true, default_value = "/data/mtd")]
    mtd_base: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a set of candidate patches to bring `target` to the expected
    /// hash and size, selecting whichever patch matches the current source.
    Apply {
        /// Source path, or an `MTD:partition:size:sha1...` probe URI.
        #[arg(long)]
        source: String,
        /// Target path, or an `MTD:partition...` write URI.
        #[arg(long)]
        target: String,
        #[arg(long)]
        target_sha1: String,
        #[arg(long)]
        target_size: u64,
        /// One candidate patch as `source_sha1=path_to_patch_file`; repeatable.
        #[arg(long = "patch", required = true, num_args = 1..)]
        patches: Vec<String>,
    },
    /// Confirm a file or partition already holds one of the given hashes,
    /// without touching it. No hashes given means "just confirm it loads".
    Check {
        filename: String,
        #[arg(long = "sha1")]
        expected: Vec<String>,
    },
    /// Print the licenses of the third-party decoders this binary embeds.
    ShowLicenses,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let device = FsMtdDevice::new(&cli.mtd_base);

    match cli.command {
        Commands::Apply {
            source,
            target,
            target_sha1,
            target_size,
            patches,
        } => {
            let target_sha1 = hash::parse_sha1(&target_sha1)?;
            let loaded_patches = load_patches(&patches)?;
            let patch_refs: Vec<PatchBlob> = loaded_patches
                .iter()
                .map(|(sha1, value)| {
                    let data = value.as_blob()?;
                    Ok(PatchBlob {
                        source_sha1: *sha1,
                        data,
                    })
                })
                .collect::<Result<_, otapatch::EngineError>>()?;

            let request = UpdateRequest {
                source_name: &source,
                target_name: &target,
                target_sha1,
                target_size,
                patches: &patch_refs,
                cache_temp_source: CACHE_TEMP_SOURCE,
            };

            engine::apply(&request, &device, &mut NoEviction)?;
            tracing::info!(target = %target, "patch applied");
        }

        Commands::Check { filename, expected } => {
            let expected: Vec<Sha1Digest> = expected
                .iter()
                .map(|s| hash::parse_sha1(s))
                .collect::<Result<_, _>>()?;
            otapatch::check(&filename, &expected, CACHE_TEMP_SOURCE, &device)?;
            tracing::info!(file = %filename, "check passed");
        }

        Commands::ShowLicenses => {
            println!("otapatch itself: Apache-2.0");
            println!("qbsdiff (BSDIFF40 decoding): MIT");
            println!("sha1, hex, thiserror, clap, nix, tracing: MIT OR Apache-2.0");
        }
    }

    Ok(())
}

/// Parse `source_sha1=path` patch arguments and read each file into memory,
/// tagged as a blob value (`PatchValue`) the way the surrounding
/// scripting layer would hand the engine a patch blob.
fn load_patches(specs: &[String]) -> Result<Vec<(Sha1Digest, PatchValue)>, Box<dyn std::error::Error>> {
    specs
        .iter()
        .map(|spec| {
            let (sha1_str, path) = spec
                .split_once('=')
                .ok_or_else(|| format!("malformed --patch argument (want sha1=path): {spec}"))?;
            let sha1 = hash::parse_sha1(sha1_str)?;
            let data = std::fs::read(path)?;
            Ok((sha1, PatchValue { tag: ValueTag::Blob, data }))
        })
        .collect()
}
