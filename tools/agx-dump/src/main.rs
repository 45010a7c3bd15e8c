#![forbid(unsafe_code)]

mod manifest;
mod readback;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use agx_decode::{decode_submission, DecodeOptions, DumpConfig, DumpSink, DumpTarget, Trace};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::manifest::Manifest;

#[derive(Debug, Parser)]
#[command(name = "agx-dump")]
#[command(about = "Decode captured AGX submissions and framebuffers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode the command buffer listed in a capture manifest.
    Decode(DecodeArgs),
    /// Convert a tiled 32bpp framebuffer capture to PNG.
    Detile(DetileArgs),
}

#[derive(Debug, Args)]
struct DecodeArgs {
    /// JSON manifest listing the captured allocations.
    manifest: PathBuf,

    /// Command buffer handle (overrides the manifest's `cmdbuf`).
    #[arg(long)]
    cmdbuf: Option<u32>,

    /// Memory map handle (overrides the manifest's `map`).
    #[arg(long)]
    map: Option<u32>,

    /// Dump base path, or `stderr` (overrides AGXDECODE_DUMP_FILE).
    #[arg(long, value_name = "PATH")]
    dump_file: Option<String>,

    /// Hex dump every decoded object (also AGXDECODE_VERBOSE).
    #[arg(long)]
    verbose: bool,

    /// Deepest pipeline/shader nesting to follow.
    #[arg(long, default_value_t = agx_decode::MAX_NESTING)]
    max_nesting: u32,
}

#[derive(Debug, Args)]
struct DetileArgs {
    /// Raw tiled framebuffer bytes.
    tiled: PathBuf,

    #[arg(long)]
    width: u32,

    #[arg(long)]
    height: u32,

    /// Output PNG path.
    #[arg(short, long)]
    output: PathBuf,

    /// Swap the red and blue channels (BGRA captures).
    #[arg(long)]
    swap_rb: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode(args) => decode(args),
        Commands::Detile(args) => detile(args),
    }
}

fn decode(args: DecodeArgs) -> anyhow::Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let base_dir = args.manifest.parent().unwrap_or(Path::new("."));
    let registry = manifest.registry(base_dir)?;

    let cmdbuf = args
        .cmdbuf
        .or(manifest.cmdbuf)
        .context("no command buffer handle: pass --cmdbuf or set `cmdbuf` in the manifest")?;
    let map = args
        .map
        .or(manifest.map)
        .context("no memory map handle: pass --map or set `map` in the manifest")?;

    let mut config = DumpConfig::from_env();
    config.verbose |= args.verbose;
    if let Some(dump) = args.dump_file {
        config.target = if dump == "stderr" {
            DumpTarget::Stderr
        } else {
            DumpTarget::Files(PathBuf::from(dump))
        };
    }

    let options = DecodeOptions {
        max_nesting: args.max_nesting,
        ..DecodeOptions::default()
    };
    let submission = decode_submission(&registry, cmdbuf, map, options)
        .with_context(|| format!("decode command buffer {cmdbuf} from {}", args.manifest.display()))?;
    tracing::info!(
        cmdbuf,
        commands = submission.encoder.items.len(),
        touched = submission.touched,
        "decoded submission"
    );

    let mut sink = DumpSink::new(config);
    let path = sink.path();
    let trace = Trace::submission(&submission, &registry, sink.config().verbose).to_string();
    sink.write_str(&trace)
        .and_then(|()| sink.next_frame())
        .with_context(|| match &path {
            Some(path) => format!("write trace to {}", path.display()),
            None => "write trace to stderr".to_string(),
        })?;
    if let Some(path) = path {
        println!("{}", path.display());
    }
    Ok(())
}

fn detile(args: DetileArgs) -> anyhow::Result<()> {
    let tiled =
        fs::read(&args.tiled).with_context(|| format!("open input {}", args.tiled.display()))?;
    let rgba = readback::detile_rgba(&tiled, args.width, args.height, args.swap_rb)
        .with_context(|| format!("detile {}", args.tiled.display()))?;
    readback::write_png(&args.output, args.width, args.height, &rgba)
}
