#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use agx_disasm::disassemble;
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Most bytes handed to the disassembler.
const MAX_CODE_BYTES: u64 = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "agx-disasm",
    about = "Disassemble AGX shader code starting at a byte offset in a binary."
)]
struct Args {
    /// Binary holding the shader code
    file: PathBuf,

    /// Offset of the first instruction, in hex (`0x` prefix optional)
    #[arg(value_name = "HEX_OFFSET", value_parser = parse_hex_offset)]
    offset: u64,

    /// Print the encoded bytes of every instruction, not only unknown ones
    #[arg(long, action = clap::ArgAction::SetTrue)]
    verbose: bool,
}

fn parse_hex_offset(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|err| format!("invalid hex offset {s:?}: {err}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let verbose = args.verbose
        || std::env::var_os("AGXDECODE_VERBOSE").is_some_and(|v| !v.is_empty());

    let mut file =
        File::open(&args.file).with_context(|| format!("open input {}", args.file.display()))?;
    file.seek(SeekFrom::Start(args.offset))
        .with_context(|| format!("seek to 0x{:x} in {}", args.offset, args.file.display()))?;

    let mut code = Vec::new();
    file.take(MAX_CODE_BYTES)
        .read_to_end(&mut code)
        .with_context(|| format!("read {}", args.file.display()))?;
    tracing::debug!(offset = args.offset, len = code.len(), "read shader code");

    let disassembly = disassemble(&code);
    print!("{}", disassembly.listing(verbose));
    Ok(())
}
