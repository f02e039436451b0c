//! shard-ctl: command-line driver for chunked transfers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use shard_core::config::ShardConfig;
use shard_core::Chunk;
use shard_transfer::{send_to, shuffle_chunks};

const DEFAULT_HOST: &str = "127.0.0.1";

// ── Arguments ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Options {
    host: String,
    port: u16,
    chunk_size: usize,
    shuffle: bool,
    output: Option<PathBuf>,
    positional: Vec<String>,
}

impl Options {
    fn parse(args: &[String], config: &ShardConfig) -> Result<Self> {
        let mut opts = Options {
            host: DEFAULT_HOST.to_string(),
            port: config.network.port,
            chunk_size: config.transfer.chunk_size,
            shuffle: config.transfer.shuffle,
            output: None,
            positional: Vec::new(),
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" => {
                    opts.host = iter.next().context("--host requires a value")?.clone();
                }
                "--port" => {
                    opts.port = iter
                        .next()
                        .context("--port requires a value")?
                        .parse()
                        .context("--port must be a number")?;
                }
                "--chunk-size" => {
                    opts.chunk_size = iter
                        .next()
                        .context("--chunk-size requires a value")?
                        .parse()
                        .context("--chunk-size must be a number")?;
                }
                "--output" => {
                    opts.output = Some(PathBuf::from(
                        iter.next().context("--output requires a value")?,
                    ));
                }
                "--shuffle" => opts.shuffle = true,
                flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
                _ => opts.positional.push(arg.clone()),
            }
        }
        Ok(opts)
    }

    fn input(&self) -> Result<PathBuf> {
        match self.positional.as_slice() {
            [_, path] => Ok(PathBuf::from(path)),
            _ => bail!("expected exactly one input file"),
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read input file: {}", path.display()))
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_send(opts: &Options, config: &ShardConfig) -> Result<()> {
    let input = opts.input()?;
    let data = read_input(&input)?;
    let mut chunks = config.transfer.codec().encode(&data, opts.chunk_size)?;

    if opts.shuffle {
        println!("Shuffling chunks before sending...");
        shuffle_chunks(&mut chunks);
    }

    let addr = format!("{}:{}", opts.host, opts.port);
    let bytes = send_to(&addr, &chunks)
        .await
        .with_context(|| format!("failed to send to {addr}"))?;
    println!("All {} chunks sent to {addr} ({bytes} bytes on the wire)", chunks.len());
    Ok(())
}

fn cmd_roundtrip(opts: &Options, config: &ShardConfig) -> Result<()> {
    let input = opts.input()?;
    let data = read_input(&input)?;
    let codec = config.transfer.codec();

    println!("Chunking '{}' ({} bytes)...", input.display(), data.len());
    let mut chunks = codec.encode(&data, opts.chunk_size)?;
    shuffle_chunks(&mut chunks);
    println!("{} chunks generated and shuffled.", chunks.len());

    println!("Reassembling...");
    let reassembled = codec.decode(chunks)?;
    if reassembled != data {
        bail!("reassembled payload differs from input");
    }

    match &opts.output {
        Some(path) => {
            std::fs::write(path, &reassembled)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Reassembled file saved to '{}'", path.display());
        }
        None => println!("Reassembly complete (no output file specified)"),
    }
    Ok(())
}

fn cmd_inspect(opts: &Options, config: &ShardConfig) -> Result<()> {
    let input = opts.input()?;
    let data = read_input(&input)?;
    let codec = config.transfer.codec();
    let chunks = codec.encode(&data, opts.chunk_size)?;

    println!("═══════════════════════════════════════");
    println!("  {}", input.display());
    println!("═══════════════════════════════════════");
    println!("  Payload bytes : {}", data.len());
    println!("  Encoded bytes : {}", encoded_len(&chunks));
    println!("  Transform     : {}", codec.transform().name());
    println!("  Chunk size    : {}", opts.chunk_size);
    println!("  Chunks        : {}", chunks.len());
    if let Some(first) = chunks.first() {
        println!("  Digest        : {}", hex::encode(first.digest));
    }
    for chunk in &chunks {
        println!("  ├─ #{:<6} {} bytes", chunk.sequence_index, chunk.payload_length());
    }
    Ok(())
}

fn encoded_len(chunks: &[Chunk]) -> usize {
    chunks.iter().map(Chunk::payload_length).sum()
}

fn print_usage() {
    println!("Usage: shard-ctl <command> <file> [options]");
    println!();
    println!("Commands:");
    println!("  send <file>        Chunk a file and send it to shardd");
    println!("  roundtrip <file>   Chunk, shuffle, and reassemble a file locally");
    println!("  inspect <file>     Show how a file would be chunked");
    println!();
    println!("Options:");
    println!("  --host <host>        Destination host (default: {DEFAULT_HOST})");
    println!("  --port <port>        Destination port (default: from config, 9000)");
    println!("  --chunk-size <n>     Encoded bytes per chunk (default: from config, 1024)");
    println!("  --shuffle            Shuffle chunks before sending");
    println!("  --output <path>      Where roundtrip writes the reassembled file");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ShardConfig::load().context("failed to load config")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let opts = Options::parse(&args, &config)?;

    let command: Vec<&str> = opts.positional.iter().take(1).map(String::as_str).collect();
    match command.as_slice() {
        ["send"] => cmd_send(&opts, &config).await,
        ["roundtrip"] => cmd_roundtrip(&opts, &config),
        ["inspect"] => cmd_inspect(&opts, &config),
        ["help"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
