//! Command-line extractor for ROM audio streams.
//!
//! Loads the ROM dumps found in a directory, reports what the set contains
//! and writes selected streams out as WAV files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use dcs_extract::{Decoder, ExtractConfig, RawPcmEngine, RomCheck, StreamInfo, StreamRef};

#[derive(Parser)]
#[command(name = "dcs-extract")]
#[command(about = "Extract audio streams from sound-board ROM sets")]
struct Args {
    /// Directory holding the ROM dumps (*.uN, *uN.rom, *suN.l1)
    dir: PathBuf,

    /// JSON config file; command-line options override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output volume, 0-255
    #[arg(long, global = true)]
    volume: Option<u8>,

    /// Mixing level passed to the engine (100 = unity)
    #[arg(long, global = true)]
    mixing_level: Option<u8>,

    /// Playback channel
    #[arg(long, global = true)]
    channel: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the ROM set signature and track table summary
    Info,
    /// List every stream with its length and format
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write streams as WAV files
    Extract {
        /// Track ids, or @hex linear addresses
        streams: Vec<StreamRef>,

        /// Extract every stream in the track table
        #[arg(long)]
        all: bool,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct StreamRow {
    id: u16,
    frames: u16,
    bytes: u32,
    duration_secs: f64,
    format_type: u8,
    format_sub_type: u8,
}

impl StreamRow {
    fn new(id: u16, info: &StreamInfo) -> Self {
        StreamRow {
            id,
            frames: info.frame_count(),
            bytes: info.byte_count(),
            duration_secs: info.duration_secs(),
            format_type: info.format_type(),
            format_sub_type: info.format_sub_type(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let mut decoder = Decoder::with_config(RawPcmEngine::new(), config)?;
    let loaded = decoder
        .load_rom_dir(&args.dir)
        .with_context(|| format!("Failed to load ROM set from {}", args.dir.display()))?;
    tracing::debug!(loaded, "ROM dumps loaded");

    let status = decoder.check_completeness();
    if status != 0 {
        bail!(
            "ROM set in {} is incomplete: {:?}",
            args.dir.display(),
            RomCheck::from_bits_retain(status)
        );
    }
    decoder.soft_reset();

    match &args.command {
        Command::Info => print_info(&mut decoder),
        Command::List { json } => print_list(&mut decoder, *json),
        Command::Extract { streams, all, out } => extract(&mut decoder, streams, *all, out),
    }
}

fn build_config(args: &Args) -> Result<ExtractConfig> {
    let mut config = match &args.config {
        Some(path) => ExtractConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ExtractConfig::default(),
    };
    if let Some(volume) = args.volume {
        config = config.volume(volume);
    }
    if let Some(level) = args.mixing_level {
        config = config.mixing_level(level);
    }
    if let Some(channel) = args.channel {
        config = config.channel(channel);
    }
    Ok(config)
}

fn print_info(decoder: &mut Decoder<RawPcmEngine>) -> Result<()> {
    let signature = decoder.signature()?;
    let max = decoder.max_track_number()?;
    let streams = decoder.list_streams()?;

    println!("Signature:   {}", signature);
    println!("Banks:       {:?}", decoder.rom_store().chip_selects());
    println!("Max track:   {}", max);
    println!("Streams:     {}", streams.len());
    Ok(())
}

fn print_list(decoder: &mut Decoder<RawPcmEngine>, json: bool) -> Result<()> {
    let mut rows = Vec::new();
    for id in decoder.list_streams()? {
        let info = decoder
            .stream_info(StreamRef::Track(id))
            .with_context(|| format!("Failed to read stream {}", id))?;
        rows.push(StreamRow::new(id, &info));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:>6}  {:>7}  {:>10}  {:>9}  {:>6}", "id", "frames", "bytes", "seconds", "format");
    for row in &rows {
        println!(
            "{:>6}  {:>7}  {:>10}  {:>9.3}  {:>3}/{:<2}",
            row.id, row.frames, row.bytes, row.duration_secs, row.format_type, row.format_sub_type
        );
    }
    Ok(())
}

fn extract(
    decoder: &mut Decoder<RawPcmEngine>,
    streams: &[StreamRef],
    all: bool,
    out: &Path,
) -> Result<()> {
    let mut targets: Vec<StreamRef> = streams.to_vec();
    if all {
        targets.extend(decoder.list_streams()?.into_iter().map(StreamRef::Track));
    }
    if targets.is_empty() {
        bail!("Nothing to extract: name streams or pass --all");
    }

    fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    for stream in targets {
        let wav = decoder
            .extract_stream(stream)
            .with_context(|| format!("Failed to extract stream {}", stream))?;
        let path = out.join(output_name(stream));
        wav.write_to(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} -> {} ({:.2}s)", stream, path.display(), wav.duration_secs());
    }
    Ok(())
}

fn output_name(stream: StreamRef) -> String {
    match stream {
        StreamRef::Track(id) => format!("stream_{}.wav", id),
        StreamRef::Address(address) => format!("stream_{:08x}.wav", address),
    }
}
