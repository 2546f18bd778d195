mod cli;

use transboxer::{
    config, drive,
    transboxer::{Counts, TransboxSink},
    Transboxer, WriteSink,
};
use transboxer_ebml::{Decoder, TagEvent, TagKind, Value};
use transboxer_fmp4::{ChunkSink, OutputChunk};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "transboxer=trace,transboxer_ebml=debug,transboxer_avc=debug,transboxer_fmp4=debug"
                .to_string()
        } else {
            "transboxer=info,transboxer_ebml=warn,transboxer_avc=warn,transboxer_fmp4=warn"
                .to_string()
        }
    });

    // Output may go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            chunk_size,
            timescale,
            lenient,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(chunk_size) = chunk_size {
                config.input.chunk_size = chunk_size;
            }
            if let Some(timescale) = timescale {
                config.transbox.timescale = timescale;
            }
            if lenient {
                config.transbox.strict = false;
            }
            config::validate_config(&config)?;
            convert(&input, output.as_deref(), &config)
        }
        Commands::Inspect { file, tags, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            if tags {
                print_tags(&file, config.input.chunk_size)
            } else {
                inspect(&file, &config, json)
            }
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("transboxer {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {:?}", path);
    }
    let file = File::open(path).with_context(|| format!("Failed to open input: {:?}", path))?;
    Ok(Box::new(file))
}

fn convert(input: &Path, output: Option<&Path>, config: &config::Config) -> Result<()> {
    let reader = open_input(input)?;
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    tracing::info!("Converting {:?}", input);
    let mut transboxer = Transboxer::new(config.transbox.clone(), WriteSink::new(writer));
    let counts = drive::transbox_reader(reader, &mut transboxer, config.input.chunk_size)
        .with_context(|| format!("Failed to convert {:?}", input))?;

    let written = transboxer.sink().written();
    tracing::info!(
        "Done: {} bytes in ({} reads), {} blocks, {} fragments, {} bytes out",
        counts.bytes,
        counts.packets,
        counts.blocks,
        counts.fragments,
        written
    );
    if counts.fragments == 0 {
        tracing::warn!("No video frames were found in {:?}", input);
    }
    Ok(())
}

/// Counts output without keeping it.
#[derive(Default)]
struct Tally {
    chunks: usize,
    bytes: u64,
}

impl ChunkSink for Tally {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()> {
        self.chunks += 1;
        self.bytes += chunk.data.len() as u64;
        Ok(())
    }
}

impl TransboxSink for Tally {
    fn finished(&mut self, _counts: &Counts) {}
}

#[derive(Serialize)]
struct Summary {
    counts: Counts,
    output_chunks: usize,
    output_bytes: u64,
    video_track: Option<u64>,
    codec: Option<String>,
    metadata: BTreeMap<String, String>,
}

fn inspect(file: &Path, config: &config::Config, json: bool) -> Result<()> {
    let reader = open_input(file)?;
    let mut transboxer = Transboxer::new(config.transbox.clone(), Tally::default());
    let counts = drive::transbox_reader(reader, &mut transboxer, config.input.chunk_size)
        .with_context(|| format!("Failed to read {:?}", file))?;

    let summary = Summary {
        counts,
        output_chunks: transboxer.sink().chunks,
        output_bytes: transboxer.sink().bytes,
        video_track: transboxer.video_track(),
        codec: transboxer.codec_config().map(|c| c.codec_string()),
        metadata: transboxer
            .metadata()
            .iter()
            .map(|(k, v)| (k.clone(), describe(v)))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Input: {} bytes", summary.counts.bytes);
    println!("Blocks: {}", summary.counts.blocks);
    match (summary.video_track, &summary.codec) {
        (Some(track), Some(codec)) => println!("Video: track {} {}", track, codec),
        (None, Some(codec)) => println!("Video: {}", codec),
        (Some(track), None) => println!("Video: track {}", track),
        (None, None) => println!("Video: none"),
    }
    println!(
        "Output: {} fragments, {} bytes",
        summary.counts.fragments, summary.output_bytes
    );

    println!("\nMetadata: {}", summary.metadata.len());
    for (path, value) in &summary.metadata {
        println!("  {} = {}", path, value);
    }

    Ok(())
}

fn print_tags(file: &Path, chunk_size: usize) -> Result<()> {
    let mut reader = open_input(file)?;
    let mut decoder = Decoder::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; chunk_size.max(1)];

    let mut print = |ev: TagEvent| -> Result<()> {
        let indent = "  ".repeat(ev.depth);
        match ev.kind {
            TagKind::Start => {
                let size = ev
                    .data_size
                    .map_or_else(|| "unknown".to_string(), |s| s.to_string());
                writeln!(
                    out,
                    "{}{} [{:X}] @{} size {}",
                    indent, ev.name, ev.id, ev.tag_start, size
                )?;
            }
            TagKind::Tag => {
                let value = ev.value.as_ref().map_or_else(String::new, describe);
                writeln!(out, "{}{} [{:X}] = {}", indent, ev.name, ev.id, value)?;
            }
            TagKind::End => {}
        }
        Ok(())
    };

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        decoder.write(&buf[..n], &mut print)?;
    }
    decoder.finish(&mut print)?;
    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Unsigned(v) => v.to_string(),
        Value::UnsignedHex(v) => format!("0x{}", v),
        Value::Signed(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::NotANumber => "NaN".to_string(),
        Value::String(s) | Value::Utf8(s) => format!("{:?}", s),
        Value::Date(_) => value
            .as_unix_nanos()
            .map_or_else(String::new, |ns| format!("{} ns since Unix epoch", ns)),
        Value::Binary(b) | Value::Unknown(b) => format!("<{} bytes>", b.len()),
        Value::Block(b) => format!(
            "track {}, timecode {}{}, {} bytes",
            b.track,
            b.timecode,
            if b.keyframe { ", keyframe" } else { "" },
            b.payload.len()
        ),
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            println!("Default config:");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let transbox = &config.transbox;
    println!("  Media type: {}", transbox.media_type);
    println!("  Timescale: {}", transbox.timescale);
    println!("  Track id: {}", transbox.track_id);
    println!("  Handler name: {}", transbox.handler_name);
    println!("  Strict: {}", transbox.strict);
    println!("  Max leaf size: {} bytes", transbox.max_leaf_size);
    println!("  Initial buffer: {} bytes", transbox.initial_size);
    println!("  Read size: {} bytes", config.input.chunk_size);
}
