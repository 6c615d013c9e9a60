//! Decoder binary - turns a raw CTP timeframe file into digits and luminosity
//!
//! Output is JSON lines: one `digits` record and one `lumi` record per
//! timeframe, depending on which outputs are enabled.
//!
//! Usage:
//!   cargo run --bin ctp_decoder -- -i run.ctpraw                  # JSON lines to stdout
//!   cargo run --bin ctp_decoder -- -i run.ctpraw -o out.jsonl -v  # File output, verbose lumi
//!   cargo run --bin ctp_decoder -- -i run.ctpraw --no-digits      # Luminosity only

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use clap::Parser;
use ctp_decoder::common::cli::DecoderArgs;
use ctp_decoder::config::Config;
use ctp_decoder::decoder::{DecoderConfig, RawDecoder};
use ctp_decoder::recorder::{open_raw_file, OutputWriter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Timeframes between progress log lines
const PROGRESS_INTERVAL: usize = 100;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for JSON lines
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctp_decoder=info".parse()?))
        .init();

    let args = DecoderArgs::parse();

    let config_path = &args.common.config_file;
    let config = if Path::new(config_path).exists() {
        info!(config_file = %config_path, "Loaded configuration");
        Config::load(config_path)?
    } else {
        Config::default()
    };

    let mut decoder_config = DecoderConfig::from_config(&config);
    if let Some(window_size) = args.window_size {
        decoder_config.window_size = window_size;
    }
    if args.verbose {
        decoder_config.verbose = true;
    }
    if args.no_digits {
        decoder_config.do_digits = false;
    }
    if args.no_lumi {
        decoder_config.do_lumi = false;
    }
    let mut decoder = RawDecoder::new(decoder_config)?;

    let mut reader = open_raw_file(Path::new(&args.input))?;
    info!(
        input = %args.input,
        run = reader.header().run_number,
        orbits_per_tf = reader.header().orbits_per_tf,
        "Opened raw file"
    );

    let timeframes = if args.salvage {
        let mut tfs = Vec::new();
        for tf in reader.timeframes() {
            match tf {
                Ok(tf) => tfs.push(tf),
                Err(e) => {
                    warn!(error = %e, recovered = tfs.len(), "Stopped at unreadable block");
                    break;
                }
            }
        }
        tfs
    } else {
        reader.read_all()?
    };

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = OutputWriter::new(sink);

    let mut last_report = *decoder.stats();
    for (i, tf) in timeframes.iter().enumerate() {
        let output = decoder.run(tf);
        writer.write_output(&output)?;

        if (i + 1) % PROGRESS_INTERVAL == 0 {
            let now = *decoder.stats();
            let delta = now.since(&last_report);
            info!(
                timeframes = now.timeframes,
                digits = delta.digits,
                bytes = delta.bytes,
                errors = delta.errors(),
                "Progress"
            );
            last_report = now;
        }
    }
    let records = writer.records_written();
    writer.finish()?;

    let stats = decoder.stats();
    info!(
        timeframes = stats.timeframes,
        placeholders = stats.dummy_timeframes,
        frames = stats.frames,
        skipped = stats.frames_skipped,
        gbt_words = stats.gbt_words,
        digits = stats.digits,
        collisions = stats.collisions,
        errors = stats.errors(),
        records,
        "Decoding complete"
    );
    Ok(())
}
