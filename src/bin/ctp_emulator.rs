//! Emulator binary - writes a raw CTP timeframe file
//!
//! Usage:
//!   cargo run --bin ctp_emulator -- -o run.ctpraw                 # Use defaults
//!   cargo run --bin ctp_emulator -- -o run.ctpraw -f config.toml  # Use config file
//!   cargo run --bin ctp_emulator -- -o run.ctpraw -n 10 --seed 1  # 10 timeframes, fixed seed

use std::path::Path;

use clap::Parser;
use ctp_decoder::common::cli::EmulatorArgs;
use ctp_decoder::config::Config;
use ctp_decoder::data_source_emulator::{EmulatorConfig, TimeframeEmulator};
use ctp_decoder::recorder::{create_raw_file, FileHeader};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctp_decoder=info".parse()?))
        .init();

    let args = EmulatorArgs::parse();

    let config_path = &args.common.config_file;
    let config = if Path::new(config_path).exists() {
        info!(config_file = %config_path, "Loaded configuration");
        Config::load(config_path)?
    } else {
        Config::default()
    };

    let mut emulator_config = EmulatorConfig::from_config(&config);
    if let Some(n) = args.n_timeframes {
        emulator_config.n_timeframes = n;
    }
    if let Some(n) = args.orbits_per_tf {
        emulator_config.orbits_per_tf = n;
    }
    if let Some(rate) = args.rate {
        emulator_config.mean_triggers_per_orbit = rate;
    }
    if let Some(every) = args.dead_beef_every {
        emulator_config.dead_beef_every = every;
    }
    if args.seed.is_some() {
        emulator_config.seed = args.seed;
    }

    let mut emulator = TimeframeEmulator::new(emulator_config.clone())?;

    let mut header = FileHeader::new(args.run_number, emulator_config.orbits_per_tf);
    header.comment = "ctp_emulator".to_string();
    if let Some(seed) = emulator_config.seed {
        header.metadata.insert("seed".to_string(), seed.to_string());
    }
    header.metadata.insert(
        "mean_triggers_per_orbit".to_string(),
        emulator_config.mean_triggers_per_orbit.to_string(),
    );

    let mut writer = create_raw_file(Path::new(&args.output), &header)?;
    let mut n_digits = 0usize;
    let mut n_placeholders = 0u32;
    for _ in 0..emulator_config.n_timeframes {
        let generated = emulator.next_timeframe();
        n_digits += generated.digits.len();
        if generated.is_placeholder {
            n_placeholders += 1;
        }
        writer.write_timeframe(&generated.timeframe)?;
    }
    let (_, footer) = writer.finish()?;

    info!(
        output = %args.output,
        timeframes = footer.n_timeframes,
        placeholders = n_placeholders,
        digits = n_digits,
        bytes = footer.data_bytes,
        "Emulation complete"
    );
    Ok(())
}
