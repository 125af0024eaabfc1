//! Decode one Modbus poll response through a configured read point.
//!
//! The read point, its poller and the linked channels come from a JSON5
//! file; the poll response is given on the command line. One update per
//! published channel is written to stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use modsight_common::{Format, LoggingConfig};
use modsight_modbus::bridge::{BridgeRegistry, BridgeStatus, PollBinding};
use modsight_modbus::codec::{BitArray, RegisterArray};
use modsight_modbus::config::ReadToolConfig;
use modsight_modbus::dispatcher::{PollData, ReadPointDispatcher, ReadPointState};
use modsight_modbus::sink::{ChannelUpdate, RecordingSink};

const READ_POINT_ID: &str = "read";
const READ_WRITE_ID: &str = "readwrite";
const POLLER_ID: &str = "poller";

/// Modbus read point decoder.
#[derive(Parser, Debug)]
#[command(name = "modsight-read")]
#[command(about = "Decodes a Modbus poll response and prints the channel updates")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "readpoint.json5")]
    config: PathBuf,

    /// Register words of the poll response, e.g. "1,0x2,65535"
    #[arg(short, long, value_delimiter = ',', value_parser = parse_word, conflicts_with = "bits")]
    registers: Vec<u16>,

    /// Bits of the poll response, e.g. "1,0,true"
    #[arg(short, long, value_delimiter = ',', value_parser = parse_bit)]
    bits: Vec<bool>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_word(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid register word '{}': {}", s, e))
}

fn parse_bit(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(format!("invalid bit '{}': expected 0, 1, true or false", other)),
    }
}

fn write_update(out: &mut impl Write, update: &ChannelUpdate, format: Format) -> Result<()> {
    let bytes = modsight_common::encode(update, format)
        .map_err(|e| anyhow::anyhow!("Failed to encode update: {}", e))?;
    out.write_all(&bytes)?;
    if format == Format::Json {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ReadToolConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    modsight_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Loaded configuration from {:?}", args.config);

    let reads_registers = config.poller.function_code.reads_registers();
    if reads_registers && args.registers.is_empty() {
        bail!("Poller reads registers: pass the response with --registers");
    }
    if !reads_registers && args.bits.is_empty() {
        bail!("Poller reads bits: pass the response with --bits");
    }

    let bridges = Arc::new(BridgeRegistry::new());
    bridges.add_bridge(POLLER_ID, "poller", BridgeStatus::Online);
    bridges.add_bridge(READ_WRITE_ID, "readwrite", BridgeStatus::Online);
    bridges.set_parent(READ_POINT_ID, Some(READ_WRITE_ID));
    bridges.set_parent(READ_WRITE_ID, Some(POLLER_ID));
    if config.poller.enabled {
        bridges.set_poll_binding(
            POLLER_ID,
            Some(PollBinding {
                function_code: config.poller.function_code,
                data_length: config.poller.length,
            }),
        );
    }

    let sink = Arc::new(RecordingSink::new());
    let dispatcher = ReadPointDispatcher::new(READ_POINT_ID, bridges, sink.clone());

    let state = dispatcher.activate(&config.read_point, config.channels.clone());
    if state != ReadPointState::Ready {
        bail!("Read point is not ready: {}", state);
    }

    let registers = RegisterArray::new(args.registers.iter().copied());
    let bits = BitArray::new(args.bits.iter().copied());
    let data = if reads_registers {
        PollData::Registers(&registers)
    } else {
        PollData::Bits(&bits)
    };

    let Some(states) = dispatcher.on_data_received(data) else {
        bail!("No update published: {}", dispatcher.state());
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (channel, value) in states.iter() {
        let update = ChannelUpdate::new(READ_POINT_ID, channel.as_str(), value.clone());
        write_update(&mut out, &update, config.serialization)?;
    }
    out.flush()?;

    info!(
        "Published {} of {} channel(s)",
        states.len(),
        config.channels.len()
    );
    Ok(())
}
