//! mpx-input CLI
//!
//! Validate device configurations and replay driver samples through the
//! event synthesizer.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mpx_input_config::{build_context, build_devices, Config};
use mpx_input_core::history::{CoreTimeCoord, SlaveRecord};
use mpx_input_core::{
    DeviceId, DeviceRole, EventList, InputContext, InternalEvent, ManualClock, MasterKind,
    QueryMode, ScreenLayout,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "mpx-input")]
#[command(about = "Multi-pointer input event synthesis")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/mpx-input/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List configured devices
    Devices,

    /// Replay a script of driver samples and print the records as JSON lines
    Replay {
        /// Path to the replay script
        script: String,

        /// Dump this device's motion history after the replay
        #[arg(long)]
        history: Option<u16>,

        /// Layout of the history dump
        #[arg(long, value_enum, default_value_t = HistoryMode::Device)]
        history_mode: HistoryMode,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum HistoryMode {
    Core,
    Device,
}

impl From<HistoryMode> for QueryMode {
    fn from(mode: HistoryMode) -> Self {
        match mode {
            HistoryMode::Core => QueryMode::Core,
            HistoryMode::Device => QueryMode::Device,
        }
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    let config = match mpx_input_config::parse_config(&config_path) {
        Ok(config) => {
            init_tracing(config.global.log_level.as_filter());
            config
        }
        Err(e) => {
            init_tracing("warn");
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Validate => cmd_validate(&config_path, &config),
        Commands::Devices => cmd_devices(&config),
        Commands::Replay {
            script,
            history,
            history_mode,
        } => cmd_replay(&config, &script, history.map(DeviceId), history_mode.into()),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn cmd_validate(config_path: &Path, config: &Config) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    build_devices(config)?;

    println!("Configuration is valid!");
    println!("  Screens: {}", config.screens.len().max(1));
    println!("  Devices: {}", config.devices.len());
    for device in &config.devices {
        println!("    - {} (id {})", device.name, device.id);
    }
    Ok(())
}

fn cmd_devices(config: &Config) -> miette::Result<()> {
    let arena = build_devices(config)?;

    println!("Configured devices:\n");

    for device in arena.iter() {
        let role = match device.role {
            DeviceRole::Master(MasterKind::Pointer) => "master pointer".to_string(),
            DeviceRole::Master(MasterKind::Keyboard) => "master keyboard".to_string(),
            DeviceRole::Slave => match device.master {
                Some(master) => format!("slave of {}", master),
                None => "floating slave".to_string(),
            },
        };

        println!("  {} [{}] {}", device.id, role, device.name);
        if let Some(valuator) = &device.valuator {
            println!(
                "    Axes: {} ({}), history {}",
                valuator.num_axes(),
                valuator.mode,
                valuator.motion.capacity()
            );
            for (i, axis) in valuator.axes.iter().enumerate() {
                if axis.has_range() {
                    println!("      {}: [{}, {}] {}", i, axis.min_value, axis.max_value, axis.mode);
                } else {
                    println!("      {}: unranged {}", i, axis.mode);
                }
            }
        }
        if let Some(button) = &device.button {
            println!("    Buttons: {}", button.num_buttons());
        }
        if let Some(key) = &device.key {
            println!(
                "    Keys: {}..={}",
                key.keymap.min_key_code, key.keymap.max_key_code
            );
        }
        if !device.enabled {
            println!("    Disabled");
        }
        println!();
    }

    Ok(())
}

fn cmd_replay(
    config: &Config,
    script: &str,
    history: Option<DeviceId>,
    mode: QueryMode,
) -> miette::Result<()> {
    let script_path: PathBuf = shellexpand::tilde(script).into_owned().into();
    let samples = mpx_input_config::parse_script(&script_path)?;
    let mut ctx = build_context(config, ManualClock::new(0))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    replay(&mut ctx, &samples, &mut out).map_err(|e| miette::miette!("{:#}", e))?;
    if let Some(dev) = history {
        dump_history(&ctx, dev, mode, &mut out).map_err(|e| miette::miette!("{:#}", e))?;
    }
    Ok(())
}

fn replay(
    ctx: &mut InputContext<ScreenLayout, ManualClock>,
    samples: &[mpx_input_config::Sample],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut list = EventList::with_maximum();

    for (index, sample) in samples.iter().enumerate() {
        if let Some(time) = sample.time {
            ctx.clock().set(time);
        }
        let (events, _) = list.slots_mut();
        match sample.synthesize(ctx, events) {
            Ok(count) => {
                for event in list.produced(count) {
                    emit(out, &Record::from(event))?;
                }
            }
            Err(e) => emit(
                out,
                &Record::Rejected {
                    sample: index,
                    device: sample.device.0,
                    error: e.to_string(),
                },
            )?,
        }
    }

    Ok(())
}

fn dump_history(
    ctx: &InputContext<ScreenLayout, ManualClock>,
    dev: DeviceId,
    mode: QueryMode,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let capacity = ctx
        .devices()
        .get(dev)
        .and_then(|d| d.valuator.as_ref())
        .map_or(0, |v| v.motion.capacity());
    let size = ctx.motion_history_buffer_size(dev, mode);
    let mut buffer = vec![0u8; size];
    let count = ctx
        .get_motion_history(dev, 0, u32::MAX, mode, &mut buffer)
        .with_context(|| format!("reading motion history of device {}", dev))?;
    if count == 0 {
        return Ok(());
    }
    let stride = size / capacity;

    for chunk in buffer.chunks_exact(stride).take(count) {
        let record = match mode {
            QueryMode::Core => {
                let coord = CoreTimeCoord::decode(chunk);
                Record::History {
                    device: dev.0,
                    time: coord.time,
                    values: vec![i32::from(coord.x), i32::from(coord.y)],
                }
            }
            QueryMode::Device => {
                let record = SlaveRecord::decode(chunk, (stride - 4) / 4);
                Record::History {
                    device: dev.0,
                    time: record.time,
                    values: record.values().to_vec(),
                }
            }
        };
        emit(out, &record)?;
    }

    Ok(())
}

fn emit(out: &mut impl Write, record: &Record) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, record).context("serializing record")?;
    writeln!(out).context("writing record")?;
    Ok(())
}

/// One line of replay output
#[derive(Serialize, Debug)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum Record {
    DeviceChanged {
        time: u32,
        device: u16,
        master: u16,
        flags: u32,
        buttons: usize,
        axes: Vec<AxisRecord>,
        min_keycode: u8,
        max_keycode: u8,
    },
    Raw {
        #[serde(rename = "type")]
        event_type: String,
        time: u32,
        device: u16,
        detail: u32,
        valuators: Vec<RawValuator>,
    },
    Event {
        #[serde(rename = "type")]
        event_type: String,
        time: u32,
        device: u16,
        source: u16,
        detail: u32,
        root_x: i32,
        root_y: i32,
        root_x_frac: f64,
        root_y_frac: f64,
        valuators: Vec<ValuatorRecord>,
    },
    Rejected {
        sample: usize,
        device: u16,
        error: String,
    },
    History {
        device: u16,
        time: u32,
        values: Vec<i32>,
    },
}

#[derive(Serialize, Debug)]
struct AxisRecord {
    min: i32,
    max: i32,
    resolution: i32,
    mode: String,
}

#[derive(Serialize, Debug)]
struct RawValuator {
    axis: usize,
    value: i32,
    raw: i32,
}

#[derive(Serialize, Debug)]
struct ValuatorRecord {
    axis: usize,
    value: i32,
    frac: i32,
    absolute: bool,
}

impl From<&InternalEvent> for Record {
    fn from(event: &InternalEvent) -> Self {
        match event {
            InternalEvent::DeviceChanged(dce) => Record::DeviceChanged {
                time: dce.time,
                device: dce.device_id.0,
                master: dce.master_id.0,
                flags: dce.flags.bits(),
                buttons: dce.num_buttons,
                axes: dce
                    .valuators()
                    .iter()
                    .map(|a| AxisRecord {
                        min: a.min_value,
                        max: a.max_value,
                        resolution: a.resolution,
                        mode: a.mode.to_string(),
                    })
                    .collect(),
                min_keycode: dce.min_keycode,
                max_keycode: dce.max_keycode,
            },
            InternalEvent::Raw(raw) => Record::Raw {
                event_type: raw.event_type.to_string(),
                time: raw.time,
                device: raw.device_id.0,
                detail: raw.detail,
                valuators: raw
                    .mask
                    .iter()
                    .map(|axis| RawValuator {
                        axis,
                        value: raw.data[axis],
                        raw: raw.data_raw[axis],
                    })
                    .collect(),
            },
            InternalEvent::Device(ev) => Record::Event {
                event_type: ev.event_type.to_string(),
                time: ev.time,
                device: ev.device_id.0,
                source: ev.source_id.0,
                detail: ev.detail,
                root_x: ev.root_x,
                root_y: ev.root_y,
                root_x_frac: ev.root_x_frac,
                root_y_frac: ev.root_y_frac,
                valuators: ev
                    .valuators
                    .values()
                    .map(|(axis, value)| ValuatorRecord {
                        axis,
                        value,
                        frac: ev.valuators.data_frac[axis],
                        absolute: ev.valuators.mode.test(axis),
                    })
                    .collect(),
            },
        }
    }
}
