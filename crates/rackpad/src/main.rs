//! rackpad - headless controller front-end host
//!
//! Wires the panel config, a rack description and the console device into
//! the engine and runs the control loop until `q` is typed on stdin.
//!
//! ## Command line flags
//!
//! - `--config PATH`: panel config (default ~/.config/rackpad/config.yaml)
//! - `--rack PATH`: rack description YAML (default: built-in demo rack)
//! - `--port N`: override the listen port
//! - `--ticks N`: stop after N ticks

mod console;

use anyhow::{bail, Context, Result};
use console::ConsoleDevice;
use rackpad_core::model::{Module, Page, Parameter, Rack};
use rackpad_core::{
    default_config_path, load_config, ChangeSource, Engine, MemoryModel, PanelConfig,
    RackModel, MODULE_ORDER_RESOURCE,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const USAGE: &str = "usage: rackpad [--config PATH] [--rack PATH] [--port N] [--ticks N]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    rack: Option<PathBuf>,
    port: Option<u16>,
    ticks: Option<u64>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--rack" => parsed.rack = Some(PathBuf::from(value("--rack")?)),
            "--port" => {
                parsed.port = Some(value("--port")?.parse().context("--port must be 0-65535")?)
            }
            "--ticks" => {
                parsed.ticks = Some(value("--ticks")?.parse().context("--ticks must be a number")?)
            }
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(parsed)
}

/// Two small modules so the panel has something to show without a rack file
fn demo_model() -> MemoryModel {
    let osc = Module::new("osc1", "Oscillator", "osc")
        .with_param(Parameter::float("freq", "Freq", 20.0, 2000.0, 440.0).with_unit("Hz"))
        .with_param(Parameter::float("fine", "Fine", -1.0, 1.0, 0.0))
        .with_param(Parameter::int("oct", "Octave", -3, 3, 0))
        .with_param(Parameter::float("shape", "Shape", 0.0, 1.0, 0.0))
        .with_param(Parameter::toggle("sync", "Sync", false))
        .with_page(Page::new("main", "Main", &["freq", "fine", "oct", "shape"]))
        .with_page(Page::new("mod", "Mod", &["sync"]));
    let filter = Module::new("flt1", "Filter", "filter")
        .with_param(Parameter::float("cutoff", "Cutoff", 0.0, 1.0, 0.7))
        .with_param(Parameter::float("res", "Res", 0.0, 1.0, 0.2))
        .with_page(Page::new("main", "Main", &["cutoff", "res"]));
    let rack = Rack::new("demo", "Demo").with_module(osc).with_module(filter);
    MemoryModel::with_racks(vec![rack]).with_module_types(&["osc", "filter", "delay"])
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config: PanelConfig = load_config(&config_path);
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let mut model = match &args.rack {
        Some(path) => MemoryModel::load(path)?,
        None => {
            log::info!("No --rack given, using the demo rack");
            demo_model()
        }
    };
    model.announce_all(ChangeSource::Remote);
    let racks: Vec<(String, String)> = model
        .racks()
        .iter()
        .map(|r| {
            let ids: Vec<&str> = r.modules.iter().map(|m| m.id.as_str()).collect();
            (r.id.clone(), ids.join(" "))
        })
        .collect();
    for (rack, order) in racks {
        model.set_resource(ChangeSource::Remote, &rack, MODULE_ORDER_RESOURCE, &order);
    }

    let running = Arc::new(AtomicBool::new(true));
    let device = ConsoleDevice::spawn(running.clone())?;

    let mut engine = Engine::new(config, Box::new(device), Box::new(model))
        .context("Failed to start the engine")?;
    if !engine.init() {
        log::warn!("Running without remote input");
    }

    match args.ticks {
        Some(ticks) => {
            for _ in 0..ticks {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                engine.tick();
            }
        }
        None => engine.run(&running),
    }

    if engine.dropped_frames() > 0 {
        log::warn!("{} remote frame(s) dropped under load", engine.dropped_frames());
    }
    if let (Some(rack), Some(module)) = (
        engine.session().current_rack(),
        engine.session().current_module(),
    ) {
        let name = engine
            .model()
            .module(rack, module)
            .map(|m| m.display_name.clone())
            .unwrap_or_default();
        log::info!("Last module: {} ({})", module, name);
    }

    engine.deinit();
    log::info!("rackpad stopped");
    Ok(())
}
