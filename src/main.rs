//! Driver binary: parses CLI arguments, loads ROM/disk images, and
//! runs the engine headlessly until its sticky error flag is set.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use alto::config::Args;
use alto::Engine;

fn run(args: &Args) -> alto::Result<()> {
    let mut engine = Engine::new(args.system_type());

    if let Some(path) = &args.constant_rom {
        let bytes = fs::read(path)?;
        engine.load_constant_rom(&bytes)?;
    }
    if let Some(path) = &args.microcode_rom {
        let bytes = fs::read(path)?;
        engine.load_microcode_rom(&bytes, 0)?;
    }
    if let Some(path) = &args.boot_binary {
        let bytes = fs::read(path)?;
        for (i, word) in bytes.chunks(2).enumerate() {
            if word.len() == 2 && i < engine.memory.banks[0].len() {
                engine.memory.banks[0][i] = u16::from_le_bytes([word[0], word[1]]);
            }
        }
    }
    if let Some(path) = args.disk1_path() {
        let bytes = fs::read(path)?;
        engine.disk.drives[0].load_image(&bytes)?;
    }
    if let Some(path) = &args.disk2 {
        let bytes = fs::read(path)?;
        engine.disk.drives[1].load_image(&bytes)?;
    }

    engine.ethernet.set_address(args.parsed_ether_address());

    info!("starting engine: system={:?}", args.system_type());
    loop {
        engine.step()?;
        if engine.error {
            break;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
