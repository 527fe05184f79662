use std::fs;

use anyhow::{Context, Result};

use peggle_assets::cli_args::{self, Command, ConfigCommand, ConfigKind, LevelCommand, PakCommand};
use peggle_assets::config;
use peggle_assets::diagnostics::Counter;
use peggle_assets::level::codec;
use peggle_assets::pak::PakArchive;

fn run_pak(command: PakCommand) -> Result<()> {
    match command {
        PakCommand::List { pak } => {
            let archive = PakArchive::open(&pak).with_context(|| format!("opening {}", pak.display()))?;
            for entry in archive.list() {
                println!("{}\t{}", entry.data.len(), entry.name);
            }
        }
        PakCommand::Extract { pak, out_dir } => {
            let archive = PakArchive::open(&pak).with_context(|| format!("opening {}", pak.display()))?;
            archive.export(&out_dir).with_context(|| format!("extracting to {}", out_dir.display()))?;
        }
        PakCommand::Pack { in_dir, pak, obfuscate } => {
            let counter = Counter::new();
            let mut archive = PakArchive::load_dir_counted(&in_dir, &counter).with_context(|| format!("reading {}", in_dir.display()))?;
            if obfuscate {
                archive.xor_key = 0xF7;
            }
            archive.save(&pak).with_context(|| format!("writing {}", pak.display()))?;
            if counter.warnings() > 0 {
                eprintln!("peggle-assets: {counter}");
            }
        }
    }
    Ok(())
}

fn run_level(command: LevelCommand) -> Result<()> {
    match command {
        LevelCommand::Decode { input, output } => {
            let bytes = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let level = codec::decode_level(&bytes).with_context(|| format!("decoding {}", input.display()))?;
            let json = serde_json::to_string_pretty(&level)?;
            match output {
                Some(path) => fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        LevelCommand::Encode { input, output } => {
            let json = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let level = serde_json::from_str(&json).with_context(|| format!("parsing {}", input.display()))?;
            let bytes = codec::encode_level(&level)?;
            fs::write(&output, bytes).with_context(|| format!("writing {}", output.display()))?;
        }
    }
    Ok(())
}

fn run_config(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Parse { kind, input } => {
            let text = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let json = match kind {
                ConfigKind::Stage => serde_json::to_string_pretty(&config::parse_stage_cfg(&text)?)?,
                ConfigKind::Trophy => serde_json::to_string_pretty(&config::parse_trophy_cfg(&text)?)?,
                ConfigKind::Character => serde_json::to_string_pretty(&config::parse_character_cfg(&text)?)?,
            };
            println!("{json}");
        }
        ConfigCommand::Emit { kind, input, output } => {
            let json = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let text = match kind {
                ConfigKind::Stage => config::emit_stage_cfg(&serde_json::from_str(&json)?),
                ConfigKind::Trophy => config::emit_trophy_cfg(&serde_json::from_str(&json)?),
                ConfigKind::Character => config::emit_character_cfg(&serde_json::from_str(&json)?),
            };
            fs::write(&output, text).with_context(|| format!("writing {}", output.display()))?;
        }
    }
    Ok(())
}

fn main() {
    let arg = cli_args::parse_args();
    let result = match arg.command {
        Command::Pak { command } => run_pak(command),
        Command::Level { command } => run_level(command),
        Command::Config { command } => run_config(command),
    };
    if let Err(err) = result {
        eprintln!("peggle-assets: {err:#}");
        std::process::exit(1);
    }
}
