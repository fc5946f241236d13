//! `zoo` binary entry point
//!
//! Lists and resolves zoo architectures and inspects checkpoint files.

use std::path::Path;

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkpoint::{read_header, CheckpointStore};
use model_zoo::{diff_states, ModelRequest, ModelZoo};
use zoo_core::{Device, Error, InputSize, ZooConfig};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const USAGE: &str = "usage:
  zoo [--config FILE] list <family>
  zoo [--config FILE] resolve <family> <name> <classes> [--pretrained] [--input-size N]
  zoo inspect <checkpoint>
  zoo diff <canonical> <other>";

fn main() -> CliResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zoo=info,model_zoo=info,checkpoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = match take_option(&mut args, "--config")? {
        Some(path) => ZooConfig::from_file(path)?,
        None => ZooConfig::default(),
    };

    let Some(command) = args.first().cloned() else {
        return Err(USAGE.into());
    };
    let rest = &args[1..];

    match (command.as_str(), rest) {
        ("list", [family]) => list(&config, family),
        ("resolve", [..]) => resolve(&config, rest.to_vec()),
        ("inspect", [path]) => inspect(Path::new(path)),
        ("diff", [canonical, other]) => diff(Path::new(canonical), Path::new(other)),
        _ => Err(USAGE.into()),
    }
}

fn list(config: &ZooConfig, family: &str) -> CliResult<()> {
    let zoo = ModelZoo::new(config.resolver.clone());
    for name in zoo.supported_models(family)? {
        println!("{}", name);
    }
    Ok(())
}

fn resolve(config: &ZooConfig, mut args: Vec<String>) -> CliResult<()> {
    let pretrained = take_flag(&mut args, "--pretrained");
    let input_size = take_option(&mut args, "--input-size")?
        .map(|side| side.parse::<usize>().map(InputSize::square))
        .transpose()
        .map_err(|e| Error::InvalidConfig {
            message: format!("--input-size: {}", e),
        })?;

    let [family, name, classes] = args.as_slice() else {
        return Err(USAGE.into());
    };
    let num_classes: usize = classes.parse().map_err(|e| Error::InvalidConfig {
        message: format!("num_classes: {}", e),
    })?;

    let mut request = ModelRequest::parse(family, name.as_str(), num_classes)?.pretrained(pretrained);
    if let Some(size) = input_size {
        request = request.input_size(size);
    }

    let zoo = ModelZoo::new(config.resolver.clone());
    let model = zoo.get_model(&request)?;
    println!("{}", serde_json::to_string_pretty(&model.summary())?);
    Ok(())
}

fn inspect(path: &Path) -> CliResult<()> {
    let header = read_header(path)?;
    let summary = json!({
        "version": header.version,
        "epoch": header.epoch,
        "proc_type": header.proc_type().as_str(),
        "modelname": header.metadata.modelname,
        "created_at": header.metadata.created_at,
        "payload_bytes": header.payload_len,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn diff(canonical: &Path, other: &Path) -> CliResult<()> {
    let store = CheckpointStore::new();
    let canonical = store.load(canonical, Device::Cpu, None)?;
    let other = store.load(other, Device::Cpu, None)?;

    let reports: Vec<_> = diff_states(&canonical.model_state, &other.model_state)?
        .map(|mismatch| mismatch.report())
        .collect();
    tracing::info!(mismatches = reports.len(), "Compared state dicts");
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Removes `flag` from `args`, reporting whether it was present
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    args.len() != before
}

/// Removes `option` and its value from `args`
fn take_option(args: &mut Vec<String>, option: &str) -> CliResult<Option<String>> {
    let Some(index) = args.iter().position(|arg| arg == option) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        return Err(format!("{} requires a value", option).into());
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}
