use anyhow::{bail, Context, Result};
use clap::Parser;
use railchess_converter::convert::convert_descriptor;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

#[derive(Parser, Debug)]
#[command(author, version, about = "Railchess AARC to RC converter", long_about = None)]
struct Args {
    /// Input AARC JSON file
    input: Option<PathBuf>,
    /// Output RC JSON file
    output: Option<PathBuf>,
    /// Converter config JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn prompt(line: &str) -> Result<String> {
    print!("{}", line);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

fn prompt_paths() -> Result<(PathBuf, PathBuf, Option<PathBuf>)> {
    println!("Railchess AARC to RC Converter");
    let input = prompt("Enter input AARC file path: ")?;
    let output = prompt("Enter output RC file path:  ")?;
    let config = prompt("Enter config JSON file path (or leave empty for default): ")?;
    let config = if config.is_empty() {
        None
    } else {
        Some(PathBuf::from(config))
    };
    Ok((PathBuf::from(input), PathBuf::from(output), config))
}

fn read_json(path: &PathBuf) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (input, output, config) = match (args.input, args.output) {
        (Some(input), Some(output)) => (input, output, args.config),
        (None, None) => prompt_paths()?,
        _ => bail!("usage: converter <input.json> <output.json> [--config <config.json>]"),
    };

    let aarc = read_json(&input)?;
    let config_json = match &config {
        Some(path) => read_json(path)?,
        None => Value::Null,
    };

    let cancel = AtomicBool::new(false);
    let rcmap = convert_descriptor(&aarc, &config_json, &cancel)?;

    let rendered = serde_json::to_string_pretty(&rcmap.to_json())?;
    fs::write(&output, rendered)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}
