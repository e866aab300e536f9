use crate::config::Config;
use crate::fields::ALL_FIELDS;
use crate::mapper::MapperState;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the exporter settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tube name mapping file to validate (overrides the settings file)
    #[arg(long)]
    pub mapping_config: Option<PathBuf>,

    /// Stat field file to validate (overrides the settings file)
    #[arg(long)]
    pub field_config: Option<PathBuf>,
}

/// Validate the settings, mapping and field files without serving.
/// Unlike the running exporter, a broken field file is reported here
/// instead of silently falling back to the full catalog.
pub async fn run(args: CheckArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let warnings = config.validate()?;
    for warning in &warnings {
        println!("{}", warning);
    }

    let mapping_file = args
        .mapping_config
        .clone()
        .or_else(|| config.mapping.mapping_file.clone());
    match &mapping_file {
        Some(path) => {
            let state = MapperState::load(path)
                .with_context(|| format!("Invalid mapping config {}", path.display()))?;
            println!(
                "Mapping config {}: {} rules",
                path.display(),
                state.rule_count()
            );
        }
        None => println!("No mapping config; tubes keep their raw names"),
    }

    let field_file = args.field_config.or(config.mapping.field_file);
    match &field_file {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Unreadable field config {}", path.display()))?;
            let count = content.lines().filter(|l| !l.trim().is_empty()).count();
            println!("Field config {}: {} fields", path.display(), count);
        }
        None => println!("No field config; collecting all {} fields", ALL_FIELDS.len()),
    }

    println!("Configuration OK");
    Ok(())
}
