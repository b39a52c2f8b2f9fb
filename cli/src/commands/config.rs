use crate::error::{CliError, Result};
use crate::output::{OutputFormat, OutputManager};
use clap::Args;
use hftmon_engine::config::EngineConfig;
use hftmon_engine::sections::SectionsCatalog;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration action
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show the configuration file path only
        #[arg(long)]
        path: bool,
    },

    /// Write a default configuration file
    Init {
        /// Target path (default: the standard config location)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate settings and the sections file
    Validate,

    /// List the sections catalog
    Sections {
        /// Only sections tagged with this profile
        #[arg(short, long)]
        profile: Option<String>,
    },
}

/// `config_path` is the global `--config` flag; settings are loaded here so
/// that `init` works before any file exists
pub async fn run(args: ConfigArgs, config_path: Option<PathBuf>, output: OutputManager) -> Result<()> {
    let load = |path: &Option<PathBuf>| EngineConfig::load_with_fallback(path.as_ref());

    match args.action {
        ConfigAction::Init { path, force } => init_config(path.or(config_path), force, &output),
        ConfigAction::Show { path } => {
            let config = load(&config_path)?;
            show_config(&config, config_path, path, &output)
        }
        ConfigAction::Validate => validate_config(&load(&config_path)?, &output),
        ConfigAction::Sections { profile } => show_sections(&load(&config_path)?, profile, &output),
    }
}

fn show_config(config: &EngineConfig, config_path: Option<PathBuf>, path_only: bool, output: &OutputManager) -> Result<()> {
    if path_only {
        let path = match config_path {
            Some(path) => path,
            None => EngineConfig::default_config_path()?,
        };
        return output.print_key_value("config_path", &path.display().to_string());
    }

    match output.format() {
        OutputFormat::Json => output.print_json(config),
        OutputFormat::Table => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        OutputFormat::Csv => {
            println!("key,value");
            let mut pairs = Vec::new();
            flatten("", &serde_json::to_value(config)?, &mut pairs);
            for (key, value) in pairs {
                println!("{},\"{}\"", key, value.replace('"', "\"\""));
            }
            Ok(())
        }
    }
}

/// Dotted key/value pairs of a nested JSON object
fn flatten(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&key, child, pairs);
            }
        }
        Value::String(s) => pairs.push((prefix.to_string(), s.clone())),
        Value::Null => pairs.push((prefix.to_string(), String::new())),
        other => pairs.push((prefix.to_string(), other.to_string())),
    }
}

fn init_config(path: Option<PathBuf>, force: bool, output: &OutputManager) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => EngineConfig::default_config_path()?,
    };

    if path.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }

    EngineConfig::default().save_to_file(&path)?;
    output.print_success(&format!("Wrote default configuration to {}", path.display()))
}

fn validate_config(config: &EngineConfig, output: &OutputManager) -> Result<()> {
    config.validate()?;
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;

    output.print_success("Configuration is valid")?;
    output.print_info(&format!(
        "Sections file: {} ({} rows, {} dynamic metrics, {} profiles)",
        config.paths.sections_file.display(),
        catalog.entries().len(),
        catalog.dynamic_metrics().len(),
        catalog.profiles().len() - 1
    ))
}

fn show_sections(config: &EngineConfig, profile: Option<String>, output: &OutputManager) -> Result<()> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;

    let sections = match &profile {
        Some(profile) => {
            super::check_profile(&catalog, profile)?;
            catalog.profile_sections(profile)
        }
        None => catalog.sections(),
    };

    output.print_sections(&sections)?;
    if output.format() == OutputFormat::Table {
        println!();
        output.print_info(&format!("Profiles: {}", catalog.profiles().join(", ")))?;
    }
    Ok(())
}
