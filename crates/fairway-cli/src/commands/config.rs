use std::path::Path;

use fairway_core::config::{default_config_path, ClientConfig};
use fairway_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, effective: &ClientConfig) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let path = default_config_path();
            println!(
                "Config file: {}",
                path.as_deref()
                    .map_or_else(|| "(none)".to_string(), |path| path.display().to_string())
            );
            println!("{}", serde_json::to_string_pretty(effective)?);
            println!("Database:    {}", effective.resolve_db_path().display());
            Ok(())
        }
        ConfigCommands::Init {
            api_url,
            timeout_ms,
        } => {
            let path = default_config_path().ok_or(CliError::NoConfigDir)?;
            let config = init_config_at(&path, api_url, timeout_ms)?;
            println!("Wrote {} (api: {})", path.display(), config.api_url);
            Ok(())
        }
    }
}

/// Merge explicit values into the config at `path` and write it back.
pub fn init_config_at(
    path: &Path,
    api_url: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::load_from_path(path)?;
    if let Some(url) = normalize_text_option(api_url) {
        config.api_url = url;
    }
    if let Some(timeout_ms) = timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }
    config.validate()?;
    config.save_to_path(path)?;
    Ok(ClientConfig::load_from_path(path)?)
}
