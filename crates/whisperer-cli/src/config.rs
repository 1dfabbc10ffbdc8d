use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use whisperer_client::ClientConfig;

use crate::cli::OutputFormat;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub server: Option<String>,
    pub format: Option<String>,
}

impl ProfileConfig {
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.format.as_deref().and_then(OutputFormat::parse)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.server = Some(value.trim_end_matches('/').to_string()),
            "format" => {
                OutputFormat::parse(value)
                    .with_context(|| format!("Unknown format: {value}. Valid formats: table, json"))?;
                self.format = Some(value.to_lowercase());
            }
            other => anyhow::bail!("Unknown config key: {other}. Valid keys: server, format"),
        }
        Ok(())
    }
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".whisperer");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

fn save_profile_to(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all_from(path)?;
    all.insert(profile.to_string(), config.clone());
    let content = toml::to_string_pretty(&all)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    let mut all = load_all_from(&config_path()?)?;
    Ok(all.remove(profile).unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    save_profile_to(&config_path()?, profile, config)
}

/// Library settings from `whisperer.toml` in the working directory and
/// `WHISPERER__*` environment variables.
pub fn load_client_config() -> Result<ClientConfig> {
    whisperer_client::load_config(None).context("Failed to load client configuration")
}

/// Picks the server URL: `--server` / `WHISPERER_URL`, then the profile, then
/// the server remembered by the last login, then the client config default.
pub fn resolve_server(
    cli_server: Option<&str>,
    profile: &ProfileConfig,
    remembered: Option<String>,
    client: &ClientConfig,
) -> String {
    cli_server
        .map(str::to_string)
        .or_else(|| profile.server.clone())
        .or(remembered)
        .unwrap_or_else(|| client.api_url.clone())
        .trim_end_matches('/')
        .to_string()
}
