//! Effective configuration display.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput {
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }
}

/// Print `config` with the provider API key masked.
pub fn execute(_args: &ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut config = config.clone();
    if config.providers.api_key.is_some() {
        config.providers.api_key = Some("***".to_string());
    }
    output(&ConfigOutput { config }, json_mode);
    Ok(())
}
