use std::path::{Path, PathBuf};

use courier_common::{config::ConfigError, logging::LoggingConfig};
use courier_dispatch::{DispatchConfig, FieldMapping, ResolveContext};
use courier_provider::ProviderConfig;
use serde::Deserialize;

pub const CONFIG_ENV_VAR: &str = "COURIER_CONFIG";

/// Top-level `courier.config.ron`
#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    pub dispatch: DispatchConfig,

    /// Required unless every run is a dry run
    #[serde(default)]
    pub provider: Option<ProviderConfig>,

    /// How template variables are filled from each recipient record
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,

    /// Values shared by every recipient
    #[serde(default)]
    pub context: ResolveContext,
}

impl CourierConfig {
    /// Locate and load the configuration.
    ///
    /// Lookup order: `explicit`, then `COURIER_CONFIG`, then
    /// `./courier.config.ron`, then `/etc/courier/courier.config.ron`.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found or it cannot be parsed.
    pub fn locate(explicit: Option<&Path>) -> Result<(PathBuf, Self), ConfigError> {
        let defaults = [
            PathBuf::from("./courier.config.ron"),
            PathBuf::from("/etc/courier/courier.config.ron"),
        ];

        let path = courier_common::config::find_config_file(explicit, CONFIG_ENV_VAR, &defaults)?;
        let config = courier_common::config::load(&path)?;

        Ok((path, config))
    }
}
