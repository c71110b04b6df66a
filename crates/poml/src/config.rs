use crate::errors::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct RendererSettings {
    /// Node executable used to run the renderer
    #[serde(default = "default_node")]
    pub node: String,
    /// Path to the renderer's `cli.js` entrypoint
    #[serde(default)]
    pub cli_script: Option<PathBuf>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            node: default_node(),
            cli_script: None,
        }
    }
}

impl RendererSettings {
    pub fn cli_script(&self) -> Result<PathBuf, ConfigError> {
        self.cli_script.clone().ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var("renderer.cli_script"),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub renderer: RendererSettings,
    /// Trace directory shared with the renderer; enables local tracing when set
    #[serde(default)]
    pub trace: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("renderer.node", default_node())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("POML")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })
    }
}

fn default_node() -> String {
    "node".to_string()
}
