use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Key under which the app expects its section in `config.yml`.
pub const APP_NAME: &str = "fednorm";

pub const CONFIG_FILENAME: &str = "config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config.yml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config.yml has no '{APP_NAME}' section")]
    MissingSection,
    #[error("sites disagree on the normalization mode")]
    ModeMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Mode {
    #[serde(rename = "quantile")]
    Quantile,
    #[serde(rename = "upper quartile")]
    UpperQuartile,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Quantile => f.write_str("quantile"),
            Mode::UpperQuartile => f.write_str("upper quartile"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub normalization: Mode,
    #[serde(default = "default_input_filename")]
    pub input_filename: String,
    // Key spelling is historical and kept for config compatibility.
    #[serde(default = "default_separator")]
    pub seperator: String,
    #[serde(default)]
    pub sample_genes_in_input: bool,
    #[serde(default)]
    pub sample_names: Option<String>,
    #[serde(default)]
    pub gene_names: Option<String>,
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
    #[serde(default)]
    pub normfactors: bool,
}

fn default_input_filename() -> String {
    "data.csv".to_string()
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_output_filename() -> String {
    "result.csv".to_string()
}

/// Loads the `fednorm` section of `<dir>/config.yml`.
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let document: serde_yaml::Value = serde_yaml::from_str(text)?;
    let section = document
        .get(APP_NAME)
        .cloned()
        .ok_or(ConfigError::MissingSection)?;
    Ok(serde_yaml::from_value(section)?)
}

#[cfg(test)]
#[path = "../tests/src_inline/config.rs"]
mod tests;
