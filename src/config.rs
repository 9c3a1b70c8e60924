use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{ScenarioConfig, TieBreakConfig};

/// Reads a scenario file, picking the parser from the extension.
pub fn load_config(path: &Path) -> Result<ScenarioConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    parse_config(&contents, ext)
}

pub fn parse_config(contents: &str, format: &str) -> Result<ScenarioConfig> {
    match format {
        "toml" => toml::from_str(contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(format.to_string())),
    }
}

/// A seed given on the command line switches the run to seeded tie-breaks.
pub fn apply_seed(mut config: ScenarioConfig, seed: Option<u64>) -> ScenarioConfig {
    if let Some(seed) = seed {
        config.tie_break = TieBreakConfig::Seeded;
        config.seed = Some(seed);
    }
    config
}
