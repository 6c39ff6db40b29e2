//! # Config Loader
//!
//! Turns a session file and command-line overrides into a validated
//! `SessionBlueprint`. Unknown keys are errors; missing keys take defaults.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("Data dir: {}", blueprint.data_dir.display());
//! ```

mod overrides;
mod parser;
mod validator;

pub use contracts::SessionBlueprint;
pub use overrides::BlueprintOverrides;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Every entry point validates the final blueprint, after any overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a `.toml` or `.json` file
    pub fn load_from_path(path: &Path) -> Result<SessionBlueprint, ContractError> {
        Self::load_with_overrides(Some(path), &BlueprintOverrides::default())
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// File (or built-in defaults when `path` is `None`) plus overrides
    ///
    /// Range and cross-field rules run once on the merged result, so an
    /// override may repair a file value and may not break a valid one.
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &BlueprintOverrides,
    ) -> Result<SessionBlueprint, ContractError> {
        let mut blueprint = match path {
            Some(path) => {
                let format = ConfigFormat::from_path(path)?;
                parser::parse(&std::fs::read_to_string(path)?, format)?
            }
            None => SessionBlueprint::default(),
        };
        overrides.apply(&mut blueprint);
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    pub fn to_toml(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}
