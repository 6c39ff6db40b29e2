//! 配置解析
//!
//! TOML 为主，JSON 可选。所有字段都有默认值，因此拼错的键 (如 `[sinks.parqet]`)
//! 会被当作未知键拒绝，而不是静默回落到默认配置。

use std::path::Path;

use contracts::{ContractError, SessionBlueprint};
use serde::Deserialize;
use serde_json::Value;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式 (不区分大小写)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of {}",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }

    fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }

    fn error<E>(self, e: E) -> ContractError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ContractError::ConfigParse {
            message: format!("{} parse error: {e}", self.name()),
            source: Some(Box::new(e)),
        }
    }
}

/// 解析配置内容 (不做范围校验)
pub fn parse(content: &str, format: ConfigFormat) -> Result<SessionBlueprint, ContractError> {
    let (blueprint, tree) = match format {
        ConfigFormat::Toml => {
            // typed pass first so errors keep their line numbers
            let blueprint: SessionBlueprint =
                toml::from_str(content).map_err(|e| format.error(e))?;
            let table: toml::Table = toml::from_str(content).map_err(|e| format.error(e))?;
            let tree = serde_json::to_value(table).map_err(|e| format.error(e))?;
            (blueprint, tree)
        }
        ConfigFormat::Json => {
            let tree: Value = serde_json::from_str(content).map_err(|e| format.error(e))?;
            let blueprint = SessionBlueprint::deserialize(&tree).map_err(|e| format.error(e))?;
            (blueprint, tree)
        }
    };

    reject_unknown_keys(&tree)?;
    Ok(blueprint)
}

fn reject_unknown_keys(tree: &Value) -> Result<(), ContractError> {
    let known = serde_json::to_value(SessionBlueprint::default())
        .map_err(|e| ContractError::config_parse(format!("cannot describe known keys: {e}")))?;
    match first_unknown_key(tree, &known, "") {
        Some(path) => Err(ContractError::config_parse(format!("unknown key '{path}'"))),
        None => Ok(()),
    }
}

/// Dotted path of the first key in `given` that `known` does not have
fn first_unknown_key(given: &Value, known: &Value, prefix: &str) -> Option<String> {
    let (Value::Object(given), Value::Object(known)) = (given, known) else {
        return None;
    };
    given.iter().find_map(|(key, value)| {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match known.get(key) {
            Some(known) => first_unknown_key(value, known, &path),
            None => Some(path),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_keeps_defaults_for_missing_keys() {
        let content = r#"
data_dir = "/tmp/gaze"

[sinks.broadcast]
endpoint = "tcp://127.0.0.1:5556"

[sinks.remote]
enabled = true
bundle_size = 30
"#;
        let bp = parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.data_dir.to_str(), Some("/tmp/gaze"));
        assert_eq!(bp.sinks.broadcast.endpoint, "tcp://127.0.0.1:5556");
        assert_eq!(bp.sinks.remote.bundle_size, 30);
        assert_eq!(bp.sinks.remote.retry_attempts, 3);
        assert!(bp.sinks.parquet.enabled);
    }

    #[test]
    fn test_parse_json_with_seed() {
        let content = r#"{
            "source": { "frequency_hz": 60.0, "seed": 7 },
            "sinks": { "csv": { "enabled": true } }
        }"#;
        let bp = parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(bp.source.frequency_hz, 60.0);
        assert_eq!(bp.source.seed, Some(7));
        assert!(bp.sinks.csv.enabled);
    }

    #[test]
    fn test_misspelled_sink_is_rejected() {
        let err = parse("[sinks.parqet]\nenabled = false\n", ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("unknown key 'sinks.parqet'"), "{err}");

        let err = parse(r#"{"source": {"frequncy_hz": 60.0}}"#, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("'source.frequncy_hz'"), "{err}");
    }

    #[test]
    fn test_seed_is_known_even_when_unset() {
        // `seed` defaults to None, which must still count as a known key
        let bp = parse("[source]\nseed = 3\n", ConfigFormat::Toml).unwrap();
        assert_eq!(bp.source.seed, Some(3));
    }

    #[test]
    fn test_syntax_and_type_errors() {
        assert!(matches!(
            parse("invalid toml [[[", ConfigFormat::Toml),
            Err(ContractError::ConfigParse { .. })
        ));
        let err = parse("[sinks.remote]\nbundle_size = \"sixty\"\n", ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().starts_with("config parse error: TOML parse error"), "{err}");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("a.yaml")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }
}
