use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::fields::FieldMapping;

pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikiedit.toml";
pub const CONFIG_PATH_ENV: &str = "WIKIEDIT_CONFIG";
pub const LOG_FILTER_ENV: &str = "WIKIEDIT_LOG";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EditorConfig {
    #[serde(default)]
    pub editor: EditorSection,
    #[serde(default)]
    pub mappings: Vec<MappingTable>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EditorSection {
    pub log_filter: Option<String>,
}

/// A named `[[mappings]]` table: which template a JSON record is written to,
/// and how its keys translate to parameter names.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MappingTable {
    pub name: String,
    pub template: String,
    /// Parameter that tells repeated instances apart (e.g. `OSfamily`).
    pub selector: Option<String>,
    #[serde(default)]
    pub fields: Vec<MappingField>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MappingField {
    pub key: String,
    pub param: String,
}

impl MappingTable {
    pub fn field_mapping(&self) -> FieldMapping {
        FieldMapping::from_pairs(
            self.fields
                .iter()
                .map(|field| (field.key.clone(), field.param.clone())),
        )
    }
}

impl EditorConfig {
    pub fn mapping(&self, name: &str) -> Option<&MappingTable> {
        let wanted = name.trim();
        self.mappings
            .iter()
            .find(|mapping| mapping.name.eq_ignore_ascii_case(wanted))
    }

    /// Resolve the log filter: env WIKIEDIT_LOG > config > DEFAULT_LOG_FILTER.
    pub fn log_filter(&self) -> String {
        resolve_log_filter(env::var(LOG_FILTER_ENV).ok().as_deref(), self)
    }

    fn validate(&self, config_path: &Path) -> Result<()> {
        for (index, mapping) in self.mappings.iter().enumerate() {
            if mapping.name.trim().is_empty() {
                bail!(
                    "mappings[{index}] has an empty name in {}",
                    config_path.display()
                );
            }
            if mapping.template.trim().is_empty() {
                bail!(
                    "mapping `{}` has an empty template in {}",
                    mapping.name,
                    config_path.display()
                );
            }
            if self
                .mappings
                .iter()
                .take(index)
                .any(|earlier| earlier.name.eq_ignore_ascii_case(mapping.name.trim()))
            {
                bail!(
                    "mapping `{}` is defined more than once in {}",
                    mapping.name,
                    config_path.display()
                );
            }
            for field in &mapping.fields {
                if field.key.trim().is_empty() || field.param.trim().is_empty() {
                    bail!(
                        "mapping `{}` has a field with an empty key or param in {}",
                        mapping.name,
                        config_path.display()
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load and parse an EditorConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<EditorConfig> {
    if !config_path.exists() {
        return Ok(EditorConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: EditorConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed.validate(config_path)?;
    Ok(parsed)
}

pub fn resolve_log_filter(env_value: Option<&str>, config: &EditorConfig) -> String {
    if let Some(value) = non_empty(env_value) {
        return value.to_string();
    }
    config
        .editor
        .log_filter
        .as_deref()
        .and_then(|value| non_empty(Some(value)))
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

/// Config path: explicit flag > WIKIEDIT_CONFIG > `wikiedit.toml` in the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    Ok(resolve_config_path_with(
        explicit,
        env::var(CONFIG_PATH_ENV).ok().as_deref(),
        &cwd,
    ))
}

pub fn resolve_config_path_with(explicit: Option<&Path>, env_value: Option<&str>, cwd: &Path) -> PathBuf {
    let chosen = match (explicit, non_empty(env_value)) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(value)) => PathBuf::from(value),
        (None, None) => PathBuf::from(DEFAULT_CONFIG_FILENAME),
    };
    if chosen.is_absolute() {
        chosen
    } else {
        cwd.join(chosen)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
