use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::forms::builtin_schema;
use crate::registry::{ComponentFactory, Delayed, FormFactory, SchemaFileFactory};
use crate::types::ComponentKey;

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionSource {
    /// `builtin:<Name>`
    Builtin(String),
    /// `file://<path>` or a plain path to a JSON form schema
    SchemaFile(PathBuf),
}

/// One registry entry declared in a TOML definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDefinitionEntry {
    pub key: ComponentKey,
    pub source: DefinitionSource,
    pub delay: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawDefinition {
    uri: String,
    #[serde(default)]
    delay_ms: Option<u64>,
}

impl ComponentDefinitionEntry {
    pub fn into_factory(self) -> Result<Arc<dyn ComponentFactory>> {
        let name = self.key.to_string();
        match self.source {
            DefinitionSource::Builtin(form) => {
                let schema = builtin_schema(&form)
                    .ok_or_else(|| anyhow::anyhow!("Unknown built-in form '{form}'"))?;
                Ok(with_delay(FormFactory::new(name, schema), self.delay))
            }
            DefinitionSource::SchemaFile(path) => {
                Ok(with_delay(SchemaFileFactory::new(name, path), self.delay))
            }
        }
    }
}

fn with_delay<F: ComponentFactory + 'static>(
    factory: F,
    delay: Option<Duration>,
) -> Arc<dyn ComponentFactory> {
    match delay {
        Some(delay) => Arc::new(Delayed::new(factory, delay)),
        None => Arc::new(factory),
    }
}

/// Load registry entries from TOML definition files.
pub fn load_definitions(definition_files: &[PathBuf]) -> Result<Vec<ComponentDefinitionEntry>> {
    let mut definitions = Vec::new();
    for path in definition_files {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => definitions.extend(parse_toml_file(path)?),
            Some(_) => {
                return Err(anyhow::anyhow!("Unsupported file type: {}", path.display()));
            }
            None => {
                return Err(anyhow::anyhow!(
                    "File without extension: {}",
                    path.display()
                ));
            }
        }
    }
    Ok(definitions)
}

fn parse_toml_file(path: &Path) -> Result<Vec<ComponentDefinitionEntry>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {e}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse '{}': {e}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut definitions = Vec::new();
    for (name, value) in table {
        let toml::Value::Table(def_table) = value else {
            return Err(anyhow::anyhow!("Definition '{name}' must be a table"));
        };
        if !def_table.contains_key("uri") {
            return Err(anyhow::anyhow!(
                "Definition '{name}' missing required 'uri' field"
            ));
        }
        let raw: RawDefinition = toml::Value::Table(def_table)
            .try_into()
            .map_err(|e| anyhow::anyhow!("Failed to parse definition '{name}': {e}"))?;

        let key = ComponentKey::new(name)?;
        let source = parse_uri(&raw.uri, base_dir)?;
        if let DefinitionSource::Builtin(form) = &source
            && builtin_schema(form).is_none()
        {
            return Err(anyhow::anyhow!(
                "Definition '{key}' refers to unknown built-in form '{form}'"
            ));
        }

        definitions.push(ComponentDefinitionEntry {
            key,
            source,
            delay: raw.delay_ms.map(Duration::from_millis),
        });
    }
    Ok(definitions)
}

fn parse_uri(uri: &str, base_dir: &Path) -> Result<DefinitionSource> {
    if let Some(form) = uri.strip_prefix("builtin:") {
        return Ok(DefinitionSource::Builtin(form.to_string()));
    }

    let path = if let Some(path_str) = uri.strip_prefix("file://") {
        PathBuf::from(path_str)
    } else if let Some((scheme, _)) = uri.split_once("://") {
        return Err(anyhow::anyhow!(
            "Unsupported URI scheme '{scheme}' in '{uri}'"
        ));
    } else {
        PathBuf::from(uri)
    };

    if path.extension().and_then(|s| s.to_str()) != Some("json") {
        return Err(anyhow::anyhow!(
            "Unsupported schema file type: {}",
            path.display()
        ));
    }

    // Relative schema paths are relative to the definition file
    let path = if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    };
    Ok(DefinitionSource::SchemaFile(path))
}
