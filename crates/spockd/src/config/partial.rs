use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::diagnostics::{
    Diagnostic, Error, LoadError, MergeConflictLocation, MergeError, SourceInfo, Warning,
};
use super::LogLevel;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<PartialApiConfig>,
    pub home_assistant: Option<PartialHomeAssistantConfig>,
    pub instances: Option<HashMap<String, PartialInstance>>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<toml::Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, toml::Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialApiConfig {
    pub enabled: Option<toml::Spanned<bool>>,
    pub listen: Option<toml::Spanned<String>>,
    pub port: Option<toml::Spanned<u16>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialHomeAssistantConfig {
    pub url: Option<toml::Spanned<String>>,
    pub token: Option<toml::Spanned<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialInstance {
    pub api_token: Option<toml::Spanned<String>>,
    pub target_id: Option<String>,
    pub status_url: Option<String>,
    pub scan_interval_secs: Option<toml::Spanned<u64>>,
    pub request_timeout_secs: Option<toml::Spanned<u64>>,
    pub groups: Option<BTreeMap<String, Vec<String>>>,
    pub telemetry: Option<PartialTelemetry>,

    /// File the instance was defined in, attached during merge
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialTelemetry {
    pub url: Option<String>,
    pub interval_secs: Option<toml::Spanned<u64>>,
    #[serde(default)]
    pub sensors: Vec<PartialPowerSensor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialPowerSensor {
    pub sensor_id: String,
    pub device_label: String,
}

/// First-wins bookkeeping shared by every mergeable field
#[derive(Default)]
struct Merger {
    claimed: HashMap<String, MergeConflictLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    /// Claim `field_path` for the file in `source`.
    ///
    /// Returns true on the first claim. Later claims are recorded as merge
    /// conflicts and return false so the first value is kept.
    fn claim(
        &mut self,
        field_path: String,
        span: Range<usize>,
        source: &SourceInfo,
        message: &str,
    ) -> bool {
        let location = MergeConflictLocation {
            file_path: source.file_path.clone(),
            span,
            content: source.content.clone(),
        };

        if let Some(previous) = self.claimed.get(&field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path,
                message: message.to_string(),
                conflicts: vec![previous.clone(), location],
            })));
            false
        } else {
            self.claimed.insert(field_path, location);
            true
        }
    }

    /// Claim a spanned value and move it into `slot` if it is the first one
    fn merge_spanned<T>(
        &mut self,
        slot: &mut Option<toml::Spanned<T>>,
        incoming: Option<toml::Spanned<T>>,
        field_path: &str,
        source: &SourceInfo,
    ) {
        if let Some(value) = incoming {
            let message = format!("'{}' defined in multiple config files", field_path);
            if self.claim(field_path.to_string(), value.span(), source, &message) {
                *slot = Some(value);
            }
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);

            // Relative imports resolve from the importing file's directory
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Sibling branches may import the same file
        visited.remove(&canonical_path);

        Ok(())
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts are collected as errors but merging continues so that all
    /// of them are reported at once.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger::default();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.clone());

            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            let is_empty = config.logging.is_none()
                && config.api.is_none()
                && config.home_assistant.is_none()
                && config.instances.is_none()
                && config.imports.is_empty();

            if is_empty {
                merger
                    .diagnostics
                    .push(Diagnostic::Warning(Warning::EmptyConfig {
                        file_path: source_info.file_path.clone(),
                    }));
            }

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);
                merger.merge_spanned(
                    &mut result_logging.level,
                    logging.level,
                    "logging.level",
                    &source_info,
                );

                for (key, value) in logging.overrides.unwrap_or_default() {
                    let field_path = format!("logging.overrides.{}", key);
                    let message = format!(
                        "Logging override for '{}' defined in multiple config files",
                        key
                    );
                    if merger.claim(field_path, value.span(), &source_info, &message) {
                        result_logging
                            .overrides
                            .get_or_insert_with(HashMap::new)
                            .insert(key, value);
                    }
                }
            }

            if let Some(api) = config.api {
                let result_api = result.api.get_or_insert_with(Default::default);
                merger.merge_spanned(&mut result_api.enabled, api.enabled, "api.enabled", &source_info);
                merger.merge_spanned(&mut result_api.listen, api.listen, "api.listen", &source_info);
                merger.merge_spanned(&mut result_api.port, api.port, "api.port", &source_info);
            }

            if let Some(ha) = config.home_assistant {
                let result_ha = result.home_assistant.get_or_insert_with(Default::default);
                merger.merge_spanned(&mut result_ha.url, ha.url, "home_assistant.url", &source_info);
                merger.merge_spanned(
                    &mut result_ha.token,
                    ha.token,
                    "home_assistant.token",
                    &source_info,
                );
            }

            // Instances merge as whole blocks, one file per instance
            for (name, mut instance) in config.instances.unwrap_or_default() {
                let header = format!("[instances.{}]", name);
                let span = source_info
                    .content
                    .find(&header)
                    .map(|start| start..(start + header.len()))
                    .unwrap_or(0..0);
                let message = format!("Instance '{}' defined in multiple config files", name);

                if merger.claim(format!("instances.{}", name), span, &source_info, &message) {
                    instance.source = Some(source_info.clone());
                    result
                        .instances
                        .get_or_insert_with(HashMap::new)
                        .insert(name, instance);
                }
            }
        }

        result.imports = imports;

        (result, merger.diagnostics)
    }
}
