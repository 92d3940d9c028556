use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

use super::diagnostics::{format_diagnostics, Diagnostic, LoadError, SourceInfo, ValidationError, Warning};
use super::partial::{PartialConfig, PartialInstance, PartialTelemetry};

/// Default location of the remote status endpoint
pub const DEFAULT_STATUS_URL: &str = "https://flex.spock.es/api/status";

/// Default location of the telemetry sink
pub const DEFAULT_TELEMETRY_URL: &str = "https://iot-ha.spock.es/api/iot_telemetry";

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;
pub const MIN_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_API_LISTEN: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 8566;
const DEFAULT_HA_URL: &str = "http://localhost:8123";
const DEFAULT_GROUPS: [&str; 2] = ["green", "yellow"];

/// Group name -> entity ids switched together
pub type GroupConfig = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub home_assistant: HomeAssistantConfig,
    pub instances: BTreeMap<String, InstanceConfig>,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"spockd::engine" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

/// HTTP API exposing status sensors and the actions switch
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: DEFAULT_API_LISTEN.to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

/// Connection to the Home Assistant instance owning the controlled entities
#[derive(Clone, PartialEq)]
pub struct HomeAssistantConfig {
    pub url: String,

    /// Long-lived access token; `HA_TOKEN` is consulted when unset
    pub token: Option<String>,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HA_URL.to_string(),
            token: None,
        }
    }
}

impl std::fmt::Debug for HomeAssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One configured account/site with its own polling cadence
#[derive(Clone, PartialEq)]
pub struct InstanceConfig {
    /// Sent as `X-Auth-Token` to the status API
    pub api_token: String,

    /// Plant/site id; when set the status request carries it in a JSON body
    pub target_id: Option<String>,

    pub status_url: String,
    pub scan_interval: Duration,
    pub request_timeout: Duration,
    pub groups: GroupConfig,
    pub telemetry: Option<TelemetryConfig>,
}

impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("api_token", &"<redacted>")
            .field("target_id", &self.target_id)
            .field("status_url", &self.status_url)
            .field("scan_interval", &self.scan_interval)
            .field("request_timeout", &self.request_timeout)
            .field("groups", &self.groups)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl InstanceConfig {
    /// Instance with default cadence, endpoint and empty green/yellow groups
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            target_id: None,
            status_url: DEFAULT_STATUS_URL.to_string(),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            groups: default_groups(),
            telemetry: None,
        }
    }

    pub fn with_group(mut self, name: &str, entities: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            entities.iter().map(|e| e.to_string()).collect(),
        );
        self
    }
}

/// Power telemetry side channel
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub url: String,
    pub interval: Duration,
    pub sensors: Vec<PowerSensor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSensor {
    pub sensor_id: String,
    pub device_label: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{}", format_diagnostics(.0))]
    Invalid(Vec<Diagnostic>),
}

fn default_groups() -> GroupConfig {
    DEFAULT_GROUPS
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect()
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports multiple files (e.g. base + secrets), `imports` inside files,
    /// conflict detection across all sources, and validation with every error
    /// and warning reported together.
    ///
    /// Returns the config with any warnings, or every diagnostic found if at
    /// least one of them is an error.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;
        let (partial, diagnostics) = PartialConfig::merge(configs);
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let logging = if let Some(partial_logging) = partial.logging {
            LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| s.into_inner())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
                    .unwrap_or_default(),
            }
        } else {
            LoggingConfig::default()
        };

        let api = partial
            .api
            .map(|api| {
                let defaults = ApiConfig::default();
                ApiConfig {
                    enabled: api.enabled.map(|s| s.into_inner()).unwrap_or(defaults.enabled),
                    listen: api.listen.map(|s| s.into_inner()).unwrap_or(defaults.listen),
                    port: api.port.map(|s| s.into_inner()).unwrap_or(defaults.port),
                }
            })
            .unwrap_or_default();

        let home_assistant = partial
            .home_assistant
            .map(|ha| HomeAssistantConfig {
                url: ha
                    .url
                    .map(|s| s.into_inner())
                    .unwrap_or_else(|| DEFAULT_HA_URL.to_string()),
                token: ha.token.map(|s| s.into_inner()),
            })
            .unwrap_or_default();

        let mut instances = BTreeMap::new();
        for (name, partial_instance) in partial.instances.unwrap_or_default() {
            match Self::validate_instance(&name, partial_instance) {
                Ok((instance, warnings)) => {
                    diagnostics.extend(warnings);
                    instances.insert(name, instance);
                }
                Err(errors) => diagnostics.extend(errors.into_iter().map(Diagnostic::from)),
            }
        }

        let config = Config {
            logging,
            api,
            home_assistant,
            instances,
        };

        diagnostics.extend(config.validate().into_iter().map(Diagnostic::from));

        if diagnostics.iter().any(|d| d.is_error()) {
            Err(ConfigError::Invalid(diagnostics))
        } else {
            Ok((config, diagnostics))
        }
    }

    /// Validate a partial instance and convert it to a complete InstanceConfig
    fn validate_instance(
        name: &str,
        partial: PartialInstance,
    ) -> Result<(InstanceConfig, Vec<Diagnostic>), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let source = partial.source.as_ref();
        let path = |field: &str| format!("instances.{}.{}", name, field);

        let api_token = match partial.api_token {
            Some(token) if token.get_ref().trim().is_empty() => {
                errors.push(
                    ValidationError::new(path("api_token"), "api_token must not be empty")
                        .at(token.span(), source),
                );
                String::new()
            }
            Some(token) => token.into_inner(),
            None => {
                errors.push(ValidationError::new(path("api_token"), "api_token is required"));
                String::new()
            }
        };

        let scan_interval_secs = match partial.scan_interval_secs {
            Some(secs) if *secs.get_ref() < MIN_SCAN_INTERVAL_SECS => {
                errors.push(
                    ValidationError::new(
                        path("scan_interval_secs"),
                        format!(
                            "scan interval must be at least {} seconds",
                            MIN_SCAN_INTERVAL_SECS
                        ),
                    )
                    .at(secs.span(), source),
                );
                MIN_SCAN_INTERVAL_SECS
            }
            Some(secs) => secs.into_inner(),
            None => DEFAULT_SCAN_INTERVAL_SECS,
        };

        let request_timeout_secs = match partial.request_timeout_secs {
            Some(secs) if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(secs.get_ref()) => {
                errors.push(
                    ValidationError::new(
                        path("request_timeout_secs"),
                        format!(
                            "request timeout must be between 1 and {} seconds",
                            MAX_REQUEST_TIMEOUT_SECS
                        ),
                    )
                    .at(secs.span(), source),
                );
                DEFAULT_REQUEST_TIMEOUT_SECS
            }
            Some(secs) => secs.into_inner(),
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let groups = partial.groups.unwrap_or_else(default_groups);
        for (group, entities) in &groups {
            if group.trim().is_empty() {
                errors.push(ValidationError::new(path("groups"), "group names must not be empty"));
            } else if entities.is_empty() {
                warnings.push(Diagnostic::Warning(Warning::EmptyGroup {
                    field_path: path(&format!("groups.{}", group)),
                }));
            }
        }

        let telemetry = partial.telemetry.and_then(|telemetry| {
            Self::validate_telemetry(name, telemetry, partial.target_id.is_some(), source, &mut errors)
        });

        if errors.is_empty() {
            Ok((
                InstanceConfig {
                    api_token,
                    target_id: partial.target_id,
                    status_url: partial
                        .status_url
                        .unwrap_or_else(|| DEFAULT_STATUS_URL.to_string()),
                    scan_interval: Duration::from_secs(scan_interval_secs),
                    request_timeout: Duration::from_secs(request_timeout_secs),
                    groups,
                    telemetry,
                },
                warnings,
            ))
        } else {
            Err(errors)
        }
    }

    fn validate_telemetry(
        name: &str,
        partial: PartialTelemetry,
        has_target_id: bool,
        source: Option<&SourceInfo>,
        errors: &mut Vec<ValidationError>,
    ) -> Option<TelemetryConfig> {
        let path = |field: &str| format!("instances.{}.telemetry.{}", name, field);

        if !has_target_id {
            errors.push(ValidationError::new(
                format!("instances.{}.target_id", name),
                "target_id is required when telemetry is configured",
            ));
        }

        if partial.sensors.is_empty() {
            errors.push(ValidationError::new(
                path("sensors"),
                "telemetry needs at least one sensor",
            ));
        }

        let interval_secs = match partial.interval_secs {
            Some(secs) if *secs.get_ref() < MIN_SCAN_INTERVAL_SECS => {
                errors.push(
                    ValidationError::new(
                        path("interval_secs"),
                        format!(
                            "telemetry interval must be at least {} seconds",
                            MIN_SCAN_INTERVAL_SECS
                        ),
                    )
                    .at(secs.span(), source),
                );
                return None;
            }
            Some(secs) => secs.into_inner(),
            None => DEFAULT_SCAN_INTERVAL_SECS,
        };

        Some(TelemetryConfig {
            url: partial
                .url
                .unwrap_or_else(|| DEFAULT_TELEMETRY_URL.to_string()),
            interval: Duration::from_secs(interval_secs),
            sensors: partial
                .sensors
                .into_iter()
                .map(|s| PowerSensor {
                    sensor_id: s.sensor_id,
                    device_label: s.device_label,
                })
                .collect(),
        })
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.instances.is_empty() {
            errors.push(ValidationError::new(
                "instances",
                "at least one instance must be configured",
            ));
        }

        // An entity switched by two groups would be fought over every tick
        for (name, instance) in &self.instances {
            let mut owners: HashMap<&str, &str> = HashMap::new();
            for (group, entities) in &instance.groups {
                for entity_id in entities {
                    match owners.get(entity_id.as_str()) {
                        Some(owner) if *owner != group.as_str() => {
                            errors.push(ValidationError::new(
                                format!("instances.{}.groups.{}", name, group),
                                format!(
                                    "entity '{}' is already in group '{}'; an entity may belong to one group only",
                                    entity_id, owner
                                ),
                            ));
                        }
                        Some(_) => {}
                        None => {
                            owners.insert(entity_id, group);
                        }
                    }
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn errors_for<'a>(diagnostics: &'a [Diagnostic], field: &str) -> Vec<&'a Diagnostic> {
        diagnostics
            .iter()
            .filter(|d| d.is_error() && d.field_path() == Some(field))
            .collect()
    }

    const MINIMAL: &str = r#"
[instances.home]
api_token = "secret"
"#;

    #[test]
    fn test_minimal_instance_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "spockd.toml", MINIMAL);

        let (config, diagnostics) = Config::from_files(&[path]).unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.home_assistant.url, "http://localhost:8123");

        let home = config.instances.get("home").unwrap();
        assert_eq!(home.api_token, "secret");
        assert_eq!(home.target_id, None);
        assert_eq!(home.status_url, DEFAULT_STATUS_URL);
        assert_eq!(home.scan_interval, Duration::from_secs(60));
        assert_eq!(home.request_timeout, Duration::from_secs(10));
        assert_eq!(home.groups.keys().collect::<Vec<_>>(), vec!["green", "yellow"]);
        assert!(home.telemetry.is_none());

        // Both default groups are empty
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.is_warning()));
    }

    #[test]
    fn test_full_instance() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "spockd.toml",
            r#"
[logging]
level = "debug"

[logging.overrides]
"spockd::engine" = "trace"

[api]
port = 9000

[home_assistant]
url = "http://ha.local:8123"
token = "ha-token"

[instances.home]
api_token = "secret"
target_id = "plant-7"
scan_interval_secs = 30
request_timeout_secs = 5

[instances.home.groups]
green = ["switch.heat_pump", "switch.pool"]
yellow = ["switch.boiler"]

[instances.home.telemetry]
interval_secs = 120

[[instances.home.telemetry.sensors]]
sensor_id = "sensor.heat_pump_power"
device_label = "Heat pump"
"#,
        );

        let (config, diagnostics) = Config::from_files(&[path]).unwrap();
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.overrides.get("spockd::engine"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.home_assistant.token.as_deref(), Some("ha-token"));

        let home = config.instances.get("home").unwrap();
        assert_eq!(home.target_id.as_deref(), Some("plant-7"));
        assert_eq!(home.scan_interval, Duration::from_secs(30));
        assert_eq!(home.request_timeout, Duration::from_secs(5));
        assert_eq!(
            home.groups.get("green").unwrap(),
            &vec!["switch.heat_pump".to_string(), "switch.pool".to_string()]
        );

        let telemetry = home.telemetry.as_ref().unwrap();
        assert_eq!(telemetry.url, DEFAULT_TELEMETRY_URL);
        assert_eq!(telemetry.interval, Duration::from_secs(120));
        assert_eq!(
            telemetry.sensors,
            vec![PowerSensor {
                sensor_id: "sensor.heat_pump_power".to_string(),
                device_label: "Heat pump".to_string(),
            }]
        );
    }

    #[test]
    fn test_scan_interval_floor() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "spockd.toml",
            r#"
[instances.home]
api_token = "secret"
scan_interval_secs = 5
"#,
        );

        let err = Config::from_files(&[path]).unwrap_err();
        let ConfigError::Invalid(diagnostics) = &err else {
            panic!("expected validation failure, got {:?}", err);
        };
        assert_eq!(
            errors_for(diagnostics, "instances.home.scan_interval_secs").len(),
            1
        );
        assert!(err.to_string().contains("at least 10 seconds"));
    }

    #[test]
    fn test_missing_and_empty_token() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "spockd.toml",
            r#"
[instances.missing]
target_id = "a"

[instances.blank]
api_token = "  "
"#,
        );

        let Err(ConfigError::Invalid(diagnostics)) = Config::from_files(&[path]) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors_for(&diagnostics, "instances.missing.api_token").len(), 1);
        assert_eq!(errors_for(&diagnostics, "instances.blank.api_token").len(), 1);
    }

    #[test]
    fn test_entity_in_two_groups_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "spockd.toml",
            r#"
[instances.home]
api_token = "secret"

[instances.home.groups]
green = ["switch.a", "switch.b"]
yellow = ["switch.b"]
"#,
        );

        let Err(ConfigError::Invalid(diagnostics)) = Config::from_files(&[path]) else {
            panic!("expected validation failure");
        };
        let errors = errors_for(&diagnostics, "instances.home.groups.yellow");
        assert_eq!(errors.len(), 1);
        assert!(format_diagnostics(&diagnostics).contains("switch.b"));
    }

    #[test]
    fn test_telemetry_requires_target_and_sensors() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "spockd.toml",
            r#"
[instances.home]
api_token = "secret"

[instances.home.groups]
green = ["switch.a"]
yellow = ["switch.b"]

[instances.home.telemetry]
url = "http://localhost/telemetry"
"#,
        );

        let Err(ConfigError::Invalid(diagnostics)) = Config::from_files(&[path]) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors_for(&diagnostics, "instances.home.target_id").len(), 1);
        assert_eq!(
            errors_for(&diagnostics, "instances.home.telemetry.sensors").len(),
            1
        );
    }

    #[test]
    fn test_no_instances_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "spockd.toml", "[logging]\nlevel = \"warn\"\n");

        let Err(ConfigError::Invalid(diagnostics)) = Config::from_files(&[path]) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors_for(&diagnostics, "instances").len(), 1);
    }

    #[test]
    fn test_secrets_file_merges_with_base() {
        let dir = TempDir::new().unwrap();
        let base = write(
            &dir,
            "base.toml",
            r#"
[logging]
level = "info"

[instances.home]
api_token = "secret"
"#,
        );
        let secrets = write(
            &dir,
            "secrets.toml",
            r#"
[home_assistant]
token = "ha-token"

[logging.overrides]
"spockd::api" = "debug"
"#,
        );

        let (config, _) = Config::from_files(&[base, secrets]).unwrap();
        assert_eq!(config.home_assistant.token.as_deref(), Some("ha-token"));
        assert_eq!(
            config.logging.overrides.get("spockd::api"),
            Some(&LogLevel::Debug)
        );
        assert!(config.instances.contains_key("home"));
    }

    #[test]
    fn test_conflicts_are_all_reported() {
        let dir = TempDir::new().unwrap();
        let base = write(
            &dir,
            "base.toml",
            r#"
[logging]
level = "info"

[api]
port = 8000

[instances.home]
api_token = "one"
"#,
        );
        let other = write(
            &dir,
            "other.toml",
            r#"
[logging]
level = "debug"

[api]
port = 9000

[instances.home]
api_token = "two"
"#,
        );

        let err = Config::from_files(&[base, other]).unwrap_err();
        let ConfigError::Invalid(diagnostics) = &err else {
            panic!("expected merge conflicts, got {:?}", err);
        };
        for field in ["logging.level", "api.port", "instances.home"] {
            assert_eq!(errors_for(diagnostics, field).len(), 1, "{}", field);
        }
        assert!(err.to_string().contains("Merge conflict"));
    }

    #[test]
    fn test_relative_imports() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "conf.d/instances.toml",
            r#"
[instances.home]
api_token = "secret"
"#,
        );
        let main = write(&dir, "spockd.toml", "imports = [\"conf.d/instances.toml\"]\n");

        let (config, _) = Config::from_files(&[main]).unwrap();
        assert!(config.instances.contains_key("home"));
    }

    #[test]
    fn test_import_cycle_detection() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.toml", "imports = [\"b.toml\"]\n");
        write(&dir, "b.toml", "imports = [\"a.toml\"]\n");

        let err = Config::from_files(&[a]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Load(LoadError::ImportCycle { .. })
        ));
    }

    #[test]
    fn test_empty_file_warns() {
        let dir = TempDir::new().unwrap();
        let empty = write(&dir, "empty.toml", "");
        let main = write(&dir, "spockd.toml", MINIMAL);

        let (_, diagnostics) = Config::from_files(&[main, empty]).unwrap();
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Warning(Warning::EmptyConfig { .. })
        )));
    }

    #[test]
    fn test_missing_file_error() {
        let missing_path = PathBuf::from("/nonexistent/spockd.toml");

        let err = Config::from_files(&[missing_path]).unwrap_err();
        let err_msg = err.to_string();
        assert!(err_msg.contains("Failed to read"));
        assert!(err_msg.contains("/nonexistent/spockd.toml"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let instance = InstanceConfig::new("super-secret");
        let rendered = format!("{:?}", instance);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
