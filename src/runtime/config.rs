//! # Configuration
//!
//! The orchestrator only needs one thing from configuration: given a unit name, hand back
//! that unit's subtree. That contract is the [`ConfigProvider`] trait.
//!
//! [`Configuration`] is the provider a real host uses. It is loaded **once** at process
//! entry from a YAML file and is read-only afterwards:
//!
//! - directories searched in order: `.` then `./config`
//! - file name: `config.yaml` (or `.yml`), or `config-<ENV>.yaml` when `ENV` is set
//! - keys are case-insensitive and dot-delimited (`db.host`, `API.Port`)
//!
//! ```yaml
//! service:
//!   group: demo
//!   name: machinery-sample
//!   version: 0.1.0
//! log:
//!   level: info
//!   format: compact
//! db:
//!   host: localhost
//!   port: 5432
//! api:
//!   port: 8080
//! ```

use crate::framework::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable selecting a configuration profile (`config-<ENV>.yaml`).
pub const PROFILE_ENV: &str = "ENV";

/// Directories [`Configuration::load`] searches, in order.
pub const SEARCH_DIRS: [&str; 2] = [".", "./config"];

const FILE_STEM: &str = "config";
const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Read access to a process-wide configuration snapshot.
pub trait ConfigProvider: Send + Sync {
    /// Returns the value at a case-insensitive dotted `key`, or `None` when absent.
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// Whether `key` is present. A key holding an empty value still counts as set.
    fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// An opaque configuration subtree handed to a unit.
///
/// The orchestrator never looks inside; the unit decides its shape, usually through
/// [`ConfigValue::deserialize`]. The value remembers the dotted key it was found under
/// so decode errors can name it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigValue {
    value: Value,
    key: String,
}

impl ConfigValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            key: String::new(),
        }
    }

    /// Tags the value with the key it was resolved from.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Dotted key this value was found under, empty for a detached value.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// `true` for a key that is present but empty (`db:` or `db: ~`).
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Looks up a nested dotted path below this value.
    pub fn get(&self, path: &str) -> Option<ConfigValue> {
        let key = match self.key.as_str() {
            "" => path.to_lowercase(),
            parent => format!("{parent}.{}", path.to_lowercase()),
        };
        lookup(&self.value, path)
            .cloned()
            .map(|value| ConfigValue { value, key })
    }

    /// Decodes the subtree into a typed settings struct. A null subtree decodes
    /// as an empty mapping so `#[serde(default)]` structs work for `db:` entries.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value = if self.value.is_null() {
            Value::Mapping(Mapping::new())
        } else {
            self.value.clone()
        };
        serde_yaml::from_value(value).map_err(|source| ConfigError::Deserialize {
            key: self.key.clone(),
            source,
        })
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Output format of the `tracing` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// The `log` section of the configuration file.
///
/// ```yaml
/// log:
///   level: info
///   format: compact
///   console:
///     enabled: true
///   file:
///     path: ./logs
///     filename: machinery.log
///     rotation: daily
///     max_files: 7
///     json: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
    /// Show module paths in each line.
    pub target: bool,
    pub console: ConsoleSettings,
    /// Rotating file output. No file is written when absent.
    pub file: Option<FileLogSettings>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            ansi: true,
            target: false,
            console: ConsoleSettings::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub enabled: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// How often the log file rolls over to a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// The `log.file` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileLogSettings {
    /// Directory holding the log files, created if missing.
    pub path: PathBuf,
    /// File name, or prefix when rotating (`machinery.log.2026-10-16`).
    pub filename: String,
    pub rotation: LogRotation,
    /// Rotated files kept on disk. Unbounded when absent.
    #[serde(alias = "maxbackups")]
    pub max_files: Option<usize>,
    /// Write JSON lines instead of plain text.
    pub json: bool,
}

impl Default for FileLogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs"),
            filename: "machinery.log".to_string(),
            rotation: LogRotation::Daily,
            max_files: None,
            json: false,
        }
    }
}

/// The `service` section: identifies the hosting program in startup logs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// File-backed configuration snapshot with case-insensitive keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    root: Value,
    source: Option<PathBuf>,
}

impl Configuration {
    /// Loads from the default search directories, honouring the `ENV` profile variable.
    pub fn load() -> Result<Self, ConfigError> {
        let profile = std::env::var(PROFILE_ENV).ok().filter(|p| !p.is_empty());
        Self::load_from(&SEARCH_DIRS, profile.as_deref())
    }

    /// Loads the first matching file found in `dirs`.
    pub fn load_from<P: AsRef<Path>>(dirs: &[P], profile: Option<&str>) -> Result<Self, ConfigError> {
        let stem = match profile {
            Some(profile) => format!("{FILE_STEM}-{profile}"),
            None => FILE_STEM.to_string(),
        };

        let mut searched = Vec::new();
        for dir in dirs {
            for ext in EXTENSIONS {
                let candidate = dir.as_ref().join(format!("{stem}.{ext}"));
                if candidate.is_file() {
                    return Self::from_path(candidate);
                }
                searched.push(candidate);
            }
        }

        Err(ConfigError::NotFound { searched })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { source })?;
        Self::from_value(value)
    }

    /// Wraps an in-memory tree. The root must be a mapping (or empty).
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let root = match value {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(_) => normalize_keys(value),
            _ => return Err(ConfigError::NotAMapping),
        };
        Ok(Self { root, source: None })
    }

    /// The file this snapshot was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Decodes the section at `key`, or `None` when the key is absent.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key).map(|value| value.deserialize()).transpose()
    }

    pub fn log_settings(&self) -> Result<LogSettings, ConfigError> {
        Ok(self.section("log")?.unwrap_or_default())
    }

    pub fn service(&self) -> Result<Option<ServiceInfo>, ConfigError> {
        self.section("service")
    }
}

impl ConfigProvider for Configuration {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        lookup(&self.root, key)
            .cloned()
            .map(|value| ConfigValue::new(value).with_key(key.to_lowercase()))
    }
}

impl FromStr for Configuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml_str(s)
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    key.split('.').try_fold(root, |node, segment| {
        node.as_mapping()?
            .get(segment.to_lowercase())
    })
}

// Keys are folded once at load so lookups only fold the query.
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, normalize_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
Service:
  Name: sample
DB:
  Host: localhost
  Port: 5432
api:
  port: 8080
empty:
log:
  level: debug
  format: json
"#;

    #[test]
    fn test_lookup_is_case_insensitive_and_dotted() {
        let config = Configuration::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(
            config.get("db.host").unwrap().as_value(),
            &Value::String("localhost".into())
        );
        assert_eq!(config.get("DB.PORT").unwrap().as_value().as_u64(), Some(5432));
        assert!(config.get("api.port.nested").is_none());
        assert!(config.get("").is_none());
    }

    #[test]
    fn test_empty_entry_counts_as_set() {
        let config = Configuration::from_yaml_str(SAMPLE).unwrap();

        assert!(config.is_set("empty"));
        assert!(config.get("empty").unwrap().is_null());
        assert!(!config.is_set("missing"));
    }

    #[test]
    fn test_typed_sections() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Db {
            host: String,
            port: u16,
        }

        let config = Configuration::from_yaml_str(SAMPLE).unwrap();
        let db: Db = config.section("db").unwrap().unwrap();
        assert_eq!(
            db,
            Db {
                host: "localhost".into(),
                port: 5432
            }
        );

        let log = config.log_settings().unwrap();
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert!(log.ansi);

        assert_eq!(config.service().unwrap().unwrap().name, "sample");
    }

    #[test]
    fn test_file_log_settings() {
        let config = Configuration::from_yaml_str(
            "log:\n  console:\n    enabled: false\n  file:\n    path: /var/log/app\n    maxBackups: 3\n    rotation: hourly\n",
        )
        .unwrap();
        let log = config.log_settings().unwrap();

        assert!(!log.console.enabled);
        let file = log.file.unwrap();
        assert_eq!(file.path, PathBuf::from("/var/log/app"));
        assert_eq!(file.filename, "machinery.log");
        assert_eq!(file.rotation, LogRotation::Hourly);
        assert_eq!(file.max_files, Some(3));
        assert!(!file.json);
    }

    #[test]
    fn test_log_settings_default_when_absent() {
        let config = Configuration::from_yaml_str("db: {}").unwrap();
        assert_eq!(config.log_settings().unwrap(), LogSettings::default());
        assert!(config.service().unwrap().is_none());
    }

    #[test]
    fn test_decode_failure_names_the_key() {
        let config = Configuration::from_yaml_str("api:\n  port: not-a-number\n").unwrap();

        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Api {
            port: u16,
        }

        let err = config.section::<Api>("api").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize { ref key, .. } if key == "api"));

        // A unit decoding the subtree it was handed gets the same key in the message.
        let err = config.get("API").unwrap().deserialize::<Api>().unwrap_err();
        assert!(err.to_string().starts_with("failed to decode configuration key `api`:"));
    }

    #[test]
    fn test_nested_value_extends_its_key() {
        let config = Configuration::from_yaml_str(SAMPLE).unwrap();
        let db = config.get("db").unwrap();

        assert_eq!(db.key(), "db");
        assert_eq!(db.get("Port").unwrap().key(), "db.port");
        assert_eq!(ConfigValue::new(Value::Null).key(), "");
    }

    #[test]
    fn test_root_must_be_mapping() {
        assert!(matches!(
            Configuration::from_yaml_str("- a\n- b\n"),
            Err(ConfigError::NotAMapping)
        ));
        assert!(Configuration::from_yaml_str("").is_ok());
    }

    #[test]
    fn test_load_from_dirs_with_profile() {
        let dir = std::env::temp_dir().join(format!("machinery-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "db:\n  host: default\n").unwrap();
        std::fs::write(dir.join("config-test.yml"), "db:\n  host: profiled\n").unwrap();

        let plain = Configuration::load_from(&[&dir], None).unwrap();
        assert_eq!(
            plain.get("db.host").unwrap().as_value(),
            &Value::String("default".into())
        );
        assert_eq!(plain.source(), Some(dir.join("config.yaml").as_path()));

        let profiled = Configuration::load_from(&[&dir], Some("test")).unwrap();
        assert_eq!(
            profiled.get("db.host").unwrap().as_value(),
            &Value::String("profiled".into())
        );

        let missing = Configuration::load_from(&[&dir], Some("prod")).unwrap_err();
        assert!(matches!(missing, ConfigError::NotFound { ref searched } if searched.len() == 2));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
