pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration loaded from YAML files, `.env` files, and
/// environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml` (base)
/// 2. `application-{profile}.yaml` (profile override)
/// 3. `.env` file (loaded into process environment)
/// 4. `.env.{profile}` file (loaded into process environment)
/// 5. Environment variables (e.g., `APP_DATABASE_URL` overrides `app.database.url`)
///
/// `.env` files never overwrite already-set environment variables.
///
/// Profile is determined by: `STRATA_PROFILE` env var > argument > default `"dev"`.
#[derive(Debug, Clone)]
pub struct StrataConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl StrataConfig {
    /// Load configuration for the given profile.
    ///
    /// Looks for `application.yaml` and `application-{profile}.yaml` in the
    /// current working directory, resolves `${...}` placeholders in string
    /// values, then overlays environment variables.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("STRATA_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();

        // 1. Load base config
        overlay_yaml_file(Path::new("application.yaml"), &mut values)?;

        // 2. Load profile config
        let profile_path = format!("application-{active_profile}.yaml");
        overlay_yaml_file(Path::new(&profile_path), &mut values)?;

        // 3. Load .env files (does NOT overwrite existing env vars)
        let _ = dotenvy::dotenv();
        let profile_env = format!(".env.{active_profile}");
        let _ = dotenvy::from_filename(&profile_env);

        // 4. Resolve ${...} placeholders in string values
        resolve_string_values(&mut values)?;

        // 5. Overlay environment variables
        // Convention: `app.database.url` <-> `APP_DATABASE_URL`
        for (env_key, env_val) in std::env::vars() {
            let config_key = env_key.to_lowercase().replace('_', ".");
            values.insert(config_key, ConfigValue::String(env_val));
        }

        Ok(StrataConfig {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        overlay_yaml_str(yaml, &mut values)?;
        Ok(StrataConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        StrataConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for the given dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the key does not exist, or
    /// `ConfigError::TypeMismatch` if the value cannot be converted.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, returning a default if the key is missing.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Check whether a key exists in the config.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Overlay a YAML file onto the config map. A missing file is skipped, so
/// profile overrides are optional.
fn overlay_yaml_file(
    path: &Path,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    overlay_yaml_str(&content, values)
}

/// Overlay YAML content onto the config map, flattening nested mappings to
/// dot-separated keys. Later layers overwrite earlier ones key by key, which
/// is what lets a profile file override a single leaf of the base file.
///
/// Sequences stay whole under their key; keys are addressed leaf by leaf.
fn overlay_yaml_str(
    content: &str,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    let root: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    match root {
        serde_yaml::Value::Mapping(map) => {
            let mut path = String::new();
            overlay_mapping(&map, &mut path, values);
            Ok(())
        }
        serde_yaml::Value::Null => Ok(()),
        _ => Err(ConfigError::Load(
            "top level of a config file must be a mapping".to_string(),
        )),
    }
}

fn overlay_mapping(
    map: &serde_yaml::Mapping,
    path: &mut String,
    out: &mut HashMap<String, ConfigValue>,
) {
    for (key, value) in map {
        let key = match key {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        let saved = path.len();
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(&key);
        match value {
            serde_yaml::Value::Mapping(inner) => overlay_mapping(inner, path, out),
            leaf => {
                out.insert(path.clone(), ConfigValue::from_yaml(leaf));
            }
        }
        path.truncate(saved);
    }
}

/// Resolve `${...}` placeholders in all string values of the config map.
fn resolve_string_values(values: &mut HashMap<String, ConfigValue>) -> Result<(), ConfigError> {
    let keys: Vec<String> = values.keys().cloned().collect();
    for key in keys {
        if let Some(ConfigValue::String(s)) = values.get(&key) {
            if s.contains("${") {
                let resolved = resolve_placeholders(s)?;
                values.insert(key, ConfigValue::String(resolved));
            }
        }
    }
    Ok(())
}

/// Resolve `${...}` placeholders in a string value.
///
/// Supports `${VAR_NAME}` and `${env:VAR_NAME}` for environment variables,
/// and `${file:/path/to/secret}` for file contents (trimmed).
pub fn resolve_placeholders(value: &str) -> Result<String, ConfigError> {
    let mut result = value.to_string();
    // Find "${" then everything until "}"
    while let Some(start) = result.find("${") {
        let end = result[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("Unclosed placeholder in: {value}")))?;
        let reference = &result[start + 2..start + end];
        let resolved = resolve_reference(reference)?;
        result = format!(
            "{}{}{}",
            &result[..start],
            resolved,
            &result[start + end + 1..]
        );
    }
    Ok(result)
}

fn resolve_reference(reference: &str) -> Result<String, ConfigError> {
    if let Some(path) = reference.strip_prefix("file:") {
        std::fs::read_to_string(path.trim())
            .map(|s| s.trim().to_string())
            .map_err(|e| ConfigError::Load(format!("Secret file '{}': {}", path.trim(), e)))
    } else if let Some(var) = reference.strip_prefix("env:") {
        std::env::var(var.trim()).map_err(|_| ConfigError::NotFound(format!("env:{}", var.trim())))
    } else {
        // Default: env var
        std::env::var(reference.trim())
            .map_err(|_| ConfigError::NotFound(reference.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_keys_flatten_to_dotted_paths() {
        let config = StrataConfig::from_yaml_str(
            r#"
strata:
  datasource:
    url: "sqlite::memory:"
    dialect: sqlite
    max-connections: 5
    trace-sql: true
"#,
            "test",
        )
        .unwrap();
        assert_eq!(
            config.get::<String>("strata.datasource.url").unwrap(),
            "sqlite::memory:"
        );
        assert_eq!(
            config.get::<u32>("strata.datasource.max-connections").unwrap(),
            5
        );
        assert!(config.get::<bool>("strata.datasource.trace-sql").unwrap());
    }

    #[test]
    fn sequences_stay_whole_under_their_key() {
        let config = StrataConfig::from_yaml_str(
            "strata:\n  replicas:\n    - primary\n    - standby\n",
            "test",
        )
        .unwrap();
        let replicas: Vec<String> = config.get("strata.replicas").unwrap();
        assert_eq!(replicas, vec!["primary", "standby"]);
    }

    #[test]
    fn later_layer_overrides_single_leaf() {
        let mut values = HashMap::new();
        overlay_yaml_str("db:\n  url: base\n  pool: 5\n", &mut values).unwrap();
        overlay_yaml_str("db:\n  url: override\n", &mut values).unwrap();
        let config = StrataConfig { values, profile: "test".into() };
        assert_eq!(config.get::<String>("db.url").unwrap(), "override");
        assert_eq!(config.get::<i64>("db.pool").unwrap(), 5);
    }

    #[test]
    fn scalar_document_root_is_rejected() {
        assert!(StrataConfig::from_yaml_str("42", "test").is_err());
    }

    #[test]
    fn missing_key_reports_not_found() {
        let config = StrataConfig::empty();
        let err = config.get::<String>("nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(key) if key == "nope"));
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let config = StrataConfig::empty();
        assert_eq!(config.get_or("strata.datasource.command-timeout", 30i64), 30);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let config = StrataConfig::from_yaml_str("port: hello", "test").unwrap();
        let err = config.get::<i64>("port").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn env_placeholder_resolution() {
        std::env::set_var("TEST_STRATA_DB_URL", "postgres://localhost/test");
        let result = resolve_placeholders("${TEST_STRATA_DB_URL}").unwrap();
        assert_eq!(result, "postgres://localhost/test");
        std::env::remove_var("TEST_STRATA_DB_URL");
    }

    #[test]
    fn mixed_placeholder_resolution() {
        std::env::set_var("TEST_STRATA_HOST", "localhost");
        let result = resolve_placeholders("mysql://${TEST_STRATA_HOST}:3306/app").unwrap();
        assert_eq!(result, "mysql://localhost:3306/app");
        std::env::remove_var("TEST_STRATA_HOST");
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        assert!(resolve_placeholders("${UNCLOSED").is_err());
    }

    #[test]
    fn file_placeholder_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let secret_file = dir.path().join("secret.txt");
        std::fs::write(&secret_file, "my-secret-value\n").unwrap();

        let ref_str = format!("${{file:{}}}", secret_file.display());
        let result = resolve_placeholders(&ref_str).unwrap();
        assert_eq!(result, "my-secret-value");
    }

    #[test]
    fn programmatic_set_overrides() {
        let mut config = StrataConfig::empty();
        config.set("a.b", ConfigValue::Integer(7));
        assert_eq!(config.get::<i64>("a.b").unwrap(), 7);
    }
}
