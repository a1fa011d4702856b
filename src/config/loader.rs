//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::CairnConfig;
use super::secret::secret_string;
use crate::domain::errors::CairnError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into CairnConfig
/// 4. Applies environment variable overrides (CAIRN_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`CairnError::Configuration`] if the file is missing or unreadable,
/// references an unset variable, is not valid TOML, or fails validation.
///
/// # Examples
///
/// ```no_run
/// use cairn::config::loader::load_config;
///
/// let config = load_config("cairn.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<CairnConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CairnError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CairnError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: CairnConfig = toml::from_str(&contents)
        .map_err(|e| CairnError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        CairnError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| CairnError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|m| m == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(CairnError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_number<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.trim().parse().map_err(|_| {
        CairnError::Configuration(format!("{name} must be a number, got '{val}'"))
    })
}

/// Applies environment variable overrides using the CAIRN_* prefix
///
/// Environment variables follow the pattern `CAIRN_<SECTION>_<KEY>`, for
/// example `CAIRN_DATABASE_URL` or `CAIRN_LOCK_WAIT_TIMEOUT_SECONDS`. List
/// values are comma-separated.
fn apply_env_overrides(config: &mut CairnConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("CAIRN_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("CAIRN_APPLICATION_DATA_DIRECTORY") {
        config.application.data_directory = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("CAIRN_APPLICATION_AUTHENTICATED_USER_ID") {
        config.application.authenticated_user_id =
            Some(env_number("CAIRN_APPLICATION_AUTHENTICATED_USER_ID", &val)?);
    }

    // Database overrides
    if let Ok(val) = std::env::var("CAIRN_DATABASE_URL") {
        config.database.url = val;
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_DRIVER") {
        config.database.driver = Some(val);
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_USERNAME") {
        config.database.username = Some(val);
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_PASSWORD") {
        config.database.password = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_AUTO_UPDATE") {
        config.database.auto_update = val.trim().eq_ignore_ascii_case("true");
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_CONNECT_TIMEOUT_SECONDS") {
        config.database.connect_timeout_seconds =
            env_number("CAIRN_DATABASE_CONNECT_TIMEOUT_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("CAIRN_DATABASE_SSL_MODE") {
        config.database.ssl_mode = val;
    }

    // Changelog overrides
    if let Ok(val) = std::env::var("CAIRN_CHANGELOG_DIRECTORY") {
        config.changelog.directory = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("CAIRN_CHANGELOG_FILES") {
        config.changelog.files = env_list(&val);
    }
    if let Ok(val) = std::env::var("CAIRN_CHANGELOG_CONTEXTS") {
        config.changelog.contexts = env_list(&val);
    }

    // Lock overrides
    if let Ok(val) = std::env::var("CAIRN_LOCK_WAIT_TIMEOUT_SECONDS") {
        config.lock.wait_timeout_seconds = env_number("CAIRN_LOCK_WAIT_TIMEOUT_SECONDS", &val)?;
    }
    if let Ok(val) = std::env::var("CAIRN_LOCK_POLL_INTERVAL_MS") {
        config.lock.poll_interval_ms = env_number("CAIRN_LOCK_POLL_INTERVAL_MS", &val)?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("CAIRN_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("CAIRN_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("CAIRN_LOADER_TEST_VAR", "test_value");
        let input = "password = \"${CAIRN_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("CAIRN_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("CAIRN_LOADER_MISSING_VAR");
        let input = "password = \"${CAIRN_LOADER_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("CAIRN_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        std::env::remove_var("CAIRN_LOADER_COMMENTED_VAR");
        let input = "# password = \"${CAIRN_LOADER_COMMENTED_VAR}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_env_list() {
        assert_eq!(env_list("core, demo,,"), vec!["core", "demo"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(matches!(result, Err(CairnError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"
data_directory = "/tmp/openmrs"
authenticated_user_id = 1

[database]
url = "postgresql://db.example.org:5432/openmrs"
username = "openmrs"
password = "openmrs"

[changelog]
files = ["cairn-core-changelog.toml", "site-changelog.toml"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.authenticated_user_id, Some(1));
        assert_eq!(config.changelog.files.len(), 2);
        assert_eq!(config.changelog.contexts, vec!["core".to_string()]);
    }
}
