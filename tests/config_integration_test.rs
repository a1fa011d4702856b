//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables should be run with --test-threads=1
//! to avoid interference between tests.

use cairn::config::{load_config, RuntimeProperties};
use cairn::core::changelog::CORE_CHANGELOG;
use cairn::core::DatabaseUpdater;
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::{NamedTempFile, TempDir};

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("CAIRN_APPLICATION_LOG_LEVEL");
    std::env::remove_var("CAIRN_DATABASE_URL");
    std::env::remove_var("CAIRN_DATABASE_AUTO_UPDATE");
    std::env::remove_var("CAIRN_CHANGELOG_FILES");
    std::env::remove_var("CAIRN_CHANGELOG_CONTEXTS");
    std::env::remove_var("CAIRN_LOCK_WAIT_TIMEOUT_SECONDS");
    std::env::remove_var("TEST_CAIRN_DB_PASSWORD");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(
        r#"
[application]
log_level = "debug"
data_directory = "/srv/openmrs"
authenticated_user_id = 2

[database]
url = "jdbc:postgresql://db:5432/openmrs"
driver = "org.postgresql.Driver"
username = "openmrs"
password = "hunter2"
auto_update = true
connect_timeout_seconds = 10
application_name = "openmrs-updater"
ssl_mode = "require"

[changelog]
directory = "/etc/cairn/changelogs"
files = ["cairn-core-changelog.toml", "site.toml"]
contexts = ["core", "demo"]

[lock]
wait_timeout_seconds = 60
poll_interval_ms = 500

[logging]
local_enabled = false
local_path = "/tmp/cairn"
local_rotation = "hourly"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.application.authenticated_user_id, Some(2));
    assert_eq!(config.database.driver.as_deref(), Some("org.postgresql.Driver"));
    assert_eq!(
        config.database.password.as_ref().unwrap().expose_secret().as_ref(),
        "hunter2"
    );
    assert!(config.database.auto_update);
    assert_eq!(config.database.ssl_mode, "require");
    assert_eq!(
        config.changelog.directory,
        Some(PathBuf::from("/etc/cairn/changelogs"))
    );
    assert_eq!(config.changelog.files.len(), 2);
    assert_eq!(config.changelog.contexts, vec!["core", "demo"]);
    assert_eq!(config.lock.wait_timeout_seconds, 60);
    assert_eq!(config.logging.local_rotation, "hourly");

    // The password never shows up in debug output
    assert!(!format!("{config:?}").contains("hunter2"));
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config("[database]\nurl = \"sqlite:///var/lib/openmrs/openmrs.db\"\n");

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.application.log_level, "info");
    assert!(!config.database.auto_update);
    assert_eq!(config.changelog.files, vec![CORE_CHANGELOG]);
    assert_eq!(config.changelog.contexts, vec!["core"]);
    assert_eq!(config.lock.wait_timeout_seconds, 300);
    assert_eq!(config.lock.poll_interval_ms, 1000);
    assert!(!config.logging.local_enabled);
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_CAIRN_DB_PASSWORD", "from-env");

    let file = write_config(
        "[database]\nurl = \"postgresql://db/openmrs\"\npassword = \"${TEST_CAIRN_DB_PASSWORD}\"\n",
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(
        config.database.password.as_ref().unwrap().expose_secret().as_ref(),
        "from-env"
    );

    cleanup_env_vars();
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_CAIRN_DB_PASSWORD"));
}

#[test]
fn test_env_var_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("CAIRN_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("CAIRN_DATABASE_URL", "sqlite:///tmp/override.db");
    std::env::set_var("CAIRN_DATABASE_AUTO_UPDATE", "true");
    std::env::set_var("CAIRN_CHANGELOG_FILES", "a.toml, b.toml");
    std::env::set_var("CAIRN_LOCK_WAIT_TIMEOUT_SECONDS", "5");

    let file = write_config("[database]\nurl = \"postgresql://db/openmrs\"\n");
    let result = load_config(file.path());
    cleanup_env_vars();

    let config = result.unwrap();
    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.database.url, "sqlite:///tmp/override.db");
    assert!(config.database.auto_update);
    assert_eq!(config.changelog.files, vec!["a.toml", "b.toml"]);
    assert_eq!(config.lock.wait_timeout_seconds, 5);
}

#[test]
fn test_invalid_config_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let bad_level = write_config(
        "[application]\nlog_level = \"loud\"\n\n[database]\nurl = \"sqlite:///tmp/x.db\"\n",
    );
    assert!(load_config(bad_level.path()).unwrap_err().is_configuration());

    let no_files =
        write_config("[database]\nurl = \"sqlite:///tmp/x.db\"\n\n[changelog]\nfiles = []\n");
    assert!(load_config(no_files.path()).unwrap_err().is_configuration());

    let missing_database = write_config("[application]\nlog_level = \"info\"\n");
    assert!(load_config(missing_database.path()).is_err());

    assert!(load_config("/nonexistent/cairn.toml").is_err());
}

#[tokio::test]
async fn test_runtime_properties_drive_an_update() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("openmrs.db");
    let properties_path = dir.path().join("openmrs-runtime.properties");
    std::fs::write(
        &properties_path,
        format!(
            "#Written by the installer\n\
             connection.url=jdbc\\:sqlite\\:{}\n\
             auto_update_database=true\n\
             application_data_directory={}\n",
            db_path.display(),
            dir.path().display()
        ),
    )
    .unwrap();

    let properties = RuntimeProperties::load(&properties_path).unwrap();
    let updater = DatabaseUpdater::from_runtime_properties(&properties).unwrap();
    assert!(updater.allow_auto_update());

    assert!(updater.updates_required().await.unwrap());
    let report = updater.execute_changelog(None, None).await.unwrap();
    assert_eq!(report.applied.len(), 3);
    assert!(!updater.updates_required().await.unwrap());
}
