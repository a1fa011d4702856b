//! Connection provisioning
//!
//! Resolves the vendor from the configured driver or URL, applies the
//! vendor-specific session adjustments, and opens one raw connection.

use crate::adapters::database::traits::{MigrationDatabase, Vendor};
use crate::adapters::postgresql::PostgresDatabase;
use crate::adapters::sqlite::{SqliteDatabase, MEMORY_PATH};
use crate::config::DatabaseConfig;
use crate::domain::{CairnError, Result};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Socket};
use url::Url;

const MISCONFIGURATION_HINT: &str =
    "check database.url, database.username and database.password";

/// Determines the vendor from an explicit driver name or the URL scheme
///
/// Legacy JDBC driver class names are accepted so runtime properties written
/// for a JVM deployment keep working.
///
/// # Errors
///
/// Returns [`CairnError::Configuration`] when the driver is unknown or the URL
/// scheme is not recognised.
pub fn resolve_vendor(driver: Option<&str>, url: &str) -> Result<Vendor> {
    if let Some(driver) = driver.map(str::trim).filter(|d| !d.is_empty()) {
        return match driver.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "org.postgresql.driver" => Ok(Vendor::PostgreSql),
            "sqlite" | "sqlite3" | "org.sqlite.jdbc" => Ok(Vendor::Sqlite),
            _ => Err(CairnError::Configuration(format!(
                "Database driver not found: {driver}"
            ))),
        };
    }

    let url = strip_jdbc(url.trim());
    if url.starts_with("postgresql://") || url.starts_with("postgres://") {
        Ok(Vendor::PostgreSql)
    } else if url.starts_with("sqlite:") {
        Ok(Vendor::Sqlite)
    } else {
        Err(CairnError::Configuration(format!(
            "Database driver not found for URL {}",
            safe_url(url)
        )))
    }
}

fn strip_jdbc(url: &str) -> &str {
    url.strip_prefix("jdbc:").unwrap_or(url)
}

/// Returns the URL with any embedded password masked
///
/// # Examples
///
/// ```
/// use cairn::adapters::database::factory::safe_url;
///
/// assert_eq!(
///     safe_url("postgresql://openmrs:secret@db:5432/openmrs"),
///     "postgresql://openmrs:****@db:5432/openmrs"
/// );
/// ```
pub fn safe_url(url: &str) -> String {
    let bare = strip_jdbc(url);
    let prefix = &url[..url.len() - bare.len()];

    match Url::parse(bare) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                format!("{prefix}{parsed}")
            } else {
                "<redacted>".to_string()
            }
        }
        Ok(_) => url.to_string(),
        Err(_) if url.contains('@') => "<redacted>".to_string(),
        Err(_) => url.to_string(),
    }
}

/// Extracts the database path from a `sqlite:` URL
fn sqlite_path(url: &str) -> Result<String> {
    let bare = strip_jdbc(url.trim());
    let rest = bare
        .strip_prefix("sqlite://")
        .or_else(|| bare.strip_prefix("sqlite:"))
        .ok_or_else(|| CairnError::Configuration(format!("Not a SQLite URL: {url}")))?;
    let path = rest.split('?').next().unwrap_or_default();

    match path {
        "" => Err(CairnError::Configuration(format!(
            "SQLite URL has no database path: {url}"
        ))),
        ":memory:" => Ok(MEMORY_PATH.to_string()),
        p => Ok(p.to_string()),
    }
}

/// Builds the PostgreSQL session configuration, applying overrides
fn postgres_config(database: &DatabaseConfig) -> Result<tokio_postgres::Config> {
    let url = strip_jdbc(database.url.trim());
    let mut config: tokio_postgres::Config = url.parse().map_err(|e| {
        CairnError::Configuration(format!(
            "Malformed database.url {}: {e}",
            safe_url(&database.url)
        ))
    })?;

    if let Some(username) = &database.username {
        config.user(username);
    }
    if let Some(password) = &database.password {
        config.password(password.expose_secret().as_ref());
    }
    config.connect_timeout(database.connect_timeout());
    config.application_name(&database.application_name);
    config.ssl_mode(match database.ssl_mode.as_str() {
        "disable" => SslMode::Disable,
        "require" => SslMode::Require,
        _ => SslMode::Prefer,
    });

    Ok(config)
}

async fn connect_postgres<T>(config: &tokio_postgres::Config, tls: T) -> Result<PostgresDatabase>
where
    T: MakeTlsConnect<Socket> + Send + 'static,
    T::Stream: Send + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| CairnError::Connection(format!("{e}; {MISCONFIGURATION_HINT}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "PostgreSQL connection closed with error");
        }
    });

    Ok(PostgresDatabase::new(client, task))
}

/// Opens one connection to the configured database
///
/// # Errors
///
/// - [`CairnError::Configuration`] for an unknown driver or malformed URL
/// - [`CairnError::Connection`] when the database cannot be reached or rejects
///   the credentials; the message names the settings to check
pub async fn connect(database: &DatabaseConfig) -> Result<Box<dyn MigrationDatabase>> {
    let vendor = resolve_vendor(database.driver.as_deref(), &database.url)?;
    tracing::debug!(vendor = %vendor, url = %safe_url(&database.url), "Opening database connection");

    match vendor {
        Vendor::PostgreSql => {
            let config = postgres_config(database)?;
            let db = if database.ssl_mode == "disable" {
                connect_postgres(&config, NoTls).await?
            } else {
                let connector = native_tls::TlsConnector::new().map_err(|e| {
                    CairnError::Configuration(format!("Failed to initialise TLS: {e}"))
                })?;
                connect_postgres(&config, postgres_native_tls::MakeTlsConnector::new(connector))
                    .await?
            };
            Ok(Box::new(db))
        }
        Vendor::Sqlite => {
            let path = sqlite_path(&database.url)?;
            let busy_timeout = Duration::from_millis(database.busy_timeout_ms);
            let db = SqliteDatabase::open(&path, busy_timeout).map_err(|e| {
                CairnError::Connection(format!(
                    "Cannot open {}: {e}; {MISCONFIGURATION_HINT}",
                    safe_url(&database.url)
                ))
            })?;
            Ok(Box::new(db))
        }
    }
}

/// Closes a connection, logging instead of failing
pub async fn close_quietly(db: Box<dyn MigrationDatabase>) {
    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use test_case::test_case;

    #[test_case(None, "postgresql://db/openmrs" => Vendor::PostgreSql; "postgresql scheme")]
    #[test_case(None, "postgres://db/openmrs" => Vendor::PostgreSql; "postgres scheme")]
    #[test_case(None, "jdbc:postgresql://db:5432/openmrs" => Vendor::PostgreSql; "jdbc postgresql")]
    #[test_case(None, "sqlite://openmrs.db" => Vendor::Sqlite; "sqlite scheme")]
    #[test_case(None, "jdbc:sqlite:/tmp/openmrs.db" => Vendor::Sqlite; "jdbc sqlite")]
    #[test_case(Some("org.postgresql.Driver"), "anything" => Vendor::PostgreSql; "jdbc driver class")]
    #[test_case(Some("sqlite"), "sqlite::memory:" => Vendor::Sqlite; "driver name")]
    fn test_resolve_vendor(driver: Option<&str>, url: &str) -> Vendor {
        resolve_vendor(driver, url).unwrap()
    }

    #[test]
    fn test_unknown_driver_is_configuration_error() {
        let err = resolve_vendor(Some("com.mysql.jdbc.Driver"), "jdbc:mysql://db/openmrs")
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("driver not found"));

        let err = resolve_vendor(None, "mysql://db/openmrs").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_safe_url_masks_password() {
        assert_eq!(
            safe_url("jdbc:postgresql://openmrs:secret@db:5432/openmrs"),
            "jdbc:postgresql://openmrs:****@db:5432/openmrs"
        );
        assert_eq!(safe_url("sqlite://openmrs.db"), "sqlite://openmrs.db");
    }

    #[test]
    fn test_sqlite_path_forms() {
        assert_eq!(sqlite_path("sqlite://openmrs.db").unwrap(), "openmrs.db");
        assert_eq!(sqlite_path("sqlite:///var/lib/openmrs.db").unwrap(), "/var/lib/openmrs.db");
        assert_eq!(sqlite_path("jdbc:sqlite:data/openmrs.db?mode=rwc").unwrap(), "data/openmrs.db");
        assert_eq!(sqlite_path("sqlite::memory:").unwrap(), MEMORY_PATH);
        assert!(sqlite_path("sqlite://").is_err());
    }

    #[test]
    fn test_postgres_config_applies_overrides() {
        let mut database = DatabaseConfig::new("jdbc:postgresql://url-user@db:5432/openmrs");
        database.username = Some("openmrs".to_string());
        database.password = Some(secret_string("secret".to_string()));
        database.ssl_mode = "disable".to_string();

        let config = postgres_config(&database).unwrap();
        assert_eq!(config.get_user(), Some("openmrs"));
        assert_eq!(config.get_password(), Some(b"secret".as_ref()));
        assert_eq!(config.get_dbname(), Some("openmrs"));
        assert_eq!(config.get_application_name(), Some("cairn"));
        assert_eq!(config.get_ssl_mode(), SslMode::Disable);
    }

    #[test]
    fn test_postgres_config_rejects_malformed_url() {
        let database = DatabaseConfig::new("postgresql://db:notaport/openmrs");
        assert!(postgres_config(&database).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_connect_sqlite_failure_is_connection_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}/missing/dir/openmrs.db", dir.path().display());
        let err = connect(&DatabaseConfig::new(url)).await.err().unwrap();
        assert!(matches!(err, CairnError::Connection(_)));
        assert!(err.to_string().contains("database.url"));
    }
}
