//! Runtime properties supplied by a hosting EMR application
//!
//! Hosting applications keep their connection settings in a Java-style
//! properties file (`openmrs-runtime.properties`). [`RuntimeProperties`]
//! parses that format and maps it onto [`DatabaseConfig`] so the updater can be
//! driven without a `cairn.toml`.

use super::schema::DatabaseConfig;
use super::secret::secret_string_opt;
use crate::domain::errors::CairnError;
use crate::domain::result::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Property that enables unattended updates
pub const AUTO_UPDATE_PROPERTY: &str = "auto_update_database";

const DRIVER_PROPERTY: &str = "hibernate.connection.driver_class";
const URL_PROPERTY: &str = "hibernate.connection.url";
const USERNAME_PROPERTY: &str = "hibernate.connection.username";
const PASSWORD_PROPERTY: &str = "hibernate.connection.password";

/// Built-in values for keys the hosting application did not set
const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    (AUTO_UPDATE_PROPERTY, "false"),
    ("hibernate.connection.application_name", "cairn"),
];

/// Key/value runtime configuration owned by the hosting application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeProperties {
    values: BTreeMap<String, String>,
}

impl RuntimeProperties {
    /// Creates an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses properties text
    ///
    /// Follows the Java properties format: lines starting with `#` or `!`
    /// are comments, a line ending in an odd number of backslashes continues
    /// on the next one, and the key ends at the first unescaped `=`, `:` or
    /// whitespace. Keys and values are unescaped (`\:`, `\=`, `\t`, `\n`,
    /// `\uXXXX`, ...); trailing whitespace is dropped from values. A
    /// malformed `\u` escape is kept as written.
    pub fn parse(text: &str) -> Self {
        let values = logical_lines(text)
            .iter()
            .map(|line| {
                let (key, value) = split_entry(line);
                (unescape(key), unescape(value).trim_end().to_string())
            })
            .collect();
        Self { values }
    }

    /// Reads and parses a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CairnError::Configuration(format!(
                "Failed to read runtime properties {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::parse(&text))
    }

    /// Value of a property, if set
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Sets a property
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Whether the property set has no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mirrors plain keys under the `hibernate.` prefix and fills in defaults
    ///
    /// A key such as `connection.url` also becomes `hibernate.connection.url`
    /// unless that key is already present. Keys that already start with
    /// `hibernate` are left alone.
    pub fn merge_defaults(&mut self) {
        let mirrored: Vec<(String, String)> = self
            .values
            .iter()
            .filter(|(key, _)| !key.starts_with("hibernate"))
            .map(|(key, value)| (format!("hibernate.{key}"), value.clone()))
            .filter(|(key, _)| !self.values.contains_key(key))
            .collect();
        self.values.extend(mirrored);

        for (key, value) in DEFAULT_PROPERTIES {
            self.values
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
    }

    /// Builds the database section from the merged properties
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::Configuration`] when no connection URL is present
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        let mut merged = self.clone();
        merged.merge_defaults();

        let url = merged
            .get(URL_PROPERTY)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                CairnError::Configuration(format!(
                    "Runtime property {URL_PROPERTY} is not set"
                ))
            })?;

        let mut database = DatabaseConfig::new(url);
        database.driver = merged
            .get(DRIVER_PROPERTY)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        database.username = merged
            .get(USERNAME_PROPERTY)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        database.password = secret_string_opt(merged.get(PASSWORD_PROPERTY).map(str::to_string));
        database.auto_update = merged.allow_auto_update();
        if let Some(name) = merged.get("hibernate.connection.application_name") {
            database.application_name = name.to_string();
        }
        Ok(database)
    }

    /// Whether `auto_update_database` is exactly `true`
    pub fn allow_auto_update(&self) -> bool {
        self.get(AUTO_UPDATE_PROPERTY) == Some("true")
    }
}

const BLANKS: [char; 3] = [' ', '\t', '\u{c}'];

/// Joins continued lines and drops blank and comment lines
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_start_matches(BLANKS);
        let mut current = match pending.take() {
            Some(current) => current,
            None if line.is_empty() || line.starts_with(['#', '!']) => continue,
            None => String::new(),
        };

        let trailing_backslashes = line.chars().rev().take_while(|c| *c == '\\').count();
        if trailing_backslashes % 2 == 1 {
            current.push_str(&line[..line.len() - 1]);
            pending = Some(current);
        } else {
            current.push_str(line);
            lines.push(current);
        }
    }

    lines.extend(pending);
    lines
}

/// Splits a logical line into its raw key and raw value
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || BLANKS.contains(&c) {
            key_end = idx;
            break;
        }
    }

    let rest = line[key_end..].trim_start_matches(BLANKS);
    let rest = rest.strip_prefix(['=', ':']).unwrap_or(rest);
    (&line[..key_end], rest.trim_start_matches(BLANKS))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                let decoded = (hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(decoded) => {
                        out.push(decoded);
                        chars.nth(3);
                    }
                    None => out.push_str("\\u"),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{resolve_vendor, Vendor};
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r"
# OpenMRS runtime properties
connection.url=jdbc:postgresql://db:5432/openmrs
connection.username = openmrs
connection.password: s3cret
! legacy comment
auto_update_database=true
";

    #[test]
    fn test_parse_properties() {
        let props = RuntimeProperties::parse(SAMPLE);
        assert_eq!(
            props.get("connection.url"),
            Some("jdbc:postgresql://db:5432/openmrs")
        );
        assert_eq!(props.get("connection.username"), Some("openmrs"));
        assert_eq!(props.get("connection.password"), Some("s3cret"));
        assert!(props.get("legacy comment").is_none());
    }

    #[test]
    fn test_parse_escaped_properties() {
        let props = RuntimeProperties::parse(
            "#Generated by the installer\n\
             connection.url=jdbc\\:postgresql\\://db\\:5432/openmrs\n\
             connection.password=p\\=ss\\u00e9\n\
             data\\ dir=/srv/open\\\n\
             \t    mrs\n",
        );

        assert_eq!(
            props.get("connection.url"),
            Some("jdbc:postgresql://db:5432/openmrs")
        );
        assert_eq!(props.get("connection.password"), Some("p=ss\u{e9}"));
        assert_eq!(props.get("data dir"), Some("/srv/openmrs"));

        let database = props.database_config().unwrap();
        assert_eq!(
            resolve_vendor(database.driver.as_deref(), &database.url).unwrap(),
            Vendor::PostgreSql
        );
    }

    #[test]
    fn test_parse_whitespace_separators() {
        let props = RuntimeProperties::parse(
            "connection.username   openmrs\n\
             auto_update_database:true   \n\
             empty_value\n\
             unicode=\\uZZZZ\n",
        );
        assert_eq!(props.get("connection.username"), Some("openmrs"));
        assert!(props.allow_auto_update());
        assert_eq!(props.get("empty_value"), Some(""));
        assert_eq!(props.get("unicode"), Some("\\uZZZZ"));
    }

    #[test]
    fn test_merge_defaults_mirrors_plain_keys() {
        let mut props = RuntimeProperties::parse(SAMPLE);
        props.set("hibernate.connection.username", "override");
        props.merge_defaults();

        assert_eq!(
            props.get("hibernate.connection.url"),
            Some("jdbc:postgresql://db:5432/openmrs")
        );
        assert_eq!(props.get("hibernate.connection.username"), Some("override"));
        assert_eq!(
            props.get("hibernate.connection.application_name"),
            Some("cairn")
        );
        assert!(props.get("hibernate.hibernate.connection.username").is_none());
    }

    #[test]
    fn test_database_config_from_properties() {
        let props = RuntimeProperties::parse(SAMPLE);
        let database = props.database_config().unwrap();

        assert_eq!(database.url, "jdbc:postgresql://db:5432/openmrs");
        assert_eq!(database.username.as_deref(), Some("openmrs"));
        assert_eq!(
            database.password.as_ref().unwrap().expose_secret(),
            "s3cret"
        );
        assert!(database.auto_update);
    }

    #[test]
    fn test_database_config_requires_url() {
        let props = RuntimeProperties::parse("connection.username=openmrs");
        assert!(matches!(
            props.database_config(),
            Err(CairnError::Configuration(_))
        ));
    }

    #[test]
    fn test_allow_auto_update_is_exact() {
        assert!(!RuntimeProperties::parse("auto_update_database=TRUE").allow_auto_update());
        assert!(!RuntimeProperties::parse("auto_update_database=yes").allow_auto_update());
        assert!(!RuntimeProperties::new().allow_auto_update());
        assert!(RuntimeProperties::parse("auto_update_database=true").allow_auto_update());
    }
}
