//! Database credential handling using the secrecy crate
//!
//! Passwords read from `cairn.toml` or from runtime properties are wrapped in
//! [`SecretString`] as soon as they are parsed. The inner value is zeroed on
//! drop, `Debug` output is redacted, and the connection provisioner is the only
//! place that calls `expose_secret()`.
//!
//! ```rust
//! use cairn::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let password = secret_string("openmrs".to_string());
//! assert_eq!(password.expose_secret().as_ref(), "openmrs");
//! assert!(!format!("{password:?}").contains("openmrs"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Password text that may be placed inside a [`Secret`]
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        SecretValue(s.to_string())
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SecretValue {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl SecretValue {
    /// Whether the password is blank
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// A password held in zeroizing, debug-redacted memory
pub type SecretString = Secret<SecretValue>;

/// Wraps a plain password
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

/// Wraps an optional password, treating blanks as absent
#[inline]
pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.filter(|s| !s.is_empty()).map(secret_string)
}
