//! Typed configuration for the close-etl pipeline.
//!
//! Configuration is split into shared sections ([`shared`]) and a loader
//! ([`load`]) that layers `configuration/base.yaml`, an environment-specific
//! file, and `APP_`-prefixed environment variables.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod load;
pub mod shared;

/// A secret string that can round-trip through serde.
///
/// Wraps [`SecretString`] so that configuration structs holding credentials can
/// derive [`Deserialize`]. Debug output is always redacted; serialization
/// exposes the secret and must only be used when handing credentials to a
/// client that needs them.
#[derive(Clone)]
pub struct SerializableSecretString(SecretString);

impl SerializableSecretString {
    /// Returns the wrapped secret value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerializableSecretString(REDACTED)")
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(SecretString::new(value))
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;

        Ok(Self::from(value))
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.expose_secret())
    }
}
