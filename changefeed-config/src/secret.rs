use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// Serializable wrapper around [`SecretString`].
///
/// Used for credentials loaded from configuration files, such as the password of the
/// checkpoint database. The value is redacted in debug output.
#[derive(Clone, Debug)]
pub struct SerializableSecretString(SecretString);

impl Deref for SerializableSecretString {
    type Target = SecretString;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<SerializableSecretString> for SecretString {
    fn from(value: SerializableSecretString) -> Self {
        value.0
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

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;

        Ok(Self(string.into()))
    }
}
