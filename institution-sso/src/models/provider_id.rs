use mongodb::bson::Bson;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of an institution's SSO configuration.
///
/// The directory reports institution ids as numbers while user documents store
/// them as strings (older documents sometimes as numbers too), so every form is
/// normalised to its decimal string on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&ProviderId> for ProviderId {
    fn from(value: &ProviderId) -> Self {
        value.clone()
    }
}

macro_rules! provider_id_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ProviderId {
                fn from(value: $t) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

provider_id_from_int!(i32, i64, u32, u64);

impl From<ProviderId> for Bson {
    fn from(value: ProviderId) -> Self {
        Bson::String(value.0)
    }
}

// `From<&ProviderId> for Bson` is provided by bson's blanket
// `impl<T: Clone + Into<Bson>> From<&T> for Bson`.

impl<'de> Deserialize<'de> for ProviderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(i) => Self(i.to_string()),
            // Whole-number floats come from JSON producers that do not keep integer types
            Raw::Float(f) if f.fract() == 0.0 => Self((f as i64).to_string()),
            Raw::Float(f) => Self(f.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}
