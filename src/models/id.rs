use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid asset id {value:?}: ids must be a single path segment (no '/', '\\\\', NUL, '.' or '..')")]
pub struct IdError {
    value: String,
}

/// Opaque identifier for stored assets.
///
/// File-backed storage uses the id as a directory name, so ids read from
/// outside the process go through [`Id::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate an id coming from user input or disk.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if Self::is_path_safe(&value) {
            Ok(Self(value))
        } else {
            Err(IdError { value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_path_safe(value: &str) -> bool {
        !(value.is_empty()
            || value == "."
            || value == ".."
            || value.contains(['/', '\\', '\0']))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_path_safe() {
        let first = Id::new();
        assert_ne!(first, Id::new());
        assert!(Id::is_path_safe(first.as_str()));
    }

    #[test]
    fn parse_rejects_unsafe_values() {
        assert!(Id::parse("../escape").is_err());
        assert!(Id::parse("..").is_err());
        assert!(Id::parse(".").is_err());
        assert!(Id::parse("").is_err());
        assert!(Id::parse("a/b").is_err());
        assert!(Id::parse("a\\b").is_err());
        assert!(Id::parse("bad\0id").is_err());
        assert_eq!(Id::parse("ppfas-flexi").unwrap().as_str(), "ppfas-flexi");
    }
}
